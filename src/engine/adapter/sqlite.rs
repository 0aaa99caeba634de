//! SQLite Adapter
//!
//! Implements [`RelationalStore`] for SQLite using rusqlite + r2d2 connection
//! pooling. rusqlite is blocking, so every statement runs on the blocking
//! thread pool via `spawn_blocking`.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::builder::QueryBuilder;
use super::dialect::SqlDialect;
use super::{
    AdapterError, AdapterResult, Condition, RelationalStore, SelectQuery, SqlValue,
    TransactionHandle,
};
use crate::engine::Row;

type DbPool = Pool<SqliteConnectionManager>;
type DbConn = PooledConnection<SqliteConnectionManager>;

const MEMORY_PATH: &str = ":memory:";

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::from(rusqlite::types::Null),
            SqlValue::Integer(i) => ToSqlOutput::from(*i),
            SqlValue::Real(f) => ToSqlOutput::from(*f),
            SqlValue::Text(s) => ToSqlOutput::from(s.as_str()),
            SqlValue::Bool(b) => ToSqlOutput::from(*b),
            SqlValue::Blob(b) => ToSqlOutput::from(b.as_slice()),
        })
    }
}

#[derive(Clone)]
pub struct SqliteAdapter {
    pool: DbPool,
    db_path: PathBuf,
}

impl SqliteAdapter {
    pub fn new(db_path: &Path, pool_size: u32) -> AdapterResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;"));
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e| AdapterError::Connection(e.to_string()))?;

        let conn = pool
            .get()
            .map_err(|e| AdapterError::Connection(e.to_string()))?;
        let _: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| AdapterError::Schema(e.to_string()))?;

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    /// Single-connection in-memory database. Every pooled connection to
    /// `:memory:` would otherwise see its own empty database, so the one
    /// connection is never recycled by the pool reaper.
    pub fn in_memory() -> AdapterResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys=ON"));
        let pool = Pool::builder()
            .max_size(1)
            .max_lifetime(None)
            .idle_timeout(None)
            .build(manager)
            .map_err(|e| AdapterError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            db_path: PathBuf::from(MEMORY_PATH),
        })
    }

    async fn run<T, F>(&self, f: F) -> AdapterResult<T>
    where
        F: FnOnce(&Connection) -> AdapterResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| AdapterError::Connection(e.to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| AdapterError::Internal(e.to_string()))?
    }

    async fn begin_transaction(&self) -> AdapterResult<Arc<dyn TransactionHandle>> {
        let pool = self.pool.clone();
        let conn = tokio::task::spawn_blocking(move || -> AdapterResult<DbConn> {
            let conn = pool
                .get()
                .map_err(|e| AdapterError::Connection(e.to_string()))?;
            conn.execute_batch("BEGIN")
                .map_err(|e| AdapterError::Transaction(e.to_string()))?;
            Ok(conn)
        })
        .await
        .map_err(|e| AdapterError::Internal(e.to_string()))??;

        tracing::debug!(path = %self.db_path.display(), "sqlite transaction started");
        Ok(Arc::new(SqliteTransaction {
            conn: Arc::new(Mutex::new(Some(conn))),
        }))
    }
}

/// An open SQLite transaction holding one pooled connection until it is
/// committed or rolled back. Dropping it unfinished rolls back.
pub struct SqliteTransaction {
    conn: Arc<Mutex<Option<DbConn>>>,
}

impl SqliteTransaction {
    async fn run<T, F>(&self, f: F) -> AdapterResult<T>
    where
        F: FnOnce(&Connection) -> AdapterResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let slot = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = slot
                .lock()
                .map_err(|_| AdapterError::Transaction("connection lock poisoned".to_string()))?;
            let conn = guard
                .as_ref()
                .ok_or_else(|| AdapterError::Transaction("transaction already finished".to_string()))?;
            f(conn)
        })
        .await
        .map_err(|e| AdapterError::Internal(e.to_string()))?
    }

    async fn finish(&self, statement: &'static str) -> AdapterResult<()> {
        let slot = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| AdapterError::Transaction("connection lock poisoned".to_string()))?;
            let conn = guard
                .take()
                .ok_or_else(|| AdapterError::Transaction("transaction already finished".to_string()))?;
            conn.execute_batch(statement)
                .map_err(|e| AdapterError::Transaction(e.to_string()))
        })
        .await
        .map_err(|e| AdapterError::Internal(e.to_string()))?
    }

    async fn begin_transaction(&self) -> AdapterResult<Arc<dyn TransactionHandle>> {
        Err(AdapterError::Transaction(
            "nested transactions are not supported".to_string(),
        ))
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.conn.lock() {
            if let Some(conn) = guard.take() {
                tracing::warn!("sqlite transaction dropped without commit, rolling back");
                let _ = conn.execute_batch("ROLLBACK");
            }
        }
    }
}

fn query_err(e: rusqlite::Error) -> AdapterError {
    AdapterError::Query(e.to_string())
}

/// Convert a rusqlite ValueRef to serde_json Value
fn value_ref_to_json(val: ValueRef<'_>) -> Value {
    match val {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => json!(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => json!(format!("BLOB({} bytes)", b.len())),
    }
}

fn query_rows(conn: &Connection, sql: &str, params: &[SqlValue]) -> AdapterResult<Vec<Row>> {
    tracing::trace!(%sql, params = params.len(), "sqlite query");
    let mut stmt = conn.prepare(sql).map_err(query_err)?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            let mut map = Row::new();
            for (i, name) in column_names.iter().enumerate() {
                map.insert(name.clone(), value_ref_to_json(row.get_ref(i)?));
            }
            Ok(map)
        })
        .map_err(query_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(query_err)?;
    Ok(rows)
}

fn execute(conn: &Connection, sql: &str, params: &[SqlValue]) -> AdapterResult<u64> {
    tracing::trace!(%sql, params = params.len(), "sqlite execute");
    let affected = conn
        .execute(sql, params_from_iter(params.iter()))
        .map_err(query_err)?;
    Ok(affected as u64)
}

/// Inserts run under a savepoint so a batch is all-or-nothing, also when the
/// connection is already inside a transaction.
fn insert_rows(conn: &Connection, table: &str, id_column: &str, rows: &[Row]) -> AdapterResult<Vec<Value>> {
    let builder = QueryBuilder::new(SqlDialect::Sqlite);
    conn.execute_batch("SAVEPOINT weft_insert").map_err(query_err)?;

    let mut ids = Vec::with_capacity(rows.len());
    for row in rows {
        let (sql, params) = builder.insert(table, row);
        if let Err(e) = execute(conn, &sql, &params) {
            let _ = conn.execute_batch("ROLLBACK TO weft_insert; RELEASE weft_insert");
            return Err(e);
        }
        let id = match row.get(id_column) {
            Some(explicit) if !explicit.is_null() => explicit.clone(),
            _ => json!(conn.last_insert_rowid()),
        };
        ids.push(id);
    }

    conn.execute_batch("RELEASE weft_insert").map_err(query_err)?;
    Ok(ids)
}

macro_rules! impl_relational_store {
    ($store:ty) => {
        #[async_trait]
        impl RelationalStore for $store {
            fn dialect(&self) -> SqlDialect {
                SqlDialect::Sqlite
            }

            async fn select(&self, query: &SelectQuery) -> AdapterResult<Vec<Row>> {
                let (sql, params) = QueryBuilder::new(SqlDialect::Sqlite).select(query);
                self.run(move |conn| query_rows(conn, &sql, &params)).await
            }

            async fn count(&self, table: &str, conditions: &[Condition]) -> AdapterResult<u64> {
                let (sql, params) = QueryBuilder::new(SqlDialect::Sqlite).count(table, conditions);
                self.run(move |conn| {
                    let count: i64 = conn
                        .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))
                        .map_err(query_err)?;
                    Ok(count as u64)
                })
                .await
            }

            async fn insert(&self, table: &str, id_column: &str, rows: &[Row]) -> AdapterResult<Vec<Value>> {
                let table = table.to_string();
                let id_column = id_column.to_string();
                let rows = rows.to_vec();
                self.run(move |conn| insert_rows(conn, &table, &id_column, &rows)).await
            }

            async fn update(&self, table: &str, conditions: &[Condition], data: &Row) -> AdapterResult<u64> {
                let (sql, params) = QueryBuilder::new(SqlDialect::Sqlite).update(table, conditions, data)?;
                self.run(move |conn| execute(conn, &sql, &params)).await
            }

            async fn delete(&self, table: &str, conditions: &[Condition]) -> AdapterResult<u64> {
                let (sql, params) = QueryBuilder::new(SqlDialect::Sqlite).delete(table, conditions);
                self.run(move |conn| execute(conn, &sql, &params)).await
            }

            async fn execute(&self, sql: &str, params: &[SqlValue]) -> AdapterResult<u64> {
                let sql = sql.to_string();
                let params = params.to_vec();
                self.run(move |conn| execute(conn, &sql, &params)).await
            }

            async fn begin(&self) -> AdapterResult<Arc<dyn TransactionHandle>> {
                self.begin_transaction().await
            }
        }
    };
}

impl_relational_store!(SqliteAdapter);
impl_relational_store!(SqliteTransaction);

#[async_trait]
impl TransactionHandle for SqliteTransaction {
    async fn commit(&self) -> AdapterResult<()> {
        self.finish("COMMIT").await?;
        tracing::debug!("sqlite transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> AdapterResult<()> {
        self.finish("ROLLBACK").await?;
        tracing::debug!("sqlite transaction rolled back");
        Ok(())
    }

    fn as_store(self: Arc<Self>) -> Arc<dyn RelationalStore> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .unwrap();
        adapter
    }

    fn row(name: &str) -> Row {
        let mut row = Row::new();
        row.insert("name".into(), json!(name));
        row
    }

    #[tokio::test]
    async fn test_insert_reports_generated_and_explicit_ids() {
        let adapter = seeded().await;
        let mut explicit = row("b");
        explicit.insert("id".into(), json!(40));
        let ids = adapter
            .insert("t", "id", &[row("a"), explicit, row("c")])
            .await
            .unwrap();
        assert_eq!(ids, vec![json!(1), json!(40), json!(41)]);
        assert_eq!(adapter.count("t", &[]).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failed_batch_insert_is_rolled_back() {
        let adapter = seeded().await;
        let mut dup = row("dup");
        dup.insert("id".into(), json!(1));
        let mut first = row("first");
        first.insert("id".into(), json!(1));
        assert!(adapter.insert("t", "id", &[first, dup]).await.is_err());
        assert_eq!(adapter.count("t", &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_in_memory_connection_is_never_recycled() {
        let adapter = seeded().await;
        assert_eq!(adapter.pool.max_size(), 1);
        assert_eq!(adapter.pool.max_lifetime(), None);
        assert_eq!(adapter.pool.idle_timeout(), None);
        assert_eq!(adapter.count("t", &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_table_is_query_error() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        let result = adapter.select(&SelectQuery::new("not_found")).await;
        assert!(matches!(result, Err(AdapterError::Query(_))));
    }
}
