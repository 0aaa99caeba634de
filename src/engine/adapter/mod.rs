//! Relational Adapter Layer
//!
//! Trait-based abstraction over a relational backing store. Queries are
//! described as plain data ([`SelectQuery`], [`Condition`]) and rendered to
//! SQL by the driver, so the filter compiler never touches SQL text.
//! Currently ships a SQLite driver; the dialect layer also renders MySQL and
//! PostgreSQL placeholders and quoting.

pub mod builder;
pub mod dialect;
pub mod sqlite;

pub use builder::QueryBuilder;
pub use dialect::SqlDialect;
pub use sqlite::{SqliteAdapter, SqliteTransaction};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::sort::Sort;
use super::Row;

/// Universal result type for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Relational backing store. Every call is a suspension point.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Which SQL dialect this store speaks
    fn dialect(&self) -> SqlDialect;

    /// Run a SELECT built from `query`
    async fn select(&self, query: &SelectQuery) -> AdapterResult<Vec<Row>>;

    /// `SELECT COUNT(*)` over the rows matching `conditions`
    async fn count(&self, table: &str, conditions: &[Condition]) -> AdapterResult<u64>;

    /// Insert rows, returning the identity value of each inserted row.
    ///
    /// Rows carrying an explicit `id_column` value report it; others report
    /// the id generated by the store.
    async fn insert(&self, table: &str, id_column: &str, rows: &[Row]) -> AdapterResult<Vec<Value>>;

    /// Update matching rows with `data`, returning the affected count
    async fn update(&self, table: &str, conditions: &[Condition], data: &Row) -> AdapterResult<u64>;

    /// Delete matching rows, returning the affected count
    async fn delete(&self, table: &str, conditions: &[Condition]) -> AdapterResult<u64>;

    /// Execute a raw statement, returning the affected count
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> AdapterResult<u64>;

    /// Open a transaction pinned to one connection
    async fn begin(&self) -> AdapterResult<Arc<dyn TransactionHandle>>;
}

/// A store whose operations all run inside one open transaction.
#[async_trait]
pub trait TransactionHandle: RelationalStore {
    async fn commit(&self) -> AdapterResult<()>;

    async fn rollback(&self) -> AdapterResult<()>;

    /// View this transaction as a plain store
    fn as_store(self: Arc<Self>) -> Arc<dyn RelationalStore>;
}

/// SQL value for parameterized queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Nested arrays and objects are stored as their JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
        }
    }
}

/// One predicate of a WHERE clause. Predicates are AND-combined.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, SqlValue),
    Ne(String, SqlValue),
    In(String, Vec<SqlValue>),
    NotIn(String, Vec<SqlValue>),
    IsNull(String),
    IsNotNull(String),
    Like(String, String),
    Gte(String, SqlValue),
    Lt(String, SqlValue),
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Condition::Eq(c, _)
            | Condition::Ne(c, _)
            | Condition::In(c, _)
            | Condition::NotIn(c, _)
            | Condition::IsNull(c)
            | Condition::IsNotNull(c)
            | Condition::Like(c, _)
            | Condition::Gte(c, _)
            | Condition::Lt(c, _) => c,
        }
    }
}

/// Declarative SELECT
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub table: String,
    /// Column allowlist; empty selects `*`
    pub columns: Vec<String>,
    pub conditions: Vec<Condition>,
    pub order_by: Vec<Sort>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl SelectQuery {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }
}

/// Database adapter errors
#[derive(Debug)]
pub enum AdapterError {
    Connection(String),
    Query(String),
    Schema(String),
    Validation(String),
    Transaction(String),
    Internal(String),
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::Connection(e) => write!(f, "Connection error: {}", e),
            AdapterError::Query(e) => write!(f, "Query error: {}", e),
            AdapterError::Schema(e) => write!(f, "Schema error: {}", e),
            AdapterError::Validation(e) => write!(f, "Validation error: {}", e),
            AdapterError::Transaction(e) => write!(f, "Transaction error: {}", e),
            AdapterError::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for AdapterError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sql_value_from_json() {
        assert_eq!(SqlValue::from_json(&json!(null)), SqlValue::Null);
        assert_eq!(SqlValue::from_json(&json!(7)), SqlValue::Integer(7));
        assert_eq!(SqlValue::from_json(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(SqlValue::from_json(&json!("a")), SqlValue::Text("a".into()));
        assert_eq!(
            SqlValue::from_json(&json!({"k": 1})),
            SqlValue::Text("{\"k\":1}".into())
        );
    }
}
