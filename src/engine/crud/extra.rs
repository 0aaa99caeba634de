//! Key-value extras over a relational `(fk, name, value)` table, e.g. a
//! `post_meta` table keyed by `post_id`.
//!
//! Upserts rely on the dialect's replace statement and need a unique key
//! over `(fk, name)` in the table.

use serde_json::Value;
use std::sync::Arc;

use crate::engine::adapter::{Condition, QueryBuilder, RelationalStore, SelectQuery, SqlValue};
use crate::engine::error::DaoResult;
use crate::engine::filter::Scalar;
use crate::engine::Row;

#[derive(Clone)]
pub struct ExtraOperations {
    primary: Arc<dyn RelationalStore>,
    replica: Arc<dyn RelationalStore>,
    table: String,
    fk_column: String,
    name_column: String,
    value_column: String,
}

impl ExtraOperations {
    /// Name and value columns default to `name` and `value`
    pub fn new(primary: Arc<dyn RelationalStore>, table: &str, fk_column: &str) -> Self {
        Self {
            replica: primary.clone(),
            primary,
            table: table.to_string(),
            fk_column: fk_column.to_string(),
            name_column: "name".to_string(),
            value_column: "value".to_string(),
        }
    }

    pub fn with_replica(mut self, replica: Arc<dyn RelationalStore>) -> Self {
        self.replica = replica;
        self
    }

    pub fn with_columns(mut self, name_column: &str, value_column: &str) -> Self {
        self.name_column = name_column.to_string();
        self.value_column = value_column.to_string();
        self
    }

    fn owner(&self, id: &Scalar) -> Condition {
        Condition::Eq(self.fk_column.clone(), id.to_sql())
    }

    /// Value of one extra, `None` when unset
    pub async fn select_by_name(&self, id: Scalar, name: &str) -> DaoResult<Option<Value>> {
        let query = SelectQuery::new(&self.table)
            .columns(&[self.value_column.as_str()])
            .filter(self.owner(&id))
            .filter(Condition::Eq(self.name_column.clone(), SqlValue::Text(name.to_string())))
            .limit(1);
        let mut rows = self.replica.select(&query).await?;
        Ok(rows.pop().and_then(|mut row| row.remove(&self.value_column)))
    }

    /// Every extra of `id` as a name -> value map
    pub async fn select_extras(&self, id: Scalar) -> DaoResult<Row> {
        let query = SelectQuery::new(&self.table)
            .columns(&[self.name_column.as_str(), self.value_column.as_str()])
            .filter(self.owner(&id));
        let rows = self.replica.select(&query).await?;

        let mut extras = Row::new();
        for mut row in rows {
            let name = match row.remove(&self.name_column) {
                Some(Value::String(name)) => name,
                Some(other) => other.to_string(),
                None => continue,
            };
            extras.insert(name, row.remove(&self.value_column).unwrap_or(Value::Null));
        }
        Ok(extras)
    }

    pub async fn upsert_extra(&self, id: Scalar, name: &str, value: Value) -> DaoResult<u64> {
        let mut extras = Row::new();
        extras.insert(name.to_string(), value);
        self.merge_extras(id, &extras).await
    }

    /// Insert or replace the given extras, leaving other names alone
    pub async fn merge_extras(&self, id: Scalar, extras: &Row) -> DaoResult<u64> {
        if extras.is_empty() {
            return Ok(0);
        }
        replace_extras(self.primary.as_ref(), self, &id, extras).await
    }

    /// Make the stored extras of `id` exactly `extras`: replace the given
    /// names and delete every other name, in one transaction.
    pub async fn upsert_extras(&self, id: Scalar, extras: &Row) -> DaoResult<u64> {
        let tx = self.primary.begin().await?;
        let store = tx.clone().as_store();

        let result = async {
            let mut affected = 0;
            if !extras.is_empty() {
                affected += replace_extras(store.as_ref(), self, &id, extras).await?;
            }
            let keep = extras.keys().map(|name| SqlValue::Text(name.clone())).collect();
            let stale = [self.owner(&id), Condition::NotIn(self.name_column.clone(), keep)];
            affected += store.delete(&self.table, &stale).await?;
            DaoResult::Ok(affected)
        }
        .await;

        match result {
            Ok(affected) => {
                tx.commit().await?;
                Ok(affected)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(table = %self.table, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Delete the named extras of `id`, or all of them when `names` is empty
    pub async fn delete_extras(&self, id: Scalar, names: &[&str]) -> DaoResult<u64> {
        let mut conditions = vec![self.owner(&id)];
        if !names.is_empty() {
            conditions.push(Condition::In(
                self.name_column.clone(),
                names.iter().map(|n| SqlValue::Text(n.to_string())).collect(),
            ));
        }
        Ok(self.primary.delete(&self.table, &conditions).await?)
    }
}

async fn replace_extras(
    store: &dyn RelationalStore,
    ops: &ExtraOperations,
    id: &Scalar,
    extras: &Row,
) -> DaoResult<u64> {
    let rows: Vec<Vec<SqlValue>> = extras
        .iter()
        .map(|(name, value)| {
            vec![
                id.to_sql(),
                SqlValue::Text(name.clone()),
                SqlValue::from_json(value),
            ]
        })
        .collect();
    let columns = [
        ops.fk_column.as_str(),
        ops.name_column.as_str(),
        ops.value_column.as_str(),
    ];
    let (sql, params) = QueryBuilder::new(store.dialect()).replace(&ops.table, &columns, &rows)?;
    Ok(store.execute(&sql, &params).await?)
}
