//! CRUD Operations
//!
//! One operation vocabulary over both backing stores. Every read takes a
//! [`CrudFilter`], sort descriptors and relation descriptors; relations are
//! resolved by the configured [`Weaver`].

pub mod document;
pub mod extra;
pub mod relational;

pub use document::DocumentCrud;
pub use extra::ExtraOperations;
pub use relational::RelationalCrud;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::error::DaoResult;
use super::filter::{CrudFilter, Scalar, DATE_FORMAT};
use super::relation::Relation;
use super::sort::Sort;
use super::weaver::Weaver;
use super::Row;

#[async_trait]
pub trait CrudOperations: Send + Sync {
    /// Identity column used by the `*_by_id` operations and min/max filters
    fn id_column(&self) -> &str;

    async fn select(&self, filter: &CrudFilter, sorts: &[Sort], relations: &[Relation]) -> DaoResult<Vec<Row>>;

    async fn count(&self, filter: &CrudFilter) -> DaoResult<u64>;

    /// First row of `select` with a limit of one
    async fn select_first(
        &self,
        filter: &CrudFilter,
        sorts: &[Sort],
        relations: &[Relation],
    ) -> DaoResult<Option<Row>> {
        let filter = filter.clone().limit(1);
        Ok(self.select(&filter, sorts, relations).await?.into_iter().next())
    }

    async fn exist(&self, filter: &CrudFilter) -> DaoResult<bool> {
        Ok(self.select_first(filter, &[], &[]).await?.is_some())
    }

    async fn select_by_id(&self, id: Scalar, relations: &[Relation]) -> DaoResult<Option<Row>> {
        let filter = CrudFilter::new().include(self.id_column(), id);
        self.select_first(&filter, &[], relations).await
    }

    /// Insert one row and read it back from the primary
    async fn insert(&self, row: Row) -> DaoResult<Option<Row>> {
        Ok(self.insert_many(vec![row]).await?.into_iter().next())
    }

    /// Insert rows and read them back from the primary, in input order
    async fn insert_many(&self, rows: Vec<Row>) -> DaoResult<Vec<Row>>;

    async fn update_by_id(&self, id: Scalar, data: Row) -> DaoResult<u64> {
        let filter = CrudFilter::new().include(self.id_column(), id);
        self.update(&filter, data).await
    }

    /// Apply `data` to every matching row, returning the affected count
    async fn update(&self, filter: &CrudFilter, data: Row) -> DaoResult<u64>;

    async fn delete_by_id(&self, id: Scalar) -> DaoResult<u64> {
        let filter = CrudFilter::new().include(self.id_column(), id);
        self.delete(&filter).await
    }

    async fn delete(&self, filter: &CrudFilter) -> DaoResult<u64>;
}

/// Weave `relations` onto `rows` when both are non-empty.
pub(crate) async fn weave_rows(
    weaver: Option<&Weaver>,
    rows: Vec<Row>,
    relations: &[Relation],
) -> DaoResult<Vec<Row>> {
    if relations.is_empty() || rows.is_empty() {
        return Ok(rows);
    }
    match weaver {
        Some(weaver) => weaver.weave(rows, relations).await,
        None => {
            tracing::debug!(count = relations.len(), "relations requested without a weaver, skipped");
            Ok(rows)
        }
    }
}

/// Set each of `columns` to the current time unless already present.
pub(crate) fn stamp(row: &mut Row, columns: &[&str]) {
    let now = Value::String(Utc::now().format(DATE_FORMAT).to_string());
    for column in columns {
        row.entry(column.to_string()).or_insert_with(|| now.clone());
    }
}

/// Loose id key: `7` and `"7"` agree, as stores may coerce one into the other.
pub(crate) fn id_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stamp_keeps_existing_values() {
        let mut row = Row::new();
        row.insert("created_at".into(), json!("2020-01-01 00:00:00"));
        stamp(&mut row, &["created_at", "updated_at"]);
        assert_eq!(row["created_at"], json!("2020-01-01 00:00:00"));
        assert!(row["updated_at"].is_string());
    }

    #[test]
    fn test_id_key() {
        assert_eq!(id_key(&json!(7)), id_key(&json!("7")));
    }
}
