//! Embedded Document Store
//!
//! A file-backed store of JSON documents grouped into collections, queried
//! with field filters. Stands in for a MongoDB-style backend: documents carry
//! a string `_id` and arbitrary top-level fields.

pub mod collection;
pub mod document;
pub mod error;
pub mod query;
pub mod storage;

pub use collection::Collection;
pub use document::{id_from_json, Document, ID_FIELD};
pub use error::NoSqlError;
pub use query::{Filter, FilterOp, Query};
pub use storage::NoSqlEngine;

use async_trait::async_trait;

use crate::engine::Row;
use error::Result;

/// Async access to a document backing store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Row>>;

    async fn count(&self, collection: &str, filters: &[Filter]) -> Result<u64>;

    /// Insert documents, returning their ids in input order
    async fn insert_many(&self, collection: &str, rows: Vec<Row>) -> Result<Vec<String>>;

    /// Shallow-merge `patch` into matching documents, returning the count
    async fn update_many(&self, collection: &str, filters: &[Filter], patch: &Row) -> Result<u64>;

    async fn delete_many(&self, collection: &str, filters: &[Filter]) -> Result<u64>;

    async fn has_collection(&self, collection: &str) -> Result<bool>;
}
