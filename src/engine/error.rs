//! weftdb Error Types
//!
//! Every public operation returns [`DaoResult`]. Errors from the layers
//! underneath (parsers, relational adapter, document store, cache, config)
//! are carried unchanged so callers can match on the originating failure.

use thiserror::Error;

use super::adapter::AdapterError;
use super::cache::CacheError;
use super::config::ConfigError;
use super::nosql::NoSqlError;

/// Malformed sort or relation term.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid sort: {0:?}")]
    InvalidSort(String),

    #[error("invalid relation: {0:?}")]
    InvalidRelation(String),
}

#[derive(Error, Debug)]
pub enum DaoError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Backing store error: {0}")]
    Store(#[from] AdapterError),

    #[error("Document store error: {0}")]
    Document(#[from] NoSqlError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Document backend does not support transactions")]
    TransactionsUnsupported,
}

pub type DaoResult<T> = std::result::Result<T, DaoError>;
