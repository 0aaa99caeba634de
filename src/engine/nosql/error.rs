//! Document store errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NoSqlError {
    #[error("document store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no such collection: {0}")]
    CollectionNotFound(String),

    #[error("no such document: {0}")]
    DocumentNotFound(String),

    #[error("bad collection name {0:?}")]
    InvalidCollectionName(String),

    #[error("bad document id {0:?}")]
    InvalidDocumentId(String),

    #[error("duplicate document id: {0}")]
    DuplicateId(String),

    #[error("storage task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, NoSqlError>;
