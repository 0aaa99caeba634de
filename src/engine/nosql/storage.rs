//! Document Storage Engine
//!
//! Main entry point for the embedded document store. All file access is
//! synchronous; [`DocumentStore`] wraps it for async callers.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::collection::{is_document_id, Collection};
use super::document::Document;
use super::error::{NoSqlError, Result};
use super::query::{Filter, Query};
use super::DocumentStore;
use crate::engine::Row;

#[derive(Clone)]
pub struct NoSqlEngine {
    base_path: PathBuf,

    /// Serialises writers within this process
    write_lock: Arc<Mutex<()>>,
}

impl NoSqlEngine {
    /// Open an existing store
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(NoSqlError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("document store not found at {}", path.display()),
            )));
        }
        Ok(Self::at(path))
    }

    /// Create a new store
    pub fn create(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;
        Ok(Self::at(path))
    }

    /// Open or create a store
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if path.is_dir() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    fn at(path: &Path) -> Self {
        Self {
            base_path: path.to_path_buf(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Open an existing collection
    pub fn collection(&self, name: &str) -> Result<Collection> {
        Collection::open(&self.base_path, name)
    }

    pub fn collection_exists(&self, name: &str) -> bool {
        self.collection(name).is_ok()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Matching documents in `collection`; a missing collection has none.
    pub fn find(&self, collection: &str, query: &Query) -> Result<Vec<Row>> {
        match self.collection(collection) {
            Ok(col) => Ok(query.execute(col.all()?)),
            Err(NoSqlError::CollectionNotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub fn count(&self, collection: &str, filters: &[Filter]) -> Result<usize> {
        let query = Query {
            filters: filters.to_vec(),
            ..Query::default()
        };
        match self.collection(collection) {
            Ok(col) => Ok(col.all()?.iter().filter(|doc| query.matches(doc)).count()),
            Err(NoSqlError::CollectionNotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Insert a batch, creating the collection on first use. Either every
    /// document is written or, on a bad or clashing id, none are.
    pub fn insert_many(&self, collection: &str, rows: Vec<Row>) -> Result<Vec<String>> {
        let _guard = self.lock();
        let col = Collection::open_or_create(&self.base_path, collection)?;

        let docs: Vec<Document> = rows.into_iter().map(Document::from_row).collect();
        let existing: HashSet<String> = col.list_ids()?.into_iter().collect();
        let mut seen = HashSet::new();
        for doc in &docs {
            if !is_document_id(&doc.id) {
                return Err(NoSqlError::InvalidDocumentId(doc.id.clone()));
            }
            if existing.contains(&doc.id) || !seen.insert(doc.id.as_str()) {
                return Err(NoSqlError::DuplicateId(doc.id.clone()));
            }
        }

        for doc in &docs {
            col.insert(doc)?;
        }
        Ok(docs.into_iter().map(|doc| doc.id).collect())
    }

    /// Merge `patch` into every matching document
    pub fn update_many(&self, collection: &str, filters: &[Filter], patch: &Row) -> Result<usize> {
        let _guard = self.lock();
        let col = match self.collection(collection) {
            Ok(col) => col,
            Err(NoSqlError::CollectionNotFound(_)) => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut updated = 0;
        for mut doc in col.all()? {
            if filters.iter().all(|f| f.matches(&doc)) {
                doc.merge(patch);
                col.replace(&doc)?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    pub fn delete_many(&self, collection: &str, filters: &[Filter]) -> Result<usize> {
        let _guard = self.lock();
        let col = match self.collection(collection) {
            Ok(col) => col,
            Err(NoSqlError::CollectionNotFound(_)) => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut deleted = 0;
        for doc in col.all()? {
            if filters.iter().all(|f| f.matches(&doc)) {
                col.delete(&doc.id)?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(NoSqlEngine) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || f(engine))
            .await
            .map_err(|e| NoSqlError::Task(e.to_string()))?
    }
}

#[async_trait]
impl DocumentStore for NoSqlEngine {
    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Row>> {
        let (collection, query) = (collection.to_string(), query.clone());
        self.blocking(move |engine| engine.find(&collection, &query)).await
    }

    async fn count(&self, collection: &str, filters: &[Filter]) -> Result<u64> {
        let (collection, filters) = (collection.to_string(), filters.to_vec());
        let count = self.blocking(move |engine| engine.count(&collection, &filters)).await?;
        Ok(count as u64)
    }

    async fn insert_many(&self, collection: &str, rows: Vec<Row>) -> Result<Vec<String>> {
        let collection = collection.to_string();
        self.blocking(move |engine| engine.insert_many(&collection, rows)).await
    }

    async fn update_many(&self, collection: &str, filters: &[Filter], patch: &Row) -> Result<u64> {
        let (collection, filters, patch) = (collection.to_string(), filters.to_vec(), patch.clone());
        let updated = self
            .blocking(move |engine| engine.update_many(&collection, &filters, &patch))
            .await?;
        Ok(updated as u64)
    }

    async fn delete_many(&self, collection: &str, filters: &[Filter]) -> Result<u64> {
        let (collection, filters) = (collection.to_string(), filters.to_vec());
        let deleted = self.blocking(move |engine| engine.delete_many(&collection, &filters)).await?;
        Ok(deleted as u64)
    }

    async fn has_collection(&self, collection: &str) -> Result<bool> {
        let collection = collection.to_string();
        self.blocking(move |engine| Ok(engine.collection_exists(&collection))).await
    }
}
