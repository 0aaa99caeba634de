//! Connection Registry
//!
//! Shared backing-store handles keyed by a SHA-256 hash of their descriptor,
//! so every table configured against the same database shares one pool.
//! Create one at startup and call [`ConnectionRegistry::shutdown`] when done.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::adapter::{RelationalStore, SqliteAdapter};
use super::config::{ConfigError, ConnectionDescriptor, DocumentConfig};
use super::error::DaoResult;
use super::nosql::{DocumentStore, NoSqlEngine};

#[derive(Default)]
pub struct ConnectionRegistry {
    relational: Mutex<HashMap<String, Arc<dyn RelationalStore>>>,
    document: Mutex<HashMap<String, Arc<dyn DocumentStore>>>,
}

fn registry_key(value: &impl Serialize) -> DaoResult<String> {
    let serialized = serde_json::to_vec(value)?;
    Ok(hex::encode(Sha256::digest(&serialized)))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared store for `descriptor`, opened on first use
    pub fn relational(&self, descriptor: &ConnectionDescriptor, pool_size: u32) -> DaoResult<Arc<dyn RelationalStore>> {
        let key = registry_key(&(descriptor, pool_size))?;
        let mut stores = lock(&self.relational);
        if let Some(store) = stores.get(&key) {
            return Ok(store.clone());
        }

        let store: Arc<dyn RelationalStore> = match descriptor {
            ConnectionDescriptor::Sqlite { path } if path == Path::new(":memory:") => {
                Arc::new(SqliteAdapter::in_memory()?)
            }
            ConnectionDescriptor::Sqlite { path } => Arc::new(SqliteAdapter::new(path, pool_size)?),
            other => {
                return Err(ConfigError::Unsupported(format!(
                    "no {} driver available for {}",
                    other.dialect(),
                    other.display_string()
                ))
                .into())
            }
        };

        tracing::info!(connection = %descriptor.display_string(), "opened relational store");
        stores.insert(key, store.clone());
        Ok(store)
    }

    /// Shared document store rooted at `config.root`, created when missing
    pub fn document(&self, config: &DocumentConfig) -> DaoResult<Arc<dyn DocumentStore>> {
        let key = registry_key(&config.root)?;
        let mut stores = lock(&self.document);
        if let Some(store) = stores.get(&key) {
            return Ok(store.clone());
        }

        let store: Arc<dyn DocumentStore> = Arc::new(NoSqlEngine::open_or_create(&config.root)?);
        tracing::info!(store = %config.display_string(), "opened document store");
        stores.insert(key, store.clone());
        Ok(store)
    }

    /// Number of open handles
    pub fn len(&self) -> usize {
        lock(&self.relational).len() + lock(&self.document).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every handle. Handles already given out stay usable until
    /// their last clone is dropped. Calling this twice is harmless.
    pub fn shutdown(&self) {
        let relational = std::mem::take(&mut *lock(&self.relational));
        let document = std::mem::take(&mut *lock(&self.document));
        if !relational.is_empty() || !document.is_empty() {
            tracing::info!(
                relational = relational.len(),
                document = document.len(),
                "connection registry shut down"
            );
        }
    }
}
