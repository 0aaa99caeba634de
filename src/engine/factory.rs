//! Operation Factory
//!
//! Resolves the configured backend once and hands out CRUD adapters for
//! individual tables, all sharing one weaver and cache.

use async_trait::async_trait;
use std::sync::Arc;

use super::adapter::{RelationalStore, TransactionHandle};
use super::cache::CacheAdapter;
use super::config::{BackendConfig, ConfigError, TableOptions, WeftConfig};
use super::crud::{CrudOperations, DocumentCrud, ExtraOperations, RelationalCrud};
use super::error::{DaoError, DaoResult};
use super::filter::CrudFilter;
use super::nosql::DocumentStore;
use super::registry::ConnectionRegistry;
use super::relation::{FkNaming, Relation, RelationParser};
use super::sort::Sort;
use super::weaver::Weaver;
use super::Row;

enum Backend {
    Relational {
        primary: Arc<dyn RelationalStore>,
        replica: Arc<dyn RelationalStore>,
    },
    Document {
        store: Arc<dyn DocumentStore>,
    },
}

pub struct OperationFactory {
    backend: Backend,
    weaver: Weaver,
    naming: FkNaming,
    tables: Vec<TableOptions>,
}

impl OperationFactory {
    pub fn new(
        config: &BackendConfig,
        registry: &ConnectionRegistry,
        cache: Option<Arc<dyn CacheAdapter>>,
    ) -> DaoResult<Self> {
        let (backend, weaver) = match config {
            BackendConfig::Relational(cfg) => {
                let primary = registry.relational(&cfg.primary, cfg.pool_size)?;
                let replica = match &cfg.replica {
                    Some(replica) => registry.relational(replica, cfg.pool_size)?,
                    None => primary.clone(),
                };
                let weaver = Weaver::relational(replica.clone(), cache);
                (Backend::Relational { primary, replica }, weaver)
            }
            BackendConfig::Document(cfg) => {
                let store = registry.document(cfg)?;
                let weaver = Weaver::document(store.clone(), cache);
                (Backend::Document { store }, weaver)
            }
        };

        Ok(Self {
            backend,
            weaver,
            naming: FkNaming::default(),
            tables: Vec::new(),
        })
    }

    pub fn from_config(config: &WeftConfig, registry: &ConnectionRegistry) -> DaoResult<Self> {
        let mut factory = Self::new(&config.backend, registry, config.cache.build())?;
        factory.naming = config.fk_naming;
        factory.tables = config.tables.clone();
        Ok(factory)
    }

    pub fn with_fk_naming(mut self, naming: FkNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn weaver(&self) -> &Weaver {
        &self.weaver
    }

    /// Relation parser using the configured foreign-key naming
    pub fn relation_parser(&self) -> RelationParser {
        RelationParser::new(self.naming)
    }

    pub fn crud(&self, options: TableOptions) -> CrudOps {
        match &self.backend {
            Backend::Relational { primary, replica } => CrudOps::Relational(
                RelationalCrud::new(primary.clone(), options)
                    .with_replica(replica.clone())
                    .with_weaver(self.weaver.clone()),
            ),
            Backend::Document { store } => CrudOps::Document(
                DocumentCrud::new(store.clone(), options).with_weaver(self.weaver.clone()),
            ),
        }
    }

    /// CRUD adapter for `table` using its configured options, if any
    pub fn table(&self, table: &str) -> CrudOps {
        let options = self
            .tables
            .iter()
            .find(|t| t.table == table)
            .cloned()
            .unwrap_or_else(|| TableOptions::new(table));
        self.crud(options)
    }

    pub fn extra(&self, table: &str, fk_column: &str) -> DaoResult<ExtraOperations> {
        match &self.backend {
            Backend::Relational { primary, replica } => {
                Ok(ExtraOperations::new(primary.clone(), table, fk_column).with_replica(replica.clone()))
            }
            Backend::Document { .. } => Err(ConfigError::Unsupported(
                "extra operations need a relational backend".to_string(),
            )
            .into()),
        }
    }

    pub async fn begin(&self) -> DaoResult<Arc<dyn TransactionHandle>> {
        match &self.backend {
            Backend::Relational { primary, .. } => Ok(primary.begin().await?),
            Backend::Document { .. } => Err(DaoError::TransactionsUnsupported),
        }
    }
}

/// CRUD adapter for whichever backend the factory resolved.
#[derive(Clone)]
pub enum CrudOps {
    Relational(RelationalCrud),
    Document(DocumentCrud),
}

impl CrudOps {
    /// See [`RelationalCrud::transacting`]. The document backend has no
    /// transactions.
    pub fn transacting(&self, tx: Arc<dyn TransactionHandle>) -> DaoResult<CrudOps> {
        match self {
            CrudOps::Relational(ops) => Ok(CrudOps::Relational(ops.transacting(tx))),
            CrudOps::Document(_) => Err(DaoError::TransactionsUnsupported),
        }
    }

    pub fn weaver(&self) -> Option<&Weaver> {
        match self {
            CrudOps::Relational(ops) => ops.weaver(),
            CrudOps::Document(ops) => ops.weaver(),
        }
    }
}

#[async_trait]
impl CrudOperations for CrudOps {
    fn id_column(&self) -> &str {
        match self {
            CrudOps::Relational(ops) => ops.id_column(),
            CrudOps::Document(ops) => ops.id_column(),
        }
    }

    async fn select(&self, filter: &CrudFilter, sorts: &[Sort], relations: &[Relation]) -> DaoResult<Vec<Row>> {
        match self {
            CrudOps::Relational(ops) => ops.select(filter, sorts, relations).await,
            CrudOps::Document(ops) => ops.select(filter, sorts, relations).await,
        }
    }

    async fn count(&self, filter: &CrudFilter) -> DaoResult<u64> {
        match self {
            CrudOps::Relational(ops) => ops.count(filter).await,
            CrudOps::Document(ops) => ops.count(filter).await,
        }
    }

    async fn insert_many(&self, rows: Vec<Row>) -> DaoResult<Vec<Row>> {
        match self {
            CrudOps::Relational(ops) => ops.insert_many(rows).await,
            CrudOps::Document(ops) => ops.insert_many(rows).await,
        }
    }

    async fn update(&self, filter: &CrudFilter, data: Row) -> DaoResult<u64> {
        match self {
            CrudOps::Relational(ops) => ops.update(filter, data).await,
            CrudOps::Document(ops) => ops.update(filter, data).await,
        }
    }

    async fn delete(&self, filter: &CrudFilter) -> DaoResult<u64> {
        match self {
            CrudOps::Relational(ops) => ops.delete(filter).await,
            CrudOps::Document(ops) => ops.delete(filter).await,
        }
    }
}
