// weftdb Engine - Core module structure
pub mod adapter;
pub mod cache;
pub mod cli;
pub mod config;
pub mod crud;
pub mod error;
pub mod factory;
pub mod filter;
pub mod nosql;
pub mod registry;
pub mod relation;
pub mod sort;
pub mod weaver;

/// A row or document as returned by either backing store.
pub type Row = serde_json::Map<String, serde_json::Value>;

pub use cache::{CacheAdapter, CacheStat, CacheStatSnapshot, MemoryCache};
pub use config::{BackendConfig, TableOptions, WeftConfig};
pub use crud::{CrudOperations, DocumentCrud, ExtraOperations, RelationalCrud};
pub use error::{DaoError, DaoResult, ParseError};
pub use factory::{CrudOps, OperationFactory};
pub use filter::{CrudFilter, FilterValue, Scalar};
pub use registry::ConnectionRegistry;
pub use relation::{parse_relation, parse_relations, FkNaming, Relation, RelationParser};
pub use sort::{parse_sort, parse_sorts, Sort, SortOrder};
pub use weaver::{RelationSource, Weaver};
