//! weftdb Configuration Module
//! Handles loading and validating weft.config.json

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::adapter::SqlDialect;
use super::cache::{CacheAdapter, MemoryCache};
use super::filter::ColumnSet;
use super::relation::FkNaming;

pub const CONFIG_FILE: &str = "weft.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Unknown backend kind: {0:?}")]
    UnknownBackend(String),
    #[error("Unsupported backend: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeftConfig {
    pub backend: BackendConfig,
    pub cache: CacheConfig,
    pub fk_naming: FkNaming,
    pub tables: Vec<TableOptions>,
}

/// On-disk shape; the backend is resolved separately so an unknown kind is
/// reported as such rather than as a generic parse failure.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(default)]
    backend: Value,
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    fk_naming: FkNaming,
    #[serde(default)]
    tables: Vec<TableOptions>,
}

impl WeftConfig {
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        Self::from_path(&project_dir.join(CONFIG_FILE))
    }

    pub fn from_path(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path.to_path_buf()));
        }
        let content = std::fs::read_to_string(config_path)?;
        let config = Self::parse(&content)?;
        tracing::debug!(path = %config_path.display(), backend = %config.backend.display_string(), "loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(content)?;
        Ok(Self {
            backend: BackendConfig::from_value(raw.backend)?,
            cache: raw.cache,
            fk_naming: raw.fk_naming,
            tables: raw.tables,
        })
    }

    pub fn save(&self, project_dir: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(project_dir.join(CONFIG_FILE), content)?;
        Ok(())
    }

    /// Options for `table`, falling back to defaults for unlisted tables
    pub fn table_options(&self, table: &str) -> TableOptions {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .cloned()
            .unwrap_or_else(|| TableOptions::new(table))
    }
}

/// Which backing store serves the tables, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Relational(RelationalConfig),
    Document(DocumentConfig),
}

impl BackendConfig {
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let kind = value.get("kind").and_then(Value::as_str).unwrap_or_default();
        match kind {
            "relational" | "document" => Ok(serde_json::from_value(value)?),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }

    /// Get a display-friendly description (no secrets)
    pub fn display_string(&self) -> String {
        match self {
            BackendConfig::Relational(cfg) => cfg.display_string(),
            BackendConfig::Document(cfg) => cfg.display_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationalConfig {
    pub primary: ConnectionDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica: Option<ConnectionDescriptor>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_pool_size() -> u32 {
    10
}

impl RelationalConfig {
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            primary: ConnectionDescriptor::Sqlite { path: path.into() },
            replica: None,
            pool_size: default_pool_size(),
        }
    }

    pub fn display_string(&self) -> String {
        match &self.replica {
            Some(replica) => format!(
                "{} (replica {})",
                self.primary.display_string(),
                replica.display_string()
            ),
            None => self.primary.display_string(),
        }
    }
}

/// Relational connection, tagged by `driver`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum ConnectionDescriptor {
    Sqlite {
        path: PathBuf,
    },
    Postgres {
        host: String,
        #[serde(default = "default_postgres_port")]
        port: u16,
        database: String,
        user: String,
        #[serde(default, skip_serializing)]
        password: String,
    },
    Mysql {
        host: String,
        #[serde(default = "default_mysql_port")]
        port: u16,
        database: String,
        user: String,
        #[serde(default, skip_serializing)]
        password: String,
    },
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_mysql_port() -> u16 {
    3306
}

impl ConnectionDescriptor {
    pub fn dialect(&self) -> SqlDialect {
        match self {
            ConnectionDescriptor::Sqlite { .. } => SqlDialect::Sqlite,
            ConnectionDescriptor::Postgres { .. } => SqlDialect::Postgres,
            ConnectionDescriptor::Mysql { .. } => SqlDialect::Mysql,
        }
    }

    /// Get a display-friendly connection string (no password)
    pub fn display_string(&self) -> String {
        match self {
            ConnectionDescriptor::Sqlite { path } => format!("sqlite://{}", path.display()),
            ConnectionDescriptor::Postgres {
                host,
                port,
                database,
                user,
                ..
            } => format!("postgres://{}@{}:{}/{}", user, host, port, database),
            ConnectionDescriptor::Mysql {
                host,
                port,
                database,
                user,
                ..
            } => format!("mysql://{}@{}:{}/{}", user, host, port, database),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentConfig {
    /// Directory of the embedded document store
    pub root: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<PrimaryHost>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary: Vec<SecondaryHost>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryHost {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub query: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryHost {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
}

fn host_port(host: &str, port: Option<u16>) -> String {
    match port {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Percent-encode everything but the URI-component unreserved set.
fn encode_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\''
            | b'(' | b')' => out.push(byte as char),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

impl DocumentConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            primary: None,
            secondary: Vec::new(),
        }
    }

    fn is_local(&self) -> bool {
        self.primary
            .as_ref()
            .is_some_and(|p| matches!(p.host.as_str(), "localhost" | "127.0.0.1" | "::1"))
    }

    fn hosts(&self, primary: &PrimaryHost) -> String {
        std::iter::once(host_port(&primary.host, primary.port))
            .chain(self.secondary.iter().map(|s| host_port(&s.host, s.port)))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn query_string(primary: &PrimaryHost) -> String {
        if primary.query.is_empty() {
            return String::new();
        }
        let pairs: Vec<String> = primary
            .query
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{}={}", encode_component(key), encode_component(&value))
            })
            .collect();
        format!("?{}", pairs.join("&"))
    }

    /// Server URL for the configured hosts: `mongodb://` with inline
    /// credentials for a local primary, `mongodb+srv://` without them
    /// otherwise. `None` when no primary host is configured.
    pub fn connection_url(&self) -> Option<String> {
        let primary = self.primary.as_ref()?;
        let database = primary.database.as_deref().unwrap_or_default();
        let query = Self::query_string(primary);

        if self.is_local() {
            let auth = match (&primary.user, &primary.password) {
                (Some(user), Some(password)) => {
                    format!("{}:{}@", encode_component(user), encode_component(password))
                }
                (Some(user), None) => format!("{}@", encode_component(user)),
                _ => String::new(),
            };
            Some(format!("mongodb://{}{}/{}{}", auth, self.hosts(primary), database, query))
        } else {
            Some(format!("mongodb+srv://{}/{}{}", self.hosts(primary), database, query))
        }
    }

    pub fn display_string(&self) -> String {
        match &self.primary {
            Some(primary) => format!(
                "document://{} ({}/{})",
                self.root.display(),
                self.hosts(primary),
                primary.database.as_deref().unwrap_or_default()
            ),
            None => format!("document://{}", self.root.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: None,
        }
    }
}

impl CacheConfig {
    pub fn build(&self) -> Option<Arc<dyn CacheAdapter>> {
        if !self.enabled {
            return None;
        }
        let cache = match self.ttl_secs {
            Some(secs) => MemoryCache::with_ttl(Duration::from_secs(secs)),
            None => MemoryCache::new(),
        };
        Some(Arc::new(cache))
    }
}

/// Per-table column names and behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOptions {
    pub table: String,
    /// Defaults to `id` (relational) or `_id` (document)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_column: Option<String>,
    #[serde(default = "default_created_at")]
    pub created_at_column: String,
    #[serde(default = "default_updated_at")]
    pub updated_at_column: String,
    /// Fill created/updated columns on insert and update when absent
    #[serde(default)]
    pub stamp_timestamps: bool,
}

fn default_created_at() -> String {
    "created_at".to_string()
}

fn default_updated_at() -> String {
    "updated_at".to_string()
}

impl TableOptions {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            id_column: None,
            created_at_column: default_created_at(),
            updated_at_column: default_updated_at(),
            stamp_timestamps: false,
        }
    }

    pub fn with_id_column(mut self, column: &str) -> Self {
        self.id_column = Some(column.to_string());
        self
    }

    pub fn with_timestamps(mut self, created_at: &str, updated_at: &str) -> Self {
        self.created_at_column = created_at.to_string();
        self.updated_at_column = updated_at.to_string();
        self
    }

    pub fn with_stamping(mut self, on: bool) -> Self {
        self.stamp_timestamps = on;
        self
    }

    pub fn columns(&self, default_id: &str) -> ColumnSet {
        ColumnSet::new(&self.table, self.id_column.as_deref().unwrap_or(default_id))
            .timestamps(&self.created_at_column, &self.updated_at_column)
    }
}
