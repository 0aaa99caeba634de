//! Relation Weaver
//!
//! Resolves foreign keys for a batch of rows with at most one backing-store
//! query per relation, reusing a [`CacheAdapter`] across calls:
//!
//! 1. collect the distinct non-null fk values of every row
//! 2. read `"{table}:{id}"` for each from the cache; hits are used as-is
//! 3. fetch the misses with a single `column IN (...)` query
//! 4. write the fetched rows back to the cache in the background
//! 5. attach each row's target under the relation's property
//!
//! Relations are fetched concurrently; rows are only touched after every
//! fetch has finished.

use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use super::adapter::{Condition, RelationalStore, SelectQuery, SqlValue};
use super::cache::{CacheAdapter, CacheStat, CacheStatSnapshot};
use super::error::DaoResult;
use super::nosql::{id_from_json, DocumentStore, Filter, NoSqlError, Query, ID_FIELD};
use super::relation::Relation;
use super::Row;

/// Where the weaver loads target rows from.
#[async_trait]
pub trait RelationSource: Send + Sync {
    /// Rows of `table` whose `column` is one of `values`. An unknown table
    /// is an error, not an empty result.
    async fn select_by_column(&self, table: &str, column: &str, values: &[Value]) -> DaoResult<Vec<Row>>;

    /// Key pairing an fk value with a target's `column` value. Type-strict
    /// by default, so `1` and `"1"` stay distinct.
    fn match_key(&self, _column: &str, value: &Value) -> String {
        value.to_string()
    }
}

/// Relational source; pass the read replica when one is configured.
pub struct StoreSource(pub Arc<dyn RelationalStore>);

#[async_trait]
impl RelationSource for StoreSource {
    async fn select_by_column(&self, table: &str, column: &str, values: &[Value]) -> DaoResult<Vec<Row>> {
        let values = values.iter().map(SqlValue::from_json).collect();
        let query = SelectQuery::new(table).filter(Condition::In(column.to_string(), values));
        Ok(self.0.select(&query).await?)
    }
}

/// Document source. An unknown collection is an error; integer fks pair
/// with the text ids documents are stored under.
pub struct DocumentSource(pub Arc<dyn DocumentStore>);

#[async_trait]
impl RelationSource for DocumentSource {
    async fn select_by_column(&self, table: &str, column: &str, values: &[Value]) -> DaoResult<Vec<Row>> {
        if !self.0.has_collection(table).await? {
            return Err(NoSqlError::CollectionNotFound(table.to_string()).into());
        }
        let query = Query::new().filter(Filter::is_in(column, values.to_vec()));
        Ok(self.0.find(table, &query).await?)
    }

    fn match_key(&self, column: &str, value: &Value) -> String {
        if column == ID_FIELD {
            id_from_json(value).to_string()
        } else {
            value.to_string()
        }
    }
}

/// Cache key text for an id: strings raw, anything else as JSON.
fn id_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cache_key(table: &str, id: &Value) -> String {
    format!("{}:{}", table, id_text(id))
}

#[derive(Clone)]
pub struct Weaver {
    source: Arc<dyn RelationSource>,
    cache: Option<Arc<dyn CacheAdapter>>,
    stat: Arc<CacheStat>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Weaver {
    pub fn new(source: Arc<dyn RelationSource>, cache: Option<Arc<dyn CacheAdapter>>) -> Self {
        Self {
            source,
            cache,
            stat: Arc::new(CacheStat::default()),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn relational(store: Arc<dyn RelationalStore>, cache: Option<Arc<dyn CacheAdapter>>) -> Self {
        Self::new(Arc::new(StoreSource(store)), cache)
    }

    pub fn document(store: Arc<dyn DocumentStore>, cache: Option<Arc<dyn CacheAdapter>>) -> Self {
        Self::new(Arc::new(DocumentSource(store)), cache)
    }

    pub fn cache_stat(&self) -> CacheStatSnapshot {
        self.stat.snapshot()
    }

    /// Attach related rows to `rows`.
    ///
    /// Returns an empty list when either `rows` or `relations` is empty,
    /// without touching the cache or the store.
    pub async fn weave(&self, mut rows: Vec<Row>, relations: &[Relation]) -> DaoResult<Vec<Row>> {
        if rows.is_empty() || relations.is_empty() {
            return Ok(Vec::new());
        }

        let fetches = relations.iter().map(|relation| {
            let ids = distinct_ids(&rows, &relation.fk, |v| self.source.match_key(&relation.column, v));
            async move { self.select_relation_by_ids(relation, &ids).await }
        });
        let targets = try_join_all(fetches).await?;

        let lookups: Vec<HashMap<String, Row>> = relations
            .iter()
            .zip(targets)
            .map(|(relation, targets)| {
                let mut lookup = HashMap::new();
                for target in targets {
                    if let Some(value) = target.get(&relation.column) {
                        let key = self.source.match_key(&relation.column, value);
                        lookup.entry(key).or_insert(target);
                    }
                }
                lookup
            })
            .collect();

        for row in rows.iter_mut() {
            for (relation, lookup) in relations.iter().zip(&lookups) {
                let target = match row.get(&relation.fk) {
                    Some(fk) if !fk.is_null() => lookup.get(&self.source.match_key(&relation.column, fk)),
                    _ => None,
                };
                if let Some(target) = target {
                    row.insert(relation.property.clone(), Value::Object(target.clone()));
                }
            }
        }

        Ok(rows)
    }

    /// Target rows for `ids`: cache hits first, then rows fetched for the
    /// misses in one query.
    pub async fn select_relation_by_ids(&self, relation: &Relation, ids: &[Value]) -> DaoResult<Vec<Row>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let Some(cache) = &self.cache else {
            return self
                .source
                .select_by_column(&relation.table, &relation.column, ids)
                .await;
        };

        let (mut rows, missed) = self.read_cache(cache.as_ref(), &relation.table, ids).await;
        if missed.is_empty() {
            return Ok(rows);
        }

        let fetched = self
            .source
            .select_by_column(&relation.table, &relation.column, &missed)
            .await?;
        if !fetched.is_empty() {
            self.schedule_cache_write(cache.clone(), relation, &fetched);
        }

        rows.extend(fetched);
        Ok(rows)
    }

    /// Split `ids` into cached rows and missed ids. A failed cache read
    /// counts every id as a miss.
    async fn read_cache(&self, cache: &dyn CacheAdapter, table: &str, ids: &[Value]) -> (Vec<Row>, Vec<Value>) {
        let keys: Vec<String> = ids.iter().map(|id| cache_key(table, id)).collect();
        let cached = match cache.get_all(&keys).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(table, error = %e, "cache read failed, treating as miss");
                vec![None; keys.len()]
            }
        };

        let mut hits = Vec::new();
        let mut missed = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            let row = cached
                .get(i)
                .and_then(Option::as_deref)
                .and_then(|text| serde_json::from_str::<Row>(text).ok());
            match row {
                Some(row) => {
                    tracing::debug!(table, id = %id_text(id), "cache hit");
                    self.stat.record_hit();
                    hits.push(row);
                }
                None => {
                    tracing::debug!(table, id = %id_text(id), "cache miss");
                    self.stat.record_miss();
                    missed.push(id.clone());
                }
            }
        }
        (hits, missed)
    }

    fn schedule_cache_write(&self, cache: Arc<dyn CacheAdapter>, relation: &Relation, rows: &[Row]) {
        let mut entries = HashMap::new();
        for row in rows {
            let Some(id) = row.get(&relation.column) else {
                continue;
            };
            match serde_json::to_string(row) {
                Ok(text) => {
                    entries.insert(cache_key(&relation.table, id), text);
                }
                Err(e) => tracing::warn!(table = %relation.table, error = %e, "cannot serialize row for cache"),
            }
        }

        let table = relation.table.clone();
        let handle = tokio::spawn(async move {
            let count = entries.len();
            match cache.set_all(entries).await {
                Ok(()) => tracing::debug!(%table, count, "cache write ok"),
                Err(e) => tracing::warn!(%table, error = %e, "cache write failed"),
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        pending.retain(|handle| !handle.is_finished());
        pending.push(handle);
    }

    /// Wait for every background cache write started so far.
    pub async fn drain_cache_writes(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut pending = self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                pending.drain(..).collect()
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "cache write task failed");
                }
            }
        }
    }

    /// Drop cached rows of `table`; `None` flushes every id.
    pub async fn flush_cache(&self, table: &str, id: Option<&str>) -> DaoResult<u64> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let pattern = format!("{}:{}", table, id.unwrap_or("*"));
        tracing::debug!(%pattern, "flush cache");
        Ok(cache.flush(&pattern).await?)
    }
}

/// Distinct non-null values of `field`, in first-seen order.
fn distinct_ids(rows: &[Row], field: &str, key: impl Fn(&Value) -> String) -> Vec<Value> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| row.get(field))
        .filter(|value| !value.is_null())
        .filter(|value| seen.insert(key(value)))
        .cloned()
        .collect()
}
