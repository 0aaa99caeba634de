//! Relational CRUD adapter.
//!
//! Reads go to the replica when one is configured; writes and the
//! read-back after insert always go to the primary.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::{id_key, stamp, weave_rows, CrudOperations};
use crate::engine::adapter::{Condition, RelationalStore, SelectQuery, SqlValue, TransactionHandle};
use crate::engine::config::TableOptions;
use crate::engine::error::DaoResult;
use crate::engine::filter::{Compiled, CrudFilter, CustomFilter, FilterCompiler, SqlFilterCompiler};
use crate::engine::relation::Relation;
use crate::engine::sort::Sort;
use crate::engine::weaver::Weaver;
use crate::engine::Row;

pub const DEFAULT_ID_COLUMN: &str = "id";

#[derive(Clone)]
pub struct RelationalCrud {
    primary: Arc<dyn RelationalStore>,
    replica: Arc<dyn RelationalStore>,
    options: TableOptions,
    compiler: SqlFilterCompiler,
    weaver: Option<Weaver>,
}

impl RelationalCrud {
    pub fn new(primary: Arc<dyn RelationalStore>, options: TableOptions) -> Self {
        let compiler = SqlFilterCompiler::new(options.columns(DEFAULT_ID_COLUMN));
        Self {
            replica: primary.clone(),
            primary,
            options,
            compiler,
            weaver: None,
        }
    }

    pub fn with_replica(mut self, replica: Arc<dyn RelationalStore>) -> Self {
        self.replica = replica;
        self
    }

    pub fn with_weaver(mut self, weaver: Weaver) -> Self {
        self.weaver = Some(weaver);
        self
    }

    pub fn with_custom_filter(mut self, hook: CustomFilter<Condition>) -> Self {
        self.compiler = self.compiler.with_custom_filter(hook);
        self
    }

    pub fn table(&self) -> &str {
        &self.options.table
    }

    pub fn weaver(&self) -> Option<&Weaver> {
        self.weaver.as_ref()
    }

    /// Open a transaction on the primary store
    pub async fn begin(&self) -> DaoResult<Arc<dyn TransactionHandle>> {
        Ok(self.primary.begin().await?)
    }

    /// A copy of this adapter whose reads and writes all run inside `tx`.
    /// `self` is left untouched.
    pub fn transacting(&self, tx: Arc<dyn TransactionHandle>) -> Self {
        let store = tx.as_store();
        Self {
            primary: store.clone(),
            replica: store,
            ..self.clone()
        }
    }

    fn compile(&self, filter: &CrudFilter) -> Option<Vec<Condition>> {
        match self.compiler.compile(filter) {
            Compiled::Predicates(conditions) => Some(conditions),
            Compiled::Unsatisfiable => {
                tracing::debug!(table = %self.options.table, "unsatisfiable filter, store not queried");
                None
            }
        }
    }

    fn id_condition(&self, ids: &[serde_json::Value]) -> Condition {
        Condition::In(
            self.id_column().to_string(),
            ids.iter().map(SqlValue::from_json).collect(),
        )
    }
}

#[async_trait]
impl CrudOperations for RelationalCrud {
    fn id_column(&self) -> &str {
        &self.compiler.columns().id_column
    }

    async fn select(&self, filter: &CrudFilter, sorts: &[Sort], relations: &[Relation]) -> DaoResult<Vec<Row>> {
        let Some(conditions) = self.compile(filter) else {
            return Ok(Vec::new());
        };
        let query = SelectQuery {
            table: self.options.table.clone(),
            columns: filter.projection.clone().unwrap_or_default(),
            conditions,
            order_by: sorts.to_vec(),
            offset: filter.page_offset(),
            limit: filter.page_limit(),
        };
        let rows = self.replica.select(&query).await?;
        weave_rows(self.weaver.as_ref(), rows, relations).await
    }

    async fn count(&self, filter: &CrudFilter) -> DaoResult<u64> {
        let Some(conditions) = self.compile(filter) else {
            return Ok(0);
        };
        Ok(self.replica.count(&self.options.table, &conditions).await?)
    }

    async fn insert_many(&self, mut rows: Vec<Row>) -> DaoResult<Vec<Row>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        if self.options.stamp_timestamps {
            let columns = [
                self.options.created_at_column.as_str(),
                self.options.updated_at_column.as_str(),
            ];
            rows.iter_mut().for_each(|row| stamp(row, &columns));
        }

        let ids = self
            .primary
            .insert(&self.options.table, self.id_column(), &rows)
            .await?;

        let query = SelectQuery::new(&self.options.table).filter(self.id_condition(&ids));
        let mut by_id: HashMap<String, Row> = self
            .primary
            .select(&query)
            .await?
            .into_iter()
            .filter_map(|row| {
                let key = id_key(row.get(self.id_column())?);
                Some((key, row))
            })
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(&id_key(id))).collect())
    }

    async fn update(&self, filter: &CrudFilter, mut data: Row) -> DaoResult<u64> {
        let Some(conditions) = self.compile(filter) else {
            return Ok(0);
        };
        if self.options.stamp_timestamps {
            stamp(&mut data, &[self.options.updated_at_column.as_str()]);
        }
        Ok(self
            .primary
            .update(&self.options.table, &conditions, &data)
            .await?)
    }

    async fn delete(&self, filter: &CrudFilter) -> DaoResult<u64> {
        let Some(conditions) = self.compile(filter) else {
            return Ok(0);
        };
        Ok(self.primary.delete(&self.options.table, &conditions).await?)
    }
}
