//! Document CRUD adapter over a [`DocumentStore`].
//!
//! The identity column defaults to `_id`. Substring filters are not
//! supported by this backend and are ignored.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::{id_key, stamp, weave_rows, CrudOperations};
use crate::engine::config::TableOptions;
use crate::engine::error::DaoResult;
use crate::engine::filter::{Compiled, CrudFilter, CustomFilter, DocumentFilterCompiler, FilterCompiler};
use crate::engine::nosql::{DocumentStore, Filter, Query, ID_FIELD};
use crate::engine::relation::Relation;
use crate::engine::sort::Sort;
use crate::engine::weaver::Weaver;
use crate::engine::Row;

#[derive(Clone)]
pub struct DocumentCrud {
    store: Arc<dyn DocumentStore>,
    options: TableOptions,
    compiler: DocumentFilterCompiler,
    weaver: Option<Weaver>,
}

impl DocumentCrud {
    pub fn new(store: Arc<dyn DocumentStore>, options: TableOptions) -> Self {
        let compiler = DocumentFilterCompiler::new(options.columns(ID_FIELD));
        Self {
            store,
            options,
            compiler,
            weaver: None,
        }
    }

    pub fn with_weaver(mut self, weaver: Weaver) -> Self {
        self.weaver = Some(weaver);
        self
    }

    pub fn with_custom_filter(mut self, hook: CustomFilter<Filter>) -> Self {
        self.compiler = self.compiler.with_custom_filter(hook);
        self
    }

    pub fn collection(&self) -> &str {
        &self.options.table
    }

    pub fn weaver(&self) -> Option<&Weaver> {
        self.weaver.as_ref()
    }

    fn compile(&self, filter: &CrudFilter) -> Option<Vec<Filter>> {
        match self.compiler.compile(filter) {
            Compiled::Predicates(filters) => Some(filters),
            Compiled::Unsatisfiable => {
                tracing::debug!(collection = %self.options.table, "unsatisfiable filter, store not queried");
                None
            }
        }
    }
}

#[async_trait]
impl CrudOperations for DocumentCrud {
    fn id_column(&self) -> &str {
        &self.compiler.columns().id_column
    }

    async fn select(&self, filter: &CrudFilter, sorts: &[Sort], relations: &[Relation]) -> DaoResult<Vec<Row>> {
        let Some(filters) = self.compile(filter) else {
            return Ok(Vec::new());
        };
        let query = Query {
            filters,
            sort: sorts
                .iter()
                .map(|s| (s.column.clone(), s.order.is_descending()))
                .collect(),
            projection: filter.projection.clone(),
            skip: filter.page_offset().unwrap_or_default() as usize,
            limit: filter.page_limit().map(|n| n as usize),
        };
        let rows = self.store.find(&self.options.table, &query).await?;
        weave_rows(self.weaver.as_ref(), rows, relations).await
    }

    async fn count(&self, filter: &CrudFilter) -> DaoResult<u64> {
        let Some(filters) = self.compile(filter) else {
            return Ok(0);
        };
        Ok(self.store.count(&self.options.table, &filters).await?)
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

        let ids = self.store.insert_many(&self.options.table, rows).await?;

        let values = ids.iter().cloned().map(Value::String).collect();
        let query = Query::new().filter(Filter::is_in(ID_FIELD, values));
        let mut by_id: HashMap<String, Row> = self
            .store
            .find(&self.options.table, &query)
            .await?
            .into_iter()
            .filter_map(|row| {
                let key = id_key(row.get(ID_FIELD)?);
                Some((key, row))
            })
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn update(&self, filter: &CrudFilter, mut data: Row) -> DaoResult<u64> {
        let Some(filters) = self.compile(filter) else {
            return Ok(0);
        };
        if self.options.stamp_timestamps {
            stamp(&mut data, &[self.options.updated_at_column.as_str()]);
        }
        Ok(self
            .store
            .update_many(&self.options.table, &filters, &data)
            .await?)
    }

    async fn delete(&self, filter: &CrudFilter) -> DaoResult<u64> {
        let Some(filters) = self.compile(filter) else {
            return Ok(0);
        };
        Ok(self.store.delete_many(&self.options.table, &filters).await?)
    }
}
