//! Relational filter compiler: [`CrudFilter`] -> [`Condition`] list.

use std::collections::BTreeMap;

use super::{ColumnSet, CrudFilter, CustomFilter, FilterCompiler, FilterValue, Scalar};
use crate::engine::adapter::{Condition, SqlValue};

#[derive(Clone)]
pub struct SqlFilterCompiler {
    columns: ColumnSet,
    custom: Option<CustomFilter<Condition>>,
}

impl SqlFilterCompiler {
    pub fn new(columns: ColumnSet) -> Self {
        Self { columns, custom: None }
    }

    pub fn with_custom_filter(mut self, hook: CustomFilter<Condition>) -> Self {
        self.custom = Some(hook);
        self
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    /// `table.column`, so joins added by a custom hook stay unambiguous
    fn qualify(&self, column: &str) -> String {
        format!("{}.{}", self.columns.table, column)
    }

    fn like(
        &self,
        predicates: &mut Vec<Condition>,
        entries: &BTreeMap<String, String>,
        pattern: fn(&str) -> String,
    ) {
        for (column, value) in entries {
            predicates.push(Condition::Like(self.qualify(column), pattern(value)));
        }
    }
}

impl FilterCompiler for SqlFilterCompiler {
    type Predicate = Condition;

    fn custom_filter(&self) -> Option<&CustomFilter<Condition>> {
        self.custom.as_ref()
    }

    fn compile_builtin(&self, filter: &CrudFilter, predicates: &mut Vec<Condition>) {
        for (column, value) in &filter.exclude {
            let column = self.qualify(column);
            match value {
                FilterValue::Exact(v) => predicates.push(Condition::Ne(column, v.to_sql())),
                FilterValue::In(vs) if vs.is_empty() => {}
                FilterValue::In(vs) => predicates.push(Condition::NotIn(column, to_sql(vs))),
                FilterValue::Null => predicates.push(Condition::IsNotNull(column)),
                FilterValue::Ignored => {}
            }
        }

        for (column, value) in &filter.include {
            let column = self.qualify(column);
            match value {
                FilterValue::Exact(v) => predicates.push(Condition::Eq(column, v.to_sql())),
                FilterValue::In(vs) => predicates.push(Condition::In(column, to_sql(vs))),
                FilterValue::Null => predicates.push(Condition::IsNull(column)),
                FilterValue::Ignored => {}
            }
        }

        // `contain` is right-anchored like `right_contain`
        self.like(predicates, &filter.contain, |v| format!("{}%", v));
        self.like(predicates, &filter.left_contain, |v| format!("%{}", v));
        self.like(predicates, &filter.right_contain, |v| format!("{}%", v));
        self.like(predicates, &filter.full_contain, |v| format!("%{}%", v));

        let columns = &self.columns;
        if let Some(min) = &filter.min {
            predicates.push(Condition::Gte(self.qualify(&columns.id_column), min.to_sql()));
        }
        if let Some(max) = &filter.max {
            predicates.push(Condition::Lt(self.qualify(&columns.id_column), max.to_sql()));
        }
        if let Some(since) = &filter.since {
            predicates.push(Condition::Gte(self.qualify(&columns.created_at_column), since.to_sql()));
        }
        if let Some(until) = &filter.until {
            predicates.push(Condition::Lt(self.qualify(&columns.updated_at_column), until.to_sql()));
        }
    }
}

fn to_sql(values: &[Scalar]) -> Vec<SqlValue> {
    values.iter().map(Scalar::to_sql).collect()
}
