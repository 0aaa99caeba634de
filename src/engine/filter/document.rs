//! Document filter compiler: [`CrudFilter`] -> document store [`Filter`] list.
//!
//! Substring slots (`contain` and friends) have no document counterpart and
//! are not compiled. `custom_condition` filters are appended last.

use serde_json::Value;

use super::{ColumnSet, CrudFilter, CustomFilter, FilterCompiler, FilterValue, Scalar};
use crate::engine::nosql::{Filter, FilterOp, ID_FIELD};

#[derive(Clone)]
pub struct DocumentFilterCompiler {
    columns: ColumnSet,
    custom: Option<CustomFilter<Filter>>,
}

impl DocumentFilterCompiler {
    pub fn new(columns: ColumnSet) -> Self {
        Self { columns, custom: None }
    }

    pub fn with_custom_filter(mut self, hook: CustomFilter<Filter>) -> Self {
        self.custom = Some(hook);
        self
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }
}

/// Document ids are stored as strings, so integer ids match their decimal text.
fn field_value(field: &str, scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Int(i) if field == ID_FIELD => Value::String(i.to_string()),
        other => other.to_json(),
    }
}

fn field_values(field: &str, scalars: &[Scalar]) -> Vec<Value> {
    scalars.iter().map(|s| field_value(field, s)).collect()
}

impl FilterCompiler for DocumentFilterCompiler {
    type Predicate = Filter;

    fn custom_filter(&self) -> Option<&CustomFilter<Filter>> {
        self.custom.as_ref()
    }

    fn compile_builtin(&self, filter: &CrudFilter, predicates: &mut Vec<Filter>) {
        for (field, value) in &filter.exclude {
            let op = match value {
                FilterValue::Exact(v) => FilterOp::Ne(field_value(field, v)),
                FilterValue::In(vs) if vs.is_empty() => continue,
                FilterValue::In(vs) => FilterOp::NotIn(field_values(field, vs)),
                FilterValue::Null => FilterOp::Ne(Value::Null),
                FilterValue::Ignored => continue,
            };
            predicates.push(Filter::new(field, op));
        }

        for (field, value) in &filter.include {
            let op = match value {
                FilterValue::Exact(v) => FilterOp::Eq(field_value(field, v)),
                FilterValue::In(vs) => FilterOp::In(field_values(field, vs)),
                FilterValue::Null => FilterOp::Eq(Value::Null),
                FilterValue::Ignored => continue,
            };
            predicates.push(Filter::new(field, op));
        }

        let columns = &self.columns;
        if let Some(min) = &filter.min {
            let id = &columns.id_column;
            predicates.push(Filter::new(id, FilterOp::Gte(field_value(id, min))));
        }
        if let Some(max) = &filter.max {
            let id = &columns.id_column;
            predicates.push(Filter::new(id, FilterOp::Lt(field_value(id, max))));
        }
        if let Some(since) = &filter.since {
            predicates.push(Filter::new(&columns.created_at_column, FilterOp::Gte(since.to_json())));
        }
        if let Some(until) = &filter.until {
            predicates.push(Filter::new(&columns.updated_at_column, FilterOp::Lt(until.to_json())));
        }

        predicates.extend(filter.custom_condition.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::filter::Compiled;
    use serde_json::json;

    fn compiler() -> DocumentFilterCompiler {
        DocumentFilterCompiler::new(ColumnSet::new("users", ID_FIELD))
    }

    #[test]
    fn test_operators() {
        let filter = CrudFilter::new()
            .exclude("state", "banned")
            .exclude("email", FilterValue::Null)
            .include("age", vec![20, 30])
            .include("deleted_at", FilterValue::Null);
        let Compiled::Predicates(p) = compiler().compile(&filter) else {
            panic!("unexpected unsatisfiable filter");
        };
        assert_eq!(
            p,
            vec![
                Filter::new("email", FilterOp::Ne(Value::Null)),
                Filter::new("state", FilterOp::Ne(json!("banned"))),
                Filter::new("age", FilterOp::In(vec![json!(20), json!(30)])),
                Filter::new("deleted_at", FilterOp::Eq(Value::Null)),
            ]
        );
    }

    #[test]
    fn test_integer_ids_match_as_text() {
        let filter = CrudFilter::new().include(ID_FIELD, 7).min(3);
        let Compiled::Predicates(p) = compiler().compile(&filter) else {
            panic!("unexpected unsatisfiable filter");
        };
        assert_eq!(p[0], Filter::eq(ID_FIELD, "7"));
        assert_eq!(p[1], Filter::new(ID_FIELD, FilterOp::Gte(json!("3"))));
    }

    #[test]
    fn test_contain_is_not_compiled_and_custom_condition_appended() {
        let filter = CrudFilter::new()
            .contain("name", "al")
            .full_contain("name", "li")
            .custom_condition(Filter::contains("name", "Ali"));
        assert_eq!(
            compiler().compile(&filter),
            Compiled::Predicates(vec![Filter::contains("name", "Ali")])
        );
    }

    #[test]
    fn test_empty_include_is_unsatisfiable() {
        let filter = CrudFilter::new().include("age", Vec::<i64>::new());
        assert_eq!(compiler().compile(&filter), Compiled::Unsatisfiable);
    }
}
