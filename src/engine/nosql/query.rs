//! Query engine for stored documents

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use super::document::{Document, ID_FIELD};
use crate::engine::Row;

/// Filter operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Equality; `Eq(null)` also matches a missing field
    Eq(Value),
    /// Not equal; `Ne(null)` requires the field to be present
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    /// String contains
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    /// In array of values
    In(Vec<Value>),
    /// Not in array of values
    NotIn(Vec<Value>),
    /// Field exists
    Exists(bool),
}

/// A single filter condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
}

impl Filter {
    pub fn new(field: &str, op: FilterOp) -> Self {
        Self { field: field.to_string(), op }
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq(value.into()))
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Ne(value.into()))
    }

    pub fn contains(field: &str, value: &str) -> Self {
        Self::new(field, FilterOp::Contains(value.to_string()))
    }

    pub fn is_in(field: &str, values: Vec<Value>) -> Self {
        Self::new(field, FilterOp::In(values))
    }

    /// Check if a document matches this filter.
    ///
    /// Missing fields behave like `null`, so `Ne`/`NotIn` against a concrete
    /// value match documents lacking the field.
    pub fn matches(&self, doc: &Document) -> bool {
        if self.field == ID_FIELD {
            return self.on_id().test(Some(id_value(&Value::String(doc.id.clone()))));
        }
        self.test(doc.field(&self.field))
    }

    /// The same filter with every operand passed through [`id_value`]
    fn on_id(&self) -> Filter {
        let op = match &self.op {
            FilterOp::Eq(v) => FilterOp::Eq(id_value(v)),
            FilterOp::Ne(v) => FilterOp::Ne(id_value(v)),
            FilterOp::Gt(v) => FilterOp::Gt(id_value(v)),
            FilterOp::Gte(v) => FilterOp::Gte(id_value(v)),
            FilterOp::Lt(v) => FilterOp::Lt(id_value(v)),
            FilterOp::Lte(v) => FilterOp::Lte(id_value(v)),
            FilterOp::In(vs) => FilterOp::In(vs.iter().map(id_value).collect()),
            FilterOp::NotIn(vs) => FilterOp::NotIn(vs.iter().map(id_value).collect()),
            other => other.clone(),
        };
        Filter::new(&self.field, op)
    }

    fn test(&self, value: Option<Value>) -> bool {
        let actual = value.as_ref().unwrap_or(&Value::Null);

        match &self.op {
            FilterOp::Exists(should_exist) => value.is_some() == *should_exist,
            FilterOp::Eq(expected) => values_equal(actual, expected),
            FilterOp::Ne(expected) => !values_equal(actual, expected),
            FilterOp::In(values) => values.iter().any(|v| values_equal(actual, v)),
            FilterOp::NotIn(values) => !values.iter().any(|v| values_equal(actual, v)),
            FilterOp::Gt(expected) => compare_values(actual, expected) == Some(Ordering::Greater),
            FilterOp::Gte(expected) => matches!(
                compare_values(actual, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt(expected) => compare_values(actual, expected) == Some(Ordering::Less),
            FilterOp::Lte(expected) => matches!(
                compare_values(actual, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Contains(substr) => actual.as_str().is_some_and(|s| s.contains(substr.as_str())),
            FilterOp::StartsWith(prefix) => {
                actual.as_str().is_some_and(|s| s.starts_with(prefix.as_str()))
            }
            FilterOp::EndsWith(suffix) => actual.as_str().is_some_and(|s| s.ends_with(suffix.as_str())),
        }
    }
}

/// Document ids are stored as text. An id spelling an integer in canonical
/// decimal form compares as that integer, so `"10"` sorts after `"3"`.
fn id_value(value: &Value) -> Value {
    match value {
        Value::String(s) => match s.parse::<i64>() {
            Ok(n) if n.to_string() == *s => Value::from(n),
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

/// Sort key of `field`, numeric for decimal ids
fn sort_key(doc: &Document, field: &str) -> Option<Value> {
    let value = doc.field(field)?;
    Some(if field == ID_FIELD { id_value(&value) } else { value })
}

/// Numbers compare by value, so `1` equals `1.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Compare two JSON values
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                return Some(a.cmp(&b));
            }
            a.as_f64()?.partial_cmp(&b.as_f64()?)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Query with multiple filters and options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Query {
    /// All filters must match (AND)
    #[serde(default)]
    pub filters: Vec<Filter>,

    /// Sort keys in priority order; `true` means descending
    #[serde(default)]
    pub sort: Vec<(String, bool)>,

    /// Field allowlist; `_id` is always kept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Skip results (for pagination)
    #[serde(default)]
    pub skip: usize,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort(mut self, field: &str, desc: bool) -> Self {
        self.sort.push((field.to_string(), desc));
        self
    }

    pub fn project(mut self, fields: Vec<String>) -> Self {
        self.projection = Some(fields);
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Filter, sort, page and project `docs`
    pub fn execute(&self, docs: Vec<Document>) -> Vec<Row> {
        let mut results: Vec<Document> = docs.into_iter().filter(|doc| self.matches(doc)).collect();

        if !self.sort.is_empty() {
            results.sort_by(|a, b| {
                for (field, desc) in &self.sort {
                    let ordering = compare_fields(sort_key(a, field), sort_key(b, field));
                    let ordering = if *desc { ordering.reverse() } else { ordering };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let page = results.into_iter().skip(self.skip);
        let page: Vec<Document> = match self.limit {
            Some(n) => page.take(n).collect(),
            None => page.collect(),
        };

        page.into_iter().map(|doc| self.project_doc(doc)).collect()
    }

    fn project_doc(&self, doc: Document) -> Row {
        let row = doc.into_row();
        match &self.projection {
            None => row,
            Some(fields) => row
                .into_iter()
                .filter(|(k, _)| k == ID_FIELD || fields.contains(k))
                .collect(),
        }
    }
}

/// Present values sort before missing ones.
fn compare_fields(a: Option<Value>, b: Option<Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_values(&a, &b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, value: Value) -> Document {
        Document::with_id(id.to_string(), value.as_object().cloned().unwrap())
    }

    #[test]
    fn test_filter_eq() {
        let d = doc("1", json!({"name": "Alice", "age": 30}));

        assert!(Filter::eq("name", "Alice").matches(&d));
        assert!(!Filter::eq("name", "Bob").matches(&d));
        assert!(Filter::eq("age", 30).matches(&d));
        assert!(Filter::eq("age", 30.0).matches(&d));
        assert!(Filter::eq("_id", "1").matches(&d));
    }

    #[test]
    fn test_null_semantics() {
        let with = doc("1", json!({"parent": 3}));
        let without = doc("2", json!({}));
        let null = doc("3", json!({"parent": null}));

        let is_null = Filter::eq("parent", Value::Null);
        assert!(!is_null.matches(&with));
        assert!(is_null.matches(&without));
        assert!(is_null.matches(&null));

        let not_null = Filter::ne("parent", Value::Null);
        assert!(not_null.matches(&with));
        assert!(!not_null.matches(&without));

        assert!(Filter::ne("parent", 4).matches(&without));
        assert!(Filter::new("parent", FilterOp::NotIn(vec![json!(3)])).matches(&without));
        assert!(!Filter::new("parent", FilterOp::NotIn(vec![json!(3)])).matches(&with));
    }

    #[test]
    fn test_query_execution() {
        let docs = vec![
            doc("a", json!({"name": "Alice", "age": 30})),
            doc("b", json!({"name": "Bob", "age": 25})),
            doc("c", json!({"name": "Charlie", "age": 35})),
        ];

        let results = Query::new()
            .filter(Filter::new("age", FilterOp::Gte(json!(30))))
            .sort("age", true)
            .project(vec!["name".into()])
            .execute(docs);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].get("name"), Some(&json!("Charlie")));
        assert_eq!(results[0].get("_id"), Some(&json!("c")));
        assert!(results[0].get("age").is_none());
    }

    #[test]
    fn test_multi_key_sort_and_paging() {
        let docs = vec![
            doc("a", json!({"g": 1, "n": 2})),
            doc("b", json!({"g": 0, "n": 9})),
            doc("c", json!({"g": 1, "n": 1})),
            doc("d", json!({"n": 0})),
        ];
        let ids: Vec<Value> = Query::new()
            .sort("g", false)
            .sort("n", false)
            .skip(1)
            .limit(2)
            .execute(docs)
            .into_iter()
            .map(|row| row["_id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("c"), json!("a")]);
    }

    #[test]
    fn test_decimal_ids_compare_as_integers() {
        let docs = vec![doc("10", json!({})), doc("3", json!({})), doc("20", json!({})), doc("x", json!({}))];

        assert!(Filter::new("_id", FilterOp::Gte(json!("3"))).matches(&docs[0]));
        assert!(Filter::new("_id", FilterOp::Lt(json!(25))).matches(&docs[2]));
        assert!(!Filter::new("_id", FilterOp::Gt(json!("3"))).matches(&docs[3]));
        assert!(Filter::eq("_id", 10).matches(&docs[0]));
        assert!(Filter::is_in("_id", vec![json!(3), json!("20")]).matches(&docs[2]));
        assert!(!Filter::eq("_id", "010").matches(&docs[0]));

        let ids: Vec<Value> = Query::new()
            .filter(Filter::new("_id", FilterOp::Gte(json!(3))))
            .sort("_id", false)
            .execute(docs)
            .into_iter()
            .map(|row| row["_id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("3"), json!("10"), json!("20")]);
    }
}
