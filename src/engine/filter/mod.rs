//! Filter model and compilers
//!
//! A [`CrudFilter`] is a declarative set of named slots (include, exclude,
//! substring matches, id/timestamp ranges, paging, projection). Each backing
//! store has a [`FilterCompiler`] turning it into native predicates with the
//! same semantics:
//!
//! - exclude: scalar -> `<>`, list -> `NOT IN`, null -> `IS NOT NULL`
//! - include: scalar -> `=`, list -> `IN`, null -> `IS NULL`
//! - min/max: half-open range on the id column
//! - since/until: `created >= since`, `updated < until`
//!
//! An include with an empty list makes the whole filter unsatisfiable; the
//! compiler reports [`Compiled::Unsatisfiable`] instead of emitting a
//! predicate and the caller skips the store entirely.

pub mod document;
pub mod sql;

pub use document::DocumentFilterCompiler;
pub use sql::SqlFilterCompiler;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::adapter::SqlValue;
use super::nosql::Filter;

/// Text form of [`Scalar::Date`] in both backing stores.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A value that can be matched exactly: integer, string or date.
///
/// Floats, booleans and objects are deliberately not exact-match values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    Int(i64),
    Text(String),
    Date(DateTime<Utc>),
}

impl Scalar {
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Scalar::Int),
            Value::String(s) => Some(Scalar::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Int(i) => Value::from(*i),
            Scalar::Text(s) => Value::String(s.clone()),
            Scalar::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
        }
    }

    pub fn to_sql(&self) -> SqlValue {
        match self {
            Scalar::Int(i) => SqlValue::Integer(*i),
            Scalar::Text(s) => SqlValue::Text(s.clone()),
            Scalar::Date(d) => SqlValue::Text(d.format(DATE_FORMAT).to_string()),
        }
    }

    /// Parse command-line input: integers stay integers, everything else is text.
    pub fn parse(input: &str) -> Self {
        match input.parse::<i64>() {
            Ok(i) => Scalar::Int(i),
            Err(_) => Scalar::Text(input.to_string()),
        }
    }

    pub fn parse_date(input: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(input, DATE_FORMAT)
            .ok()
            .map(|naive| Scalar::Date(naive.and_utc()))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Text(s) => write!(f, "{}", s),
            Scalar::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(value.into())
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(value: DateTime<Utc>) -> Self {
        Scalar::Date(value)
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Scalar::from_json(&value)
            .ok_or_else(|| de::Error::custom(format!("expected integer or string, got {}", value)))
    }
}

/// Right-hand side of an include/exclude entry.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Exact(Scalar),
    In(Vec<Scalar>),
    Null,
    /// Not an exact-match value; contributes no predicate
    Ignored,
}

impl FilterValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FilterValue::Null,
            Value::Array(items) => items
                .iter()
                .map(Scalar::from_json)
                .collect::<Option<Vec<_>>>()
                .map_or(FilterValue::Ignored, FilterValue::In),
            other => Scalar::from_json(other).map_or(FilterValue::Ignored, FilterValue::Exact),
        }
    }
}

impl<'de> Deserialize<'de> for FilterValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(FilterValue::from_json(&Value::deserialize(deserializer)?))
    }
}

impl From<Scalar> for FilterValue {
    fn from(value: Scalar) -> Self {
        FilterValue::Exact(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Exact(value.into())
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Exact(value.into())
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Exact(value.into())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Exact(value.into())
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(value: DateTime<Utc>) -> Self {
        FilterValue::Exact(value.into())
    }
}

impl<T: Into<Scalar>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::In(values.into_iter().map(Into::into).collect())
    }
}

/// Declarative filter shared by every CRUD operation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrudFilter {
    pub include: BTreeMap<String, FilterValue>,
    pub exclude: BTreeMap<String, FilterValue>,
    /// Right-anchored (`value%`), same as `right_contain`
    pub contain: BTreeMap<String, String>,
    pub left_contain: BTreeMap<String, String>,
    pub right_contain: BTreeMap<String, String>,
    pub full_contain: BTreeMap<String, String>,
    pub min: Option<Scalar>,
    pub max: Option<Scalar>,
    pub since: Option<Scalar>,
    pub until: Option<Scalar>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub projection: Option<Vec<String>>,
    /// Raw document-store filters appended after the built-in ones
    #[serde(skip)]
    pub custom_condition: Vec<Filter>,
}

impl CrudFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, column: &str, value: impl Into<FilterValue>) -> Self {
        self.include.insert(column.to_string(), value.into());
        self
    }

    pub fn exclude(mut self, column: &str, value: impl Into<FilterValue>) -> Self {
        self.exclude.insert(column.to_string(), value.into());
        self
    }

    pub fn contain(mut self, column: &str, value: &str) -> Self {
        self.contain.insert(column.to_string(), value.to_string());
        self
    }

    pub fn left_contain(mut self, column: &str, value: &str) -> Self {
        self.left_contain.insert(column.to_string(), value.to_string());
        self
    }

    pub fn right_contain(mut self, column: &str, value: &str) -> Self {
        self.right_contain.insert(column.to_string(), value.to_string());
        self
    }

    pub fn full_contain(mut self, column: &str, value: &str) -> Self {
        self.full_contain.insert(column.to_string(), value.to_string());
        self
    }

    pub fn min(mut self, value: impl Into<Scalar>) -> Self {
        self.min = Some(value.into());
        self
    }

    pub fn max(mut self, value: impl Into<Scalar>) -> Self {
        self.max = Some(value.into());
        self
    }

    pub fn since(mut self, value: impl Into<Scalar>) -> Self {
        self.since = Some(value.into());
        self
    }

    pub fn until(mut self, value: impl Into<Scalar>) -> Self {
        self.until = Some(value.into());
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn projection(mut self, columns: &[&str]) -> Self {
        self.projection = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn custom_condition(mut self, filter: Filter) -> Self {
        self.custom_condition.push(filter);
        self
    }

    /// False when some include entry is an empty list.
    pub fn is_satisfiable(&self) -> bool {
        !self
            .include
            .values()
            .any(|value| matches!(value, FilterValue::In(values) if values.is_empty()))
    }

    /// Offset, only when positive
    pub fn page_offset(&self) -> Option<u64> {
        self.offset.filter(|n| *n > 0)
    }

    /// Limit, only when positive
    pub fn page_limit(&self) -> Option<u64> {
        self.limit.filter(|n| *n > 0)
    }
}

/// Column names a compiler needs besides the ones named in the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSet {
    pub table: String,
    pub id_column: String,
    pub created_at_column: String,
    pub updated_at_column: String,
}

impl ColumnSet {
    pub fn new(table: &str, id_column: &str) -> Self {
        Self {
            table: table.to_string(),
            id_column: id_column.to_string(),
            created_at_column: "created_at".to_string(),
            updated_at_column: "updated_at".to_string(),
        }
    }

    pub fn timestamps(mut self, created_at: &str, updated_at: &str) -> Self {
        self.created_at_column = created_at.to_string();
        self.updated_at_column = updated_at.to_string();
        self
    }
}

/// Compilation outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Compiled<P> {
    /// The filter can match nothing; do not query the store
    Unsatisfiable,
    Predicates(Vec<P>),
}

/// Hook run before the built-in rules with the predicate list under
/// construction. Returning `true` skips the built-in rules.
pub type CustomFilter<P> = Arc<dyn Fn(&CrudFilter, &mut Vec<P>) -> bool + Send + Sync>;

pub trait FilterCompiler {
    type Predicate;

    fn custom_filter(&self) -> Option<&CustomFilter<Self::Predicate>>;

    /// Append predicates for the built-in filter slots
    fn compile_builtin(&self, filter: &CrudFilter, predicates: &mut Vec<Self::Predicate>);

    fn compile(&self, filter: &CrudFilter) -> Compiled<Self::Predicate> {
        if !filter.is_satisfiable() {
            return Compiled::Unsatisfiable;
        }
        let mut predicates = Vec::new();
        let handled = self
            .custom_filter()
            .is_some_and(|hook| hook(filter, &mut predicates));
        if !handled {
            self.compile_builtin(filter, &mut predicates);
        }
        Compiled::Predicates(predicates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_value_from_json() {
        assert_eq!(FilterValue::from_json(&json!(1)), FilterValue::Exact(Scalar::Int(1)));
        assert_eq!(FilterValue::from_json(&json!("a")), FilterValue::Exact("a".into()));
        assert_eq!(FilterValue::from_json(&json!(null)), FilterValue::Null);
        assert_eq!(
            FilterValue::from_json(&json!([1, "b"])),
            FilterValue::In(vec![Scalar::Int(1), "b".into()])
        );
        assert_eq!(FilterValue::from_json(&json!([])), FilterValue::In(vec![]));
        assert_eq!(FilterValue::from_json(&json!(1.5)), FilterValue::Ignored);
        assert_eq!(FilterValue::from_json(&json!(true)), FilterValue::Ignored);
        assert_eq!(FilterValue::from_json(&json!({"a": 1})), FilterValue::Ignored);
        assert_eq!(FilterValue::from_json(&json!([1, 2.5])), FilterValue::Ignored);
    }

    #[test]
    fn test_deserialize_camel_case() {
        let filter: CrudFilter = serde_json::from_value(json!({
            "include": {"id": [1, 2, 3]},
            "exclude": {"id": 2, "deleted_at": null},
            "leftContain": {"title": "abc"},
            "min": 5,
            "limit": 10
        }))
        .unwrap();
        assert_eq!(filter.include["id"], FilterValue::In(vec![1.into(), 2.into(), 3.into()]));
        assert_eq!(filter.exclude["deleted_at"], FilterValue::Null);
        assert_eq!(filter.left_contain["title"], "abc");
        assert_eq!(filter.min, Some(Scalar::Int(5)));
        assert_eq!(filter.page_limit(), Some(10));
        assert_eq!(filter.page_offset(), None);
    }

    #[test]
    fn test_satisfiable() {
        assert!(CrudFilter::new().is_satisfiable());
        assert!(CrudFilter::new().exclude("id", Vec::<i64>::new()).is_satisfiable());
        assert!(!CrudFilter::new().include("id", Vec::<i64>::new()).is_satisfiable());
    }

    #[test]
    fn test_zero_paging_is_unset() {
        let filter = CrudFilter::new().offset(0).limit(0);
        assert_eq!(filter.page_offset(), None);
        assert_eq!(filter.page_limit(), None);
    }

    #[test]
    fn test_date_scalar() {
        let date = Scalar::parse_date("2024-01-02 03:04:05").unwrap();
        assert_eq!(date.to_json(), json!("2024-01-02 03:04:05"));
        assert_eq!(Scalar::parse("42"), Scalar::Int(42));
        assert_eq!(Scalar::parse("x42"), Scalar::Text("x42".into()));
    }
}
