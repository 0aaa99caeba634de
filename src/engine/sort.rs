//! Sort terms
//!
//! Compact grammar: `+col` (ascending), `-col` (descending), `col` (store default).
//! Terms are comma separated; one malformed term fails the whole list.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ParseError;

const SORT_TERM_SEPARATOR: char = ',';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Default,
    Asc,
    Desc,
}

impl SortOrder {
    /// `Default` sorts ascending on every backing store.
    pub fn is_descending(&self) -> bool {
        matches!(self, SortOrder::Desc)
    }

    pub fn to_sql(&self) -> &'static str {
        match self {
            SortOrder::Default | SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub column: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl Sort {
    pub fn new(column: &str, order: SortOrder) -> Self {
        Self {
            column: column.to_string(),
            order,
        }
    }

    pub fn asc(column: &str) -> Self {
        Self::new(column, SortOrder::Asc)
    }

    pub fn desc(column: &str) -> Self {
        Self::new(column, SortOrder::Desc)
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.order {
            SortOrder::Default => write!(f, "{}", self.column),
            SortOrder::Asc => write!(f, "+{}", self.column),
            SortOrder::Desc => write!(f, "-{}", self.column),
        }
    }
}

/// `[A-Za-z0-9_]+`
pub(crate) fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a single sort term.
pub fn parse_sort(s: &str) -> Result<Sort, ParseError> {
    let term = s.trim();
    let (order, rest) = match term.chars().next() {
        Some('+') => (SortOrder::Asc, &term[1..]),
        Some('-') => (SortOrder::Desc, &term[1..]),
        _ => (SortOrder::Default, term),
    };
    let column = rest.trim_start();
    if !is_word(column) {
        return Err(ParseError::InvalidSort(s.to_string()));
    }
    Ok(Sort::new(column, order))
}

/// Parse a comma separated list of sort terms. Blank input yields no sorts.
pub fn parse_sorts(s: &str) -> Result<Vec<Sort>, ParseError> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.trim().split(SORT_TERM_SEPARATOR).map(parse_sort).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sort() {
        assert_eq!(parse_sort("-foo").unwrap(), Sort::desc("foo"));
        assert_eq!(parse_sort("+foo").unwrap(), Sort::asc("foo"));
        assert_eq!(parse_sort("foo").unwrap(), Sort::new("foo", SortOrder::Default));
        assert_eq!(parse_sort(" - foo ").unwrap(), Sort::desc("foo"));
    }

    #[test]
    fn test_parse_sort_rejects_malformed() {
        assert_eq!(parse_sort(""), Err(ParseError::InvalidSort(String::new())));
        assert!(parse_sort("+").is_err());
        assert!(parse_sort("-").is_err());
        assert!(parse_sort("foo bar").is_err());
    }

    #[test]
    fn test_parse_sorts() {
        let sorts = parse_sorts("foo,+bar,-baz").unwrap();
        assert_eq!(
            sorts,
            vec![
                Sort::new("foo", SortOrder::Default),
                Sort::asc("bar"),
                Sort::desc("baz"),
            ]
        );
        assert!(parse_sorts("").unwrap().is_empty());
        assert!(parse_sorts("foo,,bar").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for term in ["foo", "+foo", "-foo"] {
            assert_eq!(parse_sort(term).unwrap().to_string(), term);
        }
    }
}
