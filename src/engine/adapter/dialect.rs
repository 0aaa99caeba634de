//! SQL Dialects
//!
//! Identifier quoting, placeholder style and upsert verb per dialect.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    Sqlite,
    Postgres,
    Mysql,
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlDialect::Sqlite => write!(f, "sqlite"),
            SqlDialect::Postgres => write!(f, "postgres"),
            SqlDialect::Mysql => write!(f, "mysql"),
        }
    }
}

impl SqlDialect {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(SqlDialect::Sqlite),
            "postgres" | "postgresql" | "pg" => Some(SqlDialect::Postgres),
            "mysql" | "mariadb" => Some(SqlDialect::Mysql),
            _ => None,
        }
    }

    /// Quote a possibly table-qualified identifier: `post.id` -> `"post"."id"`
    pub fn quote_identifier(&self, identifier: &str) -> String {
        let quote = match self {
            SqlDialect::Mysql => '`',
            SqlDialect::Sqlite | SqlDialect::Postgres => '"',
        };
        identifier
            .split('.')
            .map(|part| {
                let escaped = part.replace(quote, &format!("{}{}", quote, quote));
                format!("{}{}{}", quote, escaped, quote)
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Placeholder for the 1-based parameter `index`
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::Sqlite => format!("?{}", index),
            SqlDialect::Postgres => format!("${}", index),
            SqlDialect::Mysql => "?".to_string(),
        }
    }

    /// Statement prefix that inserts or replaces on key conflict.
    pub fn replace_into(&self) -> Option<&'static str> {
        match self {
            SqlDialect::Sqlite => Some("INSERT OR REPLACE INTO"),
            SqlDialect::Mysql => Some("REPLACE INTO"),
            SqlDialect::Postgres => None,
        }
    }
}
