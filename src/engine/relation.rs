//! Relation descriptors
//!
//! A relation is one foreign-key edge from a source row to a target table:
//! the source row's `fk` value is matched against the target's `column`
//! and the matched target row is attached under `property`.
//!
//! Compact grammar, all of which describe the same edge for `user`:
//!
//! ```text
//! user  ==  user.id  ==  userId=user  ==  userId=user.id@user
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ParseError;
use super::sort::is_word;

const REL_TERM_SEPARATOR: char = ',';
const DEFAULT_TARGET_COLUMN: &str = "id";

/// Naming convention for synthesized foreign-key fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FkNaming {
    /// `user` -> `userId`
    #[default]
    Camel,
    /// `user` -> `user_id`
    Snake,
}

impl FkNaming {
    pub fn foreign_key(&self, table: &str) -> String {
        match self {
            FkNaming::Camel => format!("{}Id", table),
            FkNaming::Snake => format!("{}_id", table),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    /// Field on the source row holding the foreign key
    pub fk: String,
    /// Target table or collection
    pub table: String,
    /// Target column matched against `fk`
    pub column: String,
    /// Field under which the target row is attached
    pub property: String,
}

impl Relation {
    pub fn new(fk: &str, table: &str, column: &str, property: &str) -> Self {
        Self {
            fk: fk.to_string(),
            table: table.to_string(),
            column: column.to_string(),
            property: property.to_string(),
        }
    }

    /// Relation to `table` with every part defaulted.
    pub fn to_table(table: &str, naming: FkNaming) -> Self {
        Self::new(&naming.foreign_key(table), table, DEFAULT_TARGET_COLUMN, table)
    }
}

/// Canonical, fully explicit form: `fk=table.column@property`
impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}.{}@{}", self.fk, self.table, self.column, self.property)
    }
}

/// Relation parser bound to a foreign-key naming convention.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationParser {
    naming: FkNaming,
}

impl RelationParser {
    pub fn new(naming: FkNaming) -> Self {
        Self { naming }
    }

    pub fn naming(&self) -> FkNaming {
        self.naming
    }

    pub fn parse(&self, s: &str) -> Result<Relation, ParseError> {
        let invalid = || ParseError::InvalidRelation(s.to_string());
        let term = s.trim();

        let (fk, rest) = match term.split_once('=') {
            Some((fk, rest)) if is_word(fk) => (Some(fk), rest),
            Some(_) => return Err(invalid()),
            None => (None, term),
        };
        let (target, property) = match rest.split_once('@') {
            Some((target, alias)) if is_word(alias) => (target, Some(alias)),
            Some(_) => return Err(invalid()),
            None => (rest, None),
        };
        let (table, column) = match target.split_once('.') {
            Some((table, column)) if is_word(column) => (table, Some(column)),
            Some(_) => return Err(invalid()),
            None => (target, None),
        };
        if !is_word(table) {
            return Err(invalid());
        }

        Ok(Relation {
            fk: fk
                .map(str::to_string)
                .unwrap_or_else(|| self.naming.foreign_key(table)),
            table: table.to_string(),
            column: column.unwrap_or(DEFAULT_TARGET_COLUMN).to_string(),
            property: property.unwrap_or(table).to_string(),
        })
    }

    /// Parse a comma separated list. Blank input yields no relations.
    pub fn parse_list(&self, s: &str) -> Result<Vec<Relation>, ParseError> {
        if s.trim().is_empty() {
            return Ok(Vec::new());
        }
        s.trim()
            .split(REL_TERM_SEPARATOR)
            .map(|term| self.parse(term))
            .collect()
    }
}

/// Parse one relation term with camel-case foreign keys.
pub fn parse_relation(s: &str) -> Result<Relation, ParseError> {
    RelationParser::default().parse(s)
}

/// Parse a relation list with camel-case foreign keys.
pub fn parse_relations(s: &str) -> Result<Vec<Relation>, ParseError> {
    RelationParser::default().parse_list(s)
}
