//! SQL statement rendering
//!
//! Turns [`SelectQuery`] / [`Condition`] data into parameterized SQL for a
//! given dialect. Values never appear in the SQL text.

use super::dialect::SqlDialect;
use super::{AdapterError, AdapterResult, Condition, SelectQuery, SqlValue};
use crate::engine::Row;

/// Parameter list that hands out dialect placeholders as values are bound.
struct Params {
    dialect: SqlDialect,
    values: Vec<SqlValue>,
}

impl Params {
    fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            values: Vec::new(),
        }
    }

    fn bind(&mut self, value: SqlValue) -> String {
        self.values.push(value);
        self.dialect.placeholder(self.values.len())
    }

    fn bind_all(&mut self, values: &[SqlValue]) -> String {
        values
            .iter()
            .map(|v| self.bind(v.clone()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub struct QueryBuilder {
    dialect: SqlDialect,
}

impl QueryBuilder {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    fn quote(&self, identifier: &str) -> String {
        self.dialect.quote_identifier(identifier)
    }

    fn where_clause(&self, conditions: &[Condition], params: &mut Params) -> String {
        if conditions.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = conditions
            .iter()
            .map(|condition| {
                let column = self.quote(condition.column());
                match condition {
                    Condition::Eq(_, v) => format!("{} = {}", column, params.bind(v.clone())),
                    Condition::Ne(_, v) => format!("{} <> {}", column, params.bind(v.clone())),
                    Condition::In(_, vs) if vs.is_empty() => "1 = 0".to_string(),
                    Condition::In(_, vs) => format!("{} IN ({})", column, params.bind_all(vs)),
                    Condition::NotIn(_, vs) if vs.is_empty() => "1 = 1".to_string(),
                    Condition::NotIn(_, vs) => {
                        format!("{} NOT IN ({})", column, params.bind_all(vs))
                    }
                    Condition::IsNull(_) => format!("{} IS NULL", column),
                    Condition::IsNotNull(_) => format!("{} IS NOT NULL", column),
                    Condition::Like(_, pattern) => format!(
                        "{} LIKE {}",
                        column,
                        params.bind(SqlValue::Text(pattern.clone()))
                    ),
                    Condition::Gte(_, v) => format!("{} >= {}", column, params.bind(v.clone())),
                    Condition::Lt(_, v) => format!("{} < {}", column, params.bind(v.clone())),
                }
            })
            .collect();
        format!(" WHERE {}", parts.join(" AND "))
    }

    fn limit_clause(&self, offset: Option<u64>, limit: Option<u64>) -> String {
        match (offset, limit) {
            (None, None) => String::new(),
            (None, Some(limit)) => format!(" LIMIT {}", limit),
            (Some(offset), Some(limit)) => format!(" LIMIT {} OFFSET {}", limit, offset),
            (Some(offset), None) => match self.dialect {
                SqlDialect::Sqlite => format!(" LIMIT -1 OFFSET {}", offset),
                SqlDialect::Mysql => format!(" LIMIT {} OFFSET {}", u64::MAX, offset),
                SqlDialect::Postgres => format!(" OFFSET {}", offset),
            },
        }
    }

    pub fn select(&self, query: &SelectQuery) -> (String, Vec<SqlValue>) {
        let mut params = Params::new(self.dialect);
        let columns = if query.columns.is_empty() {
            "*".to_string()
        } else {
            query
                .columns
                .iter()
                .map(|c| self.quote(c))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let where_clause = self.where_clause(&query.conditions, &mut params);
        let order_clause = if query.order_by.is_empty() {
            String::new()
        } else {
            let terms: Vec<String> = query
                .order_by
                .iter()
                .map(|s| format!("{} {}", self.quote(&s.column), s.order.to_sql()))
                .collect();
            format!(" ORDER BY {}", terms.join(", "))
        };
        let sql = format!(
            "SELECT {} FROM {}{}{}{}",
            columns,
            self.quote(&query.table),
            where_clause,
            order_clause,
            self.limit_clause(query.offset, query.limit)
        );
        (sql, params.values)
    }

    pub fn count(&self, table: &str, conditions: &[Condition]) -> (String, Vec<SqlValue>) {
        let mut params = Params::new(self.dialect);
        let where_clause = self.where_clause(conditions, &mut params);
        let sql = format!("SELECT COUNT(*) FROM {}{}", self.quote(table), where_clause);
        (sql, params.values)
    }

    pub fn insert(&self, table: &str, row: &Row) -> (String, Vec<SqlValue>) {
        if row.is_empty() {
            return (format!("INSERT INTO {} DEFAULT VALUES", self.quote(table)), Vec::new());
        }
        let mut params = Params::new(self.dialect);
        let columns: Vec<String> = row.keys().map(|k| self.quote(k)).collect();
        let values: Vec<SqlValue> = row.values().map(SqlValue::from_json).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote(table),
            columns.join(", "),
            params.bind_all(&values)
        );
        (sql, params.values)
    }

    /// Multi-row insert-or-replace over a fixed column list.
    pub fn replace(
        &self,
        table: &str,
        columns: &[&str],
        rows: &[Vec<SqlValue>],
    ) -> AdapterResult<(String, Vec<SqlValue>)> {
        let verb = self.dialect.replace_into().ok_or_else(|| {
            AdapterError::Validation(format!("{} has no replace statement", self.dialect))
        })?;
        if rows.is_empty() {
            return Err(AdapterError::Validation("nothing to replace".to_string()));
        }
        let mut params = Params::new(self.dialect);
        let tuples: Vec<String> = rows
            .iter()
            .map(|row| format!("({})", params.bind_all(row)))
            .collect();
        let sql = format!(
            "{} {} ({}) VALUES {}",
            verb,
            self.quote(table),
            columns.iter().map(|c| self.quote(c)).collect::<Vec<_>>().join(", "),
            tuples.join(", ")
        );
        Ok((sql, params.values))
    }

    pub fn update(
        &self,
        table: &str,
        conditions: &[Condition],
        data: &Row,
    ) -> AdapterResult<(String, Vec<SqlValue>)> {
        if data.is_empty() {
            return Err(AdapterError::Validation("no columns to update".to_string()));
        }
        let mut params = Params::new(self.dialect);
        let assignments: Vec<String> = data
            .iter()
            .map(|(k, v)| format!("{} = {}", self.quote(k), params.bind(SqlValue::from_json(v))))
            .collect();
        let where_clause = self.where_clause(conditions, &mut params);
        let sql = format!(
            "UPDATE {} SET {}{}",
            self.quote(table),
            assignments.join(", "),
            where_clause
        );
        Ok((sql, params.values))
    }

    pub fn delete(&self, table: &str, conditions: &[Condition]) -> (String, Vec<SqlValue>) {
        let mut params = Params::new(self.dialect);
        let where_clause = self.where_clause(conditions, &mut params);
        (format!("DELETE FROM {}{}", self.quote(table), where_clause), params.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sort::Sort;
    use serde_json::json;

    fn int(i: i64) -> SqlValue {
        SqlValue::Integer(i)
    }

    #[test]
    fn test_select_rendering() {
        let query = SelectQuery {
            table: "post".into(),
            columns: vec![],
            conditions: vec![
                Condition::NotIn("post.id".into(), vec![int(2)]),
                Condition::In("post.id".into(), vec![int(1), int(2), int(3)]),
                Condition::Like("post.title".into(), "abc%".into()),
            ],
            order_by: vec![Sort::desc("post.id")],
            offset: Some(10),
            limit: Some(5),
        };
        let (sql, params) = QueryBuilder::new(SqlDialect::Sqlite).select(&query);
        assert_eq!(
            sql,
            "SELECT * FROM \"post\" WHERE \"post\".\"id\" NOT IN (?1) AND \"post\".\"id\" IN (?2, ?3, ?4) \
             AND \"post\".\"title\" LIKE ?5 ORDER BY \"post\".\"id\" DESC LIMIT 5 OFFSET 10"
        );
        assert_eq!(params.len(), 5);
    }

    #[test]
    fn test_offset_without_limit() {
        let mut query = SelectQuery::new("t");
        query.offset = Some(3);
        let (sql, _) = QueryBuilder::new(SqlDialect::Sqlite).select(&query);
        assert!(sql.ends_with("LIMIT -1 OFFSET 3"));
        let (sql, _) = QueryBuilder::new(SqlDialect::Postgres).select(&query);
        assert!(sql.ends_with("\"t\" OFFSET 3"));
    }

    #[test]
    fn test_empty_sets() {
        let (sql, params) = QueryBuilder::new(SqlDialect::Sqlite)
            .count("t", &[Condition::In("id".into(), vec![]), Condition::NotIn("id".into(), vec![])]);
        assert_eq!(sql, "SELECT COUNT(*) FROM \"t\" WHERE 1 = 0 AND 1 = 1");
        assert!(params.is_empty());
    }

    #[test]
    fn test_postgres_placeholders() {
        let mut data = Row::new();
        data.insert("title".into(), json!("x"));
        let (sql, params) = QueryBuilder::new(SqlDialect::Postgres)
            .update("t", &[Condition::Eq("id".into(), int(9))], &data)
            .unwrap();
        assert_eq!(sql, "UPDATE \"t\" SET \"title\" = $1 WHERE \"id\" = $2");
        assert_eq!(params, vec![SqlValue::Text("x".into()), int(9)]);
    }

    #[test]
    fn test_update_requires_columns() {
        let result = QueryBuilder::new(SqlDialect::Sqlite).update("t", &[], &Row::new());
        assert!(matches!(result, Err(AdapterError::Validation(_))));
    }

    #[test]
    fn test_replace() {
        let (sql, params) = QueryBuilder::new(SqlDialect::Mysql)
            .replace("meta", &["fk", "name"], &[vec![int(1), int(2)], vec![int(3), int(4)]])
            .unwrap();
        assert_eq!(sql, "REPLACE INTO `meta` (`fk`, `name`) VALUES (?, ?), (?, ?)");
        assert_eq!(params.len(), 4);
        assert!(QueryBuilder::new(SqlDialect::Postgres)
            .replace("meta", &["fk"], &[vec![int(1)]])
            .is_err());
    }
}
