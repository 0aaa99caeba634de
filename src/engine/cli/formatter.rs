//! CLI Output Formatting Module
//! Provides consistent, colorized output for terminal UX

use colored::Colorize;
use serde_json::Value;

use crate::engine::Row;

pub struct CliFormatter;

impl CliFormatter {
    /// Print a success message
    pub fn success(message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    /// Print an error message
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message);
    }

    /// Print a section header
    pub fn header(title: &str) {
        println!("\n{}", title.bright_cyan().bold());
        println!("{}", "─".repeat(title.chars().count()).bright_black());
    }

    /// Print a key-value pair
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", key.bright_white().bold(), value);
    }

    /// Print a list item
    pub fn item(text: &str) {
        println!("  {} {}", "•".bright_black(), text);
    }

    pub fn table_header(columns: &[String]) {
        let header = columns
            .iter()
            .map(|c| c.bright_white().bold().to_string())
            .collect::<Vec<_>>()
            .join(" │ ");
        println!("  {}", header);
        let width: usize = columns.iter().map(|c| c.chars().count()).sum::<usize>() + 3 * columns.len().saturating_sub(1);
        println!("  {}", "─".repeat(width).bright_black());
    }

    pub fn table_row(values: &[String]) {
        println!("  {}", values.join(" │ "));
    }

    /// Print rows as a table over the union of their columns
    pub fn rows(rows: &[Row]) {
        if rows.is_empty() {
            println!("  {}", "(no rows)".bright_black());
            return;
        }
        let columns = columns(rows);
        Self::table_header(&columns);
        for row in rows {
            let values: Vec<String> = columns
                .iter()
                .map(|c| row.get(c).map(cell).unwrap_or_default())
                .collect();
            Self::table_row(&values);
        }
    }

    /// Print one row as key-value pairs
    pub fn record(row: &Row) {
        for (key, value) in row {
            Self::kv(key, &cell(value));
        }
    }
}

/// Column names in first-seen order
pub fn columns(rows: &[Row]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

/// Strings print bare, null as empty, everything else as JSON.
pub fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
