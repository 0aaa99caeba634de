//! weft CLI Module
//! Command-line interface over the CRUD operations

pub mod formatter;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::config::CONFIG_FILE;
use super::relation::FkNaming;

#[derive(Parser, Debug)]
#[command(name = "weft")]
#[command(version)]
#[command(about = "Uniform CRUD over relational and document stores", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ./weft.config.json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Foreign-key naming for `parse-rels`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum NamingArg {
    Camel,
    Snake,
}

impl From<NamingArg> for FkNaming {
    fn from(arg: NamingArg) -> Self {
        match arg {
            NamingArg::Camel => FkNaming::Camel,
            NamingArg::Snake => FkNaming::Snake,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Select rows from a table
    Select {
        table: String,

        /// Filter as JSON, e.g. '{"include":{"id":[1,2]}}'
        #[arg(long)]
        filter: Option<String>,

        /// Sort terms, e.g. '-created_at,+id'
        #[arg(short, long)]
        sort: Option<String>,

        /// Relations to weave, e.g. 'user,forum'
        #[arg(short, long)]
        rels: Option<String>,
    },

    /// Count rows matching a filter
    Count {
        table: String,

        #[arg(long)]
        filter: Option<String>,
    },

    /// Fetch one row by id
    Get {
        table: String,
        id: String,

        #[arg(short, long)]
        rels: Option<String>,
    },

    /// Insert a JSON object or array of objects
    Insert { table: String, data: String },

    /// Delete one row by id
    Delete { table: String, id: String },

    /// Show how a relation list is parsed
    ParseRels {
        rels: String,

        #[arg(long, default_value = "camel")]
        naming: NamingArg,
    },

    /// Show how a sort list is parsed
    ParseSort { sort: String },
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_select() {
        let cli = Cli::parse_from([
            "weft", "--format", "json", "select", "post", "--sort", "-id", "--rels", "user",
        ]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.config_path(), PathBuf::from("weft.config.json"));
        match cli.command {
            Commands::Select { table, sort, rels, filter } => {
                assert_eq!(table, "post");
                assert_eq!(sort.as_deref(), Some("-id"));
                assert_eq!(rels.as_deref(), Some("user"));
                assert!(filter.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::parse_from(["weft", "count", "post", "--config", "/tmp/w.json"]);
        assert_eq!(cli.config_path(), PathBuf::from("/tmp/w.json"));
    }
}
