//! weft CLI - Main entry point for the `weft` binary

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::Value;
use weftdb::engine::{
    cli::{formatter::CliFormatter, Cli, Commands, OutputFormat},
    parse_sorts, ConnectionRegistry, CrudFilter, CrudOperations, OperationFactory, RelationParser,
    Row, Scalar, WeftConfig,
};

fn main() {
    weftdb::init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run_cli(cli) {
        CliFormatter::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_filter(filter: Option<&str>) -> Result<CrudFilter> {
    match filter {
        Some(text) => serde_json::from_str(text).context("invalid --filter JSON"),
        None => Ok(CrudFilter::default()),
    }
}

fn parse_rows(data: &str) -> Result<Vec<Row>> {
    match serde_json::from_str::<Value>(data).context("invalid row JSON")? {
        Value::Object(row) => Ok(vec![row]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => bail!("expected an object, got {}", other),
            })
            .collect(),
        other => bail!("expected an object or array, got {}", other),
    }
}

#[tokio::main]
async fn run_cli(cli: Cli) -> Result<()> {
    let json = cli.format == OutputFormat::Json;

    match &cli.command {
        Commands::ParseRels { rels, naming } => {
            let relations = RelationParser::new((*naming).into()).parse_list(rels)?;
            if json {
                return print_json(&relations);
            }
            CliFormatter::header("Relations");
            for relation in &relations {
                CliFormatter::item(&format!(
                    "{} -> {}.{} as {}",
                    relation.fk, relation.table, relation.column, relation.property
                ));
            }
            return Ok(());
        }
        Commands::ParseSort { sort } => {
            let sorts = parse_sorts(sort)?;
            if json {
                return print_json(&sorts);
            }
            CliFormatter::header("Sorts");
            for sort in &sorts {
                CliFormatter::kv(&sort.column, sort.order.to_sql());
            }
            return Ok(());
        }
        _ => {}
    }

    let config_path = cli.config_path();
    let config = WeftConfig::from_path(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let registry = ConnectionRegistry::new();
    let factory = OperationFactory::from_config(&config, &registry)?;
    let parser = factory.relation_parser();

    let result = run_command(&cli.command, &factory, &parser, json).await;

    factory.weaver().drain_cache_writes().await;
    registry.shutdown();
    result
}

async fn run_command(
    command: &Commands,
    factory: &OperationFactory,
    parser: &RelationParser,
    json: bool,
) -> Result<()> {
    match command {
        Commands::Select { table, filter, sort, rels } => {
            let filter = parse_filter(filter.as_deref())?;
            let sorts = parse_sorts(sort.as_deref().unwrap_or_default())?;
            let relations = parser.parse_list(rels.as_deref().unwrap_or_default())?;
            let rows = factory.table(table).select(&filter, &sorts, &relations).await?;
            if json {
                return print_json(&rows);
            }
            CliFormatter::header(&format!("{} ({} rows)", table, rows.len()));
            CliFormatter::rows(&rows);
        }
        Commands::Count { table, filter } => {
            let filter = parse_filter(filter.as_deref())?;
            let count = factory.table(table).count(&filter).await?;
            if json {
                return print_json(&serde_json::json!({ "table": table, "count": count }));
            }
            CliFormatter::kv(table, &count.to_string());
        }
        Commands::Get { table, id, rels } => {
            let relations = parser.parse_list(rels.as_deref().unwrap_or_default())?;
            let row = factory.table(table).select_by_id(Scalar::parse(id), &relations).await?;
            if json {
                return print_json(&row);
            }
            match row {
                Some(row) => {
                    CliFormatter::header(&format!("{} {}", table, id));
                    CliFormatter::record(&row);
                }
                None => CliFormatter::warning(&format!("{} {} not found", table, id)),
            }
        }
        Commands::Insert { table, data } => {
            let rows = factory.table(table).insert_many(parse_rows(data)?).await?;
            if json {
                return print_json(&rows);
            }
            CliFormatter::success(&format!("Inserted {} row(s) into {}", rows.len(), table));
            CliFormatter::rows(&rows);
        }
        Commands::Delete { table, id } => {
            let deleted = factory.table(table).delete_by_id(Scalar::parse(id)).await?;
            if json {
                return print_json(&serde_json::json!({ "table": table, "deleted": deleted }));
            }
            if deleted == 0 {
                CliFormatter::warning(&format!("{} {} not found", table, id));
            } else {
                CliFormatter::success(&format!("Deleted {} {}", table, id));
            }
        }
        Commands::ParseRels { .. } | Commands::ParseSort { .. } => {}
    }
    Ok(())
}
