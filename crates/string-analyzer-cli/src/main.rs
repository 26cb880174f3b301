use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use string_analyzer_api::{CreateStringRequest, StringAnalyzerApi};
use string_analyzer_core::FilterSet;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "sa")]
#[command(about = "String Analyzer CLI")]
struct Cli {
    #[arg(long, default_value = "./string_analyzer.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    String {
        #[command(subcommand)]
        command: StringCommand,
    },
    Query {
        #[command(subcommand)]
        command: QueryCommand,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum StringCommand {
    Add(StringValueArgs),
    Show(StringValueArgs),
    List(StringListArgs),
    Delete(StringValueArgs),
}

#[derive(Debug, Args)]
struct StringValueArgs {
    #[arg(long)]
    value: String,
}

#[derive(Debug, Args)]
struct StringListArgs {
    #[arg(long)]
    is_palindrome: Option<bool>,
    #[arg(long)]
    min_length: Option<u64>,
    #[arg(long)]
    max_length: Option<u64>,
    #[arg(long)]
    word_count: Option<u64>,
    #[arg(long)]
    contains_character: Option<char>,
}

#[derive(Debug, Subcommand)]
enum QueryCommand {
    Nl(QueryNlArgs),
}

#[derive(Debug, Args)]
struct QueryNlArgs {
    #[arg(long)]
    text: String,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let api = StringAnalyzerApi::new(cli.db);
    match cli.command {
        Command::Db { command } => run_db(command, &api),
        Command::String { command } => run_string(command, &api),
        Command::Query { command } => run_query(command, &api),
    }
}

fn run_db(command: DbCommand, api: &StringAnalyzerApi) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            let status = api.schema_status()?;
            emit_json(serde_json::json!({
                "current_version": status.current_version,
                "target_version": status.target_version,
                "pending_versions": status.pending_versions,
                "up_to_date": status.pending_versions.is_empty()
            }))
        }
        DbCommand::Migrate(args) => {
            let result = api.migrate(args.dry_run)?;
            emit_json(serde_json::to_value(&result).context("failed to serialize migrate result")?)
        }
    }
}

fn run_string(command: StringCommand, api: &StringAnalyzerApi) -> Result<()> {
    match command {
        StringCommand::Add(args) => {
            let record = api.create_string(CreateStringRequest { value: args.value })?;
            emit_json(serde_json::to_value(&record).context("failed to serialize string record")?)
        }
        StringCommand::Show(args) => {
            let record = api.get_string(&args.value)?;
            emit_json(serde_json::to_value(&record).context("failed to serialize string record")?)
        }
        StringCommand::List(args) => {
            let filters = FilterSet {
                is_palindrome: args.is_palindrome,
                min_length: args.min_length,
                max_length: args.max_length,
                word_count: args.word_count,
                contains_character: args.contains_character,
            };
            let listed = api.list_strings(filters)?;
            emit_json(serde_json::to_value(&listed).context("failed to serialize listing")?)
        }
        StringCommand::Delete(args) => {
            api.delete_string(&args.value)?;
            emit_json(serde_json::json!({
                "value": args.value,
                "deleted": true
            }))
        }
    }
}

fn run_query(command: QueryCommand, api: &StringAnalyzerApi) -> Result<()> {
    match command {
        QueryCommand::Nl(args) => {
            let filtered = api.filter_by_natural_language(&args.text)?;
            emit_json(serde_json::to_value(&filtered).context("failed to serialize query result")?)
        }
    }
}
