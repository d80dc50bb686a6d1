//! Transactor - command-line access to a Git-backed store
//!
//! Every write goes through the transaction manager, so a multi-row import
//! is applied atomically even though each row is saved by a helper that asks
//! for its own transaction.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use transactor::context::Context;
use transactor::storage::{GitStore, Row, RowKey, StoreConfig, StoreError, StoreResult, TableName};
use transactor::transaction::TxManager;

#[derive(Debug, Parser)]
#[command(name = "transactor", version, about = "A Git-backed document store")]
struct Cli {
    /// Path to the store directory.
    #[arg(short = 'd', long = "dir", global = true)]
    dir: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log transaction lifecycle events.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Insert or replace a row.
    Put { table: String, key: String, json: String },
    /// Print a committed row.
    Get { table: String, key: String },
    /// Delete a row.
    Delete { table: String, key: String },
    /// List the row keys of a table.
    List { table: String },
    /// Load a JSON-lines file into a table as one transaction.
    ///
    /// A line's `_pk` field is used as its key; lines without one get a
    /// generated key.
    Import { table: String, file: PathBuf },
    /// Delete branches left behind by transactions that never finished.
    Cleanup,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let store = match GitStore::open_with_config(config) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error opening store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(TxManager::new(store), cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> StoreResult<StoreConfig> {
    let mut config = match &cli.config {
        Some(file) => StoreConfig::from_json_file(file)?,
        None => StoreConfig::default(),
    };
    if let Some(dir) = &cli.dir {
        config.path = dir.clone();
    }
    Ok(config)
}

fn run(manager: TxManager<GitStore>, command: Command) -> StoreResult<()> {
    let ctx = Context::background();

    match command {
        Command::Put { table, key, json } => {
            let table = TableName::new(table)?;
            let data: Value = serde_json::from_str(&json)?;
            let row = save_row(&manager, &ctx, &table, RowKey::new(key)?, data)?;
            println!("{} v{}", row.key, row.version);
        }
        Command::Get { table, key } => {
            let table = TableName::new(table)?;
            let key = RowKey::new(key)?;
            match manager.resource().get(&table, &key)? {
                Some(row) => println!("{}", serde_json::to_string_pretty(&row.to_value()?)?),
                None => {
                    return Err(StoreError::RowNotFound { table, key });
                }
            }
        }
        Command::Delete { table, key } => {
            let table = TableName::new(table)?;
            let key = RowKey::new(key)?;
            manager.within_tx(&ctx, |_, tx| tx.delete(&table, &key))?;
            println!("deleted {}", key);
        }
        Command::List { table } => {
            let table = TableName::new(table)?;
            for key in manager.resource().list_keys(&table)? {
                println!("{}", key);
            }
        }
        Command::Import { table, file } => {
            let table = TableName::new(table)?;
            let content = fs::read_to_string(&file)?;
            let count = manager.within_tx(&ctx, |ctx, _| {
                let mut count = 0;
                for line in content.lines().filter(|l| !l.trim().is_empty()) {
                    let data: Value = serde_json::from_str(line)?;
                    let key = match data.get("_pk").and_then(Value::as_str) {
                        Some(pk) => RowKey::new(pk)?,
                        None => RowKey::generate(),
                    };
                    save_row(&manager, ctx, &table, key, data)?;
                    count += 1;
                }
                Ok::<_, StoreError>(count)
            })?;
            println!("imported {} row(s) into {}", count, table);
        }
        Command::Cleanup => {
            let removed = manager.resource().cleanup_abandoned()?;
            println!("removed {} abandoned branch(es)", removed);
        }
    }

    Ok(())
}

/// Save one row, in the caller's transaction if `ctx` carries one.
fn save_row(
    manager: &TxManager<GitStore>,
    ctx: &Context,
    table: &TableName,
    key: RowKey,
    data: Value,
) -> StoreResult<Row> {
    manager.within_tx(ctx, |_, tx| tx.upsert(table, key, data))
}
