//! CLI command implementations
//!
//! Each command opens one cell of `serde_json::Value` over the native file
//! system, does its work and closes the cell before returning.

use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::codec::{decode_from_slice, CodecError, JsonCodec};
use crate::config::CellConfig;
use crate::engine::{CellBuilder, DurableCell, ReplaceOnCorruption};
use crate::fs::NativeFileSystem;
use crate::storage::AtomicFileStore;

use super::args::{CellArgs, Command};
use super::errors::{CliError, CliResult};
use super::io::write_json;

/// Main entry point for CLI
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::io_error(format!("Failed to start runtime: {}", e)))?;

    let output = runtime.block_on(async {
        match cmd {
            Command::Get { cell } => get(&cell).await,
            Command::Set { cell, value } => set(&cell, &value).await,
            Command::Reset { cell } => reset(&cell).await,
            Command::Check { cell } => check(&cell),
        }
    })?;

    write_json(&output)
}

/// Read the current value
pub async fn get(args: &CellArgs) -> CliResult<Value> {
    let cell = open(args, builder(args)?)?;
    let result = cell.current().await;
    cell.close().await?;
    Ok(result?)
}

/// Commit `value`, given as JSON text
pub async fn set(args: &CellArgs, value: &str) -> CliResult<Value> {
    let value: Value = serde_json::from_str(value)
        .map_err(|e| CliError::invalid_value(format!("--value is not valid JSON: {}", e)))?;

    let cell = open(args, builder(args)?)?;
    let result = cell.set(value).await;
    cell.close().await?;
    Ok(result?)
}

/// Commit the default value. A corrupt file is replaced rather than refused.
pub async fn reset(args: &CellArgs) -> CliResult<Value> {
    let builder =
        builder(args)?.corruption_handler(ReplaceOnCorruption::new(|_: &CodecError| Value::Null));
    let cell = open(args, builder)?;
    let result = cell
        .update(|_: &Value| Ok::<Value, Infallible>(Value::Null))
        .await;
    cell.close().await?;
    Ok(result?)
}

/// Classify the stored bytes without writing anything
pub fn check(args: &CellArgs) -> CliResult<Value> {
    let config = load_config(args.config.as_deref())?;
    let store = AtomicFileStore::new(
        Arc::new(NativeFileSystem::new()),
        args.path.clone(),
        &config.store_options(),
    )?;

    let status = match store.read()? {
        None => "missing",
        Some(bytes) => match decode_from_slice(&JsonCodec::new(Value::Null), &bytes) {
            Ok(_) => "ok",
            Err(e) if e.is_corruption() => "corrupt",
            Err(e) => return Err(CliError::io_error(e.to_string())),
        },
    };

    Ok(json!({
        "path": args.path.display().to_string(),
        "status": status,
    }))
}

fn builder(args: &CellArgs) -> CliResult<CellBuilder<Value>> {
    let config = load_config(args.config.as_deref())?;
    Ok(DurableCell::builder(JsonCodec::new(Value::Null).pretty())
        .path(args.path.clone())
        .config(config))
}

fn open(args: &CellArgs, builder: CellBuilder<Value>) -> CliResult<DurableCell<Value>> {
    builder.build().map_err(|e| {
        CliError::cell_failed(format!("Cannot open {}: {}", args.path.display(), e))
    })
}

fn load_config(path: Option<&Path>) -> CliResult<CellConfig> {
    match path {
        Some(path) => Ok(CellConfig::load(path)?),
        None => Ok(CellConfig::default()),
    }
}
