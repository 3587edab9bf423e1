//! Stowage administration tool
//!
//! Inspects and maintains a store outside the application that owns it.
//!
//! Usage:
//!   stowage --config app.json stats
//!   stowage --dir ./data --name app export --out backup.json
//!   stowage --dir ./data --name app import backup.json --overwrite
//!
//! Pass the application's config so the tool sees the same schemas and
//! version; opening with an older version than the store is refused.

use std::path::PathBuf;
use anyhow::Result;
use clap::Parser;
use stowage_cli::{resolve_config, run, Command};
use stowage_engine::Engine;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "stowage")]
#[command(about = "Inspect and maintain Stowage stores")]
struct Args {
    /// Engine config file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the store; overrides the config location
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Store name; overrides the config name
    #[arg(short, long)]
    name: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let config = resolve_config(
        args.config.as_deref(),
        args.dir.as_deref(),
        args.name.as_deref(),
    )?;
    info!("Opening store {} at {:?}", config.name, config.location);
    let engine = Engine::new(config)?;

    let result = run(&engine, args.command).await;
    engine.close().await;
    if let Some(output) = result? {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}
