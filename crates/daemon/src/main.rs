// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ward Daemon (wardd)
//!
//! Foreground daemon that watches one directory tree and dispatches
//! configured operation pipelines against matching files.
//!
//! Architecture:
//! - Monitors: spawned watchers emitting change events into one channel
//! - Driver loop: main task processing events sequentially

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

use ward_config::{ConfigError, IgnoranceRegistry};
use ward_engine::{
    CodeRunner, Copier, EngineError, FsNotify, ModuleRegistry, Mover, PeriodicalRegistry,
    PeriodicalScan, ProcessDriver, WatcherEngine,
};
use ward_meta::{MetaError, MetaStore, SharedMeta};

#[derive(Debug, Error)]
enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("could not open metadata store: {0}")]
    Meta(#[from] MetaError),
}

/// What the command line asked for.
#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Run(PathBuf),
    Help,
    Version,
    Missing,
    Unexpected(String),
}

fn parse_args(args: &[String]) -> CliCommand {
    match args.first().map(String::as_str) {
        None => CliCommand::Missing,
        Some("--help" | "-h" | "help") => CliCommand::Help,
        Some("--version" | "-V" | "-v") => CliCommand::Version,
        Some(flag) if flag.starts_with('-') => CliCommand::Unexpected(flag.to_string()),
        Some(path) => CliCommand::Run(PathBuf::from(path)),
    }
}

fn print_help() {
    println!("wardd {}", env!("CARGO_PKG_VERSION"));
    println!("Ward Daemon - watches a directory tree and dispatches operation");
    println!("pipelines against files matching the configured watch entries.");
    println!();
    println!("USAGE:");
    println!("    wardd CONFIG_FILE");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = match parse_args(&args) {
        CliCommand::Run(path) => path,
        CliCommand::Help => {
            print_help();
            return Ok(());
        }
        CliCommand::Version => {
            println!("wardd {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        CliCommand::Missing => {
            eprintln!("error: missing config file argument");
            eprintln!("Usage: wardd CONFIG_FILE");
            std::process::exit(1);
        }
        CliCommand::Unexpected(flag) => {
            eprintln!("error: unexpected argument '{flag}'");
            eprintln!("Usage: wardd CONFIG_FILE");
            std::process::exit(1);
        }
    };

    setup_logging();

    if let Err(error) = run(&config_path).await {
        tracing::error!(%error, "daemon failed");
        return Err(error.into());
    }
    Ok(())
}

async fn run(config_path: &Path) -> Result<(), DaemonError> {
    let config = ward_config::load_config(config_path)?;
    info!(
        target = %config.global.target_directory.display(),
        recursive = config.global.recursive_watch,
        "loaded configuration"
    );

    let meta = open_meta(&config.global)?;
    let ignorance = IgnoranceRegistry::with_builtins();
    let mut engine = WatcherEngine::build(config, builtin_registry(), &ignorance, meta)?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let periodicals = PeriodicalRegistry::new();
    let driver = ProcessDriver::new(periodicals.clone());

    engine.activate(events_tx, periodicals).await?;
    info!("ward daemon ready");

    driver.run(&mut engine, events_rx).await?;

    engine.deactivate().await;
    info!("ward daemon stopped");
    Ok(())
}

/// The built-in module roster: both monitors and all three operators.
fn builtin_registry() -> ModuleRegistry {
    ModuleRegistry::new(
        vec![Arc::new(FsNotify::new()), Arc::new(PeriodicalScan::new())],
        vec![
            Arc::new(Copier::new()),
            Arc::new(Mover::new()),
            Arc::new(CodeRunner::new()),
        ],
    )
}

fn open_meta(global: &ward_config::GlobalConfig) -> Result<Option<SharedMeta>, MetaError> {
    let Some(db_path) = &global.meta_db_path else {
        return Ok(None);
    };
    let store = MetaStore::open(
        db_path,
        global.dupcheck_reserve_days,
        global.missing_reserve_days,
    )?;
    info!(db = %db_path.display(), "metadata store opened");
    Ok(Some(Arc::new(parking_lot::Mutex::new(store))))
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
