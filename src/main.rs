// src/main.rs

//! The main entry point for the RDS control-plane process.

use anyhow::Result;
use rds::config::Config;
use rds::server;
use std::env;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("rds version {VERSION}");
        return Ok(());
    }

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    let config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(1);
        }
    };

    let initial_log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();
    let reload_handle = Arc::new(reload_handle);

    let result = match config.role {
        rds::config::NodeRole::Master => server::master::run(config, reload_handle).await,
        rds::config::NodeRole::Minion => server::minion::run(config, reload_handle).await,
        rds::config::NodeRole::Sentinel => server::sentinel_node::run(config, reload_handle).await,
    };

    if let Err(e) = result {
        error!("server runtime error: {e}");
        return Err(e);
    }

    Ok(())
}
