//! rGeoAttend library root.
//! Exposes the tracking engine, the CLI parser and the high-level run() function.

pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod db;
pub mod errors;
pub mod models;
pub mod ui;
pub mod utils;

use clap::Parser;
use cli::parser::{Cli, Commands};
use config::Config;
use errors::AppResult;

/// Central command dispatcher
pub async fn dispatch(cli: &Cli, cfg: &Config) -> AppResult<()> {
    match &cli.command {
        Commands::Init => cli::commands::init::handle(cli, cfg),
        Commands::Config { .. } => cli::commands::config::handle(&cli.command, cfg),
        Commands::Geofences { .. } => cli::commands::geofences::handle(&cli.command, cfg).await,
        Commands::Status { .. } => cli::commands::status::handle(&cli.command, cfg).await,
        Commands::Select { .. } => cli::commands::select::handle(&cli.command, cfg).await,
        Commands::Checkout => cli::commands::checkout::handle(cfg).await,
        Commands::Replay { .. } => cli::commands::replay::handle(&cli.command, cfg).await,
        Commands::Log { .. } => cli::commands::log::handle(&cli.command, cfg),
    }
}

/// Entry point used by main.rs
pub fn run() -> AppResult<()> {
    // 1️⃣ parse CLI
    let cli = Cli::parse();

    // 2️⃣ load config once (defaults in test mode, the user file is not ours)
    let mut cfg = if cli.test {
        Config::default()
    } else {
        Config::load()?
    };

    // 3️⃣ command line overrides
    if let Some(custom_db) = &cli.db {
        cfg.database = custom_db.clone();
    }
    if let Some(user) = &cli.user {
        cfg.user_key = user.clone();
    }

    // 4️⃣ async runtime for backend calls and tracking
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(dispatch(&cli, &cfg))
}
