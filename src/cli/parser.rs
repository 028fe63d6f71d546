use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line interface definition for rGeoAttend
/// Geofence-driven attendance tracking backed by SQLite
#[derive(Parser)]
#[command(
    name = "rgeoattend",
    version = env!("CARGO_PKG_VERSION"),
    about = "Geofence attendance tracker: automatic check-in/check-out synced with the HR backend",
    long_about = None
)]
pub struct Cli {
    /// Override database path (useful for tests or custom DB)
    #[arg(global = true, long = "db")]
    pub db: Option<String>,

    /// Override the user/site key the local state is stored under
    #[arg(global = true, long = "user")]
    pub user: Option<String>,

    /// Run in test mode (no config file update)
    #[arg(global = true, long = "test", hide = true)]
    pub test: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and configuration
    Init,

    /// Inspect or upgrade the configuration file
    Config {
        #[arg(long = "print", help = "Print the current configuration")]
        print_config: bool,

        #[arg(long = "check", help = "Check configuration file for missing fields")]
        check: bool,

        #[arg(long = "migrate", help = "Add missing fields with their default values")]
        migrate: bool,
    },

    /// List the active geofences (fetched from the backend, cache as fallback)
    Geofences {
        #[arg(long = "cached", help = "Only show the local cache, no network")]
        cached: bool,
    },

    /// Show the attendance status
    Status {
        #[arg(long = "verify", help = "Reconcile with the backend before printing")]
        verify: bool,
    },

    /// Pin a geofence as the one shown by default
    Select {
        /// Geofence id
        id: Option<i64>,

        #[arg(long = "clear", help = "Clear the current selection", conflicts_with = "id")]
        clear: bool,
    },

    /// Check out manually (starts the re-check-in cooldown)
    Checkout,

    /// Replay a recorded track against a geofence file, fully offline
    Replay {
        /// JSON array of samples: {latitude, longitude, accuracyMeters, capturedAt}
        track: PathBuf,

        /// JSON array of geofence records, as served by the backend
        #[arg(long = "geofences")]
        geofences: PathBuf,
    },

    /// Print the internal log table
    Log {
        #[arg(long = "print", help = "Print rows from the internal log table")]
        print: bool,

        #[arg(long = "limit", help = "Only the last N rows")]
        limit: Option<usize>,
    },
}
