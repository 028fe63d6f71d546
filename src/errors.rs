//! Unified application error type.
//! All modules (db, core, api, cli, utils) return AppError to keep the error
//! handling consistent and easy to manage.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // ---------------------------
    // IO
    // ---------------------------
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // ---------------------------
    // Database-related
    // ---------------------------
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Database migration error: {0}")]
    Migration(String),

    // ---------------------------
    // Parsing errors
    // ---------------------------
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    // ---------------------------
    // Location / geometry
    // ---------------------------
    #[error("Location permission denied: {0}")]
    PermissionDenied(String),

    #[error("No usable location fix: {0}")]
    SignalUnavailable(String),

    #[error("Invalid geofence {id}: {reason}")]
    GeometryInputInvalid { id: i64, reason: String },

    #[error("Unknown geofence: {0}")]
    UnknownGeofence(i64),

    // ---------------------------
    // Backend / sync
    // ---------------------------
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Server rejected the request: {0}")]
    ServerConflict(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Unexpected backend response: {0}")]
    Protocol(String),

    // ---------------------------
    // State machine
    // ---------------------------
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    // ---------------------------
    // Config errors
    // ---------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // ---------------------------
    // Generic fallback
    // ---------------------------
    #[error("Internal error: {0}")]
    Other(String),
}

impl AppError {
    /// Errors the sync layer retries with backoff instead of handing back.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::NetworkFailure(_))
    }

    /// Hard rejections that must be resolved by reloading server truth.
    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::ServerConflict(_))
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(e: serde_yaml::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AppError::Protocol(e.to_string())
        } else {
            // connect / timeout / body errors are all worth another attempt
            AppError::NetworkFailure(e.to_string())
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
