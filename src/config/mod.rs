use crate::errors::{AppError, AppResult};
use crate::utils::path::expand_tilde;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

pub mod migrate; // use submodule at src/config/migrate.rs

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_user_key")]
    pub user_key: String,
    #[serde(default)]
    pub tracker: TrackerSettings,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Tunables of the containment tracker, state machine and scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Consecutive usable samples a new containment state must hold.
    pub hysteresis_samples: u32,
    pub accuracy_ceiling_m: f64,
    pub cooldown_hours: i64,
    pub tick_interval_secs: u64,
    pub sample_timeout_secs: u64,
    pub geofence_max_age_secs: u64,
    /// Allow a new check-in on the same day after an automatic checkout.
    pub reentry_after_exit: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            hysteresis_samples: 3,
            accuracy_ceiling_m: 100.0,
            cooldown_hours: 6,
            tick_interval_secs: 30,
            sample_timeout_secs: 20,
            geofence_max_age_secs: 900,
            reentry_after_exit: false,
        }
    }
}

impl TrackerSettings {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cooldown_hours)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn sample_timeout(&self) -> Duration {
        Duration::from_secs(self.sample_timeout_secs.max(1))
    }

    pub fn geofence_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.geofence_max_age_secs as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 500,
            request_timeout_secs: 15,
        }
    }
}

fn default_database() -> String {
    Config::database_file().to_string_lossy().to_string()
}
fn default_api_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_user_key() -> String {
    "default".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            api_base_url: default_api_base_url(),
            api_token: None,
            user_key: default_user_key(),
            tracker: TrackerSettings::default(),
            sync: SyncSettings::default(),
        }
    }
}

impl Config {
    /// Return the standard configuration directory depending on the platform
    pub fn config_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(appdata).join("rgeoattend")
        } else {
            let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".rgeoattend")
        }
    }

    /// Return the full path of the config file
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("rgeoattend.conf")
    }

    /// Return the full path of the SQLite database
    pub fn database_file() -> PathBuf {
        Self::config_dir().join("rgeoattend.sqlite")
    }

    /// Load configuration from file, or return defaults if not found
    pub fn load() -> AppResult<Self> {
        let path = Self::config_file();

        if path.exists() {
            let content = fs::read_to_string(&path)?;
            Self::from_yaml(&content)
        } else {
            Ok(Config::default())
        }
    }

    pub fn from_yaml(content: &str) -> AppResult<Self> {
        let mut cfg: Config = serde_yaml::from_str(content)?;
        cfg.database = expand_tilde(&cfg.database).to_string_lossy().to_string();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.tracker.hysteresis_samples == 0 {
            return Err(AppError::Config(
                "tracker.hysteresis_samples must be at least 1".into(),
            ));
        }
        if !(self.tracker.accuracy_ceiling_m > 0.0) {
            return Err(AppError::Config(
                "tracker.accuracy_ceiling_m must be positive".into(),
            ));
        }
        if self.tracker.cooldown_hours < 0 {
            return Err(AppError::Config(
                "tracker.cooldown_hours cannot be negative".into(),
            ));
        }
        if self.sync.max_attempts == 0 {
            return Err(AppError::Config("sync.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Initialize configuration and database files
    pub fn init_all(custom_db: Option<String>, is_test: bool) -> io::Result<PathBuf> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir)?;

        // DB name: user provided or default
        let db_path = if let Some(name) = custom_db {
            let p = std::path::Path::new(&name);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                dir.join(p)
            }
        } else {
            Self::database_file()
        };

        let config = Config {
            database: db_path.to_string_lossy().to_string(),
            ..Config::default()
        };

        // Write config file
        if !is_test {
            let yaml = serde_yaml::to_string(&config).map_err(io::Error::other)?;
            let mut file = fs::File::create(Self::config_file())?;
            file.write_all(yaml.as_bytes())?;
        }

        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let cfg = Config::from_yaml(
            "database: /tmp/x.sqlite\napi_base_url: https://hr.example.com\ntracker:\n  hysteresis_samples: 2\n",
        )
        .unwrap();

        assert_eq!(cfg.database, "/tmp/x.sqlite");
        assert_eq!(cfg.tracker.hysteresis_samples, 2);
        assert_eq!(cfg.tracker.cooldown_hours, 6);
        assert_eq!(cfg.sync.max_attempts, 4);
        assert_eq!(cfg.user_key, "default");
    }

    #[test]
    fn zero_hysteresis_is_rejected() {
        let err = Config::from_yaml("tracker:\n  hysteresis_samples: 0\n").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
