use crate::cli::parser::Commands;
use crate::config::Config;
use crate::config::migrate::{migrate_file, missing_keys};
use crate::errors::AppResult;
use crate::ui::messages::{info, success, warning};

/// Handle the `config` subcommand
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Config {
        print_config,
        check,
        migrate,
    } = cmd
    {
        let path = Config::config_file();

        // ---- PRINT CONFIG ----
        if *print_config {
            println!("📄 Current configuration:\n");
            let mut shown = cfg.clone();
            if shown.api_token.is_some() {
                shown.api_token = Some("********".into());
            }
            println!("{}", serde_yaml::to_string(&shown)?);
        }

        // ---- CHECK ----
        if *check {
            if !path.exists() {
                warning(format!("No configuration file at {}", path.display()));
            } else {
                let missing = missing_keys(&path)?;
                if missing.is_empty() {
                    success("Configuration file is complete");
                } else {
                    warning(format!("Missing fields: {}", missing.join(", ")));
                    info("Run `rgeoattend config --migrate` to add them");
                }
            }
        }

        // ---- MIGRATE ----
        if *migrate {
            if !path.exists() {
                warning(format!("No configuration file at {}", path.display()));
            } else {
                let added = migrate_file(&path)?;
                if added == 0 {
                    info("Configuration already up to date");
                } else {
                    success(format!("Added {added} missing field(s) to {}", path.display()));
                }
            }
        }
    }

    Ok(())
}
