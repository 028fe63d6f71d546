use super::online_tracker;
use crate::cli::parser::Commands;
use crate::config::Config;
use crate::errors::AppResult;
use crate::ui::messages::{success, warning};

pub async fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Select { id, clear } = cmd else {
        return Ok(());
    };

    let tracker = online_tracker(cfg)?;
    tracker.restore().await?;

    if *clear || id.is_none() {
        tracker.select_geofence(None).await?;
        success("Geofence selection cleared");
        return Ok(());
    }

    // validate against a fresh list when the backend answers
    if let Err(e) = tracker.refresh_geofences().await {
        warning(format!("Could not refresh geofences ({e}), using cache"));
    }
    tracker.select_geofence(*id).await?;
    success(format!("Geofence {} selected", id.unwrap_or_default()));
    Ok(())
}
