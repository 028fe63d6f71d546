use super::online_tracker;
use crate::cli::parser::Commands;
use crate::config::Config;
use crate::errors::AppResult;
use crate::ui::messages::{attendance, header, selected, warning};

pub async fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Status { verify } = cmd else {
        return Ok(());
    };

    let tracker = online_tracker(cfg)?;
    let mut status = tracker.restore().await?;

    if *verify {
        match tracker.verify_attendance_status().await {
            Ok(server) => status = server,
            Err(e) if e.is_transient() => {
                warning(format!("Backend unreachable, showing local state ({e})"));
            }
            Err(e) => return Err(e),
        }
    }

    header(format!("Attendance of {}", cfg.user_key));
    attendance(&status);
    selected(tracker.selected_geofence());
    Ok(())
}
