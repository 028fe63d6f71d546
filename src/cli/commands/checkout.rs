use super::online_tracker;
use crate::config::Config;
use crate::errors::AppResult;
use crate::ui::messages::{attendance, success, warning};

pub async fn handle(cfg: &Config) -> AppResult<()> {
    let tracker = online_tracker(cfg)?;
    tracker.restore().await?;

    // the check-in may have happened on another device
    match tracker.verify_attendance_status().await {
        Ok(_) => {}
        Err(e) if e.is_transient() => warning(format!("Backend unreachable ({e}), using local state")),
        Err(e) => return Err(e),
    }

    let status = match tracker.manual_check_out().await {
        Ok(status) => status,
        Err(e) if e.is_conflict() => {
            // the tracker already adopted the server state
            warning(format!("Backend refused the check-out: {e}"));
            attendance(&tracker.attendance_status());
            return Err(e);
        }
        Err(e) => return Err(e),
    };
    if status.pending_sync {
        warning("Checked out locally, the backend will be updated when reachable");
    } else {
        success("Checked out");
    }
    attendance(&status);
    Ok(())
}
