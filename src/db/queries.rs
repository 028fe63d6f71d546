use crate::core::machine::{AttendanceState, MachineSnapshot};
use crate::errors::{AppError, AppResult};
use crate::models::{GeofenceId, GeofenceRecord, IntentKind, TransitionIntent};
use crate::utils::time::{parse_optional_rfc3339, parse_rfc3339};
use chrono::{DateTime, Local};
use rusqlite::{Connection, OptionalExtension, Row, params};

fn ts(t: Option<DateTime<Local>>) -> Option<String> {
    t.map(|v| v.to_rfc3339())
}

fn required(value: Option<DateTime<Local>>, column: &str, state: &str) -> AppResult<DateTime<Local>> {
    value.ok_or_else(|| {
        AppError::InvalidTimestamp(format!("{column} missing for state '{state}'"))
    })
}

struct StateRow {
    state: String,
    geofence_id: Option<GeofenceId>,
    location_name: Option<String>,
    check_in_time: Option<String>,
    check_out_time: Option<String>,
    cooldown_until: Option<String>,
    pending_sync: bool,
}

fn map_state_row(row: &Row) -> rusqlite::Result<StateRow> {
    Ok(StateRow {
        state: row.get("state")?,
        geofence_id: row.get("geofence_id")?,
        location_name: row.get("location_name")?,
        check_in_time: row.get("check_in_time")?,
        check_out_time: row.get("check_out_time")?,
        cooldown_until: row.get("cooldown_until")?,
        pending_sync: row.get::<_, i32>("pending_sync")? == 1,
    })
}

impl StateRow {
    fn into_snapshot(self) -> AppResult<MachineSnapshot> {
        let check_in_time = parse_optional_rfc3339(self.check_in_time)?;
        let check_out_time = parse_optional_rfc3339(self.check_out_time)?;
        let cooldown_until = parse_optional_rfc3339(self.cooldown_until)?;

        let state = match self.state.as_str() {
            "not_checked_in" => AttendanceState::NotCheckedIn,
            "checked_in" => AttendanceState::CheckedIn {
                geofence_id: self.geofence_id,
                since: required(check_in_time, "check_in_time", &self.state)?,
            },
            "checked_out_auto" => AttendanceState::CheckedOutAutomatic {
                at: required(check_out_time, "check_out_time", &self.state)?,
            },
            "checked_out_manual" => AttendanceState::CheckedOutManual {
                at: required(check_out_time, "check_out_time", &self.state)?,
                cooldown_until: required(cooldown_until, "cooldown_until", &self.state)?,
            },
            other => {
                return Err(AppError::Other(format!("unknown attendance state '{other}'")));
            }
        };

        Ok(MachineSnapshot {
            state,
            location_name: self.location_name,
            check_in_time,
            pending_sync: self.pending_sync,
        })
    }
}

pub fn load_attendance(conn: &Connection, user_key: &str) -> AppResult<Option<MachineSnapshot>> {
    let row = conn
        .query_row(
            "SELECT * FROM attendance_state WHERE user_key = ?1",
            [user_key],
            map_state_row,
        )
        .optional()?;

    row.map(StateRow::into_snapshot).transpose()
}

pub fn save_attendance(conn: &Connection, user_key: &str, snap: &MachineSnapshot) -> AppResult<()> {
    let (geofence_id, check_out_time, cooldown_until) = match &snap.state {
        AttendanceState::NotCheckedIn => (None, None, None),
        AttendanceState::CheckedIn { geofence_id, .. } => (*geofence_id, None, None),
        AttendanceState::CheckedOutAutomatic { at } => (None, Some(*at), None),
        AttendanceState::CheckedOutManual { at, cooldown_until } => {
            (None, Some(*at), Some(*cooldown_until))
        }
    };
    let check_in_time = match &snap.state {
        AttendanceState::CheckedIn { since, .. } => Some(*since),
        _ => snap.check_in_time,
    };

    conn.execute(
        "INSERT INTO attendance_state
            (user_key, state, geofence_id, location_name, check_in_time,
             check_out_time, cooldown_until, pending_sync, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(user_key) DO UPDATE SET
            state = excluded.state,
            geofence_id = excluded.geofence_id,
            location_name = excluded.location_name,
            check_in_time = excluded.check_in_time,
            check_out_time = excluded.check_out_time,
            cooldown_until = excluded.cooldown_until,
            pending_sync = excluded.pending_sync,
            updated_at = excluded.updated_at",
        params![
            user_key,
            snap.state.to_db_str(),
            geofence_id,
            snap.location_name,
            ts(check_in_time),
            ts(check_out_time),
            ts(cooldown_until),
            if snap.pending_sync { 1 } else { 0 },
            Local::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn load_selected_geofence(conn: &Connection, user_key: &str) -> AppResult<Option<GeofenceId>> {
    Ok(conn
        .query_row(
            "SELECT geofence_id FROM selected_geofence WHERE user_key = ?1",
            [user_key],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn save_selected_geofence(
    conn: &Connection,
    user_key: &str,
    geofence_id: Option<GeofenceId>,
) -> AppResult<()> {
    match geofence_id {
        Some(id) => {
            conn.execute(
                "INSERT INTO selected_geofence (user_key, geofence_id, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_key) DO UPDATE SET
                    geofence_id = excluded.geofence_id,
                    updated_at = excluded.updated_at",
                params![user_key, id, Local::now().to_rfc3339()],
            )?;
        }
        None => {
            conn.execute(
                "DELETE FROM selected_geofence WHERE user_key = ?1",
                [user_key],
            )?;
        }
    }
    Ok(())
}

/// Pending intents in the order they were produced.
pub fn load_pending_intents(conn: &Connection, user_key: &str) -> AppResult<Vec<TransitionIntent>> {
    let mut stmt = conn.prepare(
        "SELECT kind, payload FROM pending_intents
         WHERE user_key = ?1
         ORDER BY created_at ASC",
    )?;

    let rows = stmt.query_map([user_key], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut out = Vec::new();
    for r in rows {
        let (kind, payload) = r?;
        if IntentKind::from_db_str(&kind).is_none() {
            return Err(AppError::Other(format!("unknown intent kind '{kind}'")));
        }
        out.push(serde_json::from_str(&payload)?);
    }
    Ok(out)
}

/// Insert or supersede the pending intent of the same kind.
pub fn upsert_pending_intent(conn: &Connection, user_key: &str, intent: &TransitionIntent) -> AppResult<()> {
    conn.execute(
        "INSERT INTO pending_intents (user_key, kind, payload, created_at, attempts)
         VALUES (?1, ?2, ?3, ?4, 0)
         ON CONFLICT(user_key, kind) DO UPDATE SET
            payload = excluded.payload,
            created_at = excluded.created_at,
            attempts = 0",
        params![
            user_key,
            intent.kind.to_db_str(),
            serde_json::to_string(intent)?,
            intent.timestamp.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn record_pending_attempts(
    conn: &Connection,
    user_key: &str,
    kind: IntentKind,
    attempts: usize,
) -> AppResult<()> {
    conn.execute(
        "UPDATE pending_intents SET attempts = attempts + ?3
         WHERE user_key = ?1 AND kind = ?2",
        params![user_key, kind.to_db_str(), attempts as i64],
    )?;
    Ok(())
}

pub fn delete_pending_intent(conn: &Connection, user_key: &str, kind: IntentKind) -> AppResult<()> {
    conn.execute(
        "DELETE FROM pending_intents WHERE user_key = ?1 AND kind = ?2",
        params![user_key, kind.to_db_str()],
    )?;
    Ok(())
}

pub fn clear_pending_intents(conn: &Connection, user_key: &str) -> AppResult<()> {
    conn.execute("DELETE FROM pending_intents WHERE user_key = ?1", [user_key])?;
    Ok(())
}

pub fn load_geofence_cache(
    conn: &Connection,
    user_key: &str,
) -> AppResult<Option<(Vec<GeofenceRecord>, DateTime<Local>)>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT payload, refreshed_at FROM geofence_cache WHERE user_key = ?1",
            [user_key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((payload, refreshed_at)) => Ok(Some((
            serde_json::from_str(&payload)?,
            parse_rfc3339(&refreshed_at)?,
        ))),
    }
}

pub fn save_geofence_cache(
    conn: &Connection,
    user_key: &str,
    records: &[GeofenceRecord],
    refreshed_at: DateTime<Local>,
) -> AppResult<()> {
    conn.execute(
        "INSERT INTO geofence_cache (user_key, payload, refreshed_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(user_key) DO UPDATE SET
            payload = excluded.payload,
            refreshed_at = excluded.refreshed_at",
        params![user_key, serde_json::to_string(records)?, refreshed_at.to_rfc3339()],
    )?;
    Ok(())
}
