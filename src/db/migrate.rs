use crate::errors::{AppError, AppResult};
use log::info;
use rusqlite::{Connection, OptionalExtension, Result};

/// Ensure that the `log` table exists. It also records applied migrations.
fn ensure_log_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS log (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            date      TEXT NOT NULL,
            operation TEXT NOT NULL,
            target    TEXT DEFAULT '',
            message   TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn is_applied(conn: &Connection, version: &str) -> Result<bool> {
    let mut chk = conn.prepare(
        "SELECT 1 FROM log
         WHERE operation = 'migration_applied' AND target = ?1
         LIMIT 1",
    )?;
    Ok(chk.query_row([version], |_| Ok(())).optional()?.is_some())
}

struct Migration {
    version: &'static str,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "20251001_0001_create_attendance_state",
        description: "Created attendance_state table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS attendance_state (
                user_key       TEXT PRIMARY KEY,
                state          TEXT NOT NULL CHECK(state IN
                                 ('not_checked_in','checked_in','checked_out_auto','checked_out_manual')),
                geofence_id    INTEGER,
                location_name  TEXT,
                check_in_time  TEXT,
                check_out_time TEXT,
                cooldown_until TEXT,
                pending_sync   INTEGER NOT NULL DEFAULT 0,
                updated_at     TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: "20251001_0002_create_selected_geofence",
        description: "Created selected_geofence table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS selected_geofence (
                user_key    TEXT PRIMARY KEY,
                geofence_id INTEGER NOT NULL,
                updated_at  TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: "20251001_0003_create_pending_intents",
        description: "Created pending_intents table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS pending_intents (
                user_key   TEXT NOT NULL,
                kind       TEXT NOT NULL CHECK(kind IN ('check_in','check_out')),
                payload    TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_key, kind)
            );
        "#,
    },
    Migration {
        version: "20251008_0004_create_geofence_cache",
        description: "Created geofence_cache table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS geofence_cache (
                user_key     TEXT PRIMARY KEY,
                payload      TEXT NOT NULL,
                refreshed_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: "20251012_0005_add_attempts_to_pending_intents",
        description: "Added attempts counter to pending_intents",
        sql: "ALTER TABLE pending_intents ADD COLUMN attempts INTEGER NOT NULL DEFAULT 0;",
    },
];

/// Public entry point: run all pending migrations.
///
/// Called by db::initialize::init_db().
pub fn run_pending_migrations(conn: &Connection) -> AppResult<()> {
    ensure_log_table(conn)?;

    for m in MIGRATIONS {
        if is_applied(conn, m.version)? {
            continue;
        }

        conn.execute_batch(m.sql)
            .map_err(|e| AppError::Migration(format!("{}: {}", m.version, e)))?;

        conn.execute(
            "INSERT INTO log (date, operation, target, message)
             VALUES (datetime('now'), 'migration_applied', ?1, ?2)",
            [m.version, m.description],
        )?;

        info!("migration applied: {}", m.version);
    }

    Ok(())
}
