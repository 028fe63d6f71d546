use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

mod common;
use common::{fixture, rti, setup_test_db};

fn init(db_path: &str) {
    rti()
        .args(["--db", db_path, "--test", "init"])
        .assert()
        .success()
        .stdout(contains("Database initialized"));
}

#[test]
fn test_init_creates_database() {
    let db_path = setup_test_db("cli_init");
    init(&db_path);
    assert!(std::path::Path::new(&db_path).exists());
}

#[test]
fn test_config_print_shows_tracker_settings() {
    rti()
        .args(["--test", "config", "--print"])
        .assert()
        .success()
        .stdout(contains("hysteresis_samples: 3"))
        .stdout(contains("accuracy_ceiling_m: 100"))
        .stdout(contains("cooldown_hours: 6"));
}

#[test]
fn test_log_lists_applied_migrations() {
    let db_path = setup_test_db("cli_log");
    init(&db_path);

    rti()
        .args(["--db", &db_path, "--test", "log", "--print"])
        .assert()
        .success()
        .stdout(contains("migration_applied"))
        .stdout(contains("init"));
}

#[test]
fn test_status_of_a_fresh_user() {
    let db_path = setup_test_db("cli_status");
    init(&db_path);

    rti()
        .args(["--db", &db_path, "--user", "bob@hq", "--test", "status"])
        .assert()
        .success()
        .stdout(contains("Attendance of bob@hq"))
        .stdout(contains("not checked in"));
}

#[test]
fn test_select_clear_and_empty_cache() {
    let db_path = setup_test_db("cli_select");
    init(&db_path);

    rti()
        .args(["--db", &db_path, "--test", "select", "--clear"])
        .assert()
        .success()
        .stdout(contains("selection cleared"));

    rti()
        .args(["--db", &db_path, "--test", "geofences", "--cached"])
        .assert()
        .success()
        .stdout(contains("No cached geofences yet"));
}

#[test]
fn test_select_rejects_id_together_with_clear() {
    rti()
        .args(["--test", "select", "3", "--clear"])
        .assert()
        .failure();
}

#[test]
fn test_replay_office_day() {
    rti()
        .args([
            "--test",
            "replay",
            &fixture("office_day.json"),
            "--geofences",
            &fixture("office_geofences.json"),
        ])
        .assert()
        .success()
        .stdout(contains("Replaying 10 sample(s)"))
        .stdout(contains("enter #1").and(contains("exit #1")))
        .stdout(contains("@ Office HQ"))
        .stdout(contains("Backend requests: 1 check-in, 1 check-out"));
}

#[test]
fn test_replay_missing_track_fails() {
    rti()
        .args([
            "--test",
            "replay",
            "does-not-exist.json",
            "--geofences",
            &fixture("office_geofences.json"),
        ])
        .assert()
        .failure()
        .stderr(contains("Error:"));
}
