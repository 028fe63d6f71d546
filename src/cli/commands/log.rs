use crate::cli::parser::Commands;
use crate::config::Config;
use crate::db::StateStore;
use crate::errors::AppResult;

/// Width of the `operation (target)` column.
const OP_WIDTH: usize = 40;

fn color_for_operation(op: &str) -> &'static str {
    match op {
        "check_in" => "\x1b[32m",
        "check_out" | "manual_checkout" => "\x1b[34m",
        "sync_conflict" => "\x1b[31m",
        "reconcile" | "rollover" => "\x1b[33m",
        "migration_applied" => "\x1b[35m",
        _ => "\x1b[37m",
    }
}

pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Log { print, limit } = cmd else {
        return Ok(());
    };
    if !*print {
        return Ok(());
    }

    let store = StateStore::open(&cfg.database, &cfg.user_key)?;
    let entries = store.load_log(*limit)?;

    println!("📜 Internal log:\n");

    let id_w = entries
        .iter()
        .map(|e| e.id.to_string().len())
        .max()
        .unwrap_or(1);

    for e in entries {
        let date = chrono::DateTime::parse_from_rfc3339(&e.date)
            .map(|dt| dt.format("%FT%T%:z").to_string())
            .unwrap_or(e.date.clone());

        let op_target = if e.target.is_empty() {
            e.operation.clone()
        } else {
            format!("{} ({})", e.operation, e.target)
        };
        let op_target: String = if op_target.chars().count() > OP_WIDTH {
            let mut s: String = op_target.chars().take(OP_WIDTH - 3).collect();
            s.push_str("...");
            s
        } else {
            op_target
        };
        // padding computed on the visible text, the color wraps it afterwards
        let padding = " ".repeat(OP_WIDTH.saturating_sub(op_target.chars().count()));

        println!(
            "{:>id_w$}: {} | {}{}\x1b[0m{} => {}",
            e.id,
            date,
            color_for_operation(&e.operation),
            op_target,
            padding,
            e.message,
            id_w = id_w
        );
    }

    Ok(())
}
