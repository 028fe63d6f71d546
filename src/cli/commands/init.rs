use crate::cli::parser::Cli;
use crate::config::Config;
use crate::db::StateStore;
use crate::errors::AppResult;
use crate::ui::messages::{success, warning};

/// Handle the `init` command
///
/// This initializes:
///  - the config directory (if missing)
///  - the configuration file (skipped in test mode)
///  - the SQLite database and all pending migrations
pub fn handle(cli: &Cli, cfg: &Config) -> AppResult<()> {
    //
    // 1️⃣ CONFIGURATION
    //
    let db_path = Config::init_all(cli.db.clone(), cli.test)?;
    let db_path = db_path.to_string_lossy().to_string();

    println!("⚙️  Initializing rGeoAttend…");
    if cli.test {
        warning("test mode: configuration file left untouched");
    } else {
        println!("📄 Config file : {}", Config::config_file().display());
    }
    println!("🗄️  Database   : {}", &db_path);

    //
    // 2️⃣ DATABASE (tables + migrations)
    //
    let store = StateStore::open(&db_path, &cfg.user_key)?;
    success(format!("Database initialized at {}", &db_path));

    //
    // 3️⃣ INTERNAL LOG (non blocking)
    //
    store.audit("init", &format!("Database initialized at {}", &db_path));

    println!("🎉 rGeoAttend initialization completed!");
    Ok(())
}
