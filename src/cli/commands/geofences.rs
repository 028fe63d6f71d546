use super::{online_tracker, open_store};
use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::store::GeofenceStore;
use crate::errors::AppResult;
use crate::models::{Geofence, GeofenceShape};
use crate::ui::messages::{info, warning};
use crate::utils::table::{Column, Table};
use crate::utils::time::format_timestamp;
use chrono::Local;

fn shape_details(g: &Geofence) -> String {
    match &g.shape {
        GeofenceShape::Polygon { vertices } => format!("{} vertices", vertices.len()),
        GeofenceShape::Circle { radius_meters, .. } => format!("r = {radius_meters:.0} m"),
    }
}

fn render(geofences: &[Geofence], selected: Option<i64>) -> String {
    let mut table = Table::new(vec![
        Column::new("", 1),
        Column::new("ID", 6),
        Column::new("NAME", 28),
        Column::new("TYPE", 8),
        Column::new("SHAPE", 14),
        Column::new("CENTER", 22),
    ]);

    for g in geofences {
        let c = g.center();
        table.add_row(vec![
            if selected == Some(g.id) { "*" } else { "" }.to_string(),
            g.id.to_string(),
            g.name.clone(),
            g.kind_str().to_string(),
            shape_details(g),
            format!("{:.5}, {:.5}", c.latitude, c.longitude),
        ]);
    }
    table.render()
}

pub async fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Geofences { cached } = cmd else {
        return Ok(());
    };

    if *cached {
        let store = open_store(cfg)?;
        let selected = store.load_selected_geofence()?;
        let Some((records, refreshed_at)) = store.load_geofence_cache()? else {
            warning("No cached geofences yet");
            return Ok(());
        };
        let mut geofences = GeofenceStore::new();
        geofences.replace_records(records, refreshed_at);
        println!("🗺️  Cached geofences ({}):\n", format_timestamp(Some(refreshed_at)));
        print!("{}", render(&geofences.snapshot(), selected));
        return Ok(());
    }

    let tracker = online_tracker(cfg)?;
    tracker.restore().await?;
    if let Err(e) = tracker.refresh_geofences().await {
        warning(format!("Backend unavailable ({e}), showing cached geofences"));
    }

    let geofences = tracker.geofences().await;
    if geofences.is_empty() {
        info("No active geofences");
        return Ok(());
    }

    println!("🗺️  Active geofences ({}):\n", format_timestamp(Some(Local::now())));
    print!("{}", render(&geofences, tracker.selected_geofence()));

    if let Some(selected) = tracker.selected_geofence()
        && !geofences.iter().any(|g| g.id == selected)
    {
        warning(format!("Selected geofence {selected} is no longer active"));
    }
    Ok(())
}
