//! Cache and index overview.
//!
//! Lists every cached place with its review count, how many pages were
//! fetched, and whether a vector index has been built. Used by `rh stats`.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::store::sqlite::SqliteStore;
use crate::store::{PlaceSummary, Store};

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let places = store.list_places().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Review Harness: Cache Stats");
    println!("===========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    print_totals(&places);

    if !places.is_empty() {
        println!();
        println!(
            "  {:<32} {:>8} {:>6} {:>8}   {}",
            "PLACE", "REVIEWS", "PAGES", "INDEXED", "FETCHED"
        );
        println!("  {}", "-".repeat(76));

        for p in &places {
            let indexed = match &p.index {
                Some((docs, _)) => docs.to_string(),
                None => "-".to_string(),
            };
            println!(
                "  {:<32} {:>8} {:>6} {:>8}   {}",
                p.place_id.as_str(),
                p.review_count,
                p.pages,
                indexed,
                format_ts_relative(p.fetched_at)
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

fn print_totals(places: &[PlaceSummary]) {
    let reviews: i64 = places.iter().map(|p| p.review_count).sum();
    let indexed = places.iter().filter(|p| p.index.is_some()).count();
    println!("  Places:      {}", places.len());
    println!("  Reviews:     {}", reviews);
    println!("  Indexed:     {} / {}", indexed, places.len());
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
pub(crate) fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    match delta {
        0..=59 => "just now".to_string(),
        60..=3599 => plural(delta / 60, "min"),
        3600..=86_399 => plural(delta / 3600, "hour"),
        _ if delta < 86_400 * 30 => plural(delta / 86_400, "day"),
        _ => format_ts_iso(ts),
    }
}

fn plural(n: i64, unit: &str) -> String {
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
