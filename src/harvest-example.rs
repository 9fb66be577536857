use anyhow::Context;
use chrono::Utc;
use dotenv::dotenv;
use noticeboard::events::feed::HarvestDocument;
use noticeboard::events::{by_month, by_query, normalize, upcoming};
use std::env;

/// Runs the full pipeline over a local harvest artifact and prints the
/// grouped listing. An optional second argument is used as the search
/// query.
fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv().ok();

    let path = env::args().nth(1).unwrap_or_else(|| "aom-events.json".into());
    let query = env::args().nth(2).unwrap_or_default();

    let document = HarvestDocument::from_path(&path)
        .with_context(|| format!("failed to load harvest artifact from {path}"))?;

    log::info!(
        "loaded {} raw records harvested at {}",
        document.events.len(),
        document.meta.ts_utc.as_deref().unwrap_or("an unknown time"),
    );

    let events = normalize(&document);
    let groups = by_month(by_query(upcoming(events, Utc::now()), &query));

    println!("{groups:#?}");

    Ok(())
}
