//! # Meal Prefetch
//!
//! Fills the store with meals for a window of days around today, so the first visitor of
//! each day does not wait on the upstream fan-out.
//!
//! ## Usage
//!
//! Three days back, four ahead.
//! ```sh
//! REDIS_URL=redis://127.0.0.1:6379 cargo run -p process -- 3 4
//! ```
//!
//! ## Notes
//! - Needs `REDIS_URL`; the in-memory store would be gone when the process exits
//! - Dates run one after another; schools within a date are still fetched all at once
//! - A date that fails is reported and skipped, the rest still run
use anyhow::{Context, bail};
use chrono::{Duration, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{EnvFilter, fmt};

use server::{
    config::Config,
    database::Store,
    meals::sync_meals_for_date,
    neis::{MealSource, NeisClient},
    state::open_store,
    utils::today,
};

pub fn date_range(today: NaiveDate, days_before: u32, days_after: u32) -> Vec<NaiveDate> {
    (-i64::from(days_before)..=i64::from(days_after))
        .map(|offset| today + Duration::days(offset))
        .collect()
}

pub async fn load_meals(days_before: u32, days_after: u32) -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::load().context("Config misconfigured")?;
    if config.redis_url.is_none() {
        bail!("REDIS_URL must be set to prefetch meals");
    }

    let store = open_store(&config).await.context("Failed to open store")?;
    let source = NeisClient::new(&config);

    let (synced, failed) =
        fetch_meals_range(&source, store.as_ref(), today(), days_before, days_after).await;

    println!("Dates Synced: {synced}");
    println!("Dates Failed: {failed}");

    Ok(())
}

async fn fetch_meals_range(
    source: &dyn MealSource,
    store: &dyn Store,
    today: NaiveDate,
    days_before: u32,
    days_after: u32,
) -> (usize, usize) {
    let dates = date_range(today, days_before, days_after);

    let pb = ProgressBar::new(dates.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> "),
    );

    let mut synced = 0;
    let mut failed = 0;

    for date in dates {
        pb.set_message(format!("Fetching {date}"));

        match sync_meals_for_date(source, store, date).await {
            Ok(meals) => {
                let with_menu = meals.iter().filter(|meal| meal.has_menu()).count();
                pb.println(format!("{date}: {with_menu}/{} schools with a menu", meals.len()));
                synced += 1;
            }
            Err(e) => {
                pb.println(format!("{date}: {e}"));
                failed += 1;
            }
        }

        pb.inc(1);
    }

    pb.finish_with_message("Done");
    (synced, failed)
}
