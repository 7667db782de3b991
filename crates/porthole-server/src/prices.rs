use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use porthole_engine::normalize_model_id;
use porthole_index::{queries, Database, ModelPriceRecord};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Only models of this vendor are priced; everything else in the catalog is
/// ignored.
const VENDOR_PREFIX: &str = "claude-";

const SYNC_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Fetch the price catalog now and then once a day. Failures log and retry
/// on the next cycle.
pub fn spawn_price_sync(
    db: Arc<Mutex<Database>>,
    url: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let mut interval = tokio::time::interval(SYNC_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match sync_once(&db, &client, &url).await {
                Ok(inserted) if inserted > 0 => {
                    info!(inserted, "model prices updated");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "price sync failed; will retry next cycle"),
            }
        }
    })
}

async fn sync_once(
    db: &Arc<Mutex<Database>>,
    client: &reqwest::Client,
    url: &str,
) -> Result<usize> {
    let catalog: serde_json::Value = client
        .get(url)
        .send()
        .await
        .context("fetch price catalog")?
        .error_for_status()
        .context("price catalog status")?
        .json()
        .await
        .context("decode price catalog")?;

    let db = db.clone();
    let inserted =
        tokio::task::spawn_blocking(move || apply_catalog(&db.lock().unwrap(), &catalog))
            .await??;

    Ok(inserted)
}

/// Upsert vendor prices from a LiteLLM-shaped catalog: an object keyed by
/// model name, values carrying per-token costs. A new (model, today) row is
/// inserted only when the price tuple differs from the latest stored one.
pub fn apply_catalog(db: &Database, catalog: &serde_json::Value) -> Result<usize> {
    let Some(entries) = catalog.as_object() else {
        anyhow::bail!("price catalog is not a JSON object");
    };

    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let mut inserted = 0;

    let mut keys: Vec<&String> = entries
        .keys()
        .filter(|key| key.starts_with(VENDOR_PREFIX))
        .collect();
    keys.sort();

    for key in keys {
        let entry = &entries[key];
        let Some(input) = per_million(entry, "input_cost_per_token") else {
            continue;
        };
        let Some(output) = per_million(entry, "output_cost_per_token") else {
            continue;
        };
        let cache_read = per_million(entry, "cache_read_input_token_cost").unwrap_or_default();
        let cache_write_5m =
            per_million(entry, "cache_creation_input_token_cost").unwrap_or_default();
        let cache_write_1h = per_million(entry, "cache_creation_input_token_cost_above_1hr")
            .unwrap_or(cache_write_5m);

        let record = ModelPriceRecord {
            model_id: normalize_model_id(key),
            effective_date: today.clone(),
            input,
            output,
            cache_read,
            cache_write_5m,
            cache_write_1h,
        };

        let latest = queries::price::latest(db.conn(), &record.model_id)?;
        if latest.as_ref().map(|l| l.tuple()) == Some(record.tuple()) {
            continue;
        }

        queries::price::insert(db.conn(), &record)?;
        inserted += 1;
    }

    Ok(inserted)
}

fn per_million(entry: &serde_json::Value, field: &str) -> Option<Decimal> {
    let per_token = entry.get(field)?.as_f64()?;
    let decimal = Decimal::from_f64(per_token)?;
    Some((decimal * Decimal::from(1_000_000u64)).round_dp(6))
}
