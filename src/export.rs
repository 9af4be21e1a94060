//! Market snapshot written after a fully successful scrape.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::db::market;
use crate::error::Result;
use crate::types::MarketListing;

#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    generated_at: DateTime<Utc>,
    count: usize,
    listings: &'a [MarketListing],
}

/// Dump every stored market listing to `path` (temp file + rename).
/// Returns the number of listings written.
pub async fn write_snapshot(pool: &SqlitePool, path: &Path) -> Result<usize> {
    let listings = market::all_listings(pool).await?;
    let body = serde_json::to_vec_pretty(&Snapshot {
        generated_at: Utc::now(),
        count: listings.len(),
        listings: &listings,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;

    info!(path = %path.display(), listings = listings.len(), "Market snapshot exported");
    Ok(listings.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{market::upsert_listing, test_pool};

    #[tokio::test]
    async fn snapshot_contains_every_listing() {
        let pool = test_pool().await;
        for (size, price) in [(60.0, 60_000.0), (80.0, 96_000.0)] {
            let l = MarketListing {
                city: "Бургас".to_string(),
                neighborhood: None,
                size_sqm: size,
                price_eur: price,
                price_per_sqm: price / size,
                rooms: Some(2),
                source: "alo.bg".to_string(),
                scraped_at: Utc::now(),
            };
            upsert_listing(&pool, &l).await.unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("market_listings.json");
        assert_eq!(write_snapshot(&pool, &path).await.unwrap(), 2);

        let raw = std::fs::read_to_string(&path).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["count"], 2);
        assert_eq!(v["listings"].as_array().unwrap().len(), 2);
        assert_eq!(v["listings"][0]["city"], "Бургас");
        assert!(!path.with_extension("json.tmp").exists());
    }
}
