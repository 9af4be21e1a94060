use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use sqlx::SqlitePool;
use tracing::{debug, error, info};

use crate::auction::{is_apartment, normalize_city};
use crate::comparison::engine::ComparisonEngine;
use crate::db::{auctions, comparisons, market};
use crate::error::Result;
use crate::types::MarketListing;

#[derive(Debug, Default)]
pub struct RunSummary {
    pub auctions: usize,
    pub not_apartment: usize,
    pub out_of_band: usize,
    pub saved: usize,
    pub write_errors: usize,
    /// Saved comparisons rated FAIR or better.
    pub bargains: usize,
    pub by_match: BTreeMap<String, usize>,
    pub by_rating: BTreeMap<String, usize>,
}

/// Compare every priced apartment auction against the stored market baseline
/// and replace the comparisons table with the results, one row per auction.
/// Auctions skipped this run keep no row. Market rows are loaded once per city.
pub async fn run(pool: &SqlitePool, engine: &ComparisonEngine) -> Result<RunSummary> {
    let auctions = auctions::load_priced(pool).await?;
    let mut summary = RunSummary {
        auctions: auctions.len(),
        ..Default::default()
    };
    let mut by_city: HashMap<String, Vec<MarketListing>> = HashMap::new();
    let mut scored = Vec::with_capacity(auctions.len());

    for auction in &auctions {
        if !is_apartment(auction.property_type.as_deref()) {
            summary.not_apartment += 1;
            continue;
        }

        let city = normalize_city(&auction.city).name;
        let listings = match by_city.entry(city) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let rows = market::listings_for_city(pool, e.key()).await?;
                debug!(city = %e.key(), listings = rows.len(), "Loaded market baseline");
                e.insert(rows)
            }
        };

        match engine.compare(auction, listings) {
            Some(comparison) => scored.push(comparison),
            None => {
                debug!(auction_id = %auction.id, size_sqm = auction.size_sqm, "Skipped: outside apartment band");
                summary.out_of_band += 1;
            }
        }
    }

    let mut tx = pool.begin().await?;
    let cleared = comparisons::clear(&mut *tx).await?;
    debug!(cleared, "Cleared previous comparisons");
    for comparison in &scored {
        if let Err(e) = comparisons::save(&mut *tx, comparison).await {
            error!(auction_id = %comparison.auction_id, "Comparison write failed, skipping: {e}");
            summary.write_errors += 1;
            continue;
        }
        summary.saved += 1;
        if comparison.rating.is_bargain() {
            summary.bargains += 1;
        }
        *summary.by_match.entry(comparison.match_type.to_string()).or_default() += 1;
        *summary.by_rating.entry(comparison.rating.to_string()).or_default() += 1;
    }
    tx.commit().await?;

    Ok(summary)
}

pub fn log_summary(s: &RunSummary) {
    info!(
        auctions = s.auctions,
        saved = s.saved,
        not_apartment = s.not_apartment,
        out_of_band = s.out_of_band,
        write_errors = s.write_errors,
        bargains = s.bargains,
        "Comparison run complete: {} saved, {} bargains",
        s.saved,
        s.bargains,
    );
    for (match_type, n) in &s.by_match {
        info!(match_type = %match_type, count = n, "  match {match_type}: {n}");
    }
    for (rating, n) in &s.by_rating {
        info!(rating = %rating, count = n, "  rating {rating}: {n}");
    }
}
