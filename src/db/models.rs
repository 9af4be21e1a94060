//! Row types for the SQLite schema in `migrations/`. Used with
//! `sqlx::query_as` and converted into domain types at the repository edge.

use chrono::{DateTime, Utc};

use crate::types::{AuctionListing, MarketListing};

#[derive(Debug, sqlx::FromRow)]
pub struct MarketListingRow {
    pub city: String,
    pub neighborhood: Option<String>,
    pub size_sqm: f64,
    pub price_eur: f64,
    pub price_per_sqm: f64,
    pub rooms: Option<i64>,
    pub source: String,
    pub scraped_at: DateTime<Utc>,
}

impl From<MarketListingRow> for MarketListing {
    fn from(r: MarketListingRow) -> Self {
        Self {
            city: r.city,
            neighborhood: r.neighborhood,
            size_sqm: r.size_sqm,
            price_eur: r.price_eur,
            price_per_sqm: r.price_per_sqm,
            rooms: r.rooms,
            source: r.source,
            scraped_at: r.scraped_at,
        }
    }
}

/// Auction rows are written by another tool, so most columns are nullable.
#[derive(Debug, sqlx::FromRow)]
pub struct AuctionRow {
    pub id: String,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub address: Option<String>,
    pub size_sqm: Option<f64>,
    pub price_eur: Option<f64>,
    pub rooms: Option<i64>,
    pub property_type: Option<String>,
    pub description: Option<String>,
    pub is_partial_ownership: bool,
}

impl From<AuctionRow> for AuctionListing {
    fn from(r: AuctionRow) -> Self {
        Self {
            id: r.id,
            city: r.city.unwrap_or_default(),
            neighborhood: r.neighborhood,
            address: r.address,
            size_sqm: r.size_sqm.unwrap_or(0.0),
            price_eur: r.price_eur.unwrap_or(0.0),
            rooms: r.rooms,
            property_type: r.property_type,
            description: r.description,
            is_partial_ownership: r.is_partial_ownership,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ComparisonRow {
    pub auction_id: String,
    pub city: String,
    pub neighborhood: Option<String>,
    pub auction_price_per_sqm: f64,
    pub market_median_per_sqm: Option<f64>,
    pub sample_size: i64,
    pub match_type: String,
    pub deviation_pct: Option<f64>,
    pub bargain_score: Option<i64>,
    pub rating: String,
    pub price_capped: bool,
}
