use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market listings
// ---------------------------------------------------------------------------

/// One observed market price point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketListing {
    pub city: String,
    /// Canonical neighborhood key, when the source exposes one.
    pub neighborhood: Option<String>,
    pub size_sqm: f64,
    pub price_eur: f64,
    pub price_per_sqm: f64,
    pub rooms: Option<i64>,
    pub source: String,
    pub scraped_at: DateTime<Utc>,
}

/// The smallest checkpointable piece of scrape work: one (city, source) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey {
    pub city: String,
    pub source: String,
}

impl UnitKey {
    pub fn new(city: impl Into<String>, source: impl Into<String>) -> Self {
        Self { city: city.into(), source: source.into() }
    }
}

impl std::fmt::Display for UnitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.city, self.source)
    }
}

// ---------------------------------------------------------------------------
// Auctions
// ---------------------------------------------------------------------------

/// A property under auction. Owned by the auction scraper; read-only here.
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionListing {
    pub id: String,
    pub city: String,
    pub neighborhood: Option<String>,
    pub address: Option<String>,
    pub size_sqm: f64,
    pub price_eur: f64,
    pub rooms: Option<i64>,
    pub property_type: Option<String>,
    pub description: Option<String>,
    /// Flag as stored by the auction scraper. Description text can still
    /// reveal a fractional share when this is false.
    pub is_partial_ownership: bool,
}

// ---------------------------------------------------------------------------
// Comparison classification
// ---------------------------------------------------------------------------

/// Which tier of the matching hierarchy produced the comparable set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    /// Same city, same neighborhood, similar size.
    Neighborhood,
    /// Same city, similar size.
    City,
    /// Same city, any size.
    CityWide,
    /// No tier had enough comparables.
    None,
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchType::Neighborhood => "NEIGHBORHOOD",
            MatchType::City => "CITY",
            MatchType::CityWide => "CITY_WIDE",
            MatchType::None => "NONE",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rating {
    /// 50%+ below market
    Excellent,
    /// 30–50% below market
    Good,
    /// 15–30% below market
    Fair,
    /// 0–15% below market
    BelowMarket,
    Overpriced,
    NoData,
    /// Fractional legal share; never scored against full-ownership prices.
    PartialOwnership,
}

impl Rating {
    /// Rating for a rounded, unclamped score (positive = cheaper than market).
    pub fn from_score(score: i64) -> Self {
        if score >= 50 {
            Rating::Excellent
        } else if score >= 30 {
            Rating::Good
        } else if score >= 15 {
            Rating::Fair
        } else if score >= 0 {
            Rating::BelowMarket
        } else {
            Rating::Overpriced
        }
    }

    pub fn is_bargain(self) -> bool {
        matches!(self, Rating::Excellent | Rating::Good | Rating::Fair)
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Rating::Excellent => "EXCELLENT",
            Rating::Good => "GOOD",
            Rating::Fair => "FAIR",
            Rating::BelowMarket => "BELOW_MARKET",
            Rating::Overpriced => "OVERPRICED",
            Rating::NoData => "NO_DATA",
            Rating::PartialOwnership => "PARTIAL_OWNERSHIP",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Scored link between one auction and the market baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub auction_id: String,
    pub city: String,
    pub neighborhood: Option<String>,
    pub auction_price_per_sqm: f64,
    pub market_median_per_sqm: Option<f64>,
    pub sample_size: usize,
    pub match_type: MatchType,
    pub deviation_pct: Option<f64>,
    pub bargain_score: Option<i64>,
    pub rating: Rating,
    /// The raw market median fell outside the realism tier and was replaced.
    pub price_capped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_thresholds() {
        assert_eq!(Rating::from_score(80), Rating::Excellent);
        assert_eq!(Rating::from_score(50), Rating::Excellent);
        assert_eq!(Rating::from_score(49), Rating::Good);
        assert_eq!(Rating::from_score(30), Rating::Good);
        assert_eq!(Rating::from_score(15), Rating::Fair);
        assert_eq!(Rating::from_score(14), Rating::BelowMarket);
        assert_eq!(Rating::from_score(0), Rating::BelowMarket);
        assert_eq!(Rating::from_score(-1), Rating::Overpriced);
    }

    #[test]
    fn enums_serialize_as_screaming_snake() {
        assert_eq!(serde_json::to_string(&MatchType::CityWide).unwrap(), "\"CITY_WIDE\"");
        assert_eq!(
            serde_json::to_string(&Rating::PartialOwnership).unwrap(),
            "\"PARTIAL_OWNERSHIP\""
        );
        assert_eq!(Rating::BelowMarket.to_string(), "BELOW_MARKET");
    }
}
