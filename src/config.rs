use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Channel capacity for the listing writer.
pub const CHANNEL_CAPACITY: usize = 64;

/// Market listings older than this are purged at the start of every scrape.
pub const DATA_RETENTION_DAYS: i64 = 7;

/// Plausibility bounds applied to every scraped listing, regardless of source.
pub mod listing_bounds {
    pub const MIN_SIZE_SQM: f64 = 15.0;
    pub const MAX_SIZE_SQM: f64 = 500.0;
    pub const MIN_PRICE_PER_SQM: f64 = 200.0;
    pub const MAX_PRICE_PER_SQM: f64 = 15_000.0;
}

/// Comparison engine tuning.
pub mod comparison {
    /// Fewest comparables a match tier needs before it wins.
    pub const MIN_SAMPLES: usize = 3;
    /// Size window (± m²) for NEIGHBORHOOD and CITY matches.
    pub const SIZE_TOLERANCE_SQM: f64 = 15.0;
    /// Auctions outside this apartment size band are not compared at all.
    pub const MIN_APARTMENT_SQM: f64 = 35.0;
    pub const MAX_APARTMENT_SQM: f64 = 150.0;
}

/// Backoff base for transient network errors (doubles per attempt).
pub const FETCH_BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Cooldown base after a 429/403 response (doubles per attempt).
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(15);

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// One scrape unit definition: which listing index to crawl for a (city, source) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitTarget {
    pub city: &'static str,
    pub source: &'static str,
    pub url: &'static str,
}

/// Cities and the index URL each source uses for them.
pub const UNIT_TARGETS: &[UnitTarget] = &[
    UnitTarget { city: "София", source: "imot.bg", url: "https://www.imot.bg/obiavi/prodazhbi/grad-sofiya/" },
    UnitTarget { city: "София", source: "olx.bg", url: "https://www.olx.bg/nedvizhimi-imoti/prodazhbi/apartamenti/sofiya/" },
    UnitTarget { city: "София", source: "alo.bg", url: "https://www.alo.bg/obiavi/imoti-prodajbi/apartamenti-stai/?region_id=22" },
    UnitTarget { city: "Пловдив", source: "imot.bg", url: "https://www.imot.bg/obiavi/prodazhbi/grad-plovdiv/" },
    UnitTarget { city: "Пловдив", source: "olx.bg", url: "https://www.olx.bg/nedvizhimi-imoti/prodazhbi/apartamenti/plovdiv/" },
    UnitTarget { city: "Варна", source: "imot.bg", url: "https://www.imot.bg/obiavi/prodazhbi/grad-varna/" },
    UnitTarget { city: "Варна", source: "olx.bg", url: "https://www.olx.bg/nedvizhimi-imoti/prodazhbi/apartamenti/varna/" },
    UnitTarget { city: "Бургас", source: "imot.bg", url: "https://www.imot.bg/obiavi/prodazhbi/grad-burgas/" },
    UnitTarget { city: "Бургас", source: "olx.bg", url: "https://www.olx.bg/nedvizhimi-imoti/prodazhbi/apartamenti/burgas/" },
    UnitTarget { city: "Русе", source: "imot.bg", url: "https://www.imot.bg/obiavi/prodazhbi/grad-ruse/" },
    UnitTarget { city: "Русе", source: "olx.bg", url: "https://www.olx.bg/nedvizhimi-imoti/prodazhbi/apartamenti/ruse/" },
    UnitTarget { city: "Стара Загора", source: "imot.bg", url: "https://www.imot.bg/obiavi/prodazhbi/grad-stara-zagora/" },
    UnitTarget { city: "Стара Загора", source: "olx.bg", url: "https://www.olx.bg/nedvizhimi-imoti/prodazhbi/apartamenti/stara-zagora/" },
];

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    /// Directory holding the per-date checkpoint file (CHECKPOINT_DIR)
    pub checkpoint_dir: PathBuf,
    /// Market snapshot written after a fully successful scrape (EXPORT_PATH)
    pub export_path: PathBuf,
    /// Units scraped in parallel (SCRAPE_CONCURRENCY)
    pub concurrency: usize,
    /// A unit with fewer valid listings than this is failed (MIN_LISTINGS_PER_UNIT)
    pub min_listings_per_unit: usize,
    /// Attempts per URL before the fetch gives up (FETCH_MAX_RETRIES)
    pub fetch_max_retries: u32,
    /// Per-request timeout (FETCH_TIMEOUT_SECS)
    pub fetch_timeout: Duration,
    /// Minimum spacing between two requests to the same host (MIN_REQUEST_INTERVAL_MS)
    pub min_request_interval: Duration,
    /// Cap on detail pages fetched per imot.bg unit (IMOT_MAX_LISTINGS)
    pub imot_max_listings: usize,
    /// Optional JSON file overriding the embedded price tiers (PRICE_TIERS_PATH)
    pub price_tiers_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "market.db".to_string()),
            checkpoint_dir: std::env::var("CHECKPOINT_DIR")
                .unwrap_or_else(|_| "data".to_string())
                .into(),
            export_path: std::env::var("EXPORT_PATH")
                .unwrap_or_else(|_| "data/market_listings.json".to_string())
                .into(),
            concurrency: std::env::var("SCRAPE_CONCURRENCY")
                .unwrap_or_else(|_| "2".to_string())
                .parse::<usize>()
                .map_err(|_| AppError::Config("SCRAPE_CONCURRENCY must be a positive integer".to_string()))?
                .max(1),
            min_listings_per_unit: std::env::var("MIN_LISTINGS_PER_UNIT")
                .unwrap_or_else(|_| "5".to_string())
                .parse::<usize>()
                .unwrap_or(5),
            fetch_max_retries: std::env::var("FETCH_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse::<u32>()
                .unwrap_or(3)
                .max(1),
            fetch_timeout: Duration::from_secs(
                std::env::var("FETCH_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse::<u64>()
                    .unwrap_or(30),
            ),
            min_request_interval: Duration::from_millis(
                std::env::var("MIN_REQUEST_INTERVAL_MS")
                    .unwrap_or_else(|_| "1500".to_string())
                    .parse::<u64>()
                    .unwrap_or(1500),
            ),
            imot_max_listings: std::env::var("IMOT_MAX_LISTINGS")
                .unwrap_or_else(|_| "30".to_string())
                .parse::<usize>()
                .unwrap_or(30),
            price_tiers_path: std::env::var("PRICE_TIERS_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}
