//! Per-site listing parsers.
//!
//! Every site implements [`SourceParser`]; the orchestrator looks parsers up in
//! a [`SourceRegistry`] by source tag and never branches on site names itself.
//! Parsers only turn page bodies into listings. Fetching, retries and
//! politeness belong to the fetcher.

pub mod alo;
pub mod imot;
pub mod olx;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use scraper::Html;
use tracing::debug;

use crate::config::listing_bounds::{
    MAX_PRICE_PER_SQM, MAX_SIZE_SQM, MIN_PRICE_PER_SQM, MIN_SIZE_SQM,
};
use crate::error::ParseError;
use crate::types::MarketListing;

pub use alo::AloParser;
pub use imot::ImotParser;
pub use olx::OlxParser;

/// How a unit's pages are walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crawl {
    /// Every page from [`SourceParser::page_urls`] carries listings directly.
    Pages,
    /// The first page is an index; listings live on the detail pages it links to.
    IndexThenDetails,
}

pub trait SourceParser: Send + Sync {
    /// Source tag stored on every listing, e.g. `"imot.bg"`.
    fn source(&self) -> &'static str;

    fn encoding(&self) -> &'static str {
        "utf-8"
    }

    fn crawl(&self) -> Crawl {
        Crawl::Pages
    }

    /// Pages to fetch for one unit, in order. The first one is mandatory.
    fn page_urls(&self, base: &str) -> Vec<String> {
        vec![base.to_string()]
    }

    /// Detail page links found on an index page. Only used with
    /// [`Crawl::IndexThenDetails`].
    fn detail_urls(&self, _index_body: &str) -> Vec<String> {
        Vec::new()
    }

    /// Extract validated listings from one page. Malformed or implausible
    /// listings are dropped; an `Err` means the page as a whole is unusable.
    fn parse(&self, body: &str, city: &str) -> Result<Vec<MarketListing>, ParseError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Default, Clone)]
pub struct SourceRegistry {
    parsers: HashMap<&'static str, Arc<dyn SourceParser>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in site parser.
    pub fn with_defaults(imot_max_listings: usize) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ImotParser::new(imot_max_listings)));
        registry.register(Arc::new(OlxParser));
        registry.register(Arc::new(AloParser));
        registry
    }

    pub fn register(&mut self, parser: Arc<dyn SourceParser>) {
        self.parsers.insert(parser.source(), parser);
    }

    pub fn get(&self, source: &str) -> Option<Arc<dyn SourceParser>> {
        self.parsers.get(source).cloned()
    }
}

// ---------------------------------------------------------------------------
// Shared validation
// ---------------------------------------------------------------------------

/// Fields a parser managed to read off a page. At least two of size, price and
/// price-per-m² are needed; the third is derived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawListing {
    pub size_sqm: Option<f64>,
    pub price_eur: Option<f64>,
    pub price_per_sqm: Option<f64>,
    pub rooms: Option<i64>,
    pub neighborhood: Option<String>,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Complete a raw listing and apply the plausibility bounds every source shares.
/// Returns `None` for anything incomplete or out of bounds.
pub fn validate(raw: RawListing, city: &str, source: &str) -> Option<MarketListing> {
    let (size, price, per_sqm) = match (raw.size_sqm, raw.price_eur, raw.price_per_sqm) {
        (Some(s), Some(p), Some(pp)) => (s, p, pp),
        (Some(s), Some(p), None) if s > 0.0 => (s, p, round2(p / s)),
        (Some(s), None, Some(pp)) => (s, round2(s * pp), pp),
        (None, Some(p), Some(pp)) if pp > 0.0 => (round2(p / pp), p, pp),
        _ => return None,
    };

    if !(size.is_finite() && price.is_finite() && per_sqm.is_finite()) || price <= 0.0 {
        return None;
    }
    if !(MIN_SIZE_SQM..=MAX_SIZE_SQM).contains(&size) {
        debug!(source, city, size, "dropped listing: size out of bounds");
        return None;
    }
    if !(MIN_PRICE_PER_SQM..=MAX_PRICE_PER_SQM).contains(&per_sqm) {
        debug!(source, city, per_sqm, "dropped listing: price per m² out of bounds");
        return None;
    }

    Some(MarketListing {
        city: city.to_string(),
        neighborhood: raw.neighborhood,
        size_sqm: size,
        price_eur: price,
        price_per_sqm: per_sqm,
        rooms: raw.rooms,
        source: source.to_string(),
        scraped_at: Utc::now(),
    })
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Trimmed, non-empty text nodes of an HTML document in document order.
pub(crate) fn text_nodes(body: &str) -> Vec<String> {
    Html::parse_document(body)
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whole-document text with nodes separated by newlines.
pub(crate) fn page_text(body: &str) -> String {
    text_nodes(body).join("\n")
}

/// Parse "148 000", "148 000" or "2982,61" into a number.
pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse::<f64>().ok()
}

static ROOM_WORDS: LazyLock<Vec<(Regex, i64)>> = LazyLock::new(|| {
    [
        (r"\bедностаен", 1),
        (r"\bдвустаен", 2),
        (r"\bтристаен", 3),
        (r"\bчетиристаен", 4),
        (r"\bпетстаен", 5),
        (r"\bшестстаен", 6),
        (r"\bмногостаен", 4),
        (r"\bгарсониера", 1),
        (r"\bмезонет", 3),
    ]
    .into_iter()
    .map(|(p, n)| (Regex::new(p).unwrap(), n))
    .collect()
});

static ROOM_DIGIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d)\s*-?\s*ст(?:аен|аи|\.)").unwrap());

/// Room count from Bulgarian listing text ("двустаен", "3-стаен", "гарсониера").
pub fn extract_rooms(text: &str) -> Option<i64> {
    let lower = text.to_lowercase();
    if let Some((_, n)) = ROOM_WORDS.iter().find(|(re, _)| re.is_match(&lower)) {
        return Some(*n);
    }
    ROOM_DIGIT
        .captures(&lower)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Room count from a transliterated URL slug such as `...-prodava-dvustaen-apartament-...`.
pub fn rooms_from_slug(url: &str) -> Option<i64> {
    let lower = url.to_lowercase();
    if lower.contains("ednostaen") {
        Some(1)
    } else if lower.contains("dvustaen") {
        Some(2)
    } else if lower.contains("tristaen") {
        Some(3)
    } else if lower.contains("chetiristaen") || lower.contains("mnogostaen") {
        Some(4)
    } else {
        None
    }
}
