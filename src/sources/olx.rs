use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use super::{extract_rooms, parse_number, page_text, validate, RawListing, SourceParser};
use crate::error::ParseError;
use crate::neighborhood;
use crate::types::MarketListing;

const SOURCE: &str = "olx.bg";
const PAGES: usize = 3;
const CARD: &str = r#"[data-cy="l-card"]"#;

/// "115 кв.м - 2982.61": size, then price per m².
static SIZE_AND_RATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*кв\.м\s*-\s*(\d[\d.,]*)").unwrap());
/// "гр. София, Лозенец - Днес в 10:15": the part after the comma is the district.
static LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:гр\.\s*)?\p{Lu}[\p{L} ]*,\s*([\p{L}\d ]+?)\s*-\s").unwrap()
});

/// olx.bg: paginated search results; each card shows size and price per m².
pub struct OlxParser;

fn parse_block(text: &str, city: &str) -> Vec<MarketListing> {
    let neighborhood = LOCATION
        .captures(text)
        .and_then(|c| neighborhood::normalize(&c[1]));
    let rooms = extract_rooms(text);

    SIZE_AND_RATE
        .captures_iter(text)
        .filter_map(|c| {
            let raw = RawListing {
                size_sqm: parse_number(&c[1]),
                price_eur: None,
                price_per_sqm: Some(parse_number(&c[2])?),
                rooms,
                neighborhood: neighborhood.clone(),
            };
            validate(raw, city, SOURCE)
        })
        .collect()
}

impl SourceParser for OlxParser {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn page_urls(&self, base: &str) -> Vec<String> {
        let sep = if base.contains('?') { '&' } else { '?' };
        (1..=PAGES)
            .map(|page| {
                if page == 1 {
                    base.to_string()
                } else {
                    format!("{base}{sep}page={page}")
                }
            })
            .collect()
    }

    fn parse(&self, body: &str, city: &str) -> Result<Vec<MarketListing>, ParseError> {
        let card = Selector::parse(CARD).map_err(|_| ParseError::Selector {
            source_tag: SOURCE,
            selector: CARD.to_string(),
        })?;
        let doc = Html::parse_document(body);
        let cards: Vec<String> = doc
            .select(&card)
            .map(|c| c.text().map(str::trim).filter(|t| !t.is_empty()).collect::<Vec<_>>().join(" "))
            .collect();

        if !cards.is_empty() {
            return Ok(cards.iter().flat_map(|text| parse_block(text, city)).collect());
        }

        // Markup without cards: fall back to scanning the whole page text.
        let text = page_text(body);
        if !SIZE_AND_RATE.is_match(&text) {
            return Err(ParseError::UnrecognizedPage { source_tag: SOURCE });
        }
        let mut listings = parse_block(&text, city);
        for l in &mut listings {
            // One page-wide block cannot attribute a district to a single listing.
            l.neighborhood = None;
            l.rooms = None;
        }
        Ok(listings)
    }
}
