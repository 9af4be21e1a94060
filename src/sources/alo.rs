use std::sync::LazyLock;

use regex::Regex;

use super::{extract_rooms, page_text, parse_number, validate, RawListing, SourceParser};
use crate::error::ParseError;
use crate::types::MarketListing;

const SOURCE: &str = "alo.bg";

static BLOCK_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Цена:\s*\d[\d\s]*€").unwrap());
static PRICE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Цена:\s*(\d[\d\s]*?)\s*€").unwrap());
static RATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"за кв\.м:\s*(\d[\d\s.,]*?)\s*€").unwrap());
static SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Квадратура:\s*(\d[\d.,]*)\s*кв\.м").unwrap());
static KIND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Вид на имота:\s*(\p{L}+)\s+апартамент").unwrap());

/// alo.bg: result pages list labelled fields per listing
/// ("Цена:", "за кв.м:", "Квадратура:", "Вид на имота:").
pub struct AloParser;

fn parse_block(block: &str, city: &str) -> Option<MarketListing> {
    let raw = RawListing {
        price_eur: PRICE.captures(block).and_then(|c| parse_number(&c[1])),
        price_per_sqm: RATE.captures(block).and_then(|c| parse_number(&c[1])),
        size_sqm: SIZE.captures(block).and_then(|c| parse_number(&c[1])),
        rooms: KIND.captures(block).and_then(|c| extract_rooms(&c[1])),
        neighborhood: None,
    };
    raw.price_eur?;
    validate(raw, city, SOURCE)
}

impl SourceParser for AloParser {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn parse(&self, body: &str, city: &str) -> Result<Vec<MarketListing>, ParseError> {
        let text = page_text(body);
        let starts: Vec<usize> = BLOCK_START.find_iter(&text).map(|m| m.start()).collect();
        if starts.is_empty() {
            return Err(ParseError::UnrecognizedPage { source_tag: SOURCE });
        }

        let listings = starts
            .iter()
            .enumerate()
            .filter_map(|(i, &start)| {
                let end = starts.get(i + 1).copied().unwrap_or(text.len());
                parse_block(&text[start..end], city)
            })
            .collect();
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <div class="listing">
            <div>Цена: 120 000 €</div>
            <div>за кв.м: 1 500 €</div>
            <div>Квадратура: 80 кв.м</div>
            <div>Вид на имота: Двустаен апартамент в София</div>
        </div>
        <div class="listing">
            <div>Цена: 95 000 €</div>
            <div>Квадратура: 62,5 кв.м</div>
            <div>Вид на имота: Тристаен апартамент</div>
        </div>
        <div class="listing">
            <div>Цена: 210 000 €</div>
            <div>за кв.м: 1 750 €</div>
        </div>
        <div class="listing">
            <div>Цена: 9 000 €</div>
            <div>Квадратура: 300 кв.м</div>
        </div>
    </body></html>"#;

    #[test]
    fn labelled_blocks_become_listings() {
        let listings = AloParser.parse(PAGE, "София").unwrap();
        assert_eq!(listings.len(), 3, "the 30 €/m² block is dropped");

        assert_eq!(listings[0].price_eur, 120_000.0);
        assert_eq!(listings[0].price_per_sqm, 1500.0);
        assert_eq!(listings[0].size_sqm, 80.0);
        assert_eq!(listings[0].rooms, Some(2));

        assert_eq!(listings[1].size_sqm, 62.5);
        assert_eq!(listings[1].price_per_sqm, 1520.0);
        assert_eq!(listings[1].rooms, Some(3));

        assert_eq!(listings[2].size_sqm, 120.0);
        assert_eq!(listings[2].rooms, None);
    }

    #[test]
    fn page_without_price_labels_is_unrecognized() {
        assert!(AloParser.parse("<html><body>Няма резултати</body></html>", "София").is_err());
    }
}
