use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use super::{extract_rooms, parse_number, rooms_from_slug, text_nodes, validate, Crawl, RawListing, SourceParser};
use crate::error::ParseError;
use crate::types::MarketListing;

const SOURCE: &str = "imot.bg";
const SITE_ROOT: &str = "https://www.imot.bg/";

/// A detail-page number below this is a fee or a per-m² figure, not the asking price.
const MIN_ASKING_PRICE_EUR: f64 = 5000.0;

static PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d[\d\s]*\d)\s*(?:€|EUR)").unwrap());
static SIZE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*кв\.?\s*м").unwrap());

/// imot.bg: the city index only links to listings; price and size are read
/// from each detail page. Pages are served as windows-1251.
pub struct ImotParser {
    max_listings: usize,
}

impl ImotParser {
    pub fn new(max_listings: usize) -> Self {
        Self { max_listings }
    }
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|_| ParseError::Selector {
        source_tag: SOURCE,
        selector: css.to_string(),
    })
}

fn is_apartment_sale(href: &str) -> bool {
    href.contains("obiava") && href.contains("prodava") && href.contains("apartament")
}

impl SourceParser for ImotParser {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn encoding(&self) -> &'static str {
        "windows-1251"
    }

    fn crawl(&self) -> Crawl {
        Crawl::IndexThenDetails
    }

    fn detail_urls(&self, index_body: &str) -> Vec<String> {
        let Ok(links) = selector("a[href]") else {
            return Vec::new();
        };
        let Ok(root) = Url::parse(SITE_ROOT) else {
            return Vec::new();
        };

        let doc = Html::parse_document(index_body);
        let mut urls: Vec<String> = Vec::new();
        for href in doc.select(&links).filter_map(|a| a.value().attr("href")) {
            if !is_apartment_sale(href) {
                continue;
            }
            let Ok(mut url) = root.join(href) else {
                continue;
            };
            url.set_fragment(None);
            let url = url.to_string();
            if !urls.contains(&url) {
                urls.push(url);
            }
            if urls.len() >= self.max_listings {
                break;
            }
        }
        urls
    }

    /// One detail page yields at most one listing.
    fn parse(&self, body: &str, city: &str) -> Result<Vec<MarketListing>, ParseError> {
        let nodes = text_nodes(body);

        let price = nodes
            .iter()
            .filter_map(|t| PRICE.captures(t))
            .filter_map(|c| parse_number(&c[1]))
            .find(|p| *p > MIN_ASKING_PRICE_EUR);
        let size = nodes
            .iter()
            .filter_map(|t| SIZE.captures(t))
            .filter_map(|c| parse_number(&c[1]))
            .find(|s| *s > 0.0);

        let (Some(price), Some(size)) = (price, size) else {
            return Ok(Vec::new());
        };

        let doc = Html::parse_document(body);
        let canonical = selector(r#"link[rel="canonical"]"#)?;
        let title = selector("title, h1")?;
        let rooms = doc
            .select(&canonical)
            .filter_map(|l| l.value().attr("href"))
            .find_map(rooms_from_slug)
            .or_else(|| {
                let heading: String = doc.select(&title).flat_map(|e| e.text()).collect();
                extract_rooms(&heading)
            });

        let raw = RawListing {
            size_sqm: Some(size),
            price_eur: Some(price),
            price_per_sqm: None,
            rooms,
            neighborhood: None,
        };
        Ok(validate(raw, city, SOURCE).into_iter().collect())
    }
}
