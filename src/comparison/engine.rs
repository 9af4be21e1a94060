use crate::auction::{is_partial_share, normalize_city};
use crate::config::comparison::{
    MAX_APARTMENT_SQM, MIN_APARTMENT_SQM, MIN_SAMPLES, SIZE_TOLERANCE_SQM,
};
use crate::neighborhood::{extract_neighborhood, normalize};
use crate::realism::PriceTiers;
use crate::types::{AuctionListing, Comparison, MarketListing, MatchType, Rating};

/// Sorted middle element; no interpolation for even counts.
pub fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    Some(values[values.len() / 2])
}

/// Winning tier of the match hierarchy and its price-per-m² samples.
/// `market` must already be restricted to the auction's city, and
/// `neighborhood` must be a canonical key from [`normalize`].
pub fn select_comparables(
    neighborhood: Option<&str>,
    size_sqm: f64,
    market: &[MarketListing],
) -> (MatchType, Vec<f64>) {
    let within = |l: &MarketListing| (l.size_sqm - size_sqm).abs() <= SIZE_TOLERANCE_SQM;
    let priced: Vec<&MarketListing> = market.iter().filter(|l| l.price_per_sqm > 0.0).collect();

    if let Some(hood) = neighborhood {
        let rates: Vec<f64> = priced
            .iter()
            .copied()
            .filter(|l| within(*l) && l.neighborhood.as_deref() == Some(hood))
            .map(|l| l.price_per_sqm)
            .collect();
        if rates.len() >= MIN_SAMPLES {
            return (MatchType::Neighborhood, rates);
        }
    }

    let rates: Vec<f64> = priced
        .iter()
        .copied()
        .filter(|l| within(*l))
        .map(|l| l.price_per_sqm)
        .collect();
    if rates.len() >= MIN_SAMPLES {
        return (MatchType::City, rates);
    }

    let rates: Vec<f64> = priced.iter().map(|l| l.price_per_sqm).collect();
    if rates.len() >= MIN_SAMPLES {
        (MatchType::CityWide, rates)
    } else {
        (MatchType::None, rates)
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub struct ComparisonEngine {
    tiers: PriceTiers,
}

impl ComparisonEngine {
    pub fn new(tiers: PriceTiers) -> Self {
        Self { tiers }
    }

    /// Canonical neighborhood of an auction: the stored field, else whatever
    /// the address names.
    pub fn auction_neighborhood(auction: &AuctionListing) -> Option<String> {
        auction
            .neighborhood
            .as_deref()
            .and_then(normalize)
            .or_else(|| auction.address.as_deref().and_then(extract_neighborhood))
    }

    /// Score one auction against its city's market listings. `None` means the
    /// auction is outside the comparable apartment band or has no usable
    /// price or size.
    pub fn compare(&self, auction: &AuctionListing, market: &[MarketListing]) -> Option<Comparison> {
        let size = auction.size_sqm;
        let price = auction.price_eur;
        if !(size > 0.0 && price > 0.0) {
            return None;
        }
        if !(MIN_APARTMENT_SQM..=MAX_APARTMENT_SQM).contains(&size) {
            return None;
        }

        let city = normalize_city(&auction.city);
        let neighborhood = Self::auction_neighborhood(auction);
        let auction_rate = round2(price / size);
        let partial = auction.is_partial_ownership
            || auction.description.as_deref().is_some_and(is_partial_share);

        let (match_type, rates) = select_comparables(neighborhood.as_deref(), size, market);
        let sample_size = rates.len();

        let mut comparison = Comparison {
            auction_id: auction.id.clone(),
            city: city.name.clone(),
            neighborhood: neighborhood.clone(),
            auction_price_per_sqm: auction_rate,
            market_median_per_sqm: None,
            sample_size,
            match_type,
            deviation_pct: None,
            bargain_score: None,
            rating: Rating::NoData,
            price_capped: false,
        };

        if match_type != MatchType::None {
            if let Some(raw_median) = median(rates) {
                let tier = self.tiers.bounds_for(&city, neighborhood.as_deref());
                let (market_rate, capped) = tier.clamp(raw_median);
                let deviation = (auction_rate - market_rate) / market_rate * 100.0;
                let score = (-deviation).round() as i64;

                comparison.market_median_per_sqm = Some(market_rate);
                comparison.price_capped = capped;
                comparison.deviation_pct = Some(round2(deviation));
                comparison.bargain_score = Some(score.clamp(0, 100));
                comparison.rating = Rating::from_score(score);
            }
        }

        if partial {
            comparison.rating = Rating::PartialOwnership;
        }
        Some(comparison)
    }
}
