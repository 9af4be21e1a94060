//! Interpreting auction records: city names, property types and fractional
//! ownership hidden in free-text descriptions.

use std::sync::LazyLock;

use regex::Regex;

/// City name as used to key market data, plus whether the auction record
/// marked the location as a village ("с. Кранево").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityName {
    pub name: String,
    pub rural: bool,
}

/// "гр. София" → София; "с. Кранево" → Кранево (rural).
pub fn normalize_city(raw: &str) -> CityName {
    let trimmed = raw.trim();
    for prefix in ["гр.", "град "] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return CityName { name: rest.trim().to_string(), rural: false };
        }
    }
    for prefix in ["с.", "село "] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return CityName { name: rest.trim().to_string(), rural: true };
        }
    }
    CityName { name: trimmed.to_string(), rural: false }
}

/// Only apartments are compared against the apartment-heavy market baseline.
pub fn is_apartment(property_type: Option<&str>) -> bool {
    property_type.is_some_and(|t| t.to_lowercase().contains("апартамент"))
}

/// A fraction explicitly tied to the dwelling, or an explicit "owns N/M".
static OWNED_FRACTION: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"притежава\s+\d+/\d+",
        r"\d+/\d+\s*(?:ид\.?\s*ч\.?|идеална\s+част)\s*(?:от|на)\s*(?:апартамент|имот|жилище)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// A bare trailing "N/M ид.ч.", which is only trusted when no common-area
/// share is mentioned.
static TRAILING_FRACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+/\d+\s*ид\.?\s*ч\.?\s*$").unwrap());

/// Shares of common parts or building rights. Every apartment deed has these.
static COMMON_AREA_SHARE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"идеални части от общите части",
        r"идеални части от правото на строеж",
        r"%\s*идеални части",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// True when the description says the auction sells only a fractional share.
pub fn is_partial_share(description: &str) -> bool {
    let text = description.trim().to_lowercase();
    if OWNED_FRACTION.iter().any(|re| re.is_match(&text)) {
        return true;
    }
    let common_area = COMMON_AREA_SHARE.iter().any(|re| re.is_match(&text));
    !common_area && TRAILING_FRACTION.is_match(&text)
}
