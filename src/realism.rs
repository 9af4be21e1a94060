//! Plausible EUR/m² ranges per location, used to reject market medians that
//! thin or noisy data pushed out of reality.
//!
//! The table is configuration data: `data/price_tiers.json` is compiled in and
//! can be replaced at runtime with `PRICE_TIERS_PATH`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auction::CityName;
use crate::error::{AppError, Result};
use crate::neighborhood::{extract_neighborhood, normalize};

const EMBEDDED: &str = include_str!("../data/price_tiers.json");

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

impl Tier {
    /// Returns `(value, capped)`. Values outside `[min, max]` are replaced by
    /// the tier median.
    pub fn clamp(&self, raw: f64) -> (f64, bool) {
        if raw < self.min || raw > self.max {
            (self.median, true)
        } else {
            (raw, false)
        }
    }

    fn is_ordered(&self) -> bool {
        self.min > 0.0 && self.min <= self.median && self.median <= self.max
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CityTiers {
    #[serde(default)]
    aliases: Vec<String>,
    default: Tier,
    #[serde(default)]
    neighborhoods: BTreeMap<String, Tier>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceTiers {
    unknown: Tier,
    village: Tier,
    /// Keyed by lowercase city name.
    cities: BTreeMap<String, CityTiers>,
}

impl PriceTiers {
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let tiers: Self = serde_json::from_str(raw)?;
        tiers.check()?;
        Ok(tiers)
    }

    /// Load from `path` when given, otherwise use the compiled-in table.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let raw = tokio::fs::read_to_string(p).await?;
                let tiers = Self::from_json(&raw)?;
                info!(path = %p.display(), cities = tiers.cities.len(), "Loaded price tiers");
                Ok(tiers)
            }
            None => Self::embedded(),
        }
    }

    fn check(&self) -> Result<()> {
        let named = [("unknown", &self.unknown), ("village", &self.village)];
        let cities = self.cities.iter().flat_map(|(city, c)| {
            std::iter::once((city.as_str(), &c.default))
                .chain(c.neighborhoods.iter().map(|(n, t)| (n.as_str(), t)))
        });
        for (name, tier) in named.into_iter().chain(cities) {
            if !tier.is_ordered() {
                return Err(AppError::Config(format!(
                    "price tier {name:?} must satisfy 0 < min <= median <= max, got {tier:?}"
                )));
            }
        }
        Ok(())
    }

    fn city(&self, name: &str) -> Option<&CityTiers> {
        let lower = name.trim().to_lowercase();
        if let Some(c) = self.cities.get(&lower) {
            return Some(c);
        }
        self.cities
            .iter()
            .find(|(key, c)| {
                c.aliases.iter().any(|a| *a == lower) || lower.contains(key.as_str())
            })
            .map(|(_, c)| c)
    }

    /// Tier for a city and an already-extracted neighborhood name.
    pub fn bounds_for(&self, city: &CityName, neighborhood: Option<&str>) -> Tier {
        let Some(c) = self.city(&city.name) else {
            return if city.rural { self.village } else { self.unknown };
        };
        if let Some(key) = neighborhood.and_then(normalize) {
            if let Some(t) = c.neighborhoods.get(&key) {
                return *t;
            }
            let longest = c
                .neighborhoods
                .iter()
                .filter(|(k, _)| key.contains(k.as_str()))
                .max_by_key(|(k, _)| k.chars().count());
            if let Some((_, t)) = longest {
                return *t;
            }
        }
        c.default
    }

    /// Tier for a city and a free-text address.
    pub fn bounds(&self, city: &CityName, address: Option<&str>) -> Tier {
        let hood = address.and_then(extract_neighborhood);
        self.bounds_for(city, hood.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::normalize_city;

    fn tiers() -> PriceTiers {
        PriceTiers::embedded().unwrap()
    }

    #[test]
    fn clamp_replaces_out_of_range_with_median() {
        let t = Tier { min: 600.0, max: 1200.0, median: 900.0 };
        assert_eq!(t.clamp(5000.0), (900.0, true));
        assert_eq!(t.clamp(100.0), (900.0, true));
        assert_eq!(t.clamp(1050.0), (1050.0, false));
        assert_eq!(t.clamp(1200.0), (1200.0, false));
    }

    #[test]
    fn neighborhood_tier_then_city_default() {
        let t = tiers();
        let sofia = normalize_city("гр. София");
        let lyulin = t.bounds(&sofia, Some("ж.к. Люлин, бл.883, вх.3, ет.9"));
        assert_eq!(lyulin, Tier { min: 600.0, max: 1200.0, median: 900.0 });

        let lozenets = t.bounds(&sofia, Some("кв. Лозенец, ул. Златен рог 15"));
        assert_eq!(lozenets.median, 2400.0);

        let mladost = t.bounds_for(&sofia, Some("Младост 1"));
        assert_eq!(mladost.median, 1100.0);

        let unknown_hood = t.bounds(&sofia, Some("ул. Неизвестна 3"));
        assert_eq!(unknown_hood, Tier { min: 800.0, max: 1500.0, median: 1100.0 });

        let latin = t.bounds(&normalize_city("Sofia"), None);
        assert_eq!(latin.median, 1100.0);
    }

    #[test]
    fn other_cities_villages_and_unknowns() {
        let t = tiers();
        assert_eq!(t.bounds(&normalize_city("гр. Бургас"), Some("ул. Александровска 25")).median, 900.0);
        assert_eq!(t.bounds(&normalize_city("Стара Загора"), None).max, 900.0);
        assert_eq!(t.bounds(&normalize_city("с. Кранево"), None).median, 400.0);
        assert_eq!(t.bounds(&normalize_city("гр. Габрово"), None).median, 700.0);
    }

    #[test]
    fn rejects_inverted_tiers() {
        let raw = r#"{
            "unknown": {"min": 400, "max": 1200, "median": 700},
            "village": {"min": 200, "max": 800, "median": 400},
            "cities": {"русе": {"default": {"min": 900, "max": 600, "median": 700}}}
        }"#;
        assert!(matches!(PriceTiers::from_json(raw), Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn loads_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiers.json");
        std::fs::write(
            &path,
            r#"{
                "unknown": {"min": 100, "max": 200, "median": 150},
                "village": {"min": 50, "max": 100, "median": 75},
                "cities": {}
            }"#,
        )
        .unwrap();
        let t = PriceTiers::load(Some(&path)).await.unwrap();
        assert_eq!(t.bounds(&normalize_city("гр. София"), None).median, 150.0);
    }
}
