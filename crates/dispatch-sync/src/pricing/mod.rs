//! # Pricing
//!
//! Route distance plus table-driven tier fares.
//!
//! ```text
//! base      = d <= 2 ? B : B + (d - 2) * R
//! blocks    = d > 10 ? ceil((d - 10) / 10) : 0
//! price     = round(base + blocks * 100)
//! ```
//!
//! [`quote`] and [`quote_all`] are pure. [`PricingEngine`] adds the route lookup in front
//! of them.

pub mod polyline;
pub mod route;

pub use route::*;

use crate::model::{LatLng, Money};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

/// Kilometres covered by the base fare.
pub const INCLUDED_KM: f64 = 2.0;
/// Long-trip surcharge starts past this distance.
pub const SURCHARGE_FROM_KM: f64 = 10.0;
pub const SURCHARGE_BLOCK_KM: f64 = 10.0;
pub const SURCHARGE_PER_BLOCK: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tariff {
    pub id: &'static str,
    pub name: &'static str,
    pub base: f64,
    pub per_km: f64,
}

pub const TARIFFS: [Tariff; 3] = [
    Tariff {
        id: "eco",
        name: "Economy",
        base: 150.0,
        per_km: 20.0,
    },
    Tariff {
        id: "comfort",
        name: "Comfort",
        base: 170.0,
        per_km: 20.0,
    },
    Tariff {
        id: "kids",
        name: "Kids",
        base: 190.0,
        per_km: 20.0,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TariffQuote {
    pub tariff_id: String,
    pub price: Money,
}

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("distance must be a finite, non-negative number of km (got {0})")]
    InvalidDistance(f64),
    #[error("unknown tariff: {0}")]
    UnknownTariff(String),
    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Looks a tariff up by id or display name, ignoring case.
pub fn tariff(id: &str) -> Result<&'static Tariff, PricingError> {
    let wanted = id.trim();
    TARIFFS
        .iter()
        .find(|t| t.id.eq_ignore_ascii_case(wanted) || t.name.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| PricingError::UnknownTariff(id.to_string()))
}

impl Tariff {
    pub fn price(&self, distance_km: f64) -> Result<Money, PricingError> {
        if !distance_km.is_finite() || distance_km < 0.0 {
            return Err(PricingError::InvalidDistance(distance_km));
        }

        let base = if distance_km <= INCLUDED_KM {
            self.base
        } else {
            self.base + (distance_km - INCLUDED_KM) * self.per_km
        };
        let blocks = if distance_km > SURCHARGE_FROM_KM {
            ((distance_km - SURCHARGE_FROM_KM) / SURCHARGE_BLOCK_KM).ceil()
        } else {
            0.0
        };

        Ok(Money::from(base + blocks * SURCHARGE_PER_BLOCK))
    }
}

pub fn quote(tariff_id: &str, distance_km: f64) -> Result<Money, PricingError> {
    tariff(tariff_id)?.price(distance_km)
}

/// Quotes every tariff, in table order.
pub fn quote_all(distance_km: f64) -> Result<Vec<TariffQuote>, PricingError> {
    TARIFFS
        .iter()
        .map(|t| {
            Ok(TariffQuote {
                tariff_id: t.id.to_string(),
                price: t.price(distance_km)?,
            })
        })
        .collect()
}

/// A route and the fares for it.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TripQuote {
    pub route: RouteQuote,
    pub quotes: Vec<TariffQuote>,
}

/// Prices trips by asking a [`RoutePlanner`] for the driving distance first.
#[derive(Clone)]
pub struct PricingEngine {
    planner: Arc<dyn RoutePlanner>,
}

impl PricingEngine {
    pub fn new(planner: Arc<dyn RoutePlanner>) -> Self {
        Self { planner }
    }

    #[instrument(skip(self), fields(planner = self.planner.name()))]
    pub async fn quote_trip(&self, points: &[LatLng]) -> Result<TripQuote, PricingError> {
        let route = self.planner.plan(points).await?;
        let quotes = quote_all(route.distance_km)?;
        debug!(distance_km = route.distance_km, "Trip quoted");
        Ok(TripQuote { route, quotes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_fares() {
        assert_eq!(quote("eco", 2.0).unwrap(), Money(150));
        assert_eq!(quote("eco", 12.0).unwrap(), Money(450));
        assert_eq!(quote("comfort", 0.0).unwrap(), Money(170));
        assert_eq!(quote("kids", 5.0).unwrap(), Money(250));
    }

    #[test]
    fn test_surcharge_blocks() {
        // 10 km is still inside the surcharge-free range
        assert_eq!(quote("eco", 10.0).unwrap(), Money(310));
        assert_eq!(quote("eco", 20.0).unwrap(), Money(150 + 360 + 100));
        assert_eq!(quote("eco", 20.5).unwrap(), Money(150 + 370 + 200));
    }

    #[test]
    fn test_partial_block_past_ten_km_is_charged() {
        assert_eq!(quote("eco", 10.5).unwrap(), Money(420));
        assert_eq!(quote("eco", 10.01).unwrap(), Money(410));
    }

    #[test]
    fn test_quote_is_non_decreasing_in_distance() {
        for t in TARIFFS {
            let mut previous = Money(0);
            for step in 0..=600 {
                let d = step as f64 * 0.1;
                let price = t.price(d).unwrap();
                assert!(price >= previous, "{} dropped at {d} km", t.id);
                previous = price;
            }
        }
    }

    #[test]
    fn test_tariff_lookup_accepts_display_names() {
        assert_eq!(tariff("Economy").unwrap().id, "eco");
        assert_eq!(tariff("COMFORT").unwrap().id, "comfort");
        assert!(matches!(tariff("limo"), Err(PricingError::UnknownTariff(_))));
    }

    #[test]
    fn test_invalid_distances_are_rejected() {
        assert!(matches!(quote("eco", -0.5), Err(PricingError::InvalidDistance(_))));
        assert!(matches!(quote("eco", f64::NAN), Err(PricingError::InvalidDistance(_))));
        assert!(matches!(
            quote("eco", f64::INFINITY),
            Err(PricingError::InvalidDistance(_))
        ));
    }

    #[test]
    fn test_quote_all_keeps_table_order() {
        let quotes = quote_all(5.0).unwrap();
        let pairs: Vec<(&str, i64)> = quotes
            .iter()
            .map(|q| (q.tariff_id.as_str(), q.price.units()))
            .collect();
        assert_eq!(pairs, vec![("eco", 210), ("comfort", 230), ("kids", 250)]);
    }
}
