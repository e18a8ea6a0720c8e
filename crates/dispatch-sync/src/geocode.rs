//! Reverse geocoding of picked points into short, human-readable addresses.

use crate::api::ApiError;
use crate::model::LatLng;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Comma-separated tokens kept from a full display name.
pub const SHORT_ADDRESS_TOKENS: usize = 3;

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse(&self, point: LatLng) -> Result<String, ApiError>;
}

/// Keeps the first `tokens` non-empty comma-separated parts of `display_name`.
pub fn short_address(display_name: &str, tokens: usize) -> String {
    display_name
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .take(tokens)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fallback label when no address is known.
pub fn coords_label(point: LatLng) -> String {
    format!("{:.5}, {:.5}", point.lat, point.lon)
}

/// Nominatim `/reverse` lookups.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    display_name: Option<String>,
}

impl NominatimGeocoder {
    pub fn new() -> Self {
        Self::new_with_base_url("https://nominatim.openstreetmap.org".to_string())
    }

    pub fn new_with_base_url(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    #[instrument(skip(self))]
    async fn reverse(&self, point: LatLng) -> Result<String, ApiError> {
        let url = format!("{}/reverse", self.base_url.trim_end_matches('/'));
        let lat = point.lat.to_string();
        let lon = point.lon.to_string();
        let resp = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, concat!("dispatch-sync/", env!("CARGO_PKG_VERSION")))
            .query(&[("lat", lat.as_str()), ("lon", lon.as_str()), ("format", "json")])
            .send()
            .await?;

        let body: ReverseResponse = ApiError::check(resp)
            .await?
            .json()
            .await
            .map_err(ApiError::decode)?;
        let display_name = body
            .display_name
            .ok_or_else(|| ApiError::Decode("response has no display_name".into()))?;
        debug!(%display_name, "Reverse geocoded");

        Ok(short_address(&display_name, SHORT_ADDRESS_TOKENS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_address_keeps_leading_tokens() {
        let full = "12, Leningradskoye Shosse, Vyborg, Vyborgsky District, Leningrad Oblast, Russia";
        assert_eq!(
            short_address(full, SHORT_ADDRESS_TOKENS),
            "12, Leningradskoye Shosse, Vyborg"
        );
        assert_eq!(short_address("Vyborg", 3), "Vyborg");
        assert_eq!(short_address(" , A,,B ", 3), "A, B");
    }

    #[test]
    fn test_coords_label() {
        assert_eq!(coords_label(LatLng::new(60.7076, 28.7528)), "60.70760, 28.75280");
    }
}
