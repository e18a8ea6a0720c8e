use crate::api::ApiError;
use crate::model::LatLng;
use crate::pricing::polyline::{self, PolylineError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// A planned route. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteQuote {
    pub points: Vec<LatLng>,
    /// Rounded to two decimals.
    pub distance_km: f64,
}

impl RouteQuote {
    pub fn new(points: Vec<LatLng>, distance_m: f64) -> Self {
        Self {
            points,
            distance_km: (distance_m / 10.0).round() / 100.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("a route needs at least 2 points, got {0}")]
    TooFewPoints(usize),
    #[error("routing provider returned no route")]
    NoRoute,
    #[error("bad route geometry: {0}")]
    Geometry(#[from] PolylineError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[async_trait]
pub trait RoutePlanner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Plans a route through `points` in order.
    async fn plan(&self, points: &[LatLng]) -> Result<RouteQuote, RouteError>;
}

fn path_length_m(points: &[LatLng]) -> f64 {
    points.windows(2).map(|w| w[0].distance_m(&w[1])).sum()
}

/// Offline fallback: great-circle legs between the given points.
#[derive(Debug, Clone, Copy, Default)]
pub struct StraightLinePlanner;

#[async_trait]
impl RoutePlanner for StraightLinePlanner {
    fn name(&self) -> &'static str {
        "straight-line"
    }

    async fn plan(&self, points: &[LatLng]) -> Result<RouteQuote, RouteError> {
        if points.len() < 2 {
            return Err(RouteError::TooFewPoints(points.len()));
        }
        Ok(RouteQuote::new(points.to_vec(), path_length_m(points)))
    }
}

/// openrouteservice driving directions.
///
/// The API key goes into the `Authorization` header; do not log it.
#[derive(Debug, Clone)]
pub struct OrsRoutePlanner {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct DirectionsRequest {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Deserialize)]
struct DirectionsRoute {
    geometry: String,
    #[serde(default)]
    summary: Option<RouteSummary>,
}

#[derive(Deserialize)]
struct RouteSummary {
    #[serde(default)]
    distance: Option<f64>,
}

impl OrsRoutePlanner {
    pub fn new(api_key: String) -> Self {
        Self::new_with_base_url(api_key, "https://api.openrouteservice.org".to_string())
    }

    pub fn new_with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn build_directions_url(&self) -> String {
        format!(
            "{}/v2/directions/driving-car",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl RoutePlanner for OrsRoutePlanner {
    fn name(&self) -> &'static str {
        "openrouteservice"
    }

    async fn plan(&self, points: &[LatLng]) -> Result<RouteQuote, RouteError> {
        if points.len() < 2 {
            return Err(RouteError::TooFewPoints(points.len()));
        }

        let request = DirectionsRequest {
            coordinates: points.iter().map(|p| p.to_lon_lat()).collect(),
        };
        let resp = self
            .http
            .post(self.build_directions_url())
            .header(reqwest::header::AUTHORIZATION, self.api_key.as_str())
            .json(&request)
            .send()
            .await
            .map_err(ApiError::from)?;

        let body: DirectionsResponse = ApiError::check(resp).await?.json().await.map_err(ApiError::decode)?;
        let route = body.routes.into_iter().next().ok_or(RouteError::NoRoute)?;
        let geometry = polyline::decode(&route.geometry)?;

        let distance_m = match route.summary.and_then(|s| s.distance) {
            Some(meters) => meters,
            None => {
                warn!("Route summary has no distance, measuring the geometry");
                path_length_m(&geometry)
            }
        };
        debug!(points = geometry.len(), distance_m, "Route planned");

        Ok(RouteQuote::new(geometry, distance_m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_rounds_to_two_decimals() {
        assert_eq!(RouteQuote::new(vec![], 5_004.9).distance_km, 5.0);
        assert_eq!(RouteQuote::new(vec![], 12_345.0).distance_km, 12.35);
    }

    #[tokio::test]
    async fn test_straight_line_needs_two_points() {
        let err = StraightLinePlanner
            .plan(&[LatLng::new(60.7, 28.75)])
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::TooFewPoints(1)));
    }

    #[tokio::test]
    async fn test_straight_line_sums_legs() {
        let a = LatLng::new(60.70, 28.75);
        let b = a.offset(0.0, 2_000.0);
        let c = b.offset(90.0, 3_000.0);
        let route = StraightLinePlanner.plan(&[a, b, c]).await.unwrap();
        assert_eq!(route.distance_km, 5.0);
        assert_eq!(route.points.len(), 3);
    }
}
