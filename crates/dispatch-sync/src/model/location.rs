use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mean Earth radius used for every distance in the crate.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    #[serde(alias = "lng")]
    pub lon: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle (haversine) distance to `other`, in meters.
    pub fn distance_m(&self, other: &LatLng) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// The point `distance_m` meters away along `bearing_deg` (clockwise from north).
    pub fn offset(&self, bearing_deg: f64, distance_m: f64) -> LatLng {
        let delta = distance_m / EARTH_RADIUS_M;
        let theta = bearing_deg.to_radians();
        let (lat1, lon1) = (self.lat.to_radians(), self.lon.to_radians());

        let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
        let lon2 = lon1
            + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

        LatLng::new(lat2.to_degrees(), lon2.to_degrees())
    }

    /// `[lon, lat]`, the coordinate order routing providers expect.
    pub fn to_lon_lat(self) -> [f64; 2] {
        [self.lon, self.lat]
    }
}

/// One position fix produced by the geolocation tracker.
///
/// Samples are never mutated; a newer fix supersedes an older one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub lat: f64,
    pub lon: f64,
    pub captured_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(point: LatLng, captured_at: DateTime<Utc>) -> Self {
        Self {
            lat: point.lat,
            lon: point.lon,
            captured_at,
        }
    }

    pub fn point(&self) -> LatLng {
        LatLng::new(self.lat, self.lon)
    }
}
