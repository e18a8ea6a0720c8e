//! Error types for geolocation.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeoError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("No position within the timeout")]
    Timeout,

    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    /// The host has no geolocation at all.
    #[error("Geolocation is not supported")]
    Unsupported,

    #[error("Tracker stopped")]
    TrackerClosed,
}

impl GeoError {
    /// Errors after which watching can simply continue.
    pub fn is_transient(&self) -> bool {
        matches!(self, GeoError::Timeout | GeoError::PositionUnavailable(_))
    }
}
