//! The host geolocation boundary.

use crate::geo::GeoError;
use crate::model::LatLng;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;

/// Current permission as reported by the host, without prompting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

/// Outcome of asking the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionDecision {
    Granted,
    Denied,
    /// The host cannot provide positions at all.
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub enable_high_accuracy: bool,
    /// Oldest cached fix the host may hand back. Zero forces a fresh one.
    pub maximum_age: Duration,
    pub timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            maximum_age: Duration::ZERO,
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

impl Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watch_{}", self.0)
    }
}

/// One fix from the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub coords: LatLng,
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// A live hardware watch. Positions stop once the host clears it.
#[derive(Debug)]
pub struct PositionWatch {
    pub id: WatchId,
    pub positions: mpsc::Receiver<Result<Position, GeoError>>,
}

#[async_trait]
pub trait PositionProvider: Send + Sync + 'static {
    async fn query_permission(&self) -> PermissionState;

    /// Prompts the user if needed.
    async fn request_permission(&self) -> PermissionDecision;

    async fn watch_position(&self, options: WatchOptions) -> Result<PositionWatch, GeoError>;

    async fn clear_watch(&self, id: WatchId);

    async fn current_position(&self, options: WatchOptions) -> Result<Position, GeoError>;
}
