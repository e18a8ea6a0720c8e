use crate::geo::{
    GeoError, PermissionDecision, PermissionState, Position, PositionProvider, PositionWatch,
    WatchId, WatchOptions,
};
use crate::model::LatLng;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Plays a recorded track back as if it came from a GPS receiver.
///
/// Each watch walks the track from the start, one point per `period`, and then goes
/// quiet. Permission is always granted.
pub struct ReplayPositionProvider {
    track: Vec<LatLng>,
    period: Duration,
    next_id: AtomicU64,
    watches: Mutex<HashMap<WatchId, JoinHandle<()>>>,
}

impl ReplayPositionProvider {
    pub fn new(track: Vec<LatLng>, period: Duration) -> Self {
        Self {
            track,
            period,
            next_id: AtomicU64::new(1),
            watches: Mutex::new(HashMap::new()),
        }
    }

    /// A straight walk of `steps` legs of `step_m` meters heading `bearing_deg`.
    pub fn walk(start: LatLng, bearing_deg: f64, step_m: f64, steps: usize, period: Duration) -> Self {
        let track = (0..=steps)
            .map(|i| start.offset(bearing_deg, step_m * i as f64))
            .collect();
        Self::new(track, period)
    }

    fn fix(point: LatLng) -> Position {
        Position {
            coords: point,
            accuracy_m: Some(5.0),
            timestamp: Utc::now(),
        }
    }

    pub fn active_watches(&self) -> usize {
        self.watches.lock().map(|w| w.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PositionProvider for ReplayPositionProvider {
    async fn query_permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    async fn request_permission(&self) -> PermissionDecision {
        PermissionDecision::Granted
    }

    async fn watch_position(&self, _options: WatchOptions) -> Result<PositionWatch, GeoError> {
        let id = WatchId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(16);
        let track = self.track.clone();
        let period = self.period;

        let handle = tokio::spawn(async move {
            for point in track {
                if tx.send(Ok(Self::fix(point))).await.is_err() {
                    return;
                }
                tokio::time::sleep(period).await;
            }
            // keep the stream open, like a receiver that stopped moving
            tx.closed().await;
        });

        self.watches
            .lock()
            .map_err(|e| GeoError::PositionUnavailable(e.to_string()))?
            .insert(id, handle);
        debug!(%id, "Replay watch opened");

        Ok(PositionWatch { id, positions: rx })
    }

    async fn clear_watch(&self, id: WatchId) {
        let handle = match self.watches.lock() {
            Ok(mut watches) => watches.remove(&id),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            handle.abort();
            debug!(%id, "Replay watch cleared");
        }
    }

    async fn current_position(&self, _options: WatchOptions) -> Result<Position, GeoError> {
        self.track
            .first()
            .copied()
            .map(Self::fix)
            .ok_or_else(|| GeoError::PositionUnavailable("empty track".into()))
    }
}
