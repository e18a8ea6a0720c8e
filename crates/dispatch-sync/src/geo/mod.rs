//! # Geolocation Tracker
//!
//! Continuous position sampling on top of a host [`PositionProvider`], run as an actor.
//!
//! The tracker holds at most one hardware watch. The watch is open only while the
//! tracker is started, the view is visible and permission is not denied; every other
//! state releases it. With a denied permission the tracker falls back to a single
//! best-effort fix.
//!
//! Samples are forwarded as [`TrackerEvent::Sample`]. A [`TrackerEvent::Changed`] follows
//! whenever a sample lies at least the change threshold away from the previous sample;
//! the very first sample always counts as changed.
//!
//! A watch that stays silent for [`WatchOptions::timeout`], or a one-shot fix that does not
//! answer within it, surfaces as [`GeoError::Timeout`].
//!
//! ```rust
//! use dispatch_sync::geo::{self, ReplayPositionProvider, TrackerConfig, TrackerEvent};
//! use dispatch_sync::model::LatLng;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let start = LatLng::new(60.7076, 28.7528);
//!     let provider = Arc::new(ReplayPositionProvider::walk(start, 90.0, 5.0, 3, Duration::from_millis(10)));
//!     let (tracker, client) = geo::new(provider, TrackerConfig::default(), Default::default());
//!     tokio::spawn(tracker.run());
//!
//!     let (tx, mut events) = tokio::sync::mpsc::channel(16);
//!     client.start(tx).await.unwrap();
//!     assert!(matches!(events.recv().await, Some(TrackerEvent::Sample(_))));
//!     client.stop().await.unwrap();
//! }
//! ```

pub mod error;
pub mod permission;
pub mod provider;
pub mod replay;

pub use error::*;
pub use permission::*;
pub use provider::*;
pub use replay::*;

use crate::model::LocationSample;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Minimum displacement, in meters, that counts as movement.
pub const DEFAULT_CHANGE_THRESHOLD_M: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    pub options: WatchOptions,
    pub change_threshold_m: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            options: WatchOptions::default(),
            change_threshold_m: DEFAULT_CHANGE_THRESHOLD_M,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Sample(LocationSample),
    Changed {
        sample: LocationSample,
        /// Distance from the previous sample; zero for the first one.
        displacement_m: f64,
    },
    Error(GeoError),
}

enum TrackerCommand {
    Start {
        events: mpsc::Sender<TrackerEvent>,
        respond_to: oneshot::Sender<Result<(), GeoError>>,
    },
    Stop {
        respond_to: oneshot::Sender<bool>,
    },
    RequestPermission {
        respond_to: oneshot::Sender<PermissionDecision>,
    },
    SetVisible {
        visible: bool,
        respond_to: oneshot::Sender<()>,
    },
}

struct ActiveWatch {
    id: WatchId,
    positions: mpsc::Receiver<Result<Position, GeoError>>,
    deadline: Instant,
}

enum WatchOutcome {
    Position(Result<Position, GeoError>),
    Ended,
    TimedOut,
}

/// The tracker actor. Create it with [`new`].
pub struct GeolocationTracker {
    receiver: mpsc::Receiver<TrackerCommand>,
    provider: Arc<dyn PositionProvider>,
    config: TrackerConfig,
    permission: PermissionCache,
    events: Option<mpsc::Sender<TrackerEvent>>,
    watch: Option<ActiveWatch>,
    visible: bool,
    previous: Option<LocationSample>,
}

/// Handle to a running [`GeolocationTracker`]. Cheap to clone.
#[derive(Clone)]
pub struct TrackerClient {
    sender: mpsc::Sender<TrackerCommand>,
}

/// Creates a tracker actor and its client.
pub fn new(
    provider: Arc<dyn PositionProvider>,
    config: TrackerConfig,
    permission: PermissionCache,
) -> (GeolocationTracker, TrackerClient) {
    let (sender, receiver) = mpsc::channel(16);
    let tracker = GeolocationTracker {
        receiver,
        provider,
        config,
        permission,
        events: None,
        watch: None,
        visible: true,
        previous: None,
    };
    (tracker, TrackerClient { sender })
}

impl GeolocationTracker {
    /// Runs until every [`TrackerClient`] is dropped, then releases any open watch.
    pub async fn run(mut self) {
        info!("Tracker started");

        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                outcome = next_position(&mut self.watch) => self.on_watch(outcome).await,
            }
        }

        self.release_watch().await;
        info!("Tracker shutdown");
    }

    async fn handle(&mut self, command: TrackerCommand) {
        match command {
            TrackerCommand::Start { events, respond_to } => {
                let result = self.start(events).await;
                let _ = respond_to.send(result);
            }
            TrackerCommand::Stop { respond_to } => {
                let was_running = self.events.take().is_some();
                self.release_watch().await;
                self.previous = None;
                if was_running {
                    info!("Tracking stopped");
                }
                let _ = respond_to.send(was_running);
            }
            TrackerCommand::RequestPermission { respond_to } => {
                let decision = self.resolve_permission(true).await;
                let _ = respond_to.send(decision);
            }
            TrackerCommand::SetVisible {
                visible,
                respond_to,
            } => {
                if visible != self.visible {
                    debug!(visible, "Visibility changed");
                    self.visible = visible;
                    if visible {
                        self.open_watch().await;
                    } else {
                        self.release_watch().await;
                    }
                }
                let _ = respond_to.send(());
            }
        }
    }

    async fn start(&mut self, events: mpsc::Sender<TrackerEvent>) -> Result<(), GeoError> {
        if self.events.is_some() {
            debug!("Already tracking");
            return Ok(());
        }

        match self.resolve_permission(false).await {
            PermissionDecision::Unavailable => Err(GeoError::Unsupported),
            PermissionDecision::Denied => {
                info!("Permission denied, taking a single fix");
                self.events = Some(events);
                let timeout = self.config.options.timeout;
                let fix = tokio::time::timeout(
                    timeout,
                    self.provider.current_position(self.config.options),
                )
                .await
                .unwrap_or(Err(GeoError::Timeout));
                match fix {
                    Ok(position) => self.on_sample(position).await,
                    Err(e) => {
                        warn!(error = %e, "Single fix failed");
                        self.emit(TrackerEvent::Error(e)).await
                    }
                }
                Ok(())
            }
            PermissionDecision::Granted => {
                info!("Tracking started");
                self.events = Some(events);
                self.open_watch().await;
                Ok(())
            }
        }
    }

    /// Returns the cached decision, or asks the host once and caches the answer.
    ///
    /// With `prompt == false` a `Granted`/`Denied` query answer is taken as-is and only a
    /// `Prompt` state leads to asking the user.
    async fn resolve_permission(&mut self, prompt: bool) -> PermissionDecision {
        if let Some(decision) = self.permission.get() {
            return decision;
        }

        let decision = match self.provider.query_permission().await {
            PermissionState::Granted if !prompt => PermissionDecision::Granted,
            PermissionState::Denied if !prompt => PermissionDecision::Denied,
            _ => self.provider.request_permission().await,
        };
        info!(?decision, "Permission resolved");
        self.permission.set(decision).await;
        decision
    }

    fn should_watch(&self) -> bool {
        self.events.is_some()
            && self.visible
            && self.permission.get() == Some(PermissionDecision::Granted)
    }

    async fn open_watch(&mut self) {
        if self.watch.is_some() || !self.should_watch() {
            return;
        }
        match self.provider.watch_position(self.config.options).await {
            Ok(PositionWatch { id, positions }) => {
                debug!(%id, "Watch opened");
                self.watch = Some(ActiveWatch {
                    id,
                    positions,
                    deadline: Instant::now() + self.config.options.timeout,
                });
            }
            Err(e) => {
                warn!(error = %e, "Could not open watch");
                self.emit(TrackerEvent::Error(e)).await;
            }
        }
    }

    async fn release_watch(&mut self) {
        if let Some(watch) = self.watch.take() {
            self.provider.clear_watch(watch.id).await;
            debug!(id = %watch.id, "Watch released");
        }
    }

    async fn on_watch(&mut self, outcome: WatchOutcome) {
        let timeout = self.config.options.timeout;
        if let Some(watch) = self.watch.as_mut() {
            watch.deadline = Instant::now() + timeout;
        }

        match outcome {
            WatchOutcome::Position(Ok(position)) => self.on_sample(position).await,
            WatchOutcome::Position(Err(GeoError::PermissionDenied)) => {
                warn!("Permission revoked while watching");
                self.release_watch().await;
                self.permission.set(PermissionDecision::Denied).await;
                self.emit(TrackerEvent::Error(GeoError::PermissionDenied))
                    .await;
            }
            WatchOutcome::Position(Err(e)) => {
                debug!(error = %e, "Watch error");
                self.emit(TrackerEvent::Error(e)).await;
            }
            WatchOutcome::TimedOut => {
                debug!(timeout_ms = timeout.as_millis() as u64, "No fix within timeout");
                self.emit(TrackerEvent::Error(GeoError::Timeout)).await;
            }
            WatchOutcome::Ended => {
                warn!("Host ended the watch");
                self.release_watch().await;
                self.emit(TrackerEvent::Error(GeoError::PositionUnavailable(
                    "watch ended".into(),
                )))
                .await;
            }
        }
    }

    async fn on_sample(&mut self, position: Position) {
        let sample = LocationSample::new(position.coords, position.timestamp);
        self.emit(TrackerEvent::Sample(sample)).await;

        let displacement_m = self
            .previous
            .replace(sample)
            .map(|previous| previous.point().distance_m(&sample.point()));
        if displacement_m.map_or(true, |d| d >= self.config.change_threshold_m) {
            self.emit(TrackerEvent::Changed {
                sample,
                displacement_m: displacement_m.unwrap_or(0.0),
            })
            .await;
        }
    }

    async fn emit(&mut self, event: TrackerEvent) {
        if let Some(events) = &self.events {
            if events.send(event).await.is_err() {
                debug!("Event receiver dropped");
            }
        }
    }
}

async fn next_position(watch: &mut Option<ActiveWatch>) -> WatchOutcome {
    let Some(watch) = watch else {
        return std::future::pending().await;
    };
    match tokio::time::timeout_at(watch.deadline, watch.positions.recv()).await {
        Ok(Some(result)) => WatchOutcome::Position(result),
        Ok(None) => WatchOutcome::Ended,
        Err(_) => WatchOutcome::TimedOut,
    }
}

impl TrackerClient {
    /// Starts tracking. Events go to `events`; a second call while running is a no-op.
    #[instrument(skip(self, events))]
    pub async fn start(&self, events: mpsc::Sender<TrackerEvent>) -> Result<(), GeoError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(TrackerCommand::Start { events, respond_to })
            .await
            .map_err(|_| GeoError::TrackerClosed)?;
        response.await.map_err(|_| GeoError::TrackerClosed)?
    }

    /// Stops tracking and releases the watch. Returns whether tracking was running.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<bool, GeoError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(TrackerCommand::Stop { respond_to })
            .await
            .map_err(|_| GeoError::TrackerClosed)?;
        response.await.map_err(|_| GeoError::TrackerClosed)
    }

    /// Asks for permission once per process; later calls return the cached decision.
    #[instrument(skip(self))]
    pub async fn request_permission(&self) -> Result<PermissionDecision, GeoError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(TrackerCommand::RequestPermission { respond_to })
            .await
            .map_err(|_| GeoError::TrackerClosed)?;
        response.await.map_err(|_| GeoError::TrackerClosed)
    }

    /// Suspends the watch while hidden and resumes it when visible again.
    #[instrument(skip(self))]
    pub async fn set_visible(&self, visible: bool) -> Result<(), GeoError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(TrackerCommand::SetVisible {
                visible,
                respond_to,
            })
            .await
            .map_err(|_| GeoError::TrackerClosed)?;
        response.await.map_err(|_| GeoError::TrackerClosed)
    }
}
