//! # Order Snapshot Poller
//!
//! Fetches the authoritative active-order set on a fixed interval and forwards each
//! result to a sink. A failed fetch never ends the loop: the sink gets the last good
//! snapshot again, marked `stale`, and the next tick retries.
//!
//! The poller is an actor. [`PollerClient::start_polling`] arms (or re-arms) the timer and
//! [`PollerClient::stop_polling`] disarms it; the actor itself lives until every client
//! is dropped.

use crate::api::ApiError;
use crate::model::Snapshot;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Source of active-order snapshots.
#[async_trait]
pub trait OrderFeed: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Snapshot, ApiError>;
}

/// What the sink receives on every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEvent {
    pub snapshot: Snapshot,
    /// `true` when the fetch failed and `snapshot` is the previous good one.
    pub stale: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PollerError {
    #[error("Poller stopped")]
    Closed,
    #[error("Poll interval must be non-zero")]
    InvalidInterval,
}

enum PollerCommand {
    Start {
        interval: Duration,
        respond_to: oneshot::Sender<()>,
    },
    Stop {
        respond_to: oneshot::Sender<bool>,
    },
}

pub struct OrderSnapshotPoller {
    receiver: mpsc::Receiver<PollerCommand>,
    feed: Arc<dyn OrderFeed>,
    sink: mpsc::Sender<SnapshotEvent>,
    ticker: Option<Interval>,
    last_good: Option<Snapshot>,
}

#[derive(Clone)]
pub struct PollerClient {
    sender: mpsc::Sender<PollerCommand>,
}

impl OrderSnapshotPoller {
    pub fn new(
        feed: Arc<dyn OrderFeed>,
        sink: mpsc::Sender<SnapshotEvent>,
    ) -> (Self, PollerClient) {
        let (sender, receiver) = mpsc::channel(8);
        let poller = Self {
            receiver,
            feed,
            sink,
            ticker: None,
            last_good: None,
        };
        (poller, PollerClient { sender })
    }

    pub async fn run(mut self) {
        info!("Poller started");

        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(PollerCommand::Start { interval, respond_to }) => {
                        let mut ticker = tokio::time::interval(interval);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        let restarted = self.ticker.replace(ticker).is_some();
                        info!(interval_ms = interval.as_millis() as u64, restarted, "Polling armed");
                        let _ = respond_to.send(());
                    }
                    Some(PollerCommand::Stop { respond_to }) => {
                        let was_running = self.ticker.take().is_some();
                        if was_running {
                            info!("Polling stopped");
                        }
                        let _ = respond_to.send(was_running);
                    }
                    None => break,
                },
                _ = tick(&mut self.ticker) => {
                    if !self.poll_once().await {
                        info!("Snapshot sink closed");
                        self.ticker = None;
                    }
                }
            }
        }

        info!("Poller shutdown");
    }

    /// One fetch. Returns `false` once the sink is gone.
    async fn poll_once(&mut self) -> bool {
        let event = match self.feed.fetch().await {
            Ok(snapshot) => {
                debug!(entries = snapshot.records.len(), "Snapshot fetched");
                self.last_good = Some(snapshot.clone());
                SnapshotEvent {
                    snapshot,
                    stale: false,
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Snapshot fetch failed, replaying last good snapshot");
                SnapshotEvent {
                    snapshot: self
                        .last_good
                        .clone()
                        .unwrap_or_else(|| Snapshot::empty(Utc::now())),
                    stale: true,
                    error: Some(e.to_string()),
                }
            }
        };
        self.sink.send(event).await.is_ok()
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl PollerClient {
    /// Starts polling, or restarts with the new interval if already running.
    /// The first fetch happens immediately. A zero interval is rejected.
    #[instrument(skip(self))]
    pub async fn start_polling(&self, interval: Duration) -> Result<(), PollerError> {
        if interval.is_zero() {
            return Err(PollerError::InvalidInterval);
        }
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(PollerCommand::Start {
                interval,
                respond_to,
            })
            .await
            .map_err(|_| PollerError::Closed)?;
        response.await.map_err(|_| PollerError::Closed)
    }

    /// Stops polling. Returns whether a timer was running; calling it again is a no-op.
    #[instrument(skip(self))]
    pub async fn stop_polling(&self) -> Result<bool, PollerError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(PollerCommand::Stop { respond_to })
            .await
            .map_err(|_| PollerError::Closed)?;
        response.await.map_err(|_| PollerError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OrderPatch;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted results, then keeps failing.
    struct ScriptedFeed {
        script: Mutex<VecDeque<Result<Snapshot, ApiError>>>,
    }

    impl ScriptedFeed {
        fn new(script: Vec<Result<Snapshot, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
            })
        }
    }

    #[async_trait]
    impl OrderFeed for ScriptedFeed {
        async fn fetch(&self) -> Result<Snapshot, ApiError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Decode("script exhausted".into())))
        }
    }

    fn snapshot(ids: &[&str]) -> Snapshot {
        Snapshot::new(
            ids.iter().map(|id| OrderPatch::with_id(*id)).collect(),
            Utc::now(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_replays_last_good_snapshot() {
        let good = snapshot(&["1", "2"]);
        let feed = ScriptedFeed::new(vec![
            Ok(good.clone()),
            Err(ApiError::Status {
                status: 502,
                body: "bad gateway".into(),
            }),
        ]);
        let (sink, mut events) = mpsc::channel(8);
        let (poller, client) = OrderSnapshotPoller::new(feed, sink);
        tokio::spawn(poller.run());

        client.start_polling(Duration::from_secs(5)).await.unwrap();

        let first = events.recv().await.unwrap();
        assert!(!first.stale);
        assert_eq!(first.snapshot, good);

        let second = events.recv().await.unwrap();
        assert!(second.stale);
        assert_eq!(second.snapshot, good);
        assert!(second.error.unwrap().contains("502"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_before_any_success_sends_empty_stale_snapshot() {
        let feed = ScriptedFeed::new(vec![]);
        let (sink, mut events) = mpsc::channel(8);
        let (poller, client) = OrderSnapshotPoller::new(feed, sink);
        tokio::spawn(poller.run());

        client.start_polling(Duration::from_secs(5)).await.unwrap();
        let event = events.recv().await.unwrap();
        assert!(event.stale);
        assert!(event.snapshot.records.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_silences_sink() {
        let feed = ScriptedFeed::new(vec![Ok(snapshot(&["1"]))]);
        let (sink, mut events) = mpsc::channel(8);
        let (poller, client) = OrderSnapshotPoller::new(feed, sink);
        tokio::spawn(poller.run());

        client.start_polling(Duration::from_secs(5)).await.unwrap();
        events.recv().await.unwrap();

        assert!(client.stop_polling().await.unwrap());
        assert!(!client.stop_polling().await.unwrap());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_rejected_and_poller_survives() {
        let feed = ScriptedFeed::new(vec![Ok(snapshot(&["1"]))]);
        let (sink, mut events) = mpsc::channel(8);
        let (poller, client) = OrderSnapshotPoller::new(feed, sink);
        let handle = tokio::spawn(poller.run());

        assert_eq!(
            client.start_polling(Duration::ZERO).await,
            Err(PollerError::InvalidInterval)
        );
        assert!(!client.stop_polling().await.unwrap());

        client.start_polling(Duration::from_secs(5)).await.unwrap();
        assert!(!events.recv().await.unwrap().stale);

        drop(client);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_uses_new_interval() {
        let feed = ScriptedFeed::new(vec![
            Ok(snapshot(&["1"])),
            Ok(snapshot(&["1"])),
            Ok(snapshot(&["1"])),
        ]);
        let (sink, mut events) = mpsc::channel(8);
        let (poller, client) = OrderSnapshotPoller::new(feed, sink);
        tokio::spawn(poller.run());

        client.start_polling(Duration::from_secs(30)).await.unwrap();
        events.recv().await.unwrap();

        client.start_polling(Duration::from_secs(3)).await.unwrap();
        // Restart fires immediately, then every 3s
        events.recv().await.unwrap();
        let started = tokio::time::Instant::now();
        events.recv().await.unwrap();
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(3) && waited < Duration::from_secs(4));
    }
}
