//! The session actor: the one place where the streams meet.
//!
//! | Input | Effect |
//! |-------|--------|
//! | `ChannelEvent::Message(OrderUpsert)` | `OrderClient::apply_delta` |
//! | `ChannelEvent::Message(StatusAck)` | presence acknowledged |
//! | `ChannelEvent::StateChanged(Open)` | send `register`, then `getStatus` |
//! | `ChannelEvent::Disconnected` | presence reverted, redial armed |
//! | `TrackerEvent::Changed` | send `location` if the channel is open |
//! | fresh `SnapshotEvent` | `OrderClient::apply_snapshot` |
//! | stale `SnapshotEvent` | logged, not applied |
//!
//! The channel only reconnects after a socket that was open goes away, and gives up after
//! its policy runs out. The session owns the longer horizon: a failed
//! [`SessionClient::connect_channel`] or a `Disconnected` event arms a [`Redial`] timer,
//! and every tick dials again until the socket opens.

use crate::api::{RestClient, StatusUpdate};
use crate::channel::{
    ChannelClient, ChannelError, ChannelEvent, ConnectionState, InboundMessage, OutboundMessage,
};
use crate::clients::OrderClient;
use crate::geo::TrackerEvent;
use crate::lifecycle::DispatchError;
use crate::model::{LocationSample, PresenceStatus, SessionIdentity};
use crate::poller::SnapshotEvent;
use crate::presence::PresenceState;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;
use tracing::{debug, info, instrument, warn};

/// Where and how often the session dials the socket on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redial {
    pub url: String,
    pub every: Duration,
}

enum SessionCommand {
    ConnectChannel {
        respond_to: oneshot::Sender<Result<(), DispatchError>>,
    },
    TogglePresence {
        respond_to: oneshot::Sender<Result<PresenceStatus, DispatchError>>,
    },
    Presence {
        respond_to: oneshot::Sender<PresenceStatus>,
    },
    LastSample {
        respond_to: oneshot::Sender<Option<LocationSample>>,
    },
}

/// Event streams the session consumes.
pub struct SessionInputs {
    pub channel: mpsc::Receiver<ChannelEvent>,
    pub tracker: mpsc::Receiver<TrackerEvent>,
    pub snapshots: mpsc::Receiver<SnapshotEvent>,
}

pub struct DispatchSession {
    receiver: mpsc::Receiver<SessionCommand>,
    identity: SessionIdentity,
    presence: PresenceState,
    orders: OrderClient,
    channel: ChannelClient,
    api: Option<RestClient>,
    redial: Redial,
    redial_timer: Option<Pin<Box<Sleep>>>,
    channel_events: Option<mpsc::Receiver<ChannelEvent>>,
    tracker_events: Option<mpsc::Receiver<TrackerEvent>>,
    snapshots: Option<mpsc::Receiver<SnapshotEvent>>,
    last_sample: Option<LocationSample>,
}

#[derive(Clone)]
pub struct SessionClient {
    sender: mpsc::Sender<SessionCommand>,
}

pub fn new(
    identity: SessionIdentity,
    orders: OrderClient,
    channel: ChannelClient,
    api: Option<RestClient>,
    redial: Redial,
    inputs: SessionInputs,
) -> (DispatchSession, SessionClient) {
    let (sender, receiver) = mpsc::channel(16);
    let session = DispatchSession {
        receiver,
        identity,
        presence: PresenceState::default(),
        orders,
        channel,
        api,
        redial,
        redial_timer: None,
        channel_events: Some(inputs.channel),
        tracker_events: Some(inputs.tracker),
        snapshots: Some(inputs.snapshots),
        last_sample: None,
    };
    (session, SessionClient { sender })
}

impl DispatchSession {
    pub async fn run(mut self) {
        info!(user_id = self.identity.user_id, "Session started");

        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                event = recv_opt(&mut self.channel_events) => match event {
                    Some(event) => self.on_channel(event).await,
                    None => self.channel_events = None,
                },
                event = recv_opt(&mut self.tracker_events) => match event {
                    Some(event) => self.on_tracker(event).await,
                    None => self.tracker_events = None,
                },
                event = recv_opt(&mut self.snapshots) => match event {
                    Some(event) => self.on_snapshot(event).await,
                    None => self.snapshots = None,
                },
                _ = sleep_opt(&mut self.redial_timer) => {
                    self.redial_timer = None;
                    debug!(url = %self.redial.url, "Redialing");
                    let _ = self.connect_channel().await;
                }
            }
        }

        info!("Session shutdown");
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::ConnectChannel { respond_to } => {
                let result = self.connect_channel().await;
                let _ = respond_to.send(result);
            }
            SessionCommand::TogglePresence { respond_to } => {
                let result = self.toggle_presence().await;
                let _ = respond_to.send(result);
            }
            SessionCommand::Presence { respond_to } => {
                let _ = respond_to.send(self.presence.displayed());
            }
            SessionCommand::LastSample { respond_to } => {
                let _ = respond_to.send(self.last_sample);
            }
        }
    }

    /// Dials the socket once. A failure, or no answer within one redial period, arms
    /// the redial timer.
    async fn connect_channel(&mut self) -> Result<(), DispatchError> {
        self.redial_timer = None;
        let result = tokio::time::timeout(
            self.redial.every,
            self.channel.connect(&self.redial.url),
        )
        .await
        .unwrap_or_else(|_| Err(ChannelError::Transport("connect timed out".into())));

        if let Err(e) = &result {
            warn!(
                url = %self.redial.url,
                error = %e,
                redial_ms = self.redial.every.as_millis() as u64,
                "Channel unreachable"
            );
            self.arm_redial();
        }
        Ok(result?)
    }

    fn arm_redial(&mut self) {
        self.redial_timer = Some(Box::pin(tokio::time::sleep(self.redial.every)));
    }

    async fn toggle_presence(&mut self) -> Result<PresenceStatus, DispatchError> {
        let message = self.presence.toggle(&self.identity);
        let wanted = self.presence.displayed();

        let channel_error = match self.channel.send(message).await {
            Ok(()) => return Ok(wanted),
            Err(e) => e,
        };
        let Some(api) = &self.api else {
            self.presence.revert();
            return Err(channel_error.into());
        };

        debug!(error = %channel_error, "Socket unavailable, updating status over REST");
        let update = StatusUpdate {
            user_id: self.identity.user_id,
            status: wanted,
        };
        match api.update_status(&update).await {
            Ok(()) => {
                self.presence.on_ack(wanted);
                Ok(wanted)
            }
            Err(e) => {
                self.presence.revert();
                Err(e.into())
            }
        }
    }

    async fn on_channel(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message(InboundMessage::OrderUpsert(patch)) => {
                match self.orders.apply_delta(patch).await {
                    Ok(outcome) => debug!(?outcome, "Delta applied"),
                    Err(e) => warn!(error = %e, "Delta rejected"),
                }
            }
            ChannelEvent::Message(InboundMessage::StatusAck { status }) => {
                if self.presence.on_ack(status) {
                    info!(%status, "Presence changed by server");
                }
            }
            ChannelEvent::Message(InboundMessage::RegisterAck) => info!("Registered"),
            ChannelEvent::StateChanged(ConnectionState::Open) => {
                self.redial_timer = None;
                for message in [
                    OutboundMessage::register(&self.identity),
                    PresenceState::resync(&self.identity),
                ] {
                    if let Err(e) = self.channel.send(message).await {
                        warn!(error = %e, "Could not send on open");
                    }
                }
            }
            ChannelEvent::StateChanged(state) => debug!(?state, "Channel state"),
            ChannelEvent::Disconnected { attempts } => {
                warn!(attempts, "Channel gave up reconnecting");
                self.presence.revert();
                self.arm_redial();
            }
        }
    }

    async fn on_tracker(&mut self, event: TrackerEvent) {
        match event {
            TrackerEvent::Sample(sample) => self.last_sample = Some(sample),
            TrackerEvent::Changed {
                sample,
                displacement_m,
            } => {
                self.last_sample = Some(sample);
                if self.channel.state() != ConnectionState::Open {
                    debug!("Channel not open, location not sent");
                    return;
                }
                let message = OutboundMessage::location(&self.identity, &sample);
                match self.channel.send(message).await {
                    Ok(()) => debug!(displacement_m, "Location sent"),
                    Err(e) => debug!(error = %e, "Location not sent"),
                }
            }
            TrackerEvent::Error(e) if e.is_transient() => debug!(error = %e, "Tracker error"),
            TrackerEvent::Error(e) => warn!(error = %e, "Tracker error"),
        }
    }

    async fn on_snapshot(&mut self, event: SnapshotEvent) {
        if event.stale {
            warn!(error = event.error.as_deref().unwrap_or(""), "Skipping stale snapshot");
            return;
        }
        match self.orders.apply_snapshot(event.snapshot).await {
            Ok(report) => debug!(?report, "Snapshot applied"),
            Err(e) => warn!(error = %e, "Snapshot rejected"),
        }
    }
}

async fn sleep_opt<F: Future + Unpin>(sleep: &mut Option<F>) {
    if let Some(sleep) = sleep {
        sleep.await;
    } else {
        std::future::pending::<()>().await;
    }
}

async fn recv_opt<T>(receiver: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

impl SessionClient {
    /// Dials the socket. On failure the session keeps redialing in the background.
    #[instrument(skip(self))]
    pub async fn connect_channel(&self) -> Result<(), DispatchError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(SessionCommand::ConnectChannel { respond_to })
            .await
            .map_err(|_| DispatchError::SessionClosed)?;
        response.await.map_err(|_| DispatchError::SessionClosed)?
    }

    /// Flips presence optimistically. Returns the requested status once it was sent.
    #[instrument(skip(self))]
    pub async fn toggle_presence(&self) -> Result<PresenceStatus, DispatchError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(SessionCommand::TogglePresence { respond_to })
            .await
            .map_err(|_| DispatchError::SessionClosed)?;
        response.await.map_err(|_| DispatchError::SessionClosed)?
    }

    pub async fn presence(&self) -> Result<PresenceStatus, DispatchError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(SessionCommand::Presence { respond_to })
            .await
            .map_err(|_| DispatchError::SessionClosed)?;
        response.await.map_err(|_| DispatchError::SessionClosed)
    }

    pub async fn last_sample(&self) -> Result<Option<LocationSample>, DispatchError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(SessionCommand::LastSample { respond_to })
            .await
            .map_err(|_| DispatchError::SessionClosed)?;
        response.await.map_err(|_| DispatchError::SessionClosed)
    }
}
