//! # Connection Channel
//!
//! One persistent WebSocket to the dispatch backend, owned by an actor.
//!
//! ```text
//! Closed ──connect()──▶ Connecting ──handshake ok──▶ Open
//!   ▲                      │                          │
//!   └────handshake failed──┘                          │ remote close / error
//!   ▲                                                 ▼
//!   └──────────── Closing ◀──close()─────────── (Closed, maybe reconnect)
//! ```
//!
//! - Inbound frames (text or UTF-8 binary) are parsed with [`protocol::parse_inbound`] and
//!   delivered as [`ChannelEvent::Message`]. Malformed frames are logged and dropped.
//! - [`ChannelClient::send`] fails with [`ChannelError::NotReady`] unless the socket is
//!   open; nothing is queued.
//! - An unexpected close after a successful open triggers the [`ReconnectPolicy`]. Giving
//!   up is reported as [`ChannelEvent::Disconnected`]. A user [`ChannelClient::close`]
//!   never reconnects.

pub mod error;
pub mod protocol;
pub mod reconnect;

pub use error::*;
pub use protocol::*;
pub use reconnect::*;

use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::pin::Pin;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Sleep;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Handshake = Pin<Box<dyn Future<Output = Result<WsStream, tungstenite::Error>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Closed,
    Connecting,
    Open,
    Closing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Message(InboundMessage),
    StateChanged(ConnectionState),
    /// Reconnecting gave up after `attempts` tries.
    Disconnected { attempts: u32 },
}

enum ChannelCommand {
    Connect {
        url: String,
        respond_to: oneshot::Sender<Result<(), ChannelError>>,
    },
    Send {
        message: OutboundMessage,
        respond_to: oneshot::Sender<Result<(), ChannelError>>,
    },
    Close {
        respond_to: oneshot::Sender<()>,
    },
}

/// The channel actor. Create it with [`new`].
pub struct ConnectionChannel {
    receiver: mpsc::Receiver<ChannelCommand>,
    events: mpsc::Sender<ChannelEvent>,
    state: watch::Sender<ConnectionState>,
    policy: ReconnectPolicy,
    url: Option<String>,
    socket: Option<WsStream>,
    handshake: Option<Handshake>,
    retry: Option<Pin<Box<Sleep>>>,
    /// Reconnect attempts made in the current outage.
    attempts: u32,
    reconnecting: bool,
    connect_waiters: Vec<oneshot::Sender<Result<(), ChannelError>>>,
}

/// Handle to a running [`ConnectionChannel`]. Cheap to clone.
#[derive(Clone)]
pub struct ChannelClient {
    sender: mpsc::Sender<ChannelCommand>,
    state: watch::Receiver<ConnectionState>,
}

/// Creates a channel actor, its client and the event stream.
pub fn new(
    policy: ReconnectPolicy,
) -> (ConnectionChannel, ChannelClient, mpsc::Receiver<ChannelEvent>) {
    let (sender, receiver) = mpsc::channel(32);
    let (events_tx, events_rx) = mpsc::channel(256);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Closed);

    let channel = ConnectionChannel {
        receiver,
        events: events_tx,
        state: state_tx,
        policy,
        url: None,
        socket: None,
        handshake: None,
        retry: None,
        attempts: 0,
        reconnecting: false,
        connect_waiters: Vec::new(),
    };
    let client = ChannelClient {
        sender,
        state: state_rx,
    };
    (channel, client, events_rx)
}

impl ConnectionChannel {
    /// Runs until every [`ChannelClient`] is dropped, then closes the socket.
    pub async fn run(mut self) {
        info!("Channel started");

        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                result = poll_opt(&mut self.handshake) => {
                    self.handshake = None;
                    self.on_handshake(result).await;
                }
                frame = next_frame(&mut self.socket) => self.on_frame(frame).await,
                _ = poll_opt(&mut self.retry) => {
                    self.retry = None;
                    self.begin_handshake().await;
                }
            }
        }

        self.shutdown().await;
        info!("Channel shutdown");
    }

    async fn handle(&mut self, command: ChannelCommand) {
        match command {
            ChannelCommand::Connect { url, respond_to } => self.connect(url, respond_to).await,
            ChannelCommand::Send {
                message,
                respond_to,
            } => {
                let result = self.send(message).await;
                let _ = respond_to.send(result);
            }
            ChannelCommand::Close { respond_to } => {
                self.shutdown().await;
                let _ = respond_to.send(());
            }
        }
    }

    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    async fn set_state(&mut self, next: ConnectionState) {
        if self.current() == next {
            return;
        }
        debug!(from = ?self.current(), to = ?next, "State change");
        self.state.send_replace(next);
        self.emit(ChannelEvent::StateChanged(next)).await;
    }

    async fn emit(&mut self, event: ChannelEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Event receiver dropped");
        }
    }

    async fn connect(
        &mut self,
        url: String,
        respond_to: oneshot::Sender<Result<(), ChannelError>>,
    ) {
        let same_url = self.url.as_deref() == Some(url.as_str());
        match self.current() {
            ConnectionState::Open if same_url => {
                let _ = respond_to.send(Ok(()));
                return;
            }
            ConnectionState::Connecting if same_url => {
                self.connect_waiters.push(respond_to);
                return;
            }
            ConnectionState::Closed if same_url && self.retry.is_some() => {
                // a reconnect is already scheduled; connect now instead of waiting
                self.retry = None;
            }
            ConnectionState::Closed => {}
            _ => self.shutdown().await,
        }

        info!(%url, "Connecting");
        self.url = Some(url);
        self.attempts = 0;
        self.reconnecting = false;
        self.connect_waiters.push(respond_to);
        self.begin_handshake().await;
    }

    async fn begin_handshake(&mut self) {
        let Some(url) = self.url.clone() else {
            return;
        };
        self.set_state(ConnectionState::Connecting).await;
        self.handshake = Some(Box::pin(async move {
            connect_async(url).await.map(|(socket, _response)| socket)
        }));
    }

    async fn on_handshake(&mut self, result: Result<WsStream, tungstenite::Error>) {
        match result {
            Ok(socket) => {
                info!(attempts = self.attempts, "Channel open");
                self.socket = Some(socket);
                self.attempts = 0;
                self.reconnecting = false;
                self.set_state(ConnectionState::Open).await;
                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
            }
            Err(e) => {
                warn!(error = %e, attempt = self.attempts, "Handshake failed");
                self.set_state(ConnectionState::Closed).await;
                if self.reconnecting {
                    self.schedule_retry().await;
                } else {
                    let error = ChannelError::Transport(e.to_string());
                    for waiter in self.connect_waiters.drain(..) {
                        let _ = waiter.send(Err(error.clone()));
                    }
                }
            }
        }
    }

    async fn on_frame(&mut self, frame: Option<Result<Message, tungstenite::Error>>) {
        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(bytes))) => match decode_binary(bytes) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Dropping frame");
                    return;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "Remote close");
                return;
            }
            Some(Ok(_)) => return,
            Some(Err(e)) => {
                warn!(error = %e, "Socket error");
                self.on_lost().await;
                return;
            }
            None => {
                info!("Socket ended");
                self.on_lost().await;
                return;
            }
        };

        match parse_inbound(&text) {
            Ok(Some(message)) => self.emit(ChannelEvent::Message(message)).await,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Dropping frame"),
        }
    }

    /// The socket went away without us asking.
    async fn on_lost(&mut self) {
        self.socket = None;
        self.set_state(ConnectionState::Closed).await;
        self.reconnecting = true;
        self.schedule_retry().await;
    }

    async fn schedule_retry(&mut self) {
        let next = self.attempts + 1;
        match self.policy.delay_for(next) {
            Some(delay) => {
                info!(attempt = next, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
                self.attempts = next;
                self.retry = Some(Box::pin(tokio::time::sleep(delay)));
            }
            None => {
                let attempts = self.attempts;
                warn!(attempts, "Giving up reconnecting");
                self.attempts = 0;
                self.reconnecting = false;
                self.emit(ChannelEvent::Disconnected { attempts }).await;
                let error = ChannelError::Transport("reconnect attempts exhausted".into());
                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Err(error.clone()));
                }
            }
        }
    }

    async fn send(&mut self, message: OutboundMessage) -> Result<(), ChannelError> {
        let state = self.current();
        let Some(socket) = self.socket.as_mut().filter(|_| state == ConnectionState::Open) else {
            return Err(ChannelError::NotReady(state));
        };
        let json = serde_json::to_string(&message).map_err(|e| ChannelError::Encode(e.to_string()))?;
        socket
            .send(Message::Text(json))
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        debug!(kind = message.kind(), "Sent");
        Ok(())
    }

    /// User-initiated close: no reconnect afterwards. Idempotent.
    async fn shutdown(&mut self) {
        self.retry = None;
        self.handshake = None;
        self.reconnecting = false;
        self.attempts = 0;

        if let Some(mut socket) = self.socket.take() {
            self.set_state(ConnectionState::Closing).await;
            if let Err(e) = socket.close(None).await {
                debug!(error = %e, "Close handshake failed");
            }
        }
        self.set_state(ConnectionState::Closed).await;

        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(ChannelError::Closed));
        }
    }
}

async fn poll_opt<F: Future + Unpin>(future: &mut Option<F>) -> F::Output {
    match future {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(socket: &mut Option<WsStream>) -> Option<Result<Message, tungstenite::Error>> {
    match socket {
        Some(socket) => socket.next().await,
        None => std::future::pending().await,
    }
}

impl ChannelClient {
    /// Opens the socket. Resolves once the handshake succeeded or failed.
    #[instrument(skip(self))]
    pub async fn connect(&self, url: &str) -> Result<(), ChannelError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(ChannelCommand::Connect {
                url: url.to_string(),
                respond_to,
            })
            .await
            .map_err(|_| ChannelError::Closed)?;
        response.await.map_err(|_| ChannelError::Closed)?
    }

    /// Sends one message. Fails with [`ChannelError::NotReady`] unless open.
    #[instrument(skip(self, message), fields(kind = message.kind()))]
    pub async fn send(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(ChannelCommand::Send {
                message,
                respond_to,
            })
            .await
            .map_err(|_| ChannelError::Closed)?;
        response.await.map_err(|_| ChannelError::Closed)?
    }

    /// Closes the socket and cancels any pending reconnect. Idempotent.
    #[instrument(skip(self))]
    pub async fn close(&self) -> Result<(), ChannelError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(ChannelCommand::Close { respond_to })
            .await
            .map_err(|_| ChannelError::Closed)?;
        response.await.map_err(|_| ChannelError::Closed)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}
