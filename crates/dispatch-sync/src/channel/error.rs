//! Error types for the push channel.

use crate::channel::ConnectionState;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChannelError {
    /// `send` was called while the socket was not open. Nothing was sent.
    #[error("Channel not ready (state: {0:?})")]
    NotReady(ConnectionState),

    #[error("Transport error: {0}")]
    Transport(String),

    /// The channel actor has stopped.
    #[error("Channel closed")]
    Closed,

    #[error("Could not encode message: {0}")]
    Encode(String),
}

/// Reasons an inbound frame was dropped.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("binary frame is not UTF-8")]
    NotUtf8,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("message has no type and is not an order")]
    MissingType,

    #[error("invalid order payload: {0}")]
    InvalidOrder(String),
}
