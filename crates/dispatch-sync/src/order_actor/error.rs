//! Error types for the Order reconciler.

use thiserror::Error;

/// Errors that can occur while reconciling orders.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderError {
    /// A patch arrived without `id` or `orderId`.
    #[error("Order patch has no id")]
    MissingId,

    /// The requested order was not found.
    #[error("Order not found: {0}")]
    NotFound(String),

    /// An error occurred while communicating with the actor system.
    #[error("Actor communication error: {0}")]
    ActorCommunicationError(String),
}

impl From<String> for OrderError {
    fn from(msg: String) -> Self {
        OrderError::ActorCommunicationError(msg)
    }
}
