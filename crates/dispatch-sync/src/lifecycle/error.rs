//! Errors surfaced by the system orchestrator.

use crate::api::ApiError;
use crate::channel::ChannelError;
use crate::geo::GeoError;
use crate::order_actor::OrderError;
use crate::poller::PollerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Geo(#[from] GeoError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Poller(#[from] PollerError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Session stopped")]
    SessionClosed,

    #[error("Actor task failed: {0}")]
    TaskFailed(String),
}
