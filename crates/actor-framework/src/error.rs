//! # Framework Errors
//!
//! This module defines the common error types used throughout the actor framework.
//! Entity-specific failures travel inside [`FrameworkError::EntityError`] so the
//! actor loop never needs to know the concrete error type.

/// Errors that can occur within the actor framework itself.
#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    #[error("Actor closed")]
    ActorClosed,
    #[error("Actor dropped response channel")]
    ActorDropped,
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Entity error: {0}")]
    EntityError(Box<dyn std::error::Error + Send + Sync>),
}
