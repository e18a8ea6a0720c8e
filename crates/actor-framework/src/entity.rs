//! # ActorEntity Trait
//!
//! The `ActorEntity` trait defines the contract that every keyed record must implement
//! to be managed by the generic `ResourceActor`. Unlike a classic CRUD store, identities
//! are not generated by the actor: they are carried by the incoming observations
//! themselves (an order id pushed by a server, a sensor name, ...). The actor only
//! routes each observation to the right record and lets the record decide how to merge it.
//!
//! # Architecture Note
//! By defining a contract (`ActorEntity`) that all our record types must satisfy, we can
//! write the `ResourceActor` logic *once*: keying, insertion order, batch sync and
//! liveness filtering. The entity owns the merge policy (timestamp gates, field-level
//! patches), which is where the domain rules actually live.
//!
//! # Provided Methods (Hooks)
//! - [`ActorEntity::on_absent`] - called during a batch sync for records the batch did not mention.
//! - [`ActorEntity::is_live`] - used by [`ListFilter::Live`](crate::message::ListFilter::Live).
//!
//! The defaults leave absent records untouched and treat every record as live.

use std::fmt::{Debug, Display};
use std::hash::Hash;

/// What happened to a record when an observation (or a sync) reached it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The record did not exist and was created from the observation.
    Created,
    /// The observation was merged into the existing record.
    Applied,
    /// The observation was older than the stored record and was discarded.
    Stale,
    /// A batch sync marked the record as no longer listed.
    Retired,
    /// Nothing changed.
    Unchanged,
}

/// Trait that any keyed record must implement to be managed by `ResourceActor`.
///
/// Hooks are synchronous and run inside the actor's message turn. The actor applies
/// them to a scratch copy and commits only on success, so a failing hook never leaves
/// a half-merged record behind.
pub trait ActorEntity: Clone + Send + Sync + 'static {
    /// The unique identifier for this entity.
    type Id: Eq + Hash + Clone + Send + Sync + Display + Debug;

    /// An incoming observation (full or partial) about one record.
    type Update: Send + Sync + Debug;

    /// Metadata describing a full batch (e.g. when a snapshot was fetched).
    /// Use `()` if batches carry no metadata.
    type Batch: Send + Sync + Debug;

    /// The runtime context (dependencies) injected into the actor.
    /// Use `()` if no dependencies are needed.
    type Context: Send + Sync;

    /// The error type for this entity.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Extract the identity an observation refers to.
    fn key(update: &Self::Update) -> Result<Self::Id, Self::Error>;

    /// Build a new record from the first observation seen for `id`.
    fn from_update(
        id: Self::Id,
        update: Self::Update,
        ctx: &Self::Context,
    ) -> Result<Self, Self::Error>;

    /// Merge a later observation into this record.
    fn on_update(
        &mut self,
        update: Self::Update,
        ctx: &Self::Context,
    ) -> Result<UpdateOutcome, Self::Error>;

    /// Called for every stored record that a batch sync did not mention.
    fn on_absent(&mut self, _batch: &Self::Batch, _ctx: &Self::Context) -> UpdateOutcome {
        UpdateOutcome::Unchanged
    }

    /// Whether the record should appear in live listings.
    fn is_live(&self) -> bool {
        true
    }
}
