//! # Generic Messages
//!
//! This module defines the generic message types used for communication between
//! the `ResourceClient` and `ResourceActor`.

use crate::entity::{ActorEntity, UpdateOutcome};
use crate::error::FrameworkError;
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by actors.
pub type Response<T> = oneshot::Sender<Result<T, FrameworkError>>;

/// Which records a `List` request returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
    /// Every stored record, live or not.
    All,
    /// Only records whose [`ActorEntity::is_live`] returns `true`.
    Live,
}

/// Per-batch tally returned by a `Sync` request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub applied: usize,
    pub stale: usize,
    pub rejected: usize,
    pub retired: usize,
}

impl SyncReport {
    pub(crate) fn record(&mut self, outcome: UpdateOutcome) {
        match outcome {
            UpdateOutcome::Created => self.created += 1,
            UpdateOutcome::Applied => self.applied += 1,
            UpdateOutcome::Stale => self.stale += 1,
            UpdateOutcome::Retired => self.retired += 1,
            UpdateOutcome::Unchanged => {}
        }
    }
}

/// Internal message type sent to the actor to request operations.
///
/// # Keyed-Store Pattern
/// Every request is processed entirely within one turn of the actor loop:
///
/// - **Upsert**: route one observation to its record (create or merge).
/// - **Sync**: apply a full batch, then give unmentioned records the `on_absent` hook.
/// - **Get**: fetch one record by id.
/// - **List**: fetch records in first-arrival order.
///
/// Because a turn is never interleaved with another, readers can never observe a
/// batch that has been only partially applied.
#[derive(Debug)]
pub enum ResourceRequest<T: ActorEntity> {
    Upsert {
        update: T::Update,
        respond_to: Response<UpdateOutcome>,
    },
    Sync {
        batch: T::Batch,
        updates: Vec<T::Update>,
        respond_to: Response<SyncReport>,
    },
    Get {
        id: T::Id,
        respond_to: Response<Option<T>>,
    },
    List {
        filter: ListFilter,
        respond_to: Response<Vec<T>>,
    },
}
