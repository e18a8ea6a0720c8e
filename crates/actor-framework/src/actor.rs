//! # Generic Actor Server
//!
//! This module defines the `ResourceActor`, the component that owns a keyed collection
//! of records. It implements the "Server" side of the Actor Model, processing messages
//! sequentially and ensuring exclusive access to the store.

use crate::client::ResourceClient;
use crate::entity::{ActorEntity, UpdateOutcome};
use crate::error::FrameworkError;
use crate::message::{ListFilter, ResourceRequest, SyncReport};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The generic actor that manages a keyed collection of records.
///
/// # Architecture Note
/// This struct is the "Server" half of the actor. It owns the state (`store`), the
/// first-arrival index (`arrival`) and the receiver end of the channel.
///
/// **Concurrency Model**:
/// The actor processes its own messages *sequentially* in a loop, so the store needs no
/// `Mutex` or `RwLock`. Several producers (a poller, a socket reader, ...) can share one
/// client and the actor serialises their writes.
///
/// # Implementation Details
///
/// * **Upsert**:
///     1. Extracts the id with `T::key`.
///     2. Unknown id: builds the record with `T::from_update`, stores it and appends the id
///        to the arrival index.
///     3. Known id: runs `on_update` on a scratch copy and commits the copy only if the hook
///        succeeded.
///
/// * **Sync**: upserts every entry of the batch in order, then calls `on_absent` for each
///   stored record the batch did not mention.
///
/// * **List**: walks the arrival index so callers get a stable, insertion-ordered view.
///
/// Records are never removed; entities express deletion through `is_live`.
pub struct ResourceActor<T: ActorEntity> {
    receiver: mpsc::Receiver<ResourceRequest<T>>,
    store: HashMap<T::Id, T>,
    arrival: Vec<T::Id>,
}

impl<T: ActorEntity> ResourceActor<T> {
    /// Creates a new `ResourceActor` and its associated `ResourceClient`.
    ///
    /// # Arguments
    ///
    /// * `buffer_size` - The capacity of the MPSC channel. If the channel is full,
    ///   calls to the client will wait until there is space.
    pub fn new(buffer_size: usize) -> (Self, ResourceClient<T>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            store: HashMap::new(),
            arrival: Vec::new(),
        };
        let client = ResourceClient::new(sender);
        (actor, client)
    }

    /// Runs the actor's event loop, processing messages until every client is dropped.
    ///
    /// # Context Injection
    /// The `context` argument is passed to every entity hook.
    pub async fn run(mut self, context: T::Context) {
        let entity_type = std::any::type_name::<T>()
            .split("::")
            .last()
            .unwrap_or("Unknown");
        info!(entity_type, "Actor started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                ResourceRequest::Upsert { update, respond_to } => {
                    debug!(entity_type, ?update, "Upsert");
                    let result = match self.upsert(update, &context) {
                        Ok((id, outcome)) => {
                            info!(entity_type, %id, ?outcome, size = self.store.len(), "Upserted");
                            Ok(outcome)
                        }
                        Err(e) => {
                            warn!(entity_type, error = %e, "Upsert rejected");
                            Err(FrameworkError::EntityError(Box::new(e)))
                        }
                    };
                    let _ = respond_to.send(result);
                }
                ResourceRequest::Sync {
                    batch,
                    updates,
                    respond_to,
                } => {
                    debug!(entity_type, ?batch, entries = updates.len(), "Sync");
                    let report = self.sync(&batch, updates, &context, entity_type);
                    info!(
                        entity_type,
                        created = report.created,
                        applied = report.applied,
                        stale = report.stale,
                        rejected = report.rejected,
                        retired = report.retired,
                        size = self.store.len(),
                        "Synced"
                    );
                    let _ = respond_to.send(Ok(report));
                }
                ResourceRequest::Get { id, respond_to } => {
                    let item = self.store.get(&id).cloned();
                    let found = item.is_some();
                    debug!(entity_type, %id, found, "Get");
                    let _ = respond_to.send(Ok(item));
                }
                ResourceRequest::List { filter, respond_to } => {
                    let items = self.list(filter);
                    debug!(entity_type, ?filter, count = items.len(), "List");
                    let _ = respond_to.send(Ok(items));
                }
            }
        }

        info!(entity_type, size = self.store.len(), "Shutdown");
    }

    fn upsert(
        &mut self,
        update: T::Update,
        context: &T::Context,
    ) -> Result<(T::Id, UpdateOutcome), T::Error> {
        let id = T::key(&update)?;
        match self.store.get_mut(&id) {
            Some(item) => {
                let mut next = item.clone();
                let outcome = next.on_update(update, context)?;
                if outcome == UpdateOutcome::Applied {
                    *item = next;
                }
                Ok((id, outcome))
            }
            None => {
                let item = T::from_update(id.clone(), update, context)?;
                self.store.insert(id.clone(), item);
                self.arrival.push(id.clone());
                Ok((id, UpdateOutcome::Created))
            }
        }
    }

    fn sync(
        &mut self,
        batch: &T::Batch,
        updates: Vec<T::Update>,
        context: &T::Context,
        entity_type: &str,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        let mut seen = HashSet::new();

        for update in updates {
            match self.upsert(update, context) {
                Ok((id, outcome)) => {
                    seen.insert(id);
                    report.record(outcome);
                }
                Err(e) => {
                    warn!(entity_type, error = %e, "Sync entry rejected");
                    report.rejected += 1;
                }
            }
        }

        for id in &self.arrival {
            if seen.contains(id) {
                continue;
            }
            if let Some(item) = self.store.get_mut(id) {
                let outcome = item.on_absent(batch, context);
                if outcome == UpdateOutcome::Retired {
                    debug!(entity_type, %id, "Retired");
                }
                report.record(outcome);
            }
        }

        report
    }

    fn list(&self, filter: ListFilter) -> Vec<T> {
        self.arrival
            .iter()
            .filter_map(|id| self.store.get(id))
            .filter(|item| filter == ListFilter::All || item.is_live())
            .cloned()
            .collect()
    }
}
