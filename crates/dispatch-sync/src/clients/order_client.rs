//! # Order Client
//!
//! Provides a high-level API for interacting with the order reconciler.
//! It wraps a `ResourceClient<OrderRecord>` and stamps every patch with the stream it
//! came from before it reaches the actor.
use crate::model::{OrderId, OrderObservation, OrderPatch, OrderRecord, Snapshot};
use crate::order_actor::OrderError;
use actor_framework::{ActorClient, FrameworkError, ResourceClient, SyncReport, UpdateOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

/// Client for interacting with the Order actor.
#[derive(Clone)]
pub struct OrderClient {
    inner: ResourceClient<OrderRecord>,
}

impl OrderClient {
    pub fn new(inner: ResourceClient<OrderRecord>) -> Self {
        Self { inner }
    }

    /// Applies a full snapshot in one actor turn.
    ///
    /// Entries without an id are counted as `rejected` in the report; the rest of the
    /// snapshot still applies.
    #[instrument(skip(self, snapshot), fields(entries = snapshot.records.len(), fetched_at = %snapshot.fetched_at))]
    pub async fn apply_snapshot(&self, snapshot: Snapshot) -> Result<SyncReport, OrderError> {
        debug!("Sending request");
        let meta = snapshot.meta();
        let updates = snapshot
            .records
            .into_iter()
            .map(|patch| OrderObservation::snapshot(patch, meta.fetched_at))
            .collect();
        self.inner
            .sync(meta, updates)
            .await
            .map_err(Self::map_error)
    }

    /// Applies one pushed patch, stamped with the current time.
    pub async fn apply_delta(&self, patch: OrderPatch) -> Result<UpdateOutcome, OrderError> {
        self.apply_delta_at(patch, Utc::now()).await
    }

    /// Applies one pushed patch received at `received_at`.
    #[instrument(skip(self, patch), fields(id = ?patch.id))]
    pub async fn apply_delta_at(
        &self,
        patch: OrderPatch,
        received_at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, OrderError> {
        debug!("Sending request");
        if patch.id.is_none() {
            return Err(OrderError::MissingId);
        }
        self.inner
            .upsert(OrderObservation::delta(patch, received_at))
            .await
            .map_err(Self::map_error)
    }

    /// Orders that are neither canceled nor retired, in first-arrival order.
    pub async fn active_orders(&self) -> Result<Vec<OrderRecord>, OrderError> {
        self.list_live().await
    }

    /// Like [`ActorClient::get`], but a missing order is an error.
    pub async fn require(&self, id: OrderId) -> Result<OrderRecord, OrderError> {
        self.get(id.clone())
            .await?
            .ok_or_else(|| OrderError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl ActorClient<OrderRecord> for OrderClient {
    type Error = OrderError;

    fn inner(&self) -> &ResourceClient<OrderRecord> {
        &self.inner
    }

    fn map_error(e: FrameworkError) -> Self::Error {
        OrderError::ActorCommunicationError(e.to_string())
    }
}
