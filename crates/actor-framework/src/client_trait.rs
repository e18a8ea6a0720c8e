//! # ActorClient Trait
//!
//! Provides a common interface for record-specific clients, adding default `get`, `list_live`
//! and `list_all` methods built on top of a generic `ResourceClient`.
use crate::{ActorEntity, FrameworkError, ListFilter, ResourceClient};
use async_trait::async_trait;

/// Trait for record-specific clients to inherit the standard read operations.
///
/// Domain clients keep their own write methods (they usually need to stamp or
/// validate observations first) and get reads for free.
///
/// # Example
///
/// ```rust
/// use actor_framework::{ActorClient, ActorEntity, FrameworkError, ResourceClient, UpdateOutcome};
/// use async_trait::async_trait;
///
/// #[derive(Clone, Debug)]
/// struct Beacon { id: u32 }
/// #[derive(Debug)] struct BeaconSeen { id: u32 }
/// #[derive(Debug, thiserror::Error)] #[error("{0}")] struct BeaconError(String);
///
/// impl From<String> for BeaconError {
///     fn from(s: String) -> Self { BeaconError(s) }
/// }
///
/// impl ActorEntity for Beacon {
///     type Id = u32;
///     type Update = BeaconSeen;
///     type Batch = ();
///     type Context = ();
///     type Error = BeaconError;
///
///     fn key(update: &BeaconSeen) -> Result<u32, BeaconError> { Ok(update.id) }
///     fn from_update(id: u32, _: BeaconSeen, _: &()) -> Result<Self, BeaconError> { Ok(Self { id }) }
///     fn on_update(&mut self, _: BeaconSeen, _: &()) -> Result<UpdateOutcome, BeaconError> {
///         Ok(UpdateOutcome::Unchanged)
///     }
/// }
///
/// struct BeaconClient {
///     inner: ResourceClient<Beacon>,
/// }
///
/// #[async_trait]
/// impl ActorClient<Beacon> for BeaconClient {
///     type Error = BeaconError;
///
///     fn inner(&self) -> &ResourceClient<Beacon> {
///         &self.inner
///     }
///
///     fn map_error(e: FrameworkError) -> Self::Error {
///         BeaconError(e.to_string())
///     }
/// }
///
/// async fn usage(client: BeaconClient) {
///     // get() and list_live() are provided automatically
///     let _ = client.get(1).await;
///     let _ = client.list_live().await;
/// }
/// ```
#[async_trait]
pub trait ActorClient<T: ActorEntity>: Send + Sync {
    /// The record-specific error type.
    type Error: From<String> + Send + Sync;

    /// Access the inner generic ResourceClient.
    fn inner(&self) -> &ResourceClient<T>;

    /// Map framework errors to the specific error type.
    fn map_error(e: FrameworkError) -> Self::Error;

    /// Fetch a record by ID, live or not.
    #[tracing::instrument(skip(self))]
    async fn get(&self, id: T::Id) -> Result<Option<T>, Self::Error> {
        tracing::debug!("Sending request");
        self.inner().get(id).await.map_err(Self::map_error)
    }

    /// Live records in first-arrival order.
    #[tracing::instrument(skip(self))]
    async fn list_live(&self) -> Result<Vec<T>, Self::Error> {
        tracing::debug!("Sending request");
        self.inner()
            .list(ListFilter::Live)
            .await
            .map_err(Self::map_error)
    }

    /// Every record in first-arrival order.
    #[tracing::instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<T>, Self::Error> {
        tracing::debug!("Sending request");
        self.inner()
            .list(ListFilter::All)
            .await
            .map_err(Self::map_error)
    }
}
