//! # Order Reconciler Actor
//!
//! Hosts every known [`OrderRecord`] in a `ResourceActor` and merges the two streams that
//! describe them: the periodic snapshot and socket deltas.
//!
//! ## Structure
//!
//! - [`entity`] - [`ActorEntity`](actor_framework::ActorEntity) implementation for [`OrderRecord`]
//! - [`error`] - [`OrderError`] type
//! - [`new()`] - Factory function that creates the actor and client
//!
//! ## Usage
//!
//! ```rust
//! use dispatch_sync::model::OrderPatch;
//! use dispatch_sync::order_actor;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (actor, client) = order_actor::new();
//!     tokio::spawn(actor.run(()));
//!
//!     let mut patch = OrderPatch::with_id("42");
//!     patch.pickup = Some("Vokzalnaya 1".into());
//!     client.apply_delta(patch).await?;
//!
//!     assert_eq!(client.active_orders().await?.len(), 1);
//!     Ok(())
//! }
//! ```

pub mod entity;
pub mod error;

pub use error::*;

use crate::clients::OrderClient;
use crate::model::OrderRecord;
use actor_framework::ResourceActor;

/// Creates a new Order actor and its client.
pub fn new() -> (ResourceActor<OrderRecord>, OrderClient) {
    let (actor, generic_client) = ResourceActor::new(64);
    let client = OrderClient::new(generic_client);

    (actor, client)
}
