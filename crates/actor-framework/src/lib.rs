//! # Actor Framework
//!
//! This crate provides the building blocks for keyed, single-writer state stores built on
//! the **Actor Model**. A `ResourceActor<T>` owns a map of records, receives observations
//! about them over a channel and lets each record decide how to merge what it is told.
//!
//! ## Why an actor for a store?
//!
//! State that is fed by several independent streams (a periodic snapshot and a push
//! socket, for instance) needs one place where writes are serialised. An actor gives us:
//!
//! - Isolated state (no shared memory, no locks)
//! - Message-passing concurrency between producers
//! - Whole-message atomicity: a batch is applied inside a single turn, so readers never
//!   see half of it
//!
//! **Further Reading**:
//! - [Actor Model (Wikipedia)](https://en.wikipedia.org/wiki/Actor_model)
//! - [Actors in Rust](https://ryhl.io/blog/actors-with-tokio/) - Practical guide to implementing actors with Tokio
//!
//! ## Architecture Overview
//!
//! 1. **Entity Layer** ([`ActorEntity`]) - keying and merge policy for one record type
//! 2. **Runtime Layer** ([`ResourceActor`]) - message processing, insertion order, batch sync
//! 3. **Interface Layer** ([`ResourceClient`], [`ActorClient`]) - type-safe communication
//!
//! ## Example
//!
//! ```rust
//! use actor_framework::{ActorEntity, ResourceActor, UpdateOutcome};
//!
//! #[derive(Clone, Debug)]
//! struct Reading { sensor: String, value: f64, seq: u64 }
//!
//! #[derive(Debug)]
//! struct ReadingUpdate { sensor: String, value: f64, seq: u64 }
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("reading error")]
//! struct ReadingError;
//!
//! impl ActorEntity for Reading {
//!     type Id = String;
//!     type Update = ReadingUpdate;
//!     type Batch = ();
//!     type Context = ();
//!     type Error = ReadingError;
//!
//!     fn key(update: &ReadingUpdate) -> Result<String, ReadingError> {
//!         Ok(update.sensor.clone())
//!     }
//!
//!     fn from_update(id: String, update: ReadingUpdate, _: &()) -> Result<Self, ReadingError> {
//!         Ok(Self { sensor: id, value: update.value, seq: update.seq })
//!     }
//!
//!     fn on_update(&mut self, update: ReadingUpdate, _: &()) -> Result<UpdateOutcome, ReadingError> {
//!         if update.seq < self.seq {
//!             return Ok(UpdateOutcome::Stale);
//!         }
//!         self.value = update.value;
//!         self.seq = update.seq;
//!         Ok(UpdateOutcome::Applied)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let (actor, client) = ResourceActor::<Reading>::new(10);
//!     tokio::spawn(actor.run(()));
//!
//!     let update = ReadingUpdate { sensor: "t1".into(), value: 20.5, seq: 2 };
//!     client.upsert(update).await.unwrap();
//!
//!     let late = ReadingUpdate { sensor: "t1".into(), value: 19.0, seq: 1 };
//!     assert_eq!(client.upsert(late).await.unwrap(), UpdateOutcome::Stale);
//!
//!     let reading = client.get("t1".to_string()).await.unwrap().unwrap();
//!     assert_eq!(reading.value, 20.5);
//! }
//! ```
//!
//! ## Concurrency Model
//!
//! - Each actor runs in its own Tokio task
//! - Messages are processed **sequentially** within an actor
//! - The actor exits once every client has been dropped
//!
//! ## Testing
//!
//! See the [`mock`] module for a scripted `MockClient` and raw request helpers.

pub mod actor;
pub mod client;
pub mod client_trait;
pub mod entity;
pub mod error;
pub mod message;
pub mod mock;
pub mod tracing;

// Re-export core types for convenience
pub use actor::ResourceActor;
pub use client::ResourceClient;
pub use client_trait::ActorClient;
pub use entity::{ActorEntity, UpdateOutcome};
pub use error::FrameworkError;
pub use message::{ListFilter, ResourceRequest, Response, SyncReport};
