//! # Dispatch Sync
//!
//! Live synchronization engine for a ride-hailing client: driver location tracking, a
//! push socket to the dispatch backend, periodic order snapshots reconciled with socket
//! deltas, route-based fare quotes and the host action button.
//!
//! - [`geo`], [`channel`], [`poller`] - the three live services, each an actor
//! - [`order_actor`] / [`clients`] - the order reconciler on top of `actor_framework`
//! - [`pricing`], [`geocode`], [`api`] - external lookups and the REST backend
//! - [`button`], [`presence`] - user-facing state machines
//! - [`booking`] - the passenger order form, confirmed through the button
//! - [`lifecycle`] - starts, wires and stops all of the above
//!
//! ## Testing
//!
//! See [`actor_framework::mock`] for utilities to test clients without spawning full actors.

pub mod api;
pub mod booking;
pub mod button;
pub mod channel;
pub mod clients;
pub mod config;
pub mod geo;
pub mod geocode;
pub mod lifecycle;
pub mod model;
pub mod order_actor;
pub mod poller;
pub mod pricing;
pub mod presence;
