//! # Mock Framework & Testing Guide
//!
//! The `MockClient<T>` type hands out a real `ResourceClient<T>` whose requests are answered
//! from a queue of expectations instead of a running actor. Use it to test logic that sits
//! *around* a client (forwarders, wiring, error mapping) without spawning the actor.
//!
//! ## When to use Mocks vs Real Actors
//!
//! | Feature | MockClient | Real Actor |
//! |---------|------------|------------|
//! | **Determinism** | Scripted responses | Real merge rules |
//! | **Error Injection** | Easy (`return_err`) | Requires crafting bad input |
//! | **Use Case** | Code that *calls* a client | The entity's merge policy itself |
//!
//! ## Two styles
//!
//! - [`MockClient`]: fluent expectations (`expect_upsert().return_ok(..)`), checked with
//!   [`MockClient::verify`].
//! - [`create_mock_client`] plus the `expect_*` helpers: receive the raw request, assert on
//!   its payload and answer through its responder.
//!
//! ```rust
//! use actor_framework::mock::MockClient;
//! use actor_framework::{ActorEntity, FrameworkError, UpdateOutcome};
//!
//! #[derive(Clone, Debug)] struct Beacon { id: u32 }
//! #[derive(Debug)] struct BeaconSeen { id: u32 }
//! #[derive(Debug, thiserror::Error)] #[error("beacon")] struct BeaconError;
//!
//! impl ActorEntity for Beacon {
//!     type Id = u32; type Update = BeaconSeen; type Batch = (); type Context = ();
//!     type Error = BeaconError;
//!     fn key(u: &BeaconSeen) -> Result<u32, BeaconError> { Ok(u.id) }
//!     fn from_update(id: u32, _: BeaconSeen, _: &()) -> Result<Self, BeaconError> { Ok(Self { id }) }
//!     fn on_update(&mut self, _: BeaconSeen, _: &()) -> Result<UpdateOutcome, BeaconError> {
//!         Ok(UpdateOutcome::Unchanged)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut mock = MockClient::<Beacon>::new();
//!     mock.expect_upsert().return_err(FrameworkError::ActorClosed);
//!
//!     let result = mock.client().upsert(BeaconSeen { id: 1 }).await;
//!     assert!(matches!(result, Err(FrameworkError::ActorClosed)));
//!     mock.verify();
//! }
//! ```

use crate::client::ResourceClient;
use crate::entity::{ActorEntity, UpdateOutcome};
use crate::error::FrameworkError;
use crate::message::{ResourceRequest, SyncReport};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

enum Expectation<T: ActorEntity> {
    Upsert {
        response: Result<UpdateOutcome, FrameworkError>,
    },
    Sync {
        response: Result<SyncReport, FrameworkError>,
    },
    Get {
        response: Result<Option<T>, FrameworkError>,
    },
    List {
        response: Result<Vec<T>, FrameworkError>,
    },
}

type Expectations<T> = Arc<Mutex<VecDeque<Expectation<T>>>>;

/// A mock client with expectation tracking for fluent testing.
pub struct MockClient<T: ActorEntity> {
    client: ResourceClient<T>,
    expectations: Expectations<T>,
    _handle: tokio::task::JoinHandle<()>,
}

impl<T: ActorEntity> Default for MockClient<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ActorEntity> MockClient<T> {
    /// Creates a new mock client with no expectations.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::channel::<ResourceRequest<T>>(100);
        let expectations: Expectations<T> = Arc::new(Mutex::new(VecDeque::new()));
        let queue = expectations.clone();

        let handle = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                let expectation = queue.lock().unwrap().pop_front();

                match (request, expectation) {
                    (
                        ResourceRequest::Upsert { respond_to, .. },
                        Some(Expectation::Upsert { response }),
                    ) => {
                        let _ = respond_to.send(response);
                    }
                    (
                        ResourceRequest::Sync { respond_to, .. },
                        Some(Expectation::Sync { response }),
                    ) => {
                        let _ = respond_to.send(response);
                    }
                    (
                        ResourceRequest::Get { respond_to, .. },
                        Some(Expectation::Get { response }),
                    ) => {
                        let _ = respond_to.send(response);
                    }
                    (
                        ResourceRequest::List { respond_to, .. },
                        Some(Expectation::List { response }),
                    ) => {
                        let _ = respond_to.send(response);
                    }
                    _ => {
                        panic!("Unexpected request or expectation mismatch");
                    }
                }
            }
        });

        Self {
            client: ResourceClient::new(sender),
            expectations,
            _handle: handle,
        }
    }

    /// Returns the client for use in tests.
    pub fn client(&self) -> ResourceClient<T> {
        self.client.clone()
    }

    /// Expects an `upsert` operation.
    pub fn expect_upsert(&mut self) -> ExpectationBuilder<T, UpdateOutcome> {
        ExpectationBuilder::new(self.expectations.clone(), |response| {
            Expectation::Upsert { response }
        })
    }

    /// Expects a `sync` operation.
    pub fn expect_sync(&mut self) -> ExpectationBuilder<T, SyncReport> {
        ExpectationBuilder::new(self.expectations.clone(), |response| {
            Expectation::Sync { response }
        })
    }

    /// Expects a `get` operation.
    pub fn expect_get(&mut self) -> ExpectationBuilder<T, Option<T>> {
        ExpectationBuilder::new(self.expectations.clone(), |response| {
            Expectation::Get { response }
        })
    }

    /// Expects a `list` operation.
    pub fn expect_list(&mut self) -> ExpectationBuilder<T, Vec<T>> {
        ExpectationBuilder::new(self.expectations.clone(), |response| {
            Expectation::List { response }
        })
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let remaining = self.expectations.lock().unwrap().len();
        if remaining != 0 {
            panic!("Not all expectations were met. {} remaining", remaining);
        }
    }
}

/// Builder that queues one expectation with its canned response.
pub struct ExpectationBuilder<T: ActorEntity, R> {
    expectations: Expectations<T>,
    wrap: fn(Result<R, FrameworkError>) -> Expectation<T>,
}

impl<T: ActorEntity, R> ExpectationBuilder<T, R> {
    fn new(
        expectations: Expectations<T>,
        wrap: fn(Result<R, FrameworkError>) -> Expectation<T>,
    ) -> Self {
        Self { expectations, wrap }
    }

    /// Sets the expectation to return a successful result.
    pub fn return_ok(self, value: R) {
        self.expectations
            .lock()
            .unwrap()
            .push_back((self.wrap)(Ok(value)));
    }

    /// Sets the expectation to return an error.
    pub fn return_err(self, error: FrameworkError) {
        self.expectations
            .lock()
            .unwrap()
            .push_back((self.wrap)(Err(error)));
    }
}

// =============================================================================
// RAW REQUEST HELPERS
// =============================================================================

/// Creates a client and the receiver its requests arrive on.
///
/// Tests drive the "actor side" by hand: pull the next request with one of the
/// `expect_*` helpers, assert on its payload and answer through the responder.
pub fn create_mock_client<T: ActorEntity>(
    buffer_size: usize,
) -> (ResourceClient<T>, mpsc::Receiver<ResourceRequest<T>>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (ResourceClient::new(sender), receiver)
}

/// Helper to verify that the next message is an Upsert request
pub async fn expect_upsert<T: ActorEntity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(
    T::Update,
    oneshot::Sender<Result<UpdateOutcome, FrameworkError>>,
)> {
    match receiver.recv().await {
        Some(ResourceRequest::Upsert { update, respond_to }) => Some((update, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a Sync request
pub async fn expect_sync<T: ActorEntity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(
    T::Batch,
    Vec<T::Update>,
    oneshot::Sender<Result<SyncReport, FrameworkError>>,
)> {
    match receiver.recv().await {
        Some(ResourceRequest::Sync {
            batch,
            updates,
            respond_to,
        }) => Some((batch, updates, respond_to)),
        _ => None,
    }
}
