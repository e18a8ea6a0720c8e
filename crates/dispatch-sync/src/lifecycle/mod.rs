//! # System Lifecycle & Orchestration
//!
//! Individual services are simple actors; wiring them together is where the complexity
//! lives. [`DispatchSystem`] is the conductor:
//!
//! 1. **Creation** - every actor is created with its client; none knows about another.
//! 2. **Wiring** - event streams (tracker samples, socket frames, snapshots) are handed to
//!    the [`session`] actor, the only component that talks to more than one service.
//! 3. **Start-up** - connect the socket, open the location watch, arm the poller and
//!    register the driver. Unreachable backends are logged, not fatal; the session
//!    redials the socket until it opens.
//! 4. **Shutdown** - stop the services, stop the session, close the socket, drop every
//!    client, await every task.
//!
//! ```rust,no_run
//! use dispatch_sync::config::DispatchConfig;
//! use dispatch_sync::geo::ReplayPositionProvider;
//! use dispatch_sync::lifecycle::DispatchSystem;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = DispatchConfig::from_env()?;
//! let provider = Arc::new(ReplayPositionProvider::walk(
//!     config.default_center, 45.0, 10.0, 60, Duration::from_secs(1),
//! ));
//! let system = DispatchSystem::start(&config, provider).await?;
//! let active = system.orders.active_orders().await?;
//! println!("{} active orders", active.len());
//! system.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Graceful shutdown
//!
//! Each actor leaves its loop when its last client is dropped. The session holds clones
//! of the order and channel clients, so the dependency graph stays acyclic. It is
//! stopped and awaited first so that no redial can reopen the socket after `close`.

pub mod dispatch_system;
pub mod error;
pub mod session;

pub use dispatch_system::*;
pub use error::*;
pub use session::{DispatchSession, Redial, SessionClient, SessionInputs};
