//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter driven by `RUST_LOG`.
//! Actors log with an `entity_type` field instead of module paths, so targets are hidden.
//!
//! ```bash
//! RUST_LOG=info cargo run      # lifecycle, upserts, syncs
//! RUST_LOG=debug cargo run     # full payloads and every Get/List
//! ```
//!
//! With `RUST_LOG=info` a reconciliation turn reads like:
//!
//! ```text
//! INFO Actor started entity_type="OrderRecord"
//! INFO Synced entity_type="OrderRecord" created=2 applied=0 stale=0 rejected=0 retired=0 size=2
//! INFO Upserted entity_type="OrderRecord" id=17 outcome=Applied size=2
//! ```

/// Initializes the global subscriber. Falls back to `info` when `RUST_LOG` is unset.
///
/// Calling it twice is harmless: the second installation attempt is ignored.
pub fn setup_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
