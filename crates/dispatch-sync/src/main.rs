//! Demo binary: runs the dispatch engine against a replayed GPS track.
//!
//! ```bash
//! RUST_LOG=info cargo run -p dispatch-sync
//! DISPATCH_WS_URL=ws://localhost:8080/ws DISPATCH_USER_ID=7 cargo run -p dispatch-sync
//! ```

use actor_framework::tracing::setup_tracing;
use dispatch_sync::config::DispatchConfig;
use dispatch_sync::geo::ReplayPositionProvider;
use dispatch_sync::lifecycle::DispatchSystem;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Instrument};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();
    setup_tracing();

    let config = DispatchConfig::from_env()?;
    info!(api = %config.api_base_url, ws = %config.ws_url, "Starting dispatch demo");

    let center = config.default_center;
    let provider = Arc::new(ReplayPositionProvider::walk(
        center,
        45.0,
        12.0,
        120,
        Duration::from_secs(1),
    ));
    let system = DispatchSystem::start(&config, provider).await?;

    let dropoff = center.offset(45.0, 5_000.0);
    let span = tracing::info_span!("demo_quote");
    match system
        .pricing
        .quote_trip(&[center, dropoff])
        .instrument(span)
        .await
    {
        Ok(trip) => {
            for quote in &trip.quotes {
                info!(tariff = %quote.tariff_id, price = %quote.price, km = trip.route.distance_km, "Quote");
            }
        }
        Err(e) => error!(error = %e, "Quote failed"),
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = tokio::time::sleep(Duration::from_secs(60)) => info!("Demo finished"),
    }

    match system.orders.active_orders().await {
        Ok(orders) => info!(count = orders.len(), "Active orders at exit"),
        Err(e) => error!(error = %e, "Could not read orders"),
    }
    match system.session.presence().await {
        Ok(status) => info!(%status, "Presence at exit"),
        Err(e) => error!(error = %e, "Session unavailable"),
    }

    system.shutdown().await?;
    info!("Demo completed");
    Ok(())
}
