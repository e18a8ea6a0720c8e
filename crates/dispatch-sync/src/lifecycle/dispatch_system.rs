use crate::api::{DriverRegistration, RestClient};
use crate::channel::{self, ChannelClient};
use crate::clients::OrderClient;
use crate::config::DispatchConfig;
use crate::geo::{self, PermissionCache, PositionProvider, TrackerClient};
use crate::lifecycle::session::{self, SessionClient, SessionInputs};
use crate::lifecycle::DispatchError;
use crate::order_actor;
use crate::poller::{OrderFeed, OrderSnapshotPoller, PollerClient};
use crate::pricing::{OrsRoutePlanner, PricingEngine, RoutePlanner, StraightLinePlanner};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// External collaborators the system talks to.
///
/// [`DispatchSystem::start`] builds these from the config; tests hand in fakes through
/// [`DispatchSystem::start_with`].
pub struct Services {
    pub provider: Arc<dyn PositionProvider>,
    pub feed: Arc<dyn OrderFeed>,
    pub planner: Arc<dyn RoutePlanner>,
    /// REST backend for registration and the presence fallback.
    pub api: Option<RestClient>,
}

impl Services {
    pub fn from_config(config: &DispatchConfig, provider: Arc<dyn PositionProvider>) -> Self {
        let api = RestClient::new(config.api_base_url.clone());
        let planner: Arc<dyn RoutePlanner> = match &config.routing_api_key {
            Some(key) => Arc::new(OrsRoutePlanner::new_with_base_url(
                key.clone(),
                config.routing_base_url.clone(),
            )),
            None => Arc::new(StraightLinePlanner),
        };
        Self {
            provider,
            feed: Arc::new(api.clone()),
            planner,
            api: Some(api),
        }
    }
}

/// The running dispatch engine: every actor spawned and wired together.
///
/// ```text
/// tracker ──TrackerEvent──▶ ┐
/// channel ──ChannelEvent──▶ ├─▶ session ──▶ orders (ResourceActor<OrderRecord>)
/// poller ──SnapshotEvent──▶ ┘         └──▶ channel (register, getStatus, location)
/// ```
pub struct DispatchSystem {
    pub orders: OrderClient,
    pub tracker: TrackerClient,
    pub channel: ChannelClient,
    pub poller: PollerClient,
    pub session: SessionClient,
    pub pricing: PricingEngine,
    pub api: Option<RestClient>,

    session_handle: JoinHandle<()>,
    /// Remaining actor tasks, awaited on shutdown.
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl DispatchSystem {
    /// Starts the system against the real backend described by `config`.
    pub async fn start(
        config: &DispatchConfig,
        provider: Arc<dyn PositionProvider>,
    ) -> Result<Self, DispatchError> {
        let services = Services::from_config(config, provider);
        Self::start_with(config, services).await
    }

    /// Spawns every actor, wires the event streams into the session and brings the
    /// services up. A backend that cannot be reached yet is not an error: the session
    /// keeps redialing the socket and the poller keeps fetching on every tick.
    pub async fn start_with(
        config: &DispatchConfig,
        services: Services,
    ) -> Result<Self, DispatchError> {
        info!(user_id = config.user_id, "Starting dispatch system");

        let permission = match &config.permission_cache_path {
            Some(path) => PermissionCache::load(path.clone()).await,
            None => PermissionCache::in_memory(),
        };

        let (order_actor, orders) = order_actor::new();
        let order_handle = tokio::spawn(order_actor.run(()));

        let (channel_actor, channel, channel_events) = channel::new(config.reconnect());
        let channel_handle = tokio::spawn(channel_actor.run());

        let (tracker_actor, tracker) = geo::new(services.provider, config.tracker(), permission);
        let tracker_handle = tokio::spawn(tracker_actor.run());

        let (snapshot_tx, snapshot_rx) = mpsc::channel(8);
        let (poller_actor, poller) = OrderSnapshotPoller::new(services.feed, snapshot_tx);
        let poller_handle = tokio::spawn(poller_actor.run());

        let (tracker_tx, tracker_rx) = mpsc::channel(64);
        let (session_actor, session) = session::new(
            config.identity(),
            orders.clone(),
            channel.clone(),
            services.api.clone(),
            config.redial(),
            SessionInputs {
                channel: channel_events,
                tracker: tracker_rx,
                snapshots: snapshot_rx,
            },
        );
        let session_handle = tokio::spawn(session_actor.run());

        let system = Self {
            orders,
            tracker,
            channel,
            poller,
            session,
            pricing: PricingEngine::new(services.planner),
            api: services.api,
            session_handle,
            handles: vec![
                ("poller", poller_handle),
                ("tracker", tracker_handle),
                ("channel", channel_handle),
                ("orders", order_handle),
            ],
        };

        if let Err(e) = system.session.connect_channel().await {
            warn!(url = %config.ws_url, error = %e, "Channel not available yet, redialing");
        }

        match system.tracker.start(tracker_tx).await {
            Ok(()) => {}
            Err(e) if e.is_transient() => warn!(error = %e, "Tracker started without a fix"),
            Err(e) => warn!(error = %e, "Location tracking unavailable"),
        }

        system.poller.start_polling(config.poll_interval()).await?;

        if let Some(api) = &system.api {
            let registration = DriverRegistration {
                identity: config.identity(),
                location: None,
            };
            if let Err(e) = api.register_driver(&registration).await {
                warn!(error = %e, "Driver registration failed");
            }
        }

        info!("Dispatch system running");
        Ok(system)
    }

    /// Stops every service, closes the socket and waits for all actor tasks.
    pub async fn shutdown(self) -> Result<(), DispatchError> {
        info!("Shutting down dispatch system");

        if let Err(e) = self.poller.stop_polling().await {
            warn!(error = %e, "Poller already gone");
        }
        if let Err(e) = self.tracker.stop().await {
            warn!(error = %e, "Tracker already gone");
        }

        // the session may redial, so it stops before the socket is closed
        drop(self.session);
        join("session", self.session_handle).await?;

        if let Err(e) = self.channel.close().await {
            warn!(error = %e, "Channel already gone");
        }

        // actors exit once their last client is dropped
        drop(self.poller);
        drop(self.tracker);
        drop(self.channel);
        drop(self.orders);

        for (name, handle) in self.handles {
            join(name, handle).await?;
        }

        info!("Dispatch system stopped");
        Ok(())
    }
}

async fn join(name: &'static str, handle: JoinHandle<()>) -> Result<(), DispatchError> {
    handle.await.map_err(|e| {
        error!(actor = name, error = %e, "Actor task failed");
        DispatchError::TaskFailed(format!("{name}: {e}"))
    })
}
