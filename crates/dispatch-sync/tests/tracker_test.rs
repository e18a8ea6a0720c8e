use async_trait::async_trait;
use chrono::Utc;
use dispatch_sync::geo::{
    self, GeoError, PermissionCache, PermissionDecision, PermissionState, Position,
    PositionProvider, PositionWatch, TrackerClient, TrackerConfig, TrackerEvent, WatchId,
    WatchOptions,
};
use dispatch_sync::model::LatLng;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const START: LatLng = LatLng {
    lat: 60.7076,
    lon: 28.7528,
};

/// Host geolocation stand-in driven by the test.
struct FakeProvider {
    state: PermissionState,
    prompt_answer: PermissionDecision,
    next_id: AtomicU64,
    feed: Mutex<Option<mpsc::Sender<Result<Position, GeoError>>>>,
    opened: AtomicUsize,
    cleared: AtomicUsize,
    one_shots: AtomicUsize,
    prompts: AtomicUsize,
    answers_fix: bool,
}

impl FakeProvider {
    fn new(state: PermissionState, prompt_answer: PermissionDecision) -> Arc<Self> {
        Arc::new(Self {
            state,
            prompt_answer,
            next_id: AtomicU64::new(1),
            feed: Mutex::new(None),
            opened: AtomicUsize::new(0),
            cleared: AtomicUsize::new(0),
            one_shots: AtomicUsize::new(0),
            prompts: AtomicUsize::new(0),
            answers_fix: true,
        })
    }

    /// Denied permission and a host that never answers a one-shot fix.
    fn unanswered_fix() -> Arc<Self> {
        let mut provider = Self::new(PermissionState::Denied, PermissionDecision::Denied);
        if let Some(inner) = Arc::get_mut(&mut provider) {
            inner.answers_fix = false;
        }
        provider
    }

    fn granted() -> Arc<Self> {
        Self::new(PermissionState::Granted, PermissionDecision::Granted)
    }

    async fn push(&self, result: Result<Position, GeoError>) {
        let sender = self.feed.lock().unwrap().clone().expect("watch is open");
        sender.send(result).await.unwrap();
    }

    async fn move_to(&self, point: LatLng) {
        self.push(Ok(fix(point))).await;
    }

    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn cleared(&self) -> usize {
        self.cleared.load(Ordering::SeqCst)
    }
}

fn fix(point: LatLng) -> Position {
    Position {
        coords: point,
        accuracy_m: Some(3.0),
        timestamp: Utc::now(),
    }
}

#[async_trait]
impl PositionProvider for FakeProvider {
    async fn query_permission(&self) -> PermissionState {
        self.state
    }

    async fn request_permission(&self) -> PermissionDecision {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.prompt_answer
    }

    async fn watch_position(&self, _options: WatchOptions) -> Result<PositionWatch, GeoError> {
        let (tx, rx) = mpsc::channel(16);
        *self.feed.lock().unwrap() = Some(tx);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(PositionWatch {
            id: WatchId(self.next_id.fetch_add(1, Ordering::SeqCst)),
            positions: rx,
        })
    }

    async fn clear_watch(&self, _id: WatchId) {
        self.feed.lock().unwrap().take();
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }

    async fn current_position(&self, _options: WatchOptions) -> Result<Position, GeoError> {
        self.one_shots.fetch_add(1, Ordering::SeqCst);
        if !self.answers_fix {
            std::future::pending::<()>().await;
        }
        Ok(fix(START))
    }
}

fn spawn_tracker(
    provider: Arc<FakeProvider>,
    permission: PermissionCache,
) -> (TrackerClient, JoinHandle<()>) {
    let (tracker, client) = geo::new(provider, TrackerConfig::default(), permission);
    (client, tokio::spawn(tracker.run()))
}

async fn next_event(events: &mut mpsc::Receiver<TrackerEvent>) -> TrackerEvent {
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("event in time")
        .expect("tracker running")
}

async fn expect_changed(events: &mut mpsc::Receiver<TrackerEvent>) -> f64 {
    assert!(matches!(next_event(events).await, TrackerEvent::Sample(_)));
    match next_event(events).await {
        TrackerEvent::Changed { displacement_m, .. } => displacement_m,
        other => panic!("expected Changed, got {other:?}"),
    }
}

async fn expect_sample_only(events: &mut mpsc::Receiver<TrackerEvent>) {
    assert!(matches!(next_event(events).await, TrackerEvent::Sample(_)));
    assert!(events.try_recv().is_err(), "no Changed expected");
}

#[tokio::test]
async fn test_changed_compares_consecutive_samples() {
    let provider = FakeProvider::granted();
    let (client, _handle) = spawn_tracker(provider.clone(), PermissionCache::in_memory());
    let (tx, mut events) = mpsc::channel(16);
    client.start(tx).await.unwrap();
    assert_eq!(provider.opened(), 1);

    provider.move_to(START).await;
    assert_eq!(expect_changed(&mut events).await, 0.0);

    // 0.9 m east of the previous sample
    provider.move_to(START.offset(90.0, 0.9)).await;
    expect_sample_only(&mut events).await;

    // 0.2 m west of START: 1.1 m from the previous sample
    provider.move_to(START.offset(270.0, 0.2)).await;
    let displacement_m = expect_changed(&mut events).await;
    assert!((displacement_m - 1.1).abs() < 0.01, "{displacement_m}");

    // creeping in 0.6 m steps never adds up to a change
    let mut at = START.offset(270.0, 0.2);
    for _ in 0..3 {
        at = at.offset(90.0, 0.6);
        provider.move_to(at).await;
        expect_sample_only(&mut events).await;
    }
}

#[tokio::test]
async fn test_denied_permission_takes_single_fix() {
    let provider = FakeProvider::new(PermissionState::Denied, PermissionDecision::Denied);
    let (client, _handle) = spawn_tracker(provider.clone(), PermissionCache::in_memory());
    let (tx, mut events) = mpsc::channel(16);

    client.start(tx).await.unwrap();

    assert!(matches!(next_event(&mut events).await, TrackerEvent::Sample(_)));
    assert!(matches!(next_event(&mut events).await, TrackerEvent::Changed { .. }));
    assert_eq!(provider.one_shots.load(Ordering::SeqCst), 1);
    assert_eq!(provider.opened(), 0);
    assert_eq!(
        client.request_permission().await.unwrap(),
        PermissionDecision::Denied
    );
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_single_fix_times_out() {
    let provider = FakeProvider::unanswered_fix();
    let (client, _handle) = spawn_tracker(provider.clone(), PermissionCache::in_memory());
    let (tx, mut events) = mpsc::channel(16);

    let started = tokio::time::Instant::now();
    client.start(tx).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(started.elapsed() < Duration::from_secs(6));
    assert_eq!(
        next_event(&mut events).await,
        TrackerEvent::Error(GeoError::Timeout)
    );

    // the actor is free again
    assert!(client.stop().await.unwrap());
}

#[tokio::test]
async fn test_unavailable_geolocation_is_unsupported() {
    let provider = FakeProvider::new(PermissionState::Prompt, PermissionDecision::Unavailable);
    let (client, _handle) = spawn_tracker(provider.clone(), PermissionCache::in_memory());
    let (tx, _events) = mpsc::channel(16);

    assert_eq!(client.start(tx).await, Err(GeoError::Unsupported));
    assert_eq!(provider.opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_silent_watch_times_out_and_keeps_waiting() {
    let provider = FakeProvider::granted();
    let (client, _handle) = spawn_tracker(provider.clone(), PermissionCache::in_memory());
    let (tx, mut events) = mpsc::channel(16);
    client.start(tx).await.unwrap();

    let started = tokio::time::Instant::now();
    assert_eq!(
        next_event(&mut events).await,
        TrackerEvent::Error(GeoError::Timeout)
    );
    assert!(started.elapsed() >= Duration::from_secs(5));

    // the watch stays open and still delivers
    provider.move_to(START).await;
    assert!(matches!(next_event(&mut events).await, TrackerEvent::Sample(_)));
    assert_eq!(provider.cleared(), 0);
}

#[tokio::test]
async fn test_hidden_view_releases_watch() {
    let provider = FakeProvider::granted();
    let (client, _handle) = spawn_tracker(provider.clone(), PermissionCache::in_memory());
    let (tx, _events) = mpsc::channel(16);
    client.start(tx).await.unwrap();

    client.set_visible(false).await.unwrap();
    assert_eq!(provider.cleared(), 1);
    client.set_visible(false).await.unwrap();
    assert_eq!(provider.cleared(), 1);

    client.set_visible(true).await.unwrap();
    assert_eq!(provider.opened(), 2);
}

#[tokio::test]
async fn test_watch_released_exactly_once() {
    let provider = FakeProvider::granted();
    let (client, handle) = spawn_tracker(provider.clone(), PermissionCache::in_memory());
    let (tx, _events) = mpsc::channel(16);
    client.start(tx.clone()).await.unwrap();
    // second start is a no-op
    client.start(tx).await.unwrap();
    assert_eq!(provider.opened(), 1);

    assert!(client.stop().await.unwrap());
    assert!(!client.stop().await.unwrap());
    drop(client);
    handle.await.unwrap();

    assert_eq!(provider.cleared(), 1);
}

#[tokio::test]
async fn test_dropping_client_releases_watch() {
    let provider = FakeProvider::granted();
    let (client, handle) = spawn_tracker(provider.clone(), PermissionCache::in_memory());
    let (tx, _events) = mpsc::channel(16);
    client.start(tx).await.unwrap();

    drop(client);
    handle.await.unwrap();

    assert_eq!(provider.cleared(), 1);
}

#[tokio::test]
async fn test_revoked_permission_stops_watching() {
    let provider = FakeProvider::granted();
    let (client, _handle) = spawn_tracker(provider.clone(), PermissionCache::in_memory());
    let (tx, mut events) = mpsc::channel(16);
    client.start(tx).await.unwrap();

    provider.push(Err(GeoError::PermissionDenied)).await;
    assert_eq!(
        next_event(&mut events).await,
        TrackerEvent::Error(GeoError::PermissionDenied)
    );
    assert_eq!(provider.cleared(), 1);

    // denied is remembered; becoming visible does not reopen the watch
    client.set_visible(false).await.unwrap();
    client.set_visible(true).await.unwrap();
    assert_eq!(provider.opened(), 1);
}

#[tokio::test]
async fn test_permission_decision_is_persisted() {
    let path = std::env::temp_dir().join(format!(
        "dispatch-sync-permission-{}-{}.json",
        std::process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));

    let provider = FakeProvider::new(PermissionState::Prompt, PermissionDecision::Granted);
    let (client, handle) = spawn_tracker(provider.clone(), PermissionCache::load(&path).await);
    assert_eq!(
        client.request_permission().await.unwrap(),
        PermissionDecision::Granted
    );
    drop(client);
    handle.await.unwrap();

    let reloaded = PermissionCache::load(&path).await;
    assert_eq!(reloaded.get(), Some(PermissionDecision::Granted));

    // a cached answer means no second prompt
    let (client, _handle) = spawn_tracker(provider.clone(), reloaded);
    let (tx, _events) = mpsc::channel(16);
    client.start(tx).await.unwrap();
    assert_eq!(provider.prompts.load(Ordering::SeqCst), 1);
    assert_eq!(provider.opened(), 1);

    let _ = std::fs::remove_file(&path);
}
