use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::emission::deliver_all;
use super::*;
use crate::delivery::ChannelSink;
use crate::error::DeliveryError;
use crate::frame::{PixelLayout, RawFrame};
use crate::source::{SourceConfig, TestPatternProvider};

fn fast_config() -> BroadcasterConfig {
    BroadcasterConfig::default()
        .resolution(32, 24)
        .frame_interval(Duration::from_millis(5))
        .start_timeout(Duration::from_millis(500))
        .stop_timeout(Duration::from_millis(500))
        .capture_backoff(Duration::from_millis(10))
        .emit_log_interval(Duration::from_millis(200))
}

fn with_channels(
    config: BroadcasterConfig,
    provider: Arc<dyn SourceProvider>,
) -> (Broadcaster, Arc<ChannelSink>) {
    let sink = Arc::new(ChannelSink::new());
    let broadcaster = Broadcaster::new(config, provider, sink.clone());
    (broadcaster, sink)
}

async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

fn gray_frame() -> RawFrame {
    RawFrame::new(4, 4, PixelLayout::Rgb24, vec![100u8; 4 * 4 * 3])
}

#[derive(Default)]
struct DeviceCounters {
    acquisitions: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl DeviceCounters {
    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn balanced(&self) -> bool {
        Self::get(&self.starts) == Self::get(&self.stops)
    }
}

/// Device that counts opens, starts and stops; opens and reads can be slow
struct CountingProvider {
    open_delay: Duration,
    read_delay: Duration,
    counters: Arc<DeviceCounters>,
}

impl CountingProvider {
    fn new(open_delay: Duration, read_delay: Duration) -> Self {
        Self {
            open_delay,
            read_delay,
            counters: Arc::new(DeviceCounters::default()),
        }
    }
}

impl SourceProvider for CountingProvider {
    fn acquire(&self, _config: &SourceConfig) -> Result<Box<dyn FrameSource>, SourceError> {
        std::thread::sleep(self.open_delay);
        self.counters.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingSource {
            read_delay: self.read_delay,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct CountingSource {
    read_delay: Duration,
    counters: Arc<DeviceCounters>,
}

impl FrameSource for CountingSource {
    fn start(&mut self) -> Result<(), SourceError> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn capture(&mut self) -> Result<RawFrame, SourceError> {
        std::thread::sleep(self.read_delay);
        Ok(gray_frame())
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Every acquisition fails
#[derive(Default)]
struct FailingProvider {
    attempts: AtomicUsize,
}

impl SourceProvider for FailingProvider {
    fn acquire(&self, _config: &SourceConfig) -> Result<Box<dyn FrameSource>, SourceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SourceError::Unavailable("camera busy".into()))
    }
}

/// Takes a while to open the device
struct SlowProvider {
    delay: Duration,
    inner: TestPatternProvider,
}

impl SourceProvider for SlowProvider {
    fn acquire(&self, config: &SourceConfig) -> Result<Box<dyn FrameSource>, SourceError> {
        std::thread::sleep(self.delay);
        self.inner.acquire(config)
    }
}

/// Replays a fixed list of capture results, then fails every read
struct ScriptedSource {
    script: VecDeque<Result<RawFrame, SourceError>>,
}

impl FrameSource for ScriptedSource {
    fn start(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn capture(&mut self) -> Result<RawFrame, SourceError> {
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(SourceError::Capture("script exhausted".into())))
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

struct ScriptedProvider {
    script: StdMutex<Option<VecDeque<Result<RawFrame, SourceError>>>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<RawFrame, SourceError>>) -> Self {
        Self {
            script: StdMutex::new(Some(script.into())),
        }
    }
}

impl SourceProvider for ScriptedProvider {
    fn acquire(&self, _config: &SourceConfig) -> Result<Box<dyn FrameSource>, SourceError> {
        let script = self
            .script
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| SourceError::Unavailable("script already used".into()))?;
        Ok(Box::new(ScriptedSource { script }))
    }
}

/// Every read blocks for `hang`, then fails
struct HangingSource {
    hang: Duration,
}

impl FrameSource for HangingSource {
    fn start(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn capture(&mut self) -> Result<RawFrame, SourceError> {
        std::thread::sleep(self.hang);
        Err(SourceError::Capture("device timeout".into()))
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

struct HangingProvider {
    hang: Duration,
}

impl SourceProvider for HangingProvider {
    fn acquire(&self, _config: &SourceConfig) -> Result<Box<dyn FrameSource>, SourceError> {
        Ok(Box::new(HangingSource { hang: self.hang }))
    }
}

/// Records every delivery; refuses one client
#[derive(Default)]
struct RecordingSink {
    deliveries: StdMutex<Vec<(ClientId, u64)>>,
    refuse: Option<ClientId>,
}

impl RecordingSink {
    fn refusing(id: &str) -> Self {
        Self {
            deliveries: StdMutex::new(Vec::new()),
            refuse: Some(ClientId::new(id)),
        }
    }

    fn delivered_to(&self, id: &str) -> Vec<u64> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|(client, _)| client.as_str() == id)
            .map(|(_, seq)| *seq)
            .collect()
    }

    fn total(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }
}

impl FrameSink for RecordingSink {
    fn deliver(&self, client: &ClientId, frame: &EncodedFrame) -> Result<(), DeliveryError> {
        if self.refuse.as_ref() == Some(client) {
            return Err(DeliveryError::Closed(client.clone()));
        }
        self.deliveries
            .lock()
            .unwrap()
            .push((client.clone(), frame.sequence));
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_viewer_receives_frames_until_last_disconnect() {
    let provider = Arc::new(TestPatternProvider::new());
    let (broadcaster, sink) = with_channels(fast_config(), provider.clone());
    let a = ClientId::new("a");
    let mut frames = sink.register(a.clone());

    broadcaster.on_client_connect(a.clone()).await;
    assert_eq!(broadcaster.run_state(), RunState::Running);
    assert!(broadcaster.is_source_active());
    assert!(wait_until(|| broadcaster.payload_available()).await);

    broadcaster.on_start_viewing(a.clone()).await;
    let received = tokio_test::assert_ok!(
        tokio::time::timeout(Duration::from_secs(1), frames.recv()).await
    );
    let frame = received.unwrap();
    assert_eq!(&frame.jpeg[..2], &[0xFF, 0xD8]);
    assert!(frame.sequence >= 1);
    assert_eq!((frame.width, frame.height), (32, 24));

    broadcaster.on_client_disconnect(a.clone()).await;
    assert_eq!(broadcaster.run_state(), RunState::Idle);

    let status = broadcaster.status().await;
    assert!(!status.source_active);
    assert!(!status.payload_available);
    assert_eq!(status.connected, 0);
    assert_eq!(status.viewers, 0);
    assert_eq!(status.stats.sessions_started, 1);
    assert!(status.stats.frames_encoded >= 1);
    assert_eq!(provider.acquisitions(), 1);
}

#[tokio::test]
async fn test_acquire_failure_leaves_idle() {
    let provider = Arc::new(FailingProvider::default());
    let (broadcaster, _sink) = with_channels(fast_config(), provider.clone());

    broadcaster.on_client_connect("a").await;
    assert_eq!(broadcaster.run_state(), RunState::Idle);
    assert!(!broadcaster.is_source_active());
    assert!(broadcaster.snapshot().is_none());
    assert_eq!(broadcaster.connected_count().await, 1);

    // Next connect retries
    broadcaster.on_client_connect("b").await;
    assert_eq!(broadcaster.run_state(), RunState::Idle);
    assert_eq!(provider.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(broadcaster.status().await.stats.acquire_failures, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connects_start_once() {
    let provider = Arc::new(SlowProvider {
        delay: Duration::from_millis(50),
        inner: TestPatternProvider::new(),
    });
    let (broadcaster, _sink) = with_channels(fast_config(), provider.clone());
    let broadcaster = Arc::new(broadcaster);

    let tasks: Vec<_> = (0..16)
        .map(|n| {
            let broadcaster = Arc::clone(&broadcaster);
            tokio::spawn(async move {
                broadcaster.on_client_connect(format!("client-{}", n)).await;
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(provider.inner.acquisitions(), 1);
    assert_eq!(broadcaster.run_state(), RunState::Running);
    assert_eq!(broadcaster.connected_count().await, 16);
    assert_eq!(broadcaster.status().await.stats.sessions_started, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connect_disconnect_burst_settles_idle() {
    let provider = Arc::new(TestPatternProvider::new());
    let (broadcaster, _sink) = with_channels(fast_config(), provider);
    let broadcaster = Arc::new(broadcaster);

    let tasks: Vec<_> = (0..16)
        .map(|n| {
            let broadcaster = Arc::clone(&broadcaster);
            tokio::spawn(async move {
                let id = ClientId::new(format!("client-{}", n));
                broadcaster.on_client_connect(id.clone()).await;
                broadcaster.on_client_disconnect(id).await;
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(broadcaster.connected_count().await, 0);
    assert_eq!(broadcaster.run_state(), RunState::Idle);
    assert!(!broadcaster.is_source_active());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_source_active_iff_clients_connected() {
    let (broadcaster, _sink) =
        with_channels(fast_config(), Arc::new(TestPatternProvider::new()));
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let ids: Vec<ClientId> = (0..4).map(|n| ClientId::new(format!("c{}", n))).collect();

    for _ in 0..100 {
        let id = ids[rng.gen_range(0..ids.len())].clone();
        if rng.gen_bool(0.5) {
            broadcaster.on_client_connect(id).await;
        } else {
            broadcaster.on_client_disconnect(id).await;
        }

        let connected = broadcaster.connected_count().await;
        assert_eq!(broadcaster.run_state() == RunState::Running, connected > 0);
        assert_eq!(broadcaster.is_source_active(), connected > 0);
    }
}

#[tokio::test]
async fn test_viewers_stay_subset_of_connected() {
    let config = fast_config().power_save(false);
    let (broadcaster, _sink) = with_channels(config, Arc::new(TestPatternProvider::new()));
    let mut rng = StdRng::seed_from_u64(42);
    let ids: Vec<ClientId> = (0..5).map(|n| ClientId::new(format!("v{}", n))).collect();

    for _ in 0..300 {
        let id = ids[rng.gen_range(0..ids.len())].clone();
        match rng.gen_range(0..4) {
            0 => broadcaster.on_client_connect(id).await,
            1 => broadcaster.on_client_disconnect(id).await,
            2 => broadcaster.on_start_viewing(id).await,
            _ => broadcaster.on_stop_viewing(id).await,
        }

        let registry = broadcaster.shared.registry.read().await;
        assert!(registry.viewers_are_connected());
        assert!(registry.viewer_count() <= registry.connected_count());
    }
}

#[tokio::test]
async fn test_viewing_requests() {
    let (broadcaster, _sink) =
        with_channels(fast_config(), Arc::new(TestPatternProvider::new()));

    broadcaster.on_client_connect("a").await;
    broadcaster.on_start_viewing("a").await;
    broadcaster.on_start_viewing("a").await;
    assert_eq!(broadcaster.viewer_count().await, 1);

    broadcaster.on_start_viewing("ghost").await;
    assert_eq!(broadcaster.viewer_count().await, 1);

    broadcaster.on_stop_viewing("a").await;
    broadcaster.on_stop_viewing("a").await;
    assert_eq!(broadcaster.viewer_count().await, 0);

    // Viewing has no effect on the source
    assert_eq!(broadcaster.run_state(), RunState::Running);
}

#[tokio::test]
async fn test_power_save_disabled_keeps_source_open() {
    let config = fast_config().power_save(false);
    let provider = Arc::new(TestPatternProvider::new());
    let (broadcaster, _sink) = with_channels(config, provider.clone());

    broadcaster.on_client_connect("a").await;
    broadcaster.on_client_disconnect("a").await;
    assert_eq!(broadcaster.run_state(), RunState::Running);
    assert!(broadcaster.is_source_active());

    // Turning power save back on with nobody connected releases the source
    broadcaster.set_power_save(true).await;
    assert!(broadcaster.power_save());
    assert_eq!(broadcaster.run_state(), RunState::Idle);
    assert_eq!(provider.acquisitions(), 1);
}

#[tokio::test]
async fn test_force_stop() {
    let provider = Arc::new(TestPatternProvider::new());
    let (broadcaster, _sink) = with_channels(fast_config(), provider.clone());

    // Idle stop is a no-op
    broadcaster.force_stop().await;
    assert_eq!(broadcaster.run_state(), RunState::Idle);

    broadcaster.on_client_connect("a").await;
    broadcaster.force_stop().await;
    assert_eq!(broadcaster.run_state(), RunState::Idle);
    assert!(!broadcaster.is_source_active());
    assert_eq!(broadcaster.connected_count().await, 1);

    broadcaster.force_stop().await;
    assert_eq!(broadcaster.run_state(), RunState::Idle);

    // A later connect reopens the source
    broadcaster.on_client_connect("b").await;
    assert_eq!(broadcaster.run_state(), RunState::Running);
    assert_eq!(provider.acquisitions(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_encode_failure_keeps_previous_frame() {
    let malformed = RawFrame::new(4, 4, PixelLayout::Rgb24, vec![0u8; 5]);
    let provider = Arc::new(ScriptedProvider::new(vec![Ok(gray_frame()), Ok(malformed)]));
    let (broadcaster, _sink) = with_channels(fast_config(), provider);

    broadcaster.on_client_connect("a").await;
    assert!(
        wait_until(|| {
            let stats = broadcaster.shared.stats.snapshot();
            stats.encode_failures == 1 && stats.capture_failures >= 1
        })
        .await
    );

    let stats = broadcaster.shared.stats.snapshot();
    assert_eq!(stats.frames_encoded, 1);
    assert_eq!(stats.encode_failures, 1);

    let frame = broadcaster.snapshot().unwrap();
    assert_eq!(frame.sequence, 1);
    assert_eq!((frame.width, frame.height), (4, 4));
    assert_eq!(broadcaster.run_state(), RunState::Running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malfunction_switch() {
    let config = fast_config().induce_malfunction(true);
    let (broadcaster, _sink) = with_channels(config, Arc::new(TestPatternProvider::new()));
    assert!(broadcaster.induce_malfunction());

    broadcaster.on_client_connect("a").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!broadcaster.payload_available());
    assert!(broadcaster.status().await.stats.capture_failures > 0);
    assert_eq!(broadcaster.run_state(), RunState::Running);

    broadcaster.set_induce_malfunction(false);
    assert!(wait_until(|| broadcaster.payload_available()).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hung_capture_loop_is_abandoned() {
    let config = fast_config().stop_timeout(Duration::from_millis(50));
    let provider = Arc::new(HangingProvider {
        hang: Duration::from_millis(400),
    });
    let (broadcaster, _sink) = with_channels(config, provider);

    broadcaster.on_client_connect("a").await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    broadcaster.on_client_disconnect("a").await;
    assert!(started.elapsed() < Duration::from_millis(300));
    assert_eq!(broadcaster.run_state(), RunState::Idle);
    assert!(!broadcaster.is_source_active());

    // The abandoned loop must not clear the flag of a newer session
    broadcaster.on_client_connect("b").await;
    assert!(broadcaster.is_source_active());
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(broadcaster.is_source_active());
    assert_eq!(broadcaster.run_state(), RunState::Running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_emission_isolates_failed_viewers() {
    let sink = Arc::new(RecordingSink::refusing("bad"));
    let broadcaster = Broadcaster::new(
        fast_config(),
        Arc::new(TestPatternProvider::new()),
        sink.clone(),
    );

    for id in ["good", "bad", "other"] {
        broadcaster.on_client_connect(id).await;
        broadcaster.on_start_viewing(id).await;
    }

    assert!(
        wait_until(|| {
            sink.delivered_to("good").len() >= 3 && sink.delivered_to("other").len() >= 3
        })
        .await
    );
    assert!(sink.delivered_to("bad").is_empty());

    let status = broadcaster.status().await;
    assert!(status.stats.delivery_failures > 0);
    assert!(status.stats.frames_delivered > 0);

    // Newest frame only, never going backwards
    let latest = broadcaster.shared.slot.sequence();
    for id in ["good", "other"] {
        let sequences = sink.delivered_to(id);
        assert!(sequences.windows(2).all(|w| w[0] <= w[1]));
        assert!(sequences.iter().all(|&seq| seq >= 1 && seq <= latest));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_emission_without_viewers() {
    let sink = Arc::new(RecordingSink::default());
    let broadcaster = Broadcaster::new(
        fast_config(),
        Arc::new(TestPatternProvider::new()),
        sink.clone(),
    );

    broadcaster.on_client_connect("a").await;
    assert!(wait_until(|| broadcaster.payload_available()).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.total(), 0);

    broadcaster.on_start_viewing("a").await;
    assert!(wait_until(|| sink.total() > 0).await);
}

#[tokio::test]
async fn test_run_events() {
    let (broadcaster, _sink) =
        with_channels(fast_config(), Arc::new(TestPatternProvider::new()));
    let broadcaster = Arc::new(broadcaster);
    let (tx, rx) = mpsc::channel(8);

    let runner = {
        let broadcaster = Arc::clone(&broadcaster);
        tokio::spawn(async move { broadcaster.run_events(rx).await })
    };

    tx.send(ClientEvent::Connected(ClientId::new("a"))).await.unwrap();
    tx.send(ClientEvent::StartViewing(ClientId::new("a"))).await.unwrap();
    drop(tx);
    runner.await.unwrap();

    assert_eq!(broadcaster.run_state(), RunState::Running);
    assert_eq!(broadcaster.viewer_count().await, 1);

    broadcaster
        .handle_event(ClientEvent::Disconnected(ClientId::new("a")))
        .await;
    assert_eq!(broadcaster.run_state(), RunState::Idle);
    assert_eq!(broadcaster.viewer_count().await, 0);
}

#[tokio::test]
async fn test_state_watch() {
    let (broadcaster, _sink) =
        with_channels(fast_config(), Arc::new(TestPatternProvider::new()));
    let mut states = broadcaster.subscribe_state();
    assert_eq!(*states.borrow_and_update(), RunState::Idle);

    broadcaster.on_client_connect("a").await;
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), RunState::Running);
}

#[tokio::test]
async fn test_shutdown_stops_everything() {
    let (broadcaster, _sink) =
        with_channels(fast_config(), Arc::new(TestPatternProvider::new()));

    broadcaster.on_client_connect("a").await;
    broadcaster.shutdown().await;

    assert_eq!(broadcaster.run_state(), RunState::Idle);
    assert!(!broadcaster.is_source_active());
    assert!(wait_until(|| broadcaster.emitter.is_finished()).await);
}

#[test]
fn test_deliver_all_counts() {
    let sink = RecordingSink::refusing("b");
    let viewers = vec![ClientId::new("a"), ClientId::new("b"), ClientId::new("c")];
    let frame = EncodedFrame {
        jpeg: bytes::Bytes::from_static(&[0xFF, 0xD8]),
        base64: Arc::from("/9g="),
        sequence: 7,
        width: 1,
        height: 1,
        encoded_at: Instant::now(),
    };

    assert_eq!(deliver_all(&sink, &viewers, &frame), (2, 1));
    assert_eq!(sink.delivered_to("a"), vec![7]);
    assert_eq!(sink.delivered_to("c"), vec![7]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_disconnect_still_stops_source() {
    let provider = Arc::new(CountingProvider::new(
        Duration::ZERO,
        Duration::from_millis(200),
    ));
    let counters = Arc::clone(&provider.counters);
    let (broadcaster, _sink) = with_channels(fast_config(), provider);

    broadcaster.on_client_connect("a").await;
    // Capture loop is now inside a slow read
    tokio::time::sleep(Duration::from_millis(20)).await;

    let dropped = tokio::time::timeout(
        Duration::from_millis(5),
        broadcaster.on_client_disconnect("a"),
    )
    .await;
    assert!(dropped.is_err());

    assert!(
        wait_until(|| {
            broadcaster.run_state() == RunState::Idle
                && DeviceCounters::get(&counters.stops) == 1
        })
        .await
    );
    assert!(!broadcaster.is_source_active());
    assert!(counters.balanced());
    assert_eq!(broadcaster.connected_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_connect_still_starts_source() {
    let provider = Arc::new(CountingProvider::new(
        Duration::from_millis(100),
        Duration::ZERO,
    ));
    let counters = Arc::clone(&provider.counters);
    let (broadcaster, _sink) = with_channels(fast_config(), provider);

    let dropped = tokio::time::timeout(
        Duration::from_millis(10),
        broadcaster.on_client_connect("a"),
    )
    .await;
    assert!(dropped.is_err());

    assert!(wait_until(|| broadcaster.run_state() == RunState::Running).await);
    assert!(broadcaster.is_source_active());
    assert_eq!(DeviceCounters::get(&counters.acquisitions), 1);

    broadcaster.on_client_disconnect("a").await;
    assert_eq!(broadcaster.run_state(), RunState::Idle);
    assert_eq!(DeviceCounters::get(&counters.starts), 1);
    assert!(counters.balanced());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_lifecycle_calls_settle() {
    let provider = Arc::new(CountingProvider::new(
        Duration::from_millis(20),
        Duration::from_millis(5),
    ));
    let counters = Arc::clone(&provider.counters);
    let (broadcaster, _sink) = with_channels(fast_config(), provider);
    let mut rng = StdRng::seed_from_u64(7);
    let ids: Vec<ClientId> = (0..3).map(|n| ClientId::new(format!("c{}", n))).collect();

    for _ in 0..40 {
        let id = ids[rng.gen_range(0..ids.len())].clone();
        let budget = Duration::from_millis(rng.gen_range(0..15));
        if rng.gen_bool(0.5) {
            let _ = tokio::time::timeout(budget, broadcaster.on_client_connect(id)).await;
        } else {
            let _ = tokio::time::timeout(budget, broadcaster.on_client_disconnect(id)).await;
        }
    }

    for id in &ids {
        broadcaster.on_client_disconnect(id.clone()).await;
    }

    assert!(
        wait_until(|| broadcaster.run_state() == RunState::Idle && counters.balanced()).await
    );
    assert!(!broadcaster.is_source_active());
    assert_eq!(broadcaster.connected_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_open_gives_up_and_closes_late_source() {
    let config = fast_config().start_timeout(Duration::from_millis(50));
    let provider = Arc::new(CountingProvider::new(
        Duration::from_millis(300),
        Duration::ZERO,
    ));
    let counters = Arc::clone(&provider.counters);
    let (broadcaster, _sink) = with_channels(config, provider);

    let started = Instant::now();
    broadcaster.on_client_connect("a").await;
    assert!(started.elapsed() < Duration::from_millis(250));
    assert_eq!(broadcaster.run_state(), RunState::Idle);
    assert!(!broadcaster.is_source_active());
    assert_eq!(broadcaster.status().await.stats.acquire_failures, 1);

    // The device that finally opened is closed, not leaked
    assert!(wait_until(|| DeviceCounters::get(&counters.stops) == 1).await);
    assert_eq!(DeviceCounters::get(&counters.starts), 1);

    // Lifecycle is still usable
    broadcaster.force_stop().await;
    assert_eq!(broadcaster.run_state(), RunState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drop_releases_source() {
    let provider = Arc::new(CountingProvider::new(Duration::ZERO, Duration::ZERO));
    let counters = Arc::clone(&provider.counters);
    let (broadcaster, _sink) = with_channels(fast_config(), provider);

    broadcaster.on_client_connect("a").await;
    assert!(wait_until(|| broadcaster.payload_available()).await);
    drop(broadcaster);

    assert!(wait_until(|| DeviceCounters::get(&counters.stops) == 1).await);
    assert_eq!(DeviceCounters::get(&counters.starts), 1);
}
