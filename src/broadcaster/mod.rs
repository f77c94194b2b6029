//! Demand-driven frame broadcaster
//!
//! The broadcaster owns one video source and opens it only while clients are
//! connected. Two background tasks do the work:
//!
//! ```text
//!   connect/disconnect ──► lifecycle (Mutex) ──► acquire / release source
//!                                 │
//!                                 ▼ spawn per session
//!                          [capture loop] ──► encode ──► LatestFrameSlot
//!                                                              │
//!                          [emission loop] ◄───── read ────────┘
//!                                 │
//!                                 └──► FrameSink::deliver(viewer, frame)
//! ```
//!
//! Capture and emission run on independent cadences: emission always sends
//! the newest frame and never queues, so a slow transport skips frames
//! instead of falling behind.
//!
//! Start and stop sequences are serialized by a single async mutex. Each
//! sequence re-reads the client registry after taking the mutex, so bursts
//! of concurrent connects and disconnects settle into "source open iff a
//! client is connected" (when power-save is on) without double starts.
//!
//! Sequences run on their own task. A caller that drops its future (a
//! cancelled request, a `timeout` around the call) does not interrupt them.

mod capture;
pub mod config;
mod emission;
pub mod state;
pub mod status;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::delivery::FrameSink;
use crate::error::SourceError;
use crate::frame::{EncodedFrame, FpsMeter, FrameEncoder, LatestFrameSlot};
use crate::registry::{ClientEvent, ClientId, ClientRegistry, ViewChange};
use crate::source::{FrameSource, SharedSource, SourceProvider};
use crate::stats::CaptureStats;

pub use config::BroadcasterConfig;
pub use state::RunState;
pub use status::BroadcasterStatus;

/// One open source plus the capture loop driving it
struct CaptureSession {
    generation: u64,
    stop: Arc<AtomicBool>,
    source: SharedSource,
    handle: JoinHandle<()>,
}

/// State guarded by the lifecycle mutex
#[derive(Default)]
struct Lifecycle {
    session: Option<CaptureSession>,
}

/// State shared between the broadcaster handle and its background tasks
pub(crate) struct Shared {
    config: BroadcasterConfig,
    power_save: AtomicBool,
    induce_malfunction: AtomicBool,

    provider: Arc<dyn SourceProvider>,
    sink: Arc<dyn FrameSink>,

    registry: RwLock<ClientRegistry>,
    lifecycle: Mutex<Lifecycle>,
    run_state: watch::Sender<RunState>,

    slot: LatestFrameSlot,
    fps: FpsMeter,
    encoder: FrameEncoder,
    stats: CaptureStats,

    /// Set while a capture session is live
    source_active: AtomicBool,
    /// Generation of the newest capture session
    generation: AtomicU64,
    /// Set when the broadcaster handle is dropped
    closed: AtomicBool,
}

impl Shared {
    fn run_state(&self) -> RunState {
        *self.run_state.borrow()
    }

    fn set_run_state(&self, state: RunState) {
        let previous = self.run_state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Run state changed");
        }
    }

    async fn connected_count(&self) -> usize {
        self.registry.read().await.connected_count()
    }

    /// Open the source if clients are waiting and none is open
    async fn ensure_started(self: &Arc<Self>) {
        let mut lifecycle = self.lifecycle.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let current = lifecycle
            .session
            .as_ref()
            .map(|s| (s.generation, s.handle.is_finished()));
        match current {
            Some((_, false)) => return,
            Some((generation, true)) => {
                tracing::warn!(
                    generation = generation,
                    "Capture loop ended unexpectedly, restarting source"
                );
                self.stop_locked(&mut lifecycle).await;
            }
            None => {}
        }

        if self.connected_count().await == 0 {
            return;
        }

        self.start_locked(&mut lifecycle).await;
    }

    /// Release the source if power-save applies and nobody is connected
    async fn stop_if_unused(&self) {
        let mut lifecycle = self.lifecycle.lock().await;

        if !self.power_save.load(Ordering::Relaxed) || self.connected_count().await > 0 {
            return;
        }

        if lifecycle.session.is_some() {
            tracing::info!("No clients connected, stopping source (power save)");
        }
        self.stop_locked(&mut lifecycle).await;
    }

    async fn force_stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.session.is_some() {
            tracing::info!("Forced source stop requested");
        }
        self.stop_locked(&mut lifecycle).await;
    }

    async fn start_locked(self: &Arc<Self>, lifecycle: &mut Lifecycle) {
        self.set_run_state(RunState::Starting);

        let provider = Arc::clone(&self.provider);
        let source_config = self.config.source_config();
        let mut opening = tokio::task::spawn_blocking(
            move || -> Result<Box<dyn FrameSource>, SourceError> {
                let mut source = provider.acquire(&source_config)?;
                if let Err(e) = source.start() {
                    let _ = source.stop();
                    return Err(e);
                }
                Ok(source)
            },
        );

        let bound = self.config.start_timeout;
        let opened = match tokio::time::timeout(bound, &mut opening).await {
            Ok(opened) => opened,
            Err(_) => {
                tracing::error!(
                    timeout_ms = bound.as_millis() as u64,
                    "Video source did not open in time"
                );
                tokio::spawn(close_late_source(opening));
                self.stats.record_acquire_failure();
                self.set_run_state(RunState::Idle);
                return;
            }
        };

        let source = match opened {
            Ok(Ok(source)) => source,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Failed to start video source");
                self.stats.record_acquire_failure();
                self.set_run_state(RunState::Idle);
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Video source task failed");
                self.stats.record_acquire_failure();
                self.set_run_state(RunState::Idle);
                return;
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let stop = Arc::new(AtomicBool::new(false));
        let source = SharedSource::new(source);

        self.source_active.store(true, Ordering::Release);
        let handle = tokio::spawn(capture::run(
            Arc::clone(self),
            generation,
            Arc::clone(&stop),
            source.clone(),
        ));

        lifecycle.session = Some(CaptureSession {
            generation,
            stop,
            source,
            handle,
        });
        self.stats.record_session_started();
        self.set_run_state(RunState::Running);

        tracing::info!(
            generation = generation,
            width = self.config.width,
            height = self.config.height,
            "Video source started"
        );
    }

    /// Stop sequence; a no-op when already idle
    async fn stop_locked(&self, lifecycle: &mut Lifecycle) {
        let Some(session) = lifecycle.session.take() else {
            tracing::debug!("Stop requested while idle");
            return;
        };

        self.set_run_state(RunState::Stopping);
        session.stop.store(true, Ordering::Release);

        let bound = self.config.stop_timeout;
        match tokio::time::timeout(bound, session.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(generation = session.generation, error = %e, "Capture loop failed");
            }
            Err(_) => {
                tracing::warn!(
                    generation = session.generation,
                    timeout_ms = bound.as_millis() as u64,
                    "Capture loop did not exit in time, abandoning it"
                );
            }
        }

        let source = session.source;
        let release = tokio::task::spawn_blocking(move || source.release());
        match tokio::time::timeout(bound, release).await {
            Ok(Ok(Some(Err(e)))) => {
                tracing::error!(error = %e, "Error closing video source");
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Video source release task failed");
            }
            Err(_) => {
                tracing::warn!("Video source still busy, it will be closed in the background");
            }
        }

        self.source_active.store(false, Ordering::Release);
        self.slot.clear();
        self.fps.reset();
        self.set_run_state(RunState::Idle);

        tracing::info!(generation = session.generation, "Video source stopped");
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(session) = self.lifecycle.get_mut().session.take() {
            session.stop.store(true, Ordering::Release);
            release_in_background(session.source);
        }
    }
}

/// Stop a source whose acquisition outlived the start bound
async fn close_late_source(opening: JoinHandle<Result<Box<dyn FrameSource>, SourceError>>) {
    let Ok(Ok(mut source)) = opening.await else {
        return;
    };

    tracing::info!("Closing video source that opened too late");
    match tokio::task::spawn_blocking(move || source.stop()).await {
        Ok(Err(e)) => tracing::error!(error = %e, "Error closing video source"),
        Err(e) => tracing::error!(error = %e, "Video source release task failed"),
        Ok(Ok(())) => {}
    }
}

/// Release a source without waiting for it
fn release_in_background(source: SharedSource) {
    let release = move || match source.release() {
        Some(Err(e)) => tracing::error!(error = %e, "Error closing video source"),
        Some(Ok(())) => tracing::info!("Video source closed"),
        None => {}
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(release);
        }
        Err(_) => release(),
    }
}

/// Demand-driven live frame broadcaster
///
/// Must be created inside a tokio runtime: construction spawns the emission
/// loop. Share it between transport handlers with `Arc<Broadcaster>`.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
///
/// use camcast::{Broadcaster, BroadcasterConfig, ChannelSink, ClientId, TestPatternProvider};
///
/// # async fn example() {
/// let sink = Arc::new(ChannelSink::new());
/// let broadcaster = Broadcaster::new(
///     BroadcasterConfig::default().resolution(640, 480),
///     Arc::new(TestPatternProvider::new()),
///     sink.clone(),
/// );
///
/// let client = ClientId::new("session-1");
/// let mut frames = sink.register(client.clone());
///
/// broadcaster.on_client_connect(client.clone()).await;
/// broadcaster.on_start_viewing(client.clone()).await;
///
/// if let Some(frame) = frames.recv().await {
///     println!("got {} bytes of JPEG", frame.jpeg.len());
/// }
///
/// broadcaster.on_client_disconnect(client).await;
/// # }
/// ```
pub struct Broadcaster {
    shared: Arc<Shared>,
    emitter: JoinHandle<()>,
}

impl Broadcaster {
    /// Create a broadcaster and start its emission loop
    pub fn new(
        config: BroadcasterConfig,
        provider: Arc<dyn SourceProvider>,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        let encoder = FrameEncoder::new(config.jpeg_quality).with_fps_overlay(config.fps_overlay);
        let (run_state, _) = watch::channel(RunState::Idle);

        let shared = Arc::new(Shared {
            power_save: AtomicBool::new(config.power_save),
            induce_malfunction: AtomicBool::new(config.induce_malfunction),
            config,
            provider,
            sink,
            registry: RwLock::new(ClientRegistry::new()),
            lifecycle: Mutex::new(Lifecycle::default()),
            run_state,
            slot: LatestFrameSlot::new(),
            fps: FpsMeter::new(),
            encoder,
            stats: CaptureStats::new(),
            source_active: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });

        let emitter = tokio::spawn(emission::run(Arc::clone(&shared)));

        Self { shared, emitter }
    }

    /// Get the configuration the broadcaster was built with
    pub fn config(&self) -> &BroadcasterConfig {
        &self.shared.config
    }

    /// A client opened a connection
    ///
    /// Opens the source if it is idle. Acquisition failures are logged and
    /// leave the broadcaster idle; the next connect retries.
    pub async fn on_client_connect(&self, id: impl Into<ClientId>) {
        let id = id.into();
        let connected = {
            let mut registry = self.shared.registry.write().await;
            if !registry.connect(id.clone()) {
                tracing::debug!(client = %id, "Client already connected");
            }
            registry.connected_count()
        };

        tracing::info!(client = %id, connected = connected, "Client connected");
        self.run_lifecycle(|shared| async move { shared.ensure_started().await })
            .await;
    }

    /// A client closed its connection
    ///
    /// Drops the client from the viewer set too. With power-save on, the
    /// last disconnect stops the source; this waits at most
    /// `stop_timeout` for the capture loop.
    pub async fn on_client_disconnect(&self, id: impl Into<ClientId>) {
        let id = id.into();
        let remaining = {
            let mut registry = self.shared.registry.write().await;
            registry.disconnect(&id);
            registry.connected_count()
        };

        tracing::info!(client = %id, remaining = remaining, "Client disconnected");
        if remaining == 0 {
            self.run_lifecycle(|shared| async move { shared.stop_if_unused().await })
                .await;
        }
    }

    /// A client asked for pushed frames
    pub async fn on_start_viewing(&self, id: impl Into<ClientId>) {
        let id = id.into();
        let mut registry = self.shared.registry.write().await;
        match registry.start_viewing(&id) {
            ViewChange::Added => {
                tracing::info!(
                    client = %id,
                    viewers = registry.viewer_count(),
                    "Client started viewing"
                );
            }
            ViewChange::Unchanged => {}
            ViewChange::NotConnected => {
                tracing::warn!(client = %id, "View request from unknown client ignored");
            }
        }
    }

    /// A client no longer wants pushed frames
    pub async fn on_stop_viewing(&self, id: impl Into<ClientId>) {
        let id = id.into();
        let mut registry = self.shared.registry.write().await;
        if registry.stop_viewing(&id) {
            tracing::info!(
                client = %id,
                viewers = registry.viewer_count(),
                "Client stopped viewing"
            );
        }
    }

    /// Dispatch one lifecycle notification
    pub async fn handle_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::Connected(id) => self.on_client_connect(id).await,
            ClientEvent::Disconnected(id) => self.on_client_disconnect(id).await,
            ClientEvent::StartViewing(id) => self.on_start_viewing(id).await,
            ClientEvent::StopViewing(id) => self.on_stop_viewing(id).await,
        }
    }

    /// Consume notifications until the sender side closes
    pub async fn run_events(&self, mut events: mpsc::Receiver<ClientEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        tracing::debug!("Client event channel closed");
    }

    /// Stop the source regardless of connected clients
    ///
    /// A stop against an idle source is a no-op. Clients that connect later
    /// open it again.
    pub async fn force_stop(&self) {
        self.run_lifecycle(|shared| async move { shared.force_stop().await })
            .await;
    }

    /// Stop the source and the emission loop
    pub async fn shutdown(&self) {
        self.emitter.abort();
        self.force_stop().await;
        tracing::info!("Broadcaster shut down");
    }

    /// Toggle power-save at runtime
    ///
    /// Turning it on with no clients connected stops the source right away.
    pub async fn set_power_save(&self, enabled: bool) {
        self.shared.power_save.store(enabled, Ordering::Relaxed);
        tracing::info!(enabled = enabled, "Power save toggled");
        if enabled {
            self.run_lifecycle(|shared| async move { shared.stop_if_unused().await })
                .await;
        }
    }

    /// Run a start or stop sequence to completion on its own task
    async fn run_lifecycle<F, Fut>(&self, sequence: F)
    where
        F: FnOnce(Arc<Shared>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(sequence(Arc::clone(&self.shared)));
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Lifecycle task failed");
        }
    }

    /// Whether power-save is on
    pub fn power_save(&self) -> bool {
        self.shared.power_save.load(Ordering::Relaxed)
    }

    /// Toggle simulated capture failure at runtime
    pub fn set_induce_malfunction(&self, enabled: bool) {
        self.shared
            .induce_malfunction
            .store(enabled, Ordering::Relaxed);
        tracing::info!(enabled = enabled, "Stream malfunction toggled");
    }

    /// Whether simulated capture failure is on
    pub fn induce_malfunction(&self) -> bool {
        self.shared.induce_malfunction.load(Ordering::Relaxed)
    }

    /// Current run state
    pub fn run_state(&self) -> RunState {
        self.shared.run_state()
    }

    /// Watch run state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.shared.run_state.subscribe()
    }

    /// Whether a capture session is live
    pub fn is_source_active(&self) -> bool {
        self.shared.source_active.load(Ordering::Acquire)
    }

    /// Frames encoded in the last completed second
    pub fn current_fps(&self) -> u32 {
        self.shared.fps.current_fps()
    }

    /// Whether a frame is ready to send
    pub fn payload_available(&self) -> bool {
        self.shared.slot.is_available()
    }

    /// Latest encoded frame, for snapshot requests outside the push path
    pub fn snapshot(&self) -> Option<Arc<EncodedFrame>> {
        self.shared.slot.latest()
    }

    /// Number of connected clients
    pub async fn connected_count(&self) -> usize {
        self.shared.connected_count().await
    }

    /// Number of viewing clients
    pub async fn viewer_count(&self) -> usize {
        self.shared.registry.read().await.viewer_count()
    }

    /// Status snapshot for health displays
    pub async fn status(&self) -> BroadcasterStatus {
        let (connected, viewers) = {
            let registry = self.shared.registry.read().await;
            (registry.connected_count(), registry.viewer_count())
        };

        BroadcasterStatus {
            run_state: self.run_state(),
            source_active: self.is_source_active(),
            fps: self.current_fps(),
            payload_available: self.payload_available(),
            power_save: self.power_save(),
            connected,
            viewers,
            stats: self.shared.stats.snapshot(),
        }
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        self.emitter.abort();

        // The capture loop exits on its next iteration; the source is
        // released when the last task lets go of the shared state.
        self.shared.closed.store(true, Ordering::Release);
    }
}
