//! Live recognition loop.
//!
//! One dedicated OS thread pulls frames, identifies and annotates them, and
//! publishes the result into a latest-wins slot. Consumers poll the slot;
//! they never wait on the producer. Store mutations stop the producer first
//! so recognition never reads a half-updated store.

use image::RgbImage;
use rollcall_core::{Annotator, EnrollmentStore, IdentityDecision, Recognizer};
use rollcall_hw::FrameSource;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn recognition thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("recognition thread panicked")]
    WorkerPanicked,
    #[error("recognition is not running")]
    NotRunning,
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("enrollment store is still shared")]
    StoreInUse,
}

/// One processed frame.
pub struct Snapshot {
    pub annotated: RgbImage,
    pub decision: IdentityDecision,
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EngineStatus {
    #[default]
    Starting,
    Running,
    Paused,
    CameraUnavailable(String),
    Stopped,
}

/// Shared slot holding the most recent snapshot.
#[derive(Default)]
pub struct LatestFrame {
    snapshot: Option<Arc<Snapshot>>,
    status: EngineStatus,
}

impl LatestFrame {
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.clone()
    }

    pub fn status(&self) -> &EngineStatus {
        &self.status
    }
}

pub type SharedSlot = Arc<Mutex<LatestFrame>>;

fn lock(slot: &Mutex<LatestFrame>) -> MutexGuard<'_, LatestFrame> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker {
    source: Box<dyn FrameSource>,
    recognizer: Recognizer,
}

pub struct Engine {
    slot: SharedSlot,
    store: Arc<RwLock<EnrollmentStore>>,
    annotator: Arc<Annotator>,
    shutdown: CancellationToken,
    run: Option<(CancellationToken, JoinHandle<Worker>)>,
    next_sequence: Arc<Mutex<u64>>,
}

impl Engine {
    /// Spawn the producer thread and start publishing snapshots.
    pub fn start(
        source: Box<dyn FrameSource>,
        recognizer: Recognizer,
        store: EnrollmentStore,
        annotator: Annotator,
    ) -> Result<Self, EngineError> {
        let mut engine = Self {
            slot: SharedSlot::default(),
            store: Arc::new(RwLock::new(store)),
            annotator: Arc::new(annotator),
            shutdown: CancellationToken::new(),
            run: None,
            next_sequence: Arc::new(Mutex::new(0)),
        };
        engine.spawn(Worker { source, recognizer })?;
        Ok(engine)
    }

    pub fn slot(&self) -> SharedSlot {
        Arc::clone(&self.slot)
    }

    /// Cancelled by [`shutdown`](Self::shutdown); survives pause/resume.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        lock(&self.slot).snapshot()
    }

    pub fn status(&self) -> EngineStatus {
        lock(&self.slot).status.clone()
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Read access to the store, e.g. for listing.
    pub fn with_store<R>(&self, f: impl FnOnce(&EnrollmentStore) -> R) -> R {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        f(&store)
    }

    /// Stop the producer and hand back its frame source and recognizer.
    pub fn stop(&mut self) -> Result<(Box<dyn FrameSource>, Recognizer), EngineError> {
        let (token, handle) = self.run.take().ok_or(EngineError::NotRunning)?;
        token.cancel();
        let worker = handle.join().map_err(|_| EngineError::WorkerPanicked)?;
        {
            let mut slot = lock(&self.slot);
            if !matches!(slot.status, EngineStatus::CameraUnavailable(_)) {
                slot.status = EngineStatus::Paused;
            }
        }
        tracing::info!("recognition stopped");
        Ok((worker.source, worker.recognizer))
    }

    /// Restart the producer with the given parts.
    pub fn resume(
        &mut self,
        source: Box<dyn FrameSource>,
        recognizer: Recognizer,
    ) -> Result<(), EngineError> {
        if self.run.is_some() {
            return Ok(());
        }
        lock(&self.slot).status = EngineStatus::Starting;
        self.spawn(Worker { source, recognizer })
    }

    /// Run `f` with recognition stopped and the store write-locked, then restart.
    ///
    /// `f` also gets the recognizer so it can enroll with the shared pipeline.
    /// The published snapshot is dropped: its decision was made against the
    /// old store.
    pub fn paused<R>(
        &mut self,
        f: impl FnOnce(&mut EnrollmentStore, &mut Recognizer) -> R,
    ) -> Result<R, EngineError> {
        let (source, mut recognizer) = self.stop()?;
        let result = {
            let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut store, &mut recognizer)
        };
        lock(&self.slot).snapshot = None;
        self.resume(source, recognizer)?;
        Ok(result)
    }

    /// Stop for good and cancel every consumer tied to [`shutdown_token`](Self::shutdown_token).
    pub fn shutdown(mut self) -> Result<EnrollmentStore, EngineError> {
        let stopped = match self.stop() {
            Ok(_) | Err(EngineError::NotRunning) => Ok(()),
            Err(err) => Err(err),
        };
        self.shutdown.cancel();
        lock(&self.slot).status = EngineStatus::Stopped;
        stopped?;
        let store = Arc::try_unwrap(self.store)
            .map(|lock| lock.into_inner().unwrap_or_else(PoisonError::into_inner))
            .map_err(|_| EngineError::StoreInUse)?;
        Ok(store)
    }

    fn spawn(&mut self, mut worker: Worker) -> Result<(), EngineError> {
        let token = self.shutdown.child_token();
        let slot = Arc::clone(&self.slot);
        let store = Arc::clone(&self.store);
        let annotator = Arc::clone(&self.annotator);
        let sequence = Arc::clone(&self.next_sequence);
        let cancel = token.clone();

        tracing::info!(source = %worker.source.describe(), "starting recognition");
        let handle = std::thread::Builder::new()
            .name("rollcall-recognition".into())
            .spawn(move || {
                run_producer(&mut worker, &slot, &store, &annotator, &sequence, &cancel);
                worker
            })
            .map_err(EngineError::Spawn)?;
        self.run = Some((token, handle));
        Ok(())
    }
}

fn run_producer(
    worker: &mut Worker,
    slot: &Mutex<LatestFrame>,
    store: &RwLock<EnrollmentStore>,
    annotator: &Annotator,
    sequence: &Mutex<u64>,
    cancel: &CancellationToken,
) {
    tracing::debug!("recognition thread started");
    lock(slot).status = EngineStatus::Running;

    while !cancel.is_cancelled() {
        let frame = match worker.source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "frame source failed; recognition stopped");
                lock(slot).status = EngineStatus::CameraUnavailable(err.to_string());
                break;
            }
        };

        let decision = {
            let store = store.read().unwrap_or_else(PoisonError::into_inner);
            worker.recognizer.identify(&frame.image, store.records())
        }
        .unwrap_or_else(|err| {
            tracing::debug!(error = %err, seq = frame.sequence, "recognition failed for frame");
            IdentityDecision::default()
        });
        let annotated = annotator.annotate(&frame.image, &decision);

        let seq = {
            let mut next = sequence.lock().unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            *next
        };
        lock(slot).snapshot = Some(Arc::new(Snapshot {
            annotated,
            decision,
            sequence: seq,
        }));
    }
    tracing::debug!("recognition thread exiting");
}

/// Hand every new snapshot to `render` until `shutdown` is cancelled.
///
/// Ends early with [`EngineError::CameraUnavailable`] once the producer has
/// lost its frame source.
pub async fn render_loop(
    slot: SharedSlot,
    interval: Duration,
    shutdown: CancellationToken,
    mut render: impl FnMut(&Snapshot),
) -> Result<(), EngineError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_rendered = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (snapshot, status) = {
                    let slot = lock(&slot);
                    (slot.snapshot(), slot.status.clone())
                };
                if let Some(snapshot) = snapshot.filter(|s| s.sequence > last_rendered) {
                    last_rendered = snapshot.sequence;
                    render(&snapshot);
                }
                if let EngineStatus::CameraUnavailable(reason) = status {
                    return Err(EngineError::CameraUnavailable(reason));
                }
            }
            _ = shutdown.cancelled() => {
                tracing::debug!("render loop shutting down");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rollcall_core::testing::{mean_color_pipeline, uniform_record};
    use rollcall_core::{RecognizerConfig, RetryPolicy};
    use rollcall_hw::StillSource;
    use std::time::Instant;
    use tempfile::TempDir;

    const ALICE: [u8; 3] = [200, 150, 100];

    fn alice_signature() -> Vec<f32> {
        ALICE.iter().map(|&c| c as f32 / 255.0).collect()
    }

    fn source(color: [u8; 3]) -> StillSource {
        StillSource::new(RgbImage::from_pixel(64, 48, Rgb(color))).with_interval(Duration::from_millis(2))
    }

    fn store(dir: &TempDir) -> EnrollmentStore {
        EnrollmentStore::open(dir.path().join("signatures.csv"), RetryPolicy::no_retry()).unwrap()
    }

    fn recognizer() -> Recognizer {
        Recognizer::new(mean_color_pipeline(), RecognizerConfig::default())
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met within 5s");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_latest_snapshot_wins() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.insert(uniform_record("Alice", alice_signature())).unwrap();

        let mut engine =
            Engine::start(Box::new(source(ALICE)), recognizer(), store, Annotator::new()).unwrap();
        wait_for(|| engine.latest().is_some_and(|s| s.sequence >= 3));

        let first = engine.latest().unwrap();
        wait_for(|| engine.latest().is_some_and(|s| s.sequence > first.sequence));
        let latest = engine.latest().unwrap();
        assert_eq!(latest.decision.name.as_deref(), Some("Alice"));
        assert_eq!(engine.status(), EngineStatus::Running);

        engine.stop().unwrap();
    }

    #[test]
    fn test_stop_joins_producer() {
        let dir = TempDir::new().unwrap();
        let mut engine =
            Engine::start(Box::new(source(ALICE)), recognizer(), store(&dir), Annotator::new()).unwrap();
        wait_for(|| engine.latest().is_some());

        let (_source, _recognizer) = engine.stop().unwrap();
        assert!(!engine.is_running());
        assert_eq!(engine.status(), EngineStatus::Paused);
        let frozen = engine.latest().unwrap().sequence;
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(engine.latest().unwrap().sequence, frozen);
        assert!(matches!(engine.stop(), Err(EngineError::NotRunning)));
    }

    #[test]
    fn test_camera_failure_recorded() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::start(
            Box::new(source(ALICE).limit(2)),
            recognizer(),
            store(&dir),
            Annotator::new(),
        )
        .unwrap();
        wait_for(|| matches!(engine.status(), EngineStatus::CameraUnavailable(_)));
        assert_eq!(engine.latest().unwrap().sequence, 2);
        assert!(engine.shutdown().is_ok());
    }

    #[test]
    fn test_paused_store_mutation_is_seen_after_resume() {
        let dir = TempDir::new().unwrap();
        let mut engine =
            Engine::start(Box::new(source(ALICE)), recognizer(), store(&dir), Annotator::new()).unwrap();
        wait_for(|| engine.latest().is_some());
        assert_eq!(engine.latest().unwrap().decision.name, None);

        let added = engine
            .paused(|store, _recognizer| store.insert(uniform_record("Alice", alice_signature())).is_ok())
            .unwrap();
        assert!(added);
        assert!(engine.is_running());

        wait_for(|| engine.latest().is_some_and(|s| s.decision.name.is_some()));
        let store = engine.shutdown().unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_paused_removal_drops_stale_decision() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.insert(uniform_record("Alice", alice_signature())).unwrap();
        let mut engine =
            Engine::start(Box::new(source(ALICE)), recognizer(), store, Annotator::new()).unwrap();
        wait_for(|| engine.latest().is_some_and(|s| s.decision.name.is_some()));

        let removed = engine.paused(|store, _| store.remove_person("Alice").unwrap()).unwrap();
        assert!(removed);
        assert_eq!(engine.latest().and_then(|s| s.decision.name.clone()), None);

        wait_for(|| engine.latest().is_some());
        assert_eq!(engine.latest().unwrap().decision.name, None);
        let store = engine.shutdown().unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_render_loop_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let engine =
            Engine::start(Box::new(source(ALICE)), recognizer(), store(&dir), Annotator::new()).unwrap();
        let slot = engine.slot();
        let token = engine.shutdown_token();

        let rendered = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&rendered);
        let task = tokio::spawn(render_loop(slot, Duration::from_millis(5), token, move |s| {
            sink.lock().unwrap().push(s.sequence);
        }));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::task::spawn_blocking(move || engine.shutdown()).await.unwrap().unwrap();
        task.await.unwrap().unwrap();

        let rendered = rendered.lock().unwrap();
        assert!(!rendered.is_empty());
        assert!(rendered.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_render_loop_reports_camera_loss() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::start(
            Box::new(source(ALICE).limit(1)),
            recognizer(),
            store(&dir),
            Annotator::new(),
        )
        .unwrap();
        let result = render_loop(
            engine.slot(),
            Duration::from_millis(5),
            engine.shutdown_token(),
            |_| {},
        )
        .await;
        assert!(matches!(result, Err(EngineError::CameraUnavailable(_))));
        tokio::task::spawn_blocking(move || engine.shutdown()).await.unwrap().unwrap();
    }
}
