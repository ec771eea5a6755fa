//! Async image loading orchestrator.
//!
//! Requests pass the reuse guard and the memory fast path on the calling
//! thread. Everything else becomes a decode task queued for a bounded pool of
//! blocking workers: Memory -> Disk -> Decoder.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::domain::entities::{
    BoundingBox, ImageRef, LoadedImage, TaskControl, TaskHandle, TaskId,
};
use crate::domain::errors::{DecodeError, LoaderError};
use crate::domain::ports::{DisplaySurface, ImageLoaderPort};
use crate::infrastructure::config::LoaderConfig;

use super::coordinator::{CacheCoordinator, CoordinatorStats};
use super::decoder::{ResourceBundle, SampledDecoder};
use super::disk_cache::DiskImageCache;
use super::encoder::ImageCrateEncoder;
use super::memory_cache::MemoryImageCache;
use super::reuse_guard::{GuardDecision, cancel_potential_load};
use super::task::{DecodeTask, TaskOutcome};

/// Configuration for the image loader.
#[derive(Debug, Clone)]
pub struct ImageLoaderConfig {
    /// Box decoded images are sampled down to.
    pub bounds: BoundingBox,
    /// Maximum concurrent decode tasks.
    pub workers: usize,
}

impl Default for ImageLoaderConfig {
    fn default() -> Self {
        Self {
            bounds: BoundingBox::default(),
            workers: 4,
        }
    }
}

impl From<&LoaderConfig> for ImageLoaderConfig {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            bounds: config.decode.bounds(),
            workers: config.decode.workers.max(1),
        }
    }
}

/// What [`ImageLoader::load_into`] did with a request.
#[derive(Debug)]
pub enum LoadRequest {
    /// The surface's current task already loads this image.
    AlreadyLoading(TaskId),
    /// The image was in memory and is already shown.
    Immediate(LoadedImage),
    /// A decode task was queued.
    Spawned(PendingLoad),
}

impl LoadRequest {
    /// Waits for the request to settle.
    ///
    /// Returns `None` for [`LoadRequest::AlreadyLoading`], whose result belongs
    /// to the earlier request.
    pub async fn wait(self) -> Option<TaskOutcome> {
        match self {
            Self::AlreadyLoading(_) => None,
            Self::Immediate(loaded) => Some(TaskOutcome::Delivered(loaded)),
            Self::Spawned(pending) => Some(pending.wait().await),
        }
    }
}

/// A queued or running decode task.
#[derive(Debug)]
pub struct PendingLoad {
    task: TaskHandle,
    done: oneshot::Receiver<TaskOutcome>,
}

impl PendingLoad {
    /// Returns the task handle.
    #[must_use]
    pub const fn task(&self) -> &TaskHandle {
        &self.task
    }

    /// Waits for the task to finish. A task dropped unrun reports `Cancelled`.
    pub async fn wait(self) -> TaskOutcome {
        self.done.await.unwrap_or(TaskOutcome::Cancelled)
    }
}

struct QueuedTask {
    task: DecodeTask,
    done: oneshot::Sender<TaskOutcome>,
}

enum LoaderCommand {
    Schedule(QueuedTask),
    Hold,
    Release,
}

/// State for the background worker loop.
struct WorkerState {
    pending: Arc<Mutex<HashSet<TaskId>>>,
    semaphore: Arc<Semaphore>,
    request_rx: mpsc::UnboundedReceiver<LoaderCommand>,
}

/// Orchestrates image loading from memory, disk, and the decoder.
pub struct ImageLoader {
    coordinator: Arc<CacheCoordinator>,
    pending: Arc<Mutex<HashSet<TaskId>>>,
    request_tx: mpsc::UnboundedSender<LoaderCommand>,
    held: AtomicBool,
    placeholder: Option<Arc<image::DynamicImage>>,
    config: ImageLoaderConfig,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("config", &self.config)
            .field("coordinator", &self.coordinator)
            .field("held", &self.is_held())
            .finish_non_exhaustive()
    }
}

impl ImageLoader {
    /// Creates a loader over an existing coordinator and starts its worker loop
    /// on the current tokio runtime.
    ///
    /// # Errors
    /// Returns [`LoaderError::NoRuntime`] outside a tokio runtime.
    pub fn new(
        config: ImageLoaderConfig,
        coordinator: Arc<CacheCoordinator>,
    ) -> Result<Self, LoaderError> {
        let runtime = Handle::try_current().map_err(|_| LoaderError::NoRuntime)?;

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(Mutex::new(HashSet::new()));
        let worker_state = WorkerState {
            pending: pending.clone(),
            semaphore: Arc::new(Semaphore::new(config.workers.max(1))),
            request_rx,
        };
        runtime.spawn(Self::run_worker_loop(worker_state));

        debug!(
            workers = config.workers,
            max_width = config.bounds.width,
            max_height = config.bounds.height,
            "Started image loader"
        );

        Ok(Self {
            coordinator,
            pending,
            request_tx,
            held: AtomicBool::new(false),
            placeholder: None,
            config,
        })
    }

    /// Builds the decoder, both cache tiers and the loader from configuration.
    ///
    /// A disk tier that cannot be opened is logged and left out, unless
    /// `disk.fail_fast` is set.
    ///
    /// # Errors
    /// Returns [`LoaderError::StoreUnavailable`] when the disk tier fails to open
    /// under `fail_fast`, or [`LoaderError::NoRuntime`] outside a tokio runtime.
    pub fn from_config(config: &LoaderConfig) -> Result<Self, LoaderError> {
        Self::from_config_with_resources(config, ResourceBundle::new())
    }

    /// Like [`ImageLoader::from_config`], resolving resource ids against `resources`.
    ///
    /// # Errors
    /// See [`ImageLoader::from_config`].
    pub fn from_config_with_resources(
        config: &LoaderConfig,
        resources: ResourceBundle,
    ) -> Result<Self, LoaderError> {
        let decoder = Arc::new(
            SampledDecoder::new()
                .with_max_alloc(config.decode.max_alloc_bytes)
                .with_resources(resources),
        );

        let coordinator = if config.use_cache {
            let memory = MemoryImageCache::with_budget(config.memory.budget());
            let disk = if config.disk.enabled {
                Self::open_disk_tier(config)?
            } else {
                None
            };
            CacheCoordinator::new(memory, disk, decoder)
        } else {
            info!("Caching disabled, every load decodes from source");
            CacheCoordinator::disabled(decoder)
        };

        Self::new(ImageLoaderConfig::from(config), Arc::new(coordinator))
    }

    fn open_disk_tier(config: &LoaderConfig) -> Result<Option<DiskImageCache>, LoaderError> {
        let directory = config.disk.resolve_directory();
        let encoder = Arc::new(ImageCrateEncoder::new(config.disk.format, config.disk.quality));
        match DiskImageCache::open(&directory, config.disk.capacity_bytes, encoder) {
            Ok(disk) => {
                debug!(dir = %directory.display(), format = %config.disk.format, "Opened disk cache");
                Ok(Some(disk))
            }
            Err(e) if config.disk.fail_fast => Err(LoaderError::store_unavailable(&directory, e)),
            Err(e) => {
                warn!(
                    dir = %directory.display(),
                    error = %e,
                    "Disk cache unavailable, continuing with memory cache only"
                );
                Ok(None)
            }
        }
    }

    /// Sets the image shown on a surface while its task runs.
    #[must_use]
    pub fn with_placeholder(mut self, placeholder: Arc<image::DynamicImage>) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    /// Worker loop: queues tasks and hands them to blocking workers as permits
    /// free up, unless held. Once the loader is dropped the remaining queue is
    /// drained regardless of hold.
    async fn run_worker_loop(mut state: WorkerState) {
        let mut queue: VecDeque<QueuedTask> = VecDeque::new();
        let mut held = false;

        loop {
            tokio::select! {
                cmd = state.request_rx.recv() => {
                    match cmd {
                        Some(LoaderCommand::Schedule(queued)) => queue.push_front(queued),
                        Some(LoaderCommand::Hold) => held = true,
                        Some(LoaderCommand::Release) => held = false,
                        None => break,
                    }
                }
                Ok(permit) = state.semaphore.clone().acquire_owned(), if !held && !queue.is_empty() => {
                    if let Some(queued) = queue.pop_front() {
                        Self::start(queued, permit, &state.pending);
                    }
                }
            }
        }

        if !queue.is_empty() {
            debug!(remaining = queue.len(), "Image loader dropped, draining queued tasks");
        }
        while let Some(queued) = queue.pop_front() {
            let Ok(permit) = state.semaphore.clone().acquire_owned().await else {
                break;
            };
            Self::start(queued, permit, &state.pending);
        }
        debug!("Image loader worker loop stopped");
    }

    fn start(
        QueuedTask { task, done }: QueuedTask,
        permit: OwnedSemaphorePermit,
        pending: &Arc<Mutex<HashSet<TaskId>>>,
    ) {
        let id = task.id();
        if task.is_cancelled() {
            trace!(task = %id, "Dropping cancelled task from queue");
            pending.lock().remove(&id);
            let _ = done.send(TaskOutcome::Cancelled);
            return;
        }

        let pending = pending.clone();
        tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || task.run())
                .await
                .unwrap_or_else(|e| {
                    let err = DecodeError::worker(e.to_string());
                    error!(task = %id, error = %err, "Decode task panicked");
                    TaskOutcome::NoImage
                });
            pending.lock().remove(&id);
            let _ = done.send(outcome);
            drop(permit);
        });
    }

    fn schedule(
        &self,
        control: &Arc<TaskControl>,
        surface: Option<std::sync::Weak<dyn DisplaySurface>>,
    ) -> PendingLoad {
        let (done, done_rx) = oneshot::channel();
        let task = DecodeTask::new(
            control.clone(),
            surface,
            self.coordinator.clone(),
            self.config.bounds,
        );
        let id = control.id();
        self.pending.lock().insert(id);

        if self
            .request_tx
            .send(LoaderCommand::Schedule(QueuedTask { task, done }))
            .is_err()
        {
            error!(task = %id, "Image loader worker loop is gone");
            self.pending.lock().remove(&id);
            control.cancel();
        } else {
            trace!(task = %id, source = %control.source(), "Queued decode task");
        }

        PendingLoad {
            task: control.handle(),
            done: done_rx,
        }
    }

    /// Shows `source` on `surface`.
    ///
    /// If the surface is already loading the same image nothing happens. Any
    /// other task bound to the surface is cancelled. A memory hit is shown
    /// before this returns; otherwise the placeholder is shown and a decode task
    /// is queued.
    ///
    /// # Errors
    /// Returns [`LoaderError::EmptySource`] for an empty source.
    pub fn load_into<S>(&self, source: &ImageRef, surface: &Arc<S>) -> Result<LoadRequest, LoaderError>
    where
        S: DisplaySurface + 'static,
    {
        if source.is_empty() {
            return Err(LoaderError::EmptySource);
        }
        let key = source.fingerprint();

        if let GuardDecision::Reuse(id) = cancel_potential_load(surface.as_ref(), &key) {
            return Ok(LoadRequest::AlreadyLoading(id));
        }

        if let Some(hit) = self.coordinator.get_memory(&key) {
            trace!(key = %key, "Memory hit, showing immediately");
            surface.set_image(hit.image.clone());
            return Ok(LoadRequest::Immediate(hit));
        }

        let control = TaskControl::new(source.clone());
        surface.associate(control.handle(), self.placeholder.clone());
        let surface: Arc<dyn DisplaySurface> = surface.clone();
        Ok(LoadRequest::Spawned(
            self.schedule(&control, Some(Arc::downgrade(&surface))),
        ))
    }

    /// Loads an image without a surface.
    ///
    /// Returns `Ok(None)` if the source is not a decodable image.
    ///
    /// # Errors
    /// Returns [`LoaderError::EmptySource`] for an empty source.
    pub async fn load(&self, source: &ImageRef) -> Result<Option<LoadedImage>, LoaderError> {
        if source.is_empty() {
            return Err(LoaderError::EmptySource);
        }
        if let Some(hit) = self.coordinator.get_memory(&source.fingerprint()) {
            return Ok(Some(hit));
        }
        let control = TaskControl::new(source.clone());
        Ok(self.schedule(&control, None).wait().await.into_image())
    }

    /// Warms the caches for `source` in the background.
    ///
    /// Queued prefetches still run if the loader is dropped first.
    pub fn prefetch(&self, source: ImageRef) {
        if source.is_empty() {
            debug!("Ignoring prefetch of empty source");
            return;
        }
        if self.coordinator.has(&source.fingerprint()) {
            trace!(source = %source, "Already cached, skipping prefetch");
            return;
        }
        let control = TaskControl::new(source);
        drop(self.schedule(&control, None));
    }

    /// Cancels the task bound to `surface` and drops the association.
    ///
    /// Returns whether a live task was cancelled.
    pub fn cancel<S>(&self, surface: &S) -> bool
    where
        S: DisplaySurface + ?Sized,
    {
        let Some(task) = surface.associated_task() else {
            return false;
        };
        surface.clear_association();
        let cancelled = task.cancel();
        debug!(task = %task.id(), cancelled, "Cancelled image load");
        cancelled
    }

    /// Stops starting new tasks. Queued tasks wait without taking a worker.
    pub fn hold(&self) {
        self.held.store(true, Ordering::Release);
        if self.request_tx.send(LoaderCommand::Hold).is_err() {
            error!("Failed to send hold request");
        }
    }

    /// Resumes starting tasks after [`ImageLoader::hold`].
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
        if self.request_tx.send(LoaderCommand::Release).is_err() {
            error!("Failed to send release request");
        }
    }

    /// Returns true while held.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Returns true if `source` is in either cache tier.
    #[must_use]
    pub fn has(&self, source: &ImageRef) -> bool {
        self.coordinator.has(&source.fingerprint())
    }

    /// Returns the number of queued or running tasks.
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns statistics for both tiers.
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        self.coordinator.stats()
    }

    /// Returns the shared coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &Arc<CacheCoordinator> {
        &self.coordinator
    }

    /// Clears all caches.
    ///
    /// Must not overlap with running tasks that may still write to disk.
    pub async fn clear_caches(&self) {
        let coordinator = self.coordinator.clone();
        match tokio::task::spawn_blocking(move || coordinator.clear()).await {
            Ok(Ok(())) => info!("Cleared all image caches"),
            Ok(Err(e)) => warn!(error = %e, "Failed to clear disk cache"),
            Err(e) => error!(error = %e, "Cache clear task panicked"),
        }
    }
}

#[async_trait]
impl ImageLoaderPort for ImageLoader {
    async fn load(&self, source: &ImageRef) -> Result<Option<LoadedImage>, LoaderError> {
        Self::load(self, source).await
    }

    fn prefetch(&self, source: ImageRef) {
        Self::prefetch(self, source);
    }

    fn is_cached(&self, source: &ImageRef) -> bool {
        self.has(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ImageSource, TaskState};
    use crate::domain::errors::DecodeError;
    use crate::domain::ports::ImageDecoder;
    use crate::domain::ports::mocks::MockImageDecoder;
    use crate::presentation::widgets::ImageSurface;
    use std::time::Duration;
    use tempfile::TempDir;

    fn rgb(side: u32) -> image::DynamicImage {
        image::DynamicImage::new_rgb8(side, side)
    }

    /// Decodes `<n>.png` to an n×n image.
    fn sized_decoder(calls: usize) -> MockImageDecoder {
        let mut decoder = MockImageDecoder::new();
        decoder.expect_decode().times(calls).returning(|source, _| {
            let side = source
                .as_path()
                .and_then(|p| p.file_stem())
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(1);
            Ok(Some(rgb(side)))
        });
        decoder
    }

    fn loader_with(decoder: impl ImageDecoder + 'static) -> ImageLoader {
        let coordinator = CacheCoordinator::new(
            MemoryImageCache::new(10_000_000),
            None,
            Arc::new(decoder),
        );
        ImageLoader::new(ImageLoaderConfig::default(), Arc::new(coordinator)).unwrap()
    }

    /// Blocks decoding of `slow.png` until the test opens the gate.
    struct GatedDecoder {
        started: mpsc::UnboundedSender<()>,
        gate: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl ImageDecoder for GatedDecoder {
        fn decode(
            &self,
            source: &ImageRef,
            _bounds: BoundingBox,
        ) -> Result<Option<image::DynamicImage>, DecodeError> {
            if source.to_string() == "slow.png" {
                let _ = self.started.send(());
                let _ = self.gate.lock().recv();
                return Ok(Some(rgb(10)));
            }
            Ok(Some(rgb(20)))
        }

        fn decode_bytes(&self, _bytes: &[u8]) -> Result<Option<image::DynamicImage>, DecodeError> {
            Ok(None)
        }
    }

    #[test]
    fn test_requires_runtime() {
        let coordinator = Arc::new(CacheCoordinator::disabled(Arc::new(SampledDecoder::new())));
        let result = ImageLoader::new(ImageLoaderConfig::default(), coordinator);
        assert!(matches!(result, Err(LoaderError::NoRuntime)));
    }

    #[test]
    fn test_settled_requests_resolve_immediately() {
        let id = TaskId::new();
        assert!(tokio_test::block_on(LoadRequest::AlreadyLoading(id).wait()).is_none());

        let loaded = LoadedImage {
            key: crate::domain::entities::Fingerprint::of("x.png"),
            image: Arc::new(rgb(2)),
            source: ImageSource::MemoryCache,
        };
        let outcome = tokio_test::block_on(LoadRequest::Immediate(loaded).wait());
        assert!(matches!(outcome, Some(TaskOutcome::Delivered(_))));
    }

    #[tokio::test]
    async fn test_empty_source_is_rejected() {
        let loader = loader_with(sized_decoder(0));
        let surface = Arc::new(ImageSurface::new());

        let result = loader.load_into(&ImageRef::file(""), &surface);
        assert!(matches!(result, Err(LoaderError::EmptySource)));
        assert!(matches!(
            loader.load(&ImageRef::file("")).await,
            Err(LoaderError::EmptySource)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_load_into_delivers() {
        let placeholder = Arc::new(rgb(1));
        let loader = loader_with(sized_decoder(1)).with_placeholder(placeholder);
        let surface = Arc::new(ImageSurface::new());
        loader.hold();

        let request = loader.load_into(&ImageRef::file("12.png"), &surface).unwrap();
        assert!(surface.is_loading());
        assert_eq!(surface.dimensions(), Some((1, 1)));

        loader.release();
        let outcome = request.wait().await.unwrap();

        assert!(matches!(outcome, TaskOutcome::Delivered(ref l) if l.source == ImageSource::Decoder));
        assert_eq!(surface.dimensions(), Some((12, 12)));
        assert!(surface.is_ready());
        assert_eq!(loader.active_tasks(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_memory_hit_bypasses_decoder() {
        let loader = loader_with(sized_decoder(1));
        let first = Arc::new(ImageSurface::new());
        let second = Arc::new(ImageSurface::new());
        let source = ImageRef::file("7.png");

        loader.load_into(&source, &first).unwrap().wait().await;
        let request = loader.load_into(&source, &second).unwrap();

        assert!(matches!(request, LoadRequest::Immediate(_)));
        assert_eq!(second.dimensions(), Some((7, 7)));
        assert_eq!(second.task_id(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_same_content_is_noop() {
        let loader = loader_with(sized_decoder(1));
        let surface = Arc::new(ImageSurface::new());
        let source = ImageRef::file("5.png");
        loader.hold();

        let LoadRequest::Spawned(pending) = loader.load_into(&source, &surface).unwrap() else {
            panic!("expected a spawned task");
        };
        let again = loader.load_into(&source, &surface).unwrap();

        assert!(matches!(again, LoadRequest::AlreadyLoading(id) if id == pending.task().id()));
        assert!(again.wait().await.is_none());

        loader.release();
        assert!(matches!(pending.wait().await, TaskOutcome::Delivered(_)));
        assert_eq!(surface.deliveries(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reassigned_surface_shows_only_latest() {
        let loader = loader_with(sized_decoder(1));
        let surface = Arc::new(ImageSurface::new());
        loader.hold();

        let LoadRequest::Spawned(first) = loader.load_into(&ImageRef::file("3.png"), &surface).unwrap()
        else {
            panic!("expected a spawned task");
        };
        let second = loader.load_into(&ImageRef::file("9.png"), &surface).unwrap();
        assert_eq!(first.task().state(), Some(TaskState::Cancelled));

        loader.release();
        assert!(first.wait().await.is_cancelled());
        assert!(matches!(second.wait().await, Some(TaskOutcome::Delivered(_))));
        assert_eq!(surface.dimensions(), Some((9, 9)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stale_running_task_cannot_overwrite() {
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let (gate_tx, gate_rx) = std::sync::mpsc::channel();
        let loader = loader_with(GatedDecoder {
            started: started_tx,
            gate: Mutex::new(gate_rx),
        });
        let surface = Arc::new(ImageSurface::new());

        let slow = loader.load_into(&ImageRef::file("slow.png"), &surface).unwrap();
        started_rx.recv().await.unwrap();

        let fast = loader.load_into(&ImageRef::file("fast.png"), &surface).unwrap();
        assert!(matches!(fast.wait().await, Some(TaskOutcome::Delivered(_))));
        assert_eq!(surface.dimensions(), Some((20, 20)));

        gate_tx.send(()).unwrap();
        let outcome = slow.wait().await.unwrap();

        assert!(outcome.is_cancelled());
        assert_eq!(surface.dimensions(), Some((20, 20)));
        assert_eq!(surface.deliveries(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_hold_defers_work() {
        let loader = loader_with(sized_decoder(1));
        let surface = Arc::new(ImageSurface::new());
        loader.hold();
        assert!(loader.is_held());

        let LoadRequest::Spawned(pending) = loader.load_into(&ImageRef::file("4.png"), &surface).unwrap()
        else {
            panic!("expected a spawned task");
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pending.task().state(), Some(TaskState::Created));
        assert_eq!(loader.active_tasks(), 1);

        loader.release();
        assert!(matches!(pending.wait().await, TaskOutcome::Delivered(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_surface() {
        let loader = loader_with(sized_decoder(0));
        let surface = Arc::new(ImageSurface::new());
        loader.hold();

        let request = loader.load_into(&ImageRef::file("4.png"), &surface).unwrap();
        assert!(loader.cancel(surface.as_ref()));
        assert!(surface.associated_task().is_none());
        assert!(!loader.cancel(surface.as_ref()));

        loader.release();
        assert!(request.wait().await.unwrap().is_cancelled());
        assert!(surface.image().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_load_without_surface_uses_cache() {
        let loader = loader_with(sized_decoder(1));
        let source = ImageRef::file("6.png");

        let first = loader.load(&source).await.unwrap().unwrap();
        let second = loader.load(&source).await.unwrap().unwrap();

        assert_eq!(first.source, ImageSource::Decoder);
        assert_eq!(second.source, ImageSource::MemoryCache);
        assert!(loader.is_cached(&source));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_prefetch_warms_cache() {
        let loader = loader_with(sized_decoder(1));
        let source = ImageRef::file("8.png");

        loader.prefetch(source.clone());
        for _ in 0..100 {
            if loader.has(&source) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(loader.has(&source));
        // Already cached: no second decode.
        loader.prefetch(source);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropping_loader_drains_queued_work() {
        let loader = loader_with(sized_decoder(2));
        let coordinator = loader.coordinator().clone();
        let surface = Arc::new(ImageSurface::new());
        let warmed = ImageRef::file("6.png");
        loader.hold();
        loader.prefetch(warmed.clone());
        let request = loader.load_into(&ImageRef::file("3.png"), &surface).unwrap();

        drop(loader);

        assert!(matches!(request.wait().await, Some(TaskOutcome::Delivered(_))));
        assert_eq!(surface.dimensions(), Some((3, 3)));
        for _ in 0..100 {
            if coordinator.has(&warmed.fingerprint()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(coordinator.has(&warmed.fingerprint()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bypass_mode_always_decodes() {
        let coordinator = CacheCoordinator::disabled(Arc::new(sized_decoder(2)));
        let loader = ImageLoader::new(ImageLoaderConfig::default(), Arc::new(coordinator)).unwrap();
        let source = ImageRef::file("3.png");

        let first = loader.load(&source).await.unwrap().unwrap();
        let second = loader.load(&source).await.unwrap().unwrap();

        assert_eq!(first.source, ImageSource::Decoder);
        assert_eq!(second.source, ImageSource::Decoder);
        assert!(!loader.has(&source));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_from_config_round_trips_through_disk() {
        let temp = TempDir::new().unwrap();
        let image_path = temp.path().join("photo.png");
        rgb(200).save(&image_path).unwrap();
        let mut config = LoaderConfig::default();
        config.disk.directory = Some(temp.path().join("cache"));

        let loader = ImageLoader::from_config(&config).unwrap();
        let source = ImageRef::file(&image_path);
        let loaded = loader.load(&source).await.unwrap().unwrap();
        assert_eq!(loaded.source, ImageSource::Decoder);
        assert_eq!((loaded.image.width(), loaded.image.height()), (50, 50));
        assert!(loader.stats().disk_size.is_some_and(|size| size > 0));
        drop(loader);

        let reopened = ImageLoader::from_config(&config).unwrap();
        let cached = reopened.load(&source).await.unwrap().unwrap();
        assert_eq!(cached.source, ImageSource::DiskCache);
        assert_eq!((cached.image.width(), cached.image.height()), (50, 50));
    }

    #[tokio::test]
    async fn test_unusable_disk_tier_degrades_or_fails_fast() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let mut config = LoaderConfig::default();
        config.disk.directory = Some(blocker.join("cache"));

        let loader = ImageLoader::from_config(&config).unwrap();
        assert!(!loader.coordinator().has_disk_tier());

        config.disk.fail_fast = true;
        let result = ImageLoader::from_config(&config);
        assert!(matches!(result, Err(LoaderError::StoreUnavailable { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_clear_caches() {
        let loader = loader_with(sized_decoder(2));
        let source = ImageRef::file("2.png");
        loader.load(&source).await.unwrap();
        assert!(loader.has(&source));

        loader.clear_caches().await;

        assert!(!loader.has(&source));
        assert_eq!(loader.stats().memory.size, 0);
        loader.load(&source).await.unwrap();
    }
}
