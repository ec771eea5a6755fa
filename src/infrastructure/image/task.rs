//! Decode task: one cancellable unit of background image work.
//!
//! A task looks the image up in the cache tiers, decodes it from source on a
//! miss, and hands the result to its surface only if the surface still points
//! at this task. Cancellation is checked before the lookup, before the decode
//! and before delivery; the decode itself runs to completion.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use tracing::{debug, trace, warn};

use crate::domain::entities::{
    BoundingBox, ImageSource, LoadedImage, TaskControl, TaskHandle, TaskId, TaskState,
};
use crate::domain::errors::DecodeError;
use crate::domain::ports::DisplaySurface;

use super::coordinator::CacheCoordinator;

/// How a decode task ended.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// The image was shown on the task's surface.
    Delivered(LoadedImage),
    /// The image is available; the task had no surface.
    Ready(LoadedImage),
    /// The image was produced but the surface had moved on or was dropped.
    Superseded(LoadedImage),
    /// The source could not be decoded.
    NoImage,
    /// The task was cancelled before it could deliver.
    Cancelled,
}

impl TaskOutcome {
    /// Returns the loaded image, if any was produced.
    #[must_use]
    pub const fn image(&self) -> Option<&LoadedImage> {
        match self {
            Self::Delivered(image) | Self::Ready(image) | Self::Superseded(image) => Some(image),
            Self::NoImage | Self::Cancelled => None,
        }
    }

    /// Consumes the outcome, returning the loaded image, if any.
    #[must_use]
    pub fn into_image(self) -> Option<LoadedImage> {
        match self {
            Self::Delivered(image) | Self::Ready(image) | Self::Superseded(image) => Some(image),
            Self::NoImage | Self::Cancelled => None,
        }
    }

    /// Returns true if the task was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A decode job bound to (at most) one surface.
pub struct DecodeTask {
    control: Arc<TaskControl>,
    surface: Option<Weak<dyn DisplaySurface>>,
    coordinator: Arc<CacheCoordinator>,
    bounds: BoundingBox,
}

impl DecodeTask {
    /// Creates a task. The surface, if any, is held weakly.
    #[must_use]
    pub fn new(
        control: Arc<TaskControl>,
        surface: Option<Weak<dyn DisplaySurface>>,
        coordinator: Arc<CacheCoordinator>,
        bounds: BoundingBox,
    ) -> Self {
        Self {
            control,
            surface,
            coordinator,
            bounds,
        }
    }

    /// Returns the task id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.control.id()
    }

    /// Returns a weak handle for associating the task with a surface.
    #[must_use]
    pub fn handle(&self) -> TaskHandle {
        self.control.handle()
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    /// Runs the task to completion on the current thread.
    ///
    /// Blocks on disk I/O and decoding; call it from a blocking worker.
    #[must_use]
    pub fn run(self) -> TaskOutcome {
        if !self.control.advance(TaskState::Running) {
            trace!(task = %self.id(), "Task cancelled before start");
            return TaskOutcome::Cancelled;
        }
        let key = self.control.key().clone();

        if self.control.is_cancelled() {
            return self.finish_cancelled();
        }

        let cached = match self.coordinator.get_image(&key) {
            Ok(cached) => cached,
            Err(e) => return self.finish_failed(&e.to_string(), e.is_out_of_memory()),
        };

        let loaded = if let Some(hit) = cached {
            if hit.source == ImageSource::DiskCache {
                self.coordinator.promote(&key, hit.image.clone());
            }
            hit
        } else {
            if self.control.is_cancelled() {
                return self.finish_cancelled();
            }
            let decoder = self.coordinator.decoder();
            let decoded = panic::catch_unwind(AssertUnwindSafe(|| {
                decoder.decode(self.control.source(), self.bounds)
            }))
            .unwrap_or_else(|payload| {
                let err = DecodeError::worker(panic_message(payload.as_ref()));
                warn!(task = %self.id(), error = %err, "Decoder panicked");
                Err(err)
            });
            match decoded {
                Ok(Some(image)) => {
                    let image = Arc::new(image);
                    let writes = self.coordinator.put_image(&key, &image);
                    debug!(
                        task = %self.id(),
                        key = %key,
                        width = image.width(),
                        height = image.height(),
                        memory = writes.memory,
                        disk = writes.disk,
                        "Decoded image from source"
                    );
                    LoadedImage {
                        key: key.clone(),
                        image,
                        source: ImageSource::Decoder,
                    }
                }
                Ok(None) => return self.finish_failed("source is not a decodable image", false),
                Err(e) => return self.finish_failed(&e.to_string(), e.is_out_of_memory()),
            }
        };

        if self.control.is_cancelled() {
            return self.finish_cancelled();
        }
        self.deliver(loaded)
    }

    fn deliver(self, loaded: LoadedImage) -> TaskOutcome {
        let id = self.id();
        let outcome = match &self.surface {
            None => TaskOutcome::Ready(loaded),
            Some(surface) => match surface.upgrade() {
                Some(surface) if surface.deliver(id, loaded.image.clone()) => {
                    trace!(task = %id, source = %loaded.source, "Delivered image to surface");
                    TaskOutcome::Delivered(loaded)
                }
                Some(_) => {
                    trace!(task = %id, "Surface reassigned, skipping delivery");
                    TaskOutcome::Superseded(loaded)
                }
                None => {
                    trace!(task = %id, "Surface dropped, skipping delivery");
                    TaskOutcome::Superseded(loaded)
                }
            },
        };
        self.control.advance(TaskState::Completed);
        outcome
    }

    fn finish_cancelled(self) -> TaskOutcome {
        trace!(task = %self.id(), "Task cancelled");
        self.control.advance(TaskState::Cancelled);
        TaskOutcome::Cancelled
    }

    fn finish_failed(self, reason: &str, out_of_memory: bool) -> TaskOutcome {
        if out_of_memory {
            let evicted = self.coordinator.relieve_memory_pressure();
            warn!(task = %self.id(), evicted, "Decode ran out of memory, result abandoned");
        } else {
            debug!(task = %self.id(), source = %self.control.source(), reason, "No image produced");
        }
        if let Some(surface) = self.surface.as_ref().and_then(Weak::upgrade) {
            surface.mark_failed(self.id(), reason);
        }
        self.control.advance(TaskState::Completed);
        TaskOutcome::NoImage
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "decoder panicked".to_string())
}

impl std::fmt::Debug for DecodeTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeTask")
            .field("id", &self.control.id())
            .field("source", self.control.source())
            .field("state", &self.control.state())
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}
