//! Thread-safe image slot that decode tasks fill.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::entities::{ImageStatus, TaskHandle, TaskId};
use crate::domain::ports::DisplaySurface;

#[derive(Default)]
struct SurfaceState {
    image: Option<Arc<image::DynamicImage>>,
    status: ImageStatus,
    task: Option<TaskHandle>,
    deliveries: u64,
}

impl SurfaceState {
    fn show(&mut self, image: Arc<image::DynamicImage>) {
        self.image = Some(image);
        self.status = ImageStatus::Ready;
        self.task = None;
        self.deliveries += 1;
    }
}

/// A display slot: the image currently shown, its status and the task
/// responsible for filling it.
#[derive(Default)]
pub struct ImageSurface {
    state: Mutex<SurfaceState>,
}

impl ImageSurface {
    /// Creates an empty surface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the image currently shown (possibly a placeholder).
    #[must_use]
    pub fn image(&self) -> Option<Arc<image::DynamicImage>> {
        self.state.lock().image.clone()
    }

    /// Returns the load status.
    #[must_use]
    pub fn status(&self) -> ImageStatus {
        self.state.lock().status.clone()
    }

    /// Number of times a final image has been shown.
    #[must_use]
    pub fn deliveries(&self) -> u64 {
        self.state.lock().deliveries
    }

    /// Returns the id of the associated task, if any.
    #[must_use]
    pub fn task_id(&self) -> Option<TaskId> {
        self.state.lock().task.as_ref().map(TaskHandle::id)
    }

    /// Returns true once an image was delivered.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let state = self.state.lock();
        state.image.is_some() && state.status.is_ready()
    }

    /// Returns true while a task is associated and nothing was delivered.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.lock().status.is_loading()
    }

    /// Dimensions of the shown image.
    #[must_use]
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.state
            .lock()
            .image
            .as_ref()
            .map(|image| (image.width(), image.height()))
    }
}

impl DisplaySurface for ImageSurface {
    fn associated_task(&self) -> Option<TaskHandle> {
        self.state.lock().task.clone()
    }

    fn associate(&self, task: TaskHandle, placeholder: Option<Arc<image::DynamicImage>>) {
        let mut state = self.state.lock();
        state.task = Some(task);
        state.status = ImageStatus::Loading;
        if placeholder.is_some() {
            state.image = placeholder;
        }
    }

    fn clear_association(&self) {
        let mut state = self.state.lock();
        state.task = None;
        if state.status.is_loading() {
            state.status = ImageStatus::Empty;
        }
    }

    fn set_image(&self, image: Arc<image::DynamicImage>) {
        self.state.lock().show(image);
    }

    fn mark_failed(&self, task: TaskId, reason: &str) {
        let mut state = self.state.lock();
        if state.task.as_ref().is_some_and(|current| current.is(task)) {
            state.task = None;
            state.status = ImageStatus::Failed(reason.to_string());
        }
    }

    fn deliver(&self, task: TaskId, image: Arc<image::DynamicImage>) -> bool {
        let mut state = self.state.lock();
        if state.task.as_ref().is_some_and(|current| current.is(task)) {
            state.show(image);
            true
        } else {
            false
        }
    }
}

impl std::fmt::Debug for ImageSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ImageSurface")
            .field("has_image", &state.image.is_some())
            .field("status", &state.status)
            .field("task", &state.task.as_ref().map(TaskHandle::id))
            .field("deliveries", &state.deliveries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ImageRef, TaskControl};

    fn pixel() -> Arc<image::DynamicImage> {
        Arc::new(image::DynamicImage::new_rgb8(1, 1))
    }

    #[test]
    fn test_associate_shows_placeholder() {
        let surface = ImageSurface::new();
        let task = TaskControl::new(ImageRef::file("a.png"));

        surface.associate(task.handle(), Some(pixel()));

        assert!(surface.is_loading());
        assert_eq!(surface.task_id(), Some(task.id()));
        assert_eq!(surface.dimensions(), Some((1, 1)));
        assert!(!surface.is_ready());
    }

    #[test]
    fn test_deliver_requires_current_association() {
        let surface = ImageSurface::new();
        let old = TaskControl::new(ImageRef::file("old.png"));
        let new = TaskControl::new(ImageRef::file("new.png"));
        surface.associate(old.handle(), None);
        surface.associate(new.handle(), None);

        assert!(!surface.deliver(old.id(), pixel()));
        assert!(surface.image().is_none());

        assert!(surface.deliver(new.id(), pixel()));
        assert!(surface.is_ready());
        assert_eq!(surface.deliveries(), 1);
        assert_eq!(surface.task_id(), None);
    }

    #[test]
    fn test_mark_failed_keeps_placeholder() {
        let surface = ImageSurface::new();
        let task = TaskControl::new(ImageRef::file("broken.png"));
        let other = TaskControl::new(ImageRef::file("other.png"));
        surface.associate(task.handle(), Some(pixel()));

        surface.mark_failed(other.id(), "ignored");
        assert!(surface.is_loading());

        surface.mark_failed(task.id(), "not an image");
        assert_eq!(surface.status(), ImageStatus::Failed("not an image".into()));
        assert!(surface.image().is_some());
    }

    #[test]
    fn test_clear_association_resets_loading() {
        let surface = ImageSurface::new();
        let task = TaskControl::new(ImageRef::file("a.png"));
        surface.associate(task.handle(), None);

        surface.clear_association();

        assert!(surface.associated_task().is_none());
        assert_eq!(surface.status(), ImageStatus::Empty);
    }
}
