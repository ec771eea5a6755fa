//! Port definition for the widget that shows a loaded image.

use std::sync::Arc;

use crate::domain::entities::{TaskHandle, TaskId};

/// A display target that decode tasks fill.
///
/// The loader never inspects layout or rendering; it only swaps the image and
/// maintains the association with the task responsible for the surface.
pub trait DisplaySurface: Send + Sync {
    /// Returns the task currently responsible for this surface, if any.
    fn associated_task(&self) -> Option<TaskHandle>;

    /// Replaces the association with `task` and shows `placeholder` while it runs.
    fn associate(&self, task: TaskHandle, placeholder: Option<Arc<image::DynamicImage>>);

    /// Drops the association without touching the shown image.
    fn clear_association(&self);

    /// Shows `image` and drops any association.
    fn set_image(&self, image: Arc<image::DynamicImage>);

    /// Records that the associated task could not produce an image. The placeholder
    /// stays on screen.
    fn mark_failed(&self, _task: TaskId, _reason: &str) {}

    /// Shows `image` only if the surface is still associated with `task`.
    ///
    /// Returns whether the image was shown. The default performs the check and the
    /// update separately; implementations that can be reassigned from another
    /// thread should override it with an atomic compare-and-set.
    fn deliver(&self, task: TaskId, image: Arc<image::DynamicImage>) -> bool {
        if self
            .associated_task()
            .is_some_and(|current| current.is(task))
        {
            self.set_image(image);
            true
        } else {
            false
        }
    }
}
