//! Decides what to do with a surface's current task when new content is requested.

use tracing::trace;

use crate::domain::entities::{Fingerprint, TaskId};
use crate::domain::ports::DisplaySurface;

/// Result of inspecting a surface before assigning it new content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// A live task is already loading the same content; do nothing.
    Reuse(TaskId),
    /// Start a new task. `cancelled` names the prior task a cancellation was
    /// requested for, if any.
    Proceed {
        /// Task that was asked to cancel.
        cancelled: Option<TaskId>,
    },
}

impl GuardDecision {
    /// Returns true if a new task should be created.
    #[must_use]
    pub const fn should_proceed(&self) -> bool {
        matches!(self, Self::Proceed { .. })
    }
}

/// Cancels the surface's in-flight task unless it already loads `key`.
///
/// Tasks that are finished or gone count as no task. Cancellation of a
/// differing task is requested regardless of whether it can still take effect.
pub fn cancel_potential_load(surface: &dyn DisplaySurface, key: &Fingerprint) -> GuardDecision {
    let Some(current) = surface.associated_task() else {
        return GuardDecision::Proceed { cancelled: None };
    };
    if !current.is_active() {
        return GuardDecision::Proceed { cancelled: None };
    }
    if current.key() == key {
        trace!(task = %current.id(), key = %key, "Surface already loading this image");
        return GuardDecision::Reuse(current.id());
    }
    let accepted = current.cancel();
    trace!(task = %current.id(), accepted, "Cancelled superseded load");
    GuardDecision::Proceed {
        cancelled: Some(current.id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ImageRef, TaskControl, TaskState};
    use crate::presentation::widgets::ImageSurface;

    #[test]
    fn test_empty_surface_proceeds() {
        let surface = ImageSurface::new();
        let decision = cancel_potential_load(&surface, &Fingerprint::of("a"));
        assert_eq!(decision, GuardDecision::Proceed { cancelled: None });
    }

    #[test]
    fn test_same_content_is_reused() {
        let surface = ImageSurface::new();
        let task = TaskControl::new(ImageRef::file("a.png"));
        surface.associate(task.handle(), None);

        let decision = cancel_potential_load(&surface, &ImageRef::file("a.png").fingerprint());

        assert_eq!(decision, GuardDecision::Reuse(task.id()));
        assert!(!task.is_cancelled());
    }

    #[test]
    fn test_equal_keys_compare_by_value() {
        let surface = ImageSurface::new();
        let task = TaskControl::new(ImageRef::file("a.png"));
        surface.associate(task.handle(), None);

        // A freshly computed fingerprint is a distinct allocation.
        let key = Fingerprint::of(&String::from("a.png"));
        assert!(!cancel_potential_load(&surface, &key).should_proceed());
    }

    #[test]
    fn test_different_content_cancels_prior_task() {
        let surface = ImageSurface::new();
        let task = TaskControl::new(ImageRef::file("a.png"));
        surface.associate(task.handle(), None);

        let decision = cancel_potential_load(&surface, &Fingerprint::of("b.png"));

        assert_eq!(
            decision,
            GuardDecision::Proceed {
                cancelled: Some(task.id())
            }
        );
        assert!(task.is_cancelled());
        assert_eq!(task.state(), TaskState::Cancelled);
    }

    #[test]
    fn test_finished_task_is_not_reused() {
        let surface = ImageSurface::new();
        let task = TaskControl::new(ImageRef::file("a.png"));
        surface.associate(task.handle(), None);
        task.advance(TaskState::Running);
        task.advance(TaskState::Completed);

        let decision = cancel_potential_load(&surface, &ImageRef::file("a.png").fingerprint());
        assert_eq!(decision, GuardDecision::Proceed { cancelled: None });
    }

    #[test]
    fn test_dropped_task_counts_as_none() {
        let surface = ImageSurface::new();
        let task = TaskControl::new(ImageRef::file("a.png"));
        surface.associate(task.handle(), None);
        drop(task);

        let decision = cancel_potential_load(&surface, &ImageRef::file("a.png").fingerprint());
        assert_eq!(decision, GuardDecision::Proceed { cancelled: None });
    }
}
