//! Decode task identity, lifecycle and the non-owning handle surfaces hold.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use uuid::Uuid;

use super::image::{Fingerprint, ImageRef};

/// Unique identity of a decode task. Delivery compares these, never keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generates a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Lifecycle state of a decode task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Exists and is associated, not yet scheduled on a worker.
    #[default]
    Created,
    /// Executing on a worker.
    Running,
    /// Produced a result (possibly no image).
    Completed,
    /// Cancelled before producing a deliverable result.
    Cancelled,
}

impl TaskState {
    /// Returns true for `Completed` and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    const fn can_become(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Running | Self::Cancelled)
                | (Self::Running, Self::Completed | Self::Cancelled)
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Shared control block of one decode task.
///
/// Owned (through `Arc`) by whoever runs the task. Surfaces only ever see it
/// through a [`TaskHandle`].
#[derive(Debug)]
pub struct TaskControl {
    id: TaskId,
    source: ImageRef,
    key: Fingerprint,
    cancelled: AtomicBool,
    state: Mutex<TaskState>,
}

impl TaskControl {
    /// Creates a control block in the `Created` state.
    #[must_use]
    pub fn new(source: ImageRef) -> Arc<Self> {
        let key = source.fingerprint();
        Arc::new(Self {
            id: TaskId::new(),
            source,
            key,
            cancelled: AtomicBool::new(false),
            state: Mutex::new(TaskState::Created),
        })
    }

    /// Returns the task id.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the source being loaded.
    #[must_use]
    pub const fn source(&self) -> &ImageRef {
        &self.source
    }

    /// Returns the target fingerprint.
    #[must_use]
    pub const fn key(&self) -> &Fingerprint {
        &self.key
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Requests cancellation.
    ///
    /// Returns false if the task had already reached a terminal state, in which
    /// case the request has no effect. A task still in `Created` moves straight to
    /// `Cancelled`; a running task observes the flag at its next phase boundary.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return false;
        }
        self.cancelled.store(true, Ordering::Release);
        if *state == TaskState::Created {
            *state = TaskState::Cancelled;
        }
        true
    }

    /// Moves to `next` if the lifecycle allows it. Returns whether it moved.
    pub fn advance(&self, next: TaskState) -> bool {
        let mut state = self.state.lock();
        if state.can_become(next) {
            *state = next;
            true
        } else {
            false
        }
    }

    /// Returns a non-owning handle for surface association.
    #[must_use]
    pub fn handle(self: &Arc<Self>) -> TaskHandle {
        TaskHandle {
            id: self.id,
            key: self.key.clone(),
            control: Arc::downgrade(self),
        }
    }
}

/// Non-owning reference from a display surface to the task filling it.
///
/// Holding a handle never keeps the task alive. Once the task has been dropped
/// by its runner the handle reports it as inactive.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    key: Fingerprint,
    control: Weak<TaskControl>,
}

impl TaskHandle {
    /// Returns the task id.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the fingerprint the task is loading.
    #[must_use]
    pub const fn key(&self) -> &Fingerprint {
        &self.key
    }

    /// Returns the task's state, or `None` if the task no longer exists.
    #[must_use]
    pub fn state(&self) -> Option<TaskState> {
        self.control.upgrade().map(|control| control.state())
    }

    /// Returns true if the task exists and has not reached a terminal state.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state().is_some_and(|state| !state.is_terminal())
    }

    /// Requests cancellation. Returns false if the task is gone or already terminal.
    pub fn cancel(&self) -> bool {
        self.control.upgrade().is_some_and(|control| control.cancel())
    }

    /// Returns true if this handle refers to the given task.
    #[must_use]
    pub fn is(&self, id: TaskId) -> bool {
        self.id == id
    }
}
