//! Minimal task stand-in
//!
//! The real task lifecycle (scheduling, exit collection) lives outside this
//! crate; what the identity core needs from a task is small: a stable id,
//! the pid namespace it allocates from, one pid link per attachment type,
//! and a flag the namespace teardown path can raise to request termination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use nucleus_core::{PidType, TaskId};

use crate::namespace::PidNamespace;
use crate::pid::Pid;

/// A task as seen by the identity core
pub struct Task {
    id: TaskId,
    active_ns: Arc<PidNamespace>,
    terminated: AtomicBool,
    links: [Mutex<Option<Arc<Pid>>>; PidType::COUNT],
}

impl Task {
    pub(crate) fn new(id: TaskId, active_ns: Arc<PidNamespace>) -> Arc<Self> {
        Arc::new(Self {
            id,
            active_ns,
            terminated: AtomicBool::new(false),
            links: std::array::from_fn(|_| Mutex::new(None)),
        })
    }

    /// Stable task identifier
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// The pid namespace this task allocates from and resolves virtual ids
    /// against
    #[must_use]
    pub const fn active_namespace(&self) -> &Arc<PidNamespace> {
        &self.active_ns
    }

    /// The pid this task is attached to under `ty`, if any
    #[must_use]
    pub fn pid(&self, ty: PidType) -> Option<Arc<Pid>> {
        self.links[ty.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether namespace teardown has asked this task to exit
    #[must_use]
    pub fn termination_requested(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Ask this task to exit
    ///
    /// The request is a flag, not an action: the scheduling machinery
    /// observing it is expected to drive the task through `exit_task`.
    pub fn request_termination(&self) {
        if !self.terminated.swap(true, Ordering::AcqRel) {
            tracing::debug!(task = %self.id, "termination requested");
        }
    }

    /// Replace the `ty` link; structural write lock held by the caller.
    pub(crate) fn set_link(&self, ty: PidType, pid: Arc<Pid>) -> Option<Arc<Pid>> {
        self.links[ty.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(pid)
    }

    /// Take the `ty` link; structural write lock held by the caller.
    pub(crate) fn take_link(&self, ty: PidType) -> Option<Arc<Pid>> {
        self.links[ty.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("level", &self.active_ns.level())
            .field("terminated", &self.termination_requested())
            .finish_non_exhaustive()
    }
}
