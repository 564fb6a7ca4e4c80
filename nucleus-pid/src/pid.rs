//! The pid identity object
//!
//! A `Pid` is the internal notion of a process identifier: it names a
//! process, a process group, or a session, independently of any task that
//! carries it. Tasks attach to and detach from a shared `Pid`; holding one
//! is safe across the named process exiting, because the numeric value is
//! only recycled once the object for its previous use is fully gone.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use nucleus_core::{Error, PidType, RawPid, Result, TaskId};

use crate::namespace::{NsId, PidNamespace};
use crate::task::Task;

/// One namespace level of a pid: the numeric id as seen from that namespace
#[derive(Debug, Clone)]
pub struct UPid {
    nr: RawPid,
    ns: Weak<PidNamespace>,
    ns_id: NsId,
}

impl UPid {
    pub(crate) fn new(nr: RawPid, ns: &Arc<PidNamespace>) -> Self {
        Self {
            nr,
            ns: Arc::downgrade(ns),
            ns_id: ns.id(),
        }
    }

    /// Numeric id at this level
    #[must_use]
    pub const fn nr(&self) -> RawPid {
        self.nr
    }

    /// Identity of the namespace this level belongs to
    #[must_use]
    pub const fn ns_id(&self) -> NsId {
        self.ns_id
    }

    /// The namespace this level belongs to, if still alive
    #[must_use]
    pub fn namespace(&self) -> Option<Arc<PidNamespace>> {
        self.ns.upgrade()
    }
}

/// Shared process identity
///
/// Holds one [`UPid`] per namespace level from the root down to the
/// namespace it was allocated in, plus one task list per attachment type.
/// The object is shared (`Arc`), never copied; dropping the last handle
/// releases the numeric id at every level.
pub struct Pid {
    owner: Arc<PidNamespace>,
    numbers: Vec<UPid>,
    tasks: [Mutex<Vec<Weak<Task>>>; PidType::COUNT],
}

impl Pid {
    pub(crate) fn new(owner: Arc<PidNamespace>, numbers: Vec<UPid>) -> Self {
        debug_assert_eq!(numbers.len(), owner.level() as usize + 1);
        Self {
            owner,
            numbers,
            tasks: std::array::from_fn(|_| Mutex::new(Vec::new())),
        }
    }

    /// Depth of the owning namespace; `numbers` has `level + 1` entries
    #[must_use]
    pub fn level(&self) -> u32 {
        self.owner.level()
    }

    /// The namespace this pid was allocated in
    #[must_use]
    pub const fn namespace(&self) -> &Arc<PidNamespace> {
        &self.owner
    }

    /// Every namespace level of this pid, root first
    #[must_use]
    pub fn numbers(&self) -> &[UPid] {
        &self.numbers
    }

    /// The id as seen from the root namespace
    #[must_use]
    pub fn nr(&self) -> RawPid {
        self.numbers[0].nr
    }

    /// The id as seen from the owning namespace
    ///
    /// Only meaningful to callers running in that namespace.
    #[must_use]
    pub fn vnr(&self) -> RawPid {
        self.numbers[self.numbers.len() - 1].nr
    }

    /// The id as seen from `ns`
    ///
    /// # Errors
    /// [`Error::NamespaceMismatch`] if this pid has no entry at that
    /// namespace's level.
    pub fn nr_ns(&self, ns: &Arc<PidNamespace>) -> Result<RawPid> {
        self.numbers
            .get(ns.level() as usize)
            .filter(|upid| upid.ns_id == ns.id())
            .map(|upid| upid.nr)
            .ok_or(Error::NamespaceMismatch)
    }

    /// First live task attached under `ty`, if any
    #[must_use]
    pub fn first_task(&self, ty: PidType) -> Option<Arc<Task>> {
        self.tasks[ty.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find_map(Weak::upgrade)
    }

    /// Every live task attached under `ty`
    #[must_use]
    pub fn tasks(&self, ty: PidType) -> Vec<Arc<Task>> {
        self.tasks[ty.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Whether any task is still attached under any type
    #[must_use]
    pub fn has_attached_tasks(&self) -> bool {
        self.tasks.iter().any(|list| {
            list.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .any(|weak| weak.strong_count() > 0)
        })
    }

    /// Link a task under `ty`; structural write lock held by the caller.
    pub(crate) fn attach_task(&self, ty: PidType, task: &Arc<Task>) -> Result<()> {
        let mut list = self.tasks[ty.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        list.try_reserve(1).map_err(|_| Error::AllocationFailure {
            what: "pid task link",
        })?;
        list.push(Arc::downgrade(task));
        Ok(())
    }

    /// Unlink a task under `ty`; structural write lock held by the caller.
    pub(crate) fn detach_task(&self, ty: PidType, id: TaskId) {
        self.tasks[ty.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|weak| weak.upgrade().is_some_and(|task| task.id() != id));
    }

    /// Move the `ty` edge from one task to another without an unlinked
    /// window; structural write lock held by the caller.
    pub(crate) fn replace_task(&self, ty: PidType, from: TaskId, to: &Arc<Task>) {
        let mut list = self.tasks[ty.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        list.retain(|weak| weak.upgrade().is_some_and(|task| task.id() != from));
        list.push(Arc::downgrade(to));
    }
}

impl std::fmt::Debug for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pid")
            .field("nr", &self.nr())
            .field("vnr", &self.vnr())
            .field("level", &self.level())
            .finish_non_exhaustive()
    }
}

impl Drop for Pid {
    /// Release the numeric id at every namespace level
    ///
    /// Runs only once every holder is gone - table entries, task links,
    /// grace-deferred retirees, external handles - which is exactly when
    /// the values become safe to recycle.
    fn drop(&mut self) {
        let mut ns = Some(Arc::clone(&self.owner));
        for upid in self.numbers.iter().rev() {
            let Some(cur) = ns else { break };
            cur.release_nr(upid.nr);
            ns = cur.parent().cloned();
        }
        tracing::trace!(pid = %self.nr(), level = self.level(), "pid identity released");
    }
}
