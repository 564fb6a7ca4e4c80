//! Pid namespace hierarchy
//!
//! Namespaces form a tree: the root namespace sits at level 0, and every
//! clone is one level deeper, holding a counted edge to its parent. A task
//! inside a nested namespace is visible - under a different numeric id - at
//! every ancestor level, so each namespace runs its own allocator and keeps
//! its own registry of resident pids for teardown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock, Weak};

use serde::{Deserialize, Serialize};

use nucleus_core::{Error, IsolationFlags, RawPid, Result};

use crate::bitmap::{PID_MAX_DEFAULT, PidBitmap};
use crate::pid::Pid;
use crate::task::Task;

/// Maximum nesting depth of pid namespaces
pub const MAX_PID_NS_LEVEL: u32 = 32;

static NEXT_NS_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of one namespace, used as a hash-key component
///
/// Distinct from the namespace's level: two sibling namespaces share a
/// level but never an identity, and an identity is never reused even after
/// the namespace is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct NsId(u64);

impl std::fmt::Display for NsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One pid namespace
///
/// Owns the numeric id allocator for its level, a counted edge to its
/// parent, a designated reaper task, and the set of pids currently resident
/// at this level. Destroyed when the last handle drops, which requires
/// every pid allocated here to be gone and every child namespace released.
pub struct PidNamespace {
    id: NsId,
    level: u32,
    parent: Option<Arc<PidNamespace>>,
    allocator: Mutex<PidBitmap>,
    reaper: RwLock<Weak<Task>>,
    residents: Mutex<HashMap<RawPid, Weak<Pid>>>,
    drained: Condvar,
}

impl PidNamespace {
    /// Create a root namespace (level 0, no parent) with the default id
    /// range
    #[must_use]
    pub fn new_root() -> Arc<Self> {
        Self::root_with_pid_max(PID_MAX_DEFAULT)
    }

    /// Create a root namespace with a custom id range bound
    #[must_use]
    pub fn root_with_pid_max(pid_max: i32) -> Arc<Self> {
        Arc::new(Self {
            id: NsId(NEXT_NS_ID.fetch_add(1, Ordering::Relaxed)),
            level: 0,
            parent: None,
            allocator: Mutex::new(PidBitmap::new(pid_max, 0)),
            reaper: RwLock::new(Weak::new()),
            residents: Mutex::new(HashMap::new()),
            drained: Condvar::new(),
        })
    }

    fn child_of(parent: &Arc<Self>) -> Result<Arc<Self>> {
        Self::child_with_pid_max(parent, parent.pid_max())
    }

    /// Create a child namespace with its own id range bound
    ///
    /// The bound is per-namespace: a container can run with a tighter pid
    /// range than its parent. [`copy_pid_ns`] inherits the parent's bound.
    ///
    /// # Errors
    /// [`Error::Unsupported`] when the nesting depth limit is exceeded.
    pub fn child_with_pid_max(parent: &Arc<Self>, pid_max: i32) -> Result<Arc<Self>> {
        let level = parent.level + 1;
        if level > MAX_PID_NS_LEVEL {
            return Err(Error::Unsupported {
                flags: IsolationFlags::NEW_PID,
            });
        }
        let child = Arc::new(Self {
            id: NsId(NEXT_NS_ID.fetch_add(1, Ordering::Relaxed)),
            level,
            parent: Some(Arc::clone(parent)),
            allocator: Mutex::new(PidBitmap::new(pid_max, level)),
            reaper: RwLock::new(Weak::new()),
            residents: Mutex::new(HashMap::new()),
            drained: Condvar::new(),
        });
        tracing::info!(ns = %child.id, level, parent = %parent.id, "pid namespace cloned");
        Ok(child)
    }

    /// Stable identity of this namespace
    #[must_use]
    pub const fn id(&self) -> NsId {
        self.id
    }

    /// Depth in the namespace tree; the root is 0
    #[must_use]
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// The parent namespace; `None` only for the root
    #[must_use]
    pub const fn parent(&self) -> Option<&Arc<Self>> {
        self.parent.as_ref()
    }

    /// Whether this is the root namespace
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Upper bound (exclusive) of this namespace's id range
    #[must_use]
    pub fn pid_max(&self) -> i32 {
        self.allocator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pid_max()
    }

    /// Whether a numeric id is currently marked in use at this level
    #[must_use]
    pub fn id_in_use(&self, nr: RawPid) -> bool {
        self.allocator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_used(nr)
    }

    /// The ancestor chain, root first, ending with this namespace
    #[must_use]
    pub fn lineage(self: &Arc<Self>) -> Vec<Arc<Self>> {
        let mut chain = Vec::with_capacity(self.level as usize + 1);
        let mut cur = Some(Arc::clone(self));
        while let Some(ns) = cur {
            cur = ns.parent().cloned();
            chain.push(ns);
        }
        chain.reverse();
        chain
    }

    /// Designate the task that collects orphaned descendants in this
    /// namespace
    pub fn set_reaper(&self, task: &Arc<Task>) {
        *self
            .reaper
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(task);
        tracing::debug!(ns = %self.id, task = %task.id(), "namespace reaper set");
    }

    /// The designated reaper, if set and still alive
    #[must_use]
    pub fn reaper(&self) -> Option<Arc<Task>> {
        self.reaper
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
    }

    /// Number of pids currently resident at this level
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.residents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Block until no pid is resident at this level
    ///
    /// The drain is driven externally: tasks observing their termination
    /// request must be exited by the scheduling machinery for the wait to
    /// finish. There is no timeout.
    pub fn wait_drained(&self) {
        let mut residents = self
            .residents
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            residents.retain(|_, weak| weak.strong_count() > 0);
            if residents.is_empty() {
                return;
            }
            residents = self
                .drained
                .wait(residents)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(crate) fn allocate_nr(&self) -> Result<RawPid> {
        self.allocator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .allocate()
    }

    pub(crate) fn release_nr(&self, nr: RawPid) {
        self.allocator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .free(nr);
    }

    pub(crate) fn register_resident(&self, nr: RawPid, pid: &Arc<Pid>) {
        self.residents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(nr, Arc::downgrade(pid));
    }

    pub(crate) fn unregister_resident(&self, nr: RawPid) {
        let mut residents = self
            .residents
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        residents.remove(&nr);
        if residents.is_empty() {
            self.drained.notify_all();
        }
    }

    pub(crate) fn resident_pids(&self) -> Vec<Arc<Pid>> {
        self.residents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

impl std::fmt::Debug for PidNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PidNamespace")
            .field("id", &self.id)
            .field("level", &self.level)
            .field("residents", &self.resident_count())
            .finish_non_exhaustive()
    }
}

impl Drop for PidNamespace {
    fn drop(&mut self) {
        // Bitmap storage and the parent edge are released with the fields;
        // the parent release may cascade further up the tree.
        tracing::debug!(ns = %self.id, level = self.level, "pid namespace destroyed");
    }
}

/// Clone or share a pid namespace, depending on the isolation flags
///
/// Without [`IsolationFlags::NEW_PID`] the existing namespace is shared:
/// the returned handle is the same object with its count incremented. With
/// the flag, a fresh namespace one level deeper is created, holding a
/// counted edge to `parent`.
///
/// # Errors
/// [`Error::Unsupported`] when the nesting depth limit is exceeded.
pub fn copy_pid_ns(flags: IsolationFlags, parent: &Arc<PidNamespace>) -> Result<Arc<PidNamespace>> {
    if !flags.contains(IsolationFlags::NEW_PID) {
        return Ok(Arc::clone(parent));
    }
    PidNamespace::child_of(parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_level_zero_without_parent() {
        let root = PidNamespace::new_root();
        assert_eq!(root.level(), 0);
        assert!(root.is_root());
        assert!(root.parent().is_none());
    }

    #[test]
    fn share_without_flag_increments_count() {
        let root = PidNamespace::new_root();
        let before = Arc::strong_count(&root);
        let shared = copy_pid_ns(IsolationFlags::NONE, &root).unwrap();
        assert!(Arc::ptr_eq(&root, &shared));
        assert_eq!(Arc::strong_count(&root), before + 1);
    }

    #[test]
    fn clone_with_flag_is_one_level_deeper() {
        let root = PidNamespace::new_root();
        let child = copy_pid_ns(IsolationFlags::NEW_PID, &root).unwrap();
        assert!(!Arc::ptr_eq(&root, &child));
        assert_eq!(child.level(), 1);
        assert_eq!(Arc::strong_count(&child), 1);
        assert!(child.parent().is_some_and(|p| Arc::ptr_eq(p, &root)));
        assert_ne!(child.id(), root.id());
    }

    #[test]
    fn destroying_child_releases_parent_edge() {
        let root = PidNamespace::new_root();
        let child = copy_pid_ns(IsolationFlags::NEW_PID, &root).unwrap();
        assert_eq!(Arc::strong_count(&root), 2);
        drop(child);
        assert_eq!(Arc::strong_count(&root), 1);
    }

    #[test]
    fn nesting_depth_is_bounded() {
        let mut ns = PidNamespace::new_root();
        for _ in 0..MAX_PID_NS_LEVEL {
            ns = copy_pid_ns(IsolationFlags::NEW_PID, &ns).unwrap();
        }
        assert_eq!(ns.level(), MAX_PID_NS_LEVEL);
        assert!(matches!(
            copy_pid_ns(IsolationFlags::NEW_PID, &ns),
            Err(Error::Unsupported { .. })
        ));
    }

    #[test]
    fn lineage_runs_root_first() {
        let root = PidNamespace::new_root();
        let mid = copy_pid_ns(IsolationFlags::NEW_PID, &root).unwrap();
        let leaf = copy_pid_ns(IsolationFlags::NEW_PID, &mid).unwrap();

        let chain = leaf.lineage();
        assert_eq!(chain.len(), 3);
        assert!(Arc::ptr_eq(&chain[0], &root));
        assert!(Arc::ptr_eq(&chain[1], &mid));
        assert!(Arc::ptr_eq(&chain[2], &leaf));
    }
}
