//! The pid registry: coarse-locked entry points over the identity core
//!
//! All structural mutation of the task/pid graph - hash publication,
//! attachment edges, transfers - happens under one exclusive write lock
//! held here. Lookups take the read side plus a grace pin, so teardown can
//! never release an object out from under a concurrent reader; unlinked
//! handles are retired to the grace domain instead of dropped inline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use nucleus_core::{GraceDomain, PidType, RawPid, Result, TaskId};

use crate::namespace::PidNamespace;
use crate::pid::{Pid, UPid};
use crate::table::{PidKey, PidTable};
use crate::task::Task;

/// Shared state container for pid allocation, lookup, and attachment
///
/// One registry spans every namespace in a tree; it owns the root
/// namespace, the lookup table, and the grace domain teardown defers to.
pub struct PidRegistry {
    root: Arc<PidNamespace>,
    table: RwLock<PidTable>,
    grace: GraceDomain,
    next_task_id: AtomicU64,
}

impl PidRegistry {
    /// Create a registry with a fresh root namespace
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(PidNamespace::new_root())
    }

    /// Create a registry over an existing root namespace
    #[must_use]
    pub fn with_root(root: Arc<PidNamespace>) -> Self {
        Self {
            root,
            table: RwLock::new(PidTable::new()),
            grace: GraceDomain::new(),
            next_task_id: AtomicU64::new(1),
        }
    }

    /// The root namespace of this registry's tree
    #[must_use]
    pub const fn root(&self) -> &Arc<PidNamespace> {
        &self.root
    }

    /// Number of published table entries, across all namespaces
    #[must_use]
    pub fn hashed_entries(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Block until every deferred release queued so far has completed
    ///
    /// After this returns, objects freed before the call have dropped their
    /// numeric ids back to their namespaces.
    pub fn synchronize(&self) {
        self.grace.synchronize();
    }

    /// Allocate a pid in `ns`
    ///
    /// Claims one numeric id per namespace level from the root down to
    /// `ns`, publishes the pid at every level, and registers it as resident
    /// everywhere it is visible. On failure at any level, ids already
    /// claimed at shallower levels are released before the error surfaces.
    ///
    /// The returned handle owns the identity: callers that do not attach a
    /// task must eventually hand it to [`PidRegistry::free_pid`].
    pub fn alloc_pid(&self, ns: &Arc<PidNamespace>) -> Result<Arc<Pid>> {
        let lineage = ns.lineage();
        let mut claimed: Vec<(Arc<PidNamespace>, RawPid)> = Vec::with_capacity(lineage.len());
        for level_ns in &lineage {
            match level_ns.allocate_nr() {
                Ok(nr) => claimed.push((Arc::clone(level_ns), nr)),
                Err(err) => {
                    for (owner, nr) in claimed.drain(..) {
                        owner.release_nr(nr);
                    }
                    tracing::warn!(
                        error = %err,
                        level = level_ns.level(),
                        "pid allocation failed, shallower levels rolled back"
                    );
                    return Err(err);
                }
            }
        }

        let numbers: Vec<UPid> = claimed
            .iter()
            .map(|(owner, nr)| UPid::new(*nr, owner))
            .collect();
        let pid = Arc::new(Pid::new(Arc::clone(ns), numbers));

        {
            let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
            for (owner, nr) in &claimed {
                table.insert(
                    PidKey {
                        nr: *nr,
                        ns: owner.id(),
                    },
                    Arc::clone(&pid),
                );
                owner.register_resident(*nr, &pid);
            }
        }

        tracing::debug!(
            pid = %pid.vnr(),
            root_pid = %pid.nr(),
            level = pid.level(),
            "pid allocated"
        );
        Ok(pid)
    }

    /// Unpublish a pid from every namespace level
    ///
    /// Table entries are retired through the grace domain, so a reader
    /// mid-lookup keeps a valid object; the numeric ids return to their
    /// allocators only once the last handle drops.
    pub fn free_pid(&self, pid: &Arc<Pid>) {
        let retired = {
            let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
            Self::unlink_locked(&mut table, pid)
        };
        if !retired.is_empty() {
            tracing::debug!(pid = %pid.vnr(), root_pid = %pid.nr(), "pid unhashed");
        }
        for handle in retired {
            self.grace.retire(handle);
        }
    }

    fn unlink_locked(table: &mut PidTable, pid: &Arc<Pid>) -> Vec<Arc<Pid>> {
        let mut retired = Vec::new();
        for upid in pid.numbers() {
            if let Some(entry) = table.remove(PidKey {
                nr: upid.nr(),
                ns: upid.ns_id(),
            }) {
                retired.push(entry);
            }
            if let Some(owner) = upid.namespace() {
                owner.unregister_resident(upid.nr());
            }
        }
        retired
    }

    /// Find the pid carrying `nr` in `ns`
    ///
    /// Runs against the read side with a grace pin; safe concurrently with
    /// any teardown.
    #[must_use]
    pub fn find_pid_ns(&self, nr: RawPid, ns: &Arc<PidNamespace>) -> Option<Arc<Pid>> {
        let _pin = self.grace.pin();
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(PidKey { nr, ns: ns.id() })
            .cloned()
    }

    /// Find a pid by its id in the root namespace
    #[must_use]
    pub fn find_pid(&self, nr: RawPid) -> Option<Arc<Pid>> {
        self.find_pid_ns(nr, &self.root)
    }

    /// Find a pid by its virtual id, as seen from `task`'s namespace
    #[must_use]
    pub fn find_vpid(&self, nr: RawPid, task: &Task) -> Option<Arc<Pid>> {
        self.find_pid_ns(nr, task.active_namespace())
    }

    /// Look up a virtual id and take a counted reference
    ///
    /// Every lookup in this crate returns an owning handle already; this
    /// name exists for callers that want the acquisition explicit at the
    /// call site.
    #[must_use]
    pub fn find_get_pid(&self, nr: RawPid, task: &Task) -> Option<Arc<Pid>> {
        self.find_vpid(nr, task)
    }

    /// Attach `task` to `pid` under `ty`
    ///
    /// # Errors
    /// [`nucleus_core::Error::AllocationFailure`] if the linkage storage
    /// cannot grow; the graph is left unchanged in that case.
    pub fn attach_pid(&self, task: &Arc<Task>, ty: PidType, pid: &Arc<Pid>) -> Result<()> {
        let previous = {
            let _guard = self.table.write().unwrap_or_else(PoisonError::into_inner);
            pid.attach_task(ty, task)?;
            task.set_link(ty, Arc::clone(pid))
        };
        debug_assert!(previous.is_none(), "attach over a live link");
        if let Some(stale) = previous {
            self.grace.retire(stale);
        }
        tracing::debug!(task = %task.id(), ty = %ty, pid = %pid.vnr(), "task attached");
        Ok(())
    }

    /// Detach `task`'s `ty` edge
    ///
    /// A no-op if no such edge exists. When the final task detaches, the
    /// pid is unpublished from every level and its release deferred past
    /// any in-flight reader.
    pub fn detach_pid(&self, task: &Arc<Task>, ty: PidType) {
        let (link, unhashed) = {
            let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
            let Some(pid) = task.take_link(ty) else {
                return;
            };
            pid.detach_task(ty, task.id());
            let unhashed = if pid.has_attached_tasks() {
                Vec::new()
            } else {
                Self::unlink_locked(&mut table, &pid)
            };
            (pid, unhashed)
        };
        tracing::debug!(task = %task.id(), ty = %ty, pid = %link.vnr(), "task detached");
        for handle in unhashed {
            self.grace.retire(handle);
        }
        self.grace.retire(link);
    }

    /// Move the `ty` edge from one task to another in a single step
    ///
    /// There is no window in which the pid has neither task attached; used
    /// when a group or session leader changes identity. A no-op if `from`
    /// holds no such edge.
    pub fn transfer_pid(&self, from: &Arc<Task>, to: &Arc<Task>, ty: PidType) {
        let moved = {
            let _guard = self.table.write().unwrap_or_else(PoisonError::into_inner);
            let Some(pid) = from.take_link(ty) else {
                return;
            };
            pid.replace_task(ty, from.id(), to);
            let previous = to.set_link(ty, Arc::clone(&pid));
            debug_assert!(previous.is_none(), "transfer over a live link");
            (pid, previous)
        };
        tracing::debug!(
            from = %from.id(),
            to = %to.id(),
            ty = %ty,
            pid = %moved.0.vnr(),
            "attachment transferred"
        );
        if let Some(stale) = moved.1 {
            self.grace.retire(stale);
        }
    }

    /// Task-creation hook: allocate an identity in `ns` and attach the new
    /// task to it as the process
    ///
    /// The first task created in a fresh namespace becomes its reaper.
    pub fn create_task(&self, ns: &Arc<PidNamespace>) -> Result<Arc<Task>> {
        let pid = self.alloc_pid(ns)?;
        let id = TaskId::from_raw(self.next_task_id.fetch_add(1, Ordering::Relaxed));
        let task = Task::new(id, Arc::clone(ns));
        if let Err(err) = self.attach_pid(&task, PidType::Process, &pid) {
            self.free_pid(&pid);
            return Err(err);
        }
        if ns.reaper().is_none() {
            ns.set_reaper(&task);
        }
        tracing::info!(task = %task.id(), pid = %pid.vnr(), level = ns.level(), "task created");
        Ok(task)
    }

    /// Task-teardown hook: detach every attachment type
    pub fn exit_task(&self, task: &Arc<Task>) {
        for ty in PidType::ALL {
            self.detach_pid(task, ty);
        }
        tracing::debug!(task = %task.id(), "task exited");
    }

    /// Terminate every task resident in `ns` and wait for the drain
    ///
    /// Requests termination of every task attached to every pid visible at
    /// this level - the reaper's synchronous collection of its orphans -
    /// then blocks, without a timeout, until the namespace holds no
    /// resident pids. The scheduling machinery must drive the flagged
    /// tasks through [`PidRegistry::exit_task`] for the drain to complete.
    pub fn zap_pid_ns_processes(&self, ns: &Arc<PidNamespace>) {
        let residents = ns.resident_pids();
        tracing::info!(
            ns = %ns.id(),
            level = ns.level(),
            residents = residents.len(),
            "draining pid namespace"
        );
        for pid in &residents {
            for ty in PidType::ALL {
                for task in pid.tasks(ty) {
                    task.request_termination();
                }
            }
        }
        // Hold no strong pid handles while blocking on the drain.
        drop(residents);
        ns.wait_drained();
        tracing::info!(ns = %ns.id(), level = ns.level(), "pid namespace drained");
    }
}

impl Default for PidRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PidRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PidRegistry")
            .field("root", &self.root.id())
            .field("hashed_entries", &self.hashed_entries())
            .finish_non_exhaustive()
    }
}
