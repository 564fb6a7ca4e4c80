//! Shared pid lookup table
//!
//! One table spans every namespace: a pid visible at N levels has N entries,
//! each keyed by the numeric id paired with the identity of the namespace
//! that id is relative to.
//!
//! The table does not synchronize itself. Its contract is that every
//! mutation happens under the caller's exclusive structural lock; the
//! registry enforces that by construction, keeping the table inside its
//! write-locked state. Lookups are safe from the read side because entries
//! hold shared handles that stay valid once published.

use std::collections::HashMap;
use std::sync::Arc;

use nucleus_core::RawPid;

use crate::namespace::NsId;
use crate::pid::Pid;

/// Lookup key: a numeric id qualified by the namespace it is relative to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PidKey {
    /// Numeric id as seen in the namespace
    pub nr: RawPid,
    /// Identity of the namespace the id belongs to
    pub ns: NsId,
}

/// The (namespace, id) → pid map
///
/// Mutation requires the caller-held structural write lock; see the module
/// documentation.
#[derive(Debug, Default)]
pub struct PidTable {
    entries: HashMap<PidKey, Arc<Pid>>,
}

impl PidTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an entry for one namespace level of a pid
    pub fn insert(&mut self, key: PidKey, pid: Arc<Pid>) {
        let previous = self.entries.insert(key, pid);
        debug_assert!(previous.is_none(), "pid table key reused while live");
    }

    /// Find the pid carrying `key.nr` in the namespace `key.ns`
    #[must_use]
    pub fn lookup(&self, key: PidKey) -> Option<&Arc<Pid>> {
        self.entries.get(&key)
    }

    /// Unlink one namespace level of a pid, returning the published handle
    pub fn remove(&mut self, key: PidKey) -> Option<Arc<Pid>> {
        self.entries.remove(&key)
    }

    /// Number of published entries across all namespaces
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
