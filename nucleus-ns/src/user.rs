//! User namespace and per-user resource accounting
//!
//! Structurally the user namespace mirrors the UTS one - reference
//! counted, cloned on demand - but it carries state: a uid-keyed table of
//! accounts tracking per-user resource consumption. Cloning creates a
//! fresh, empty table with a new root account, plus an account for the
//! identity acting at the time; the caller's proxy then charges resources
//! against the new accounts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use nucleus_core::{Error, IsolationFlags, Result, Uid};

/// Per-user resource bookkeeping within one user namespace
///
/// Accounts are shared by every task running as that uid in the
/// namespace; the counters move with task and file lifecycle events.
pub struct UserAccount {
    uid: Uid,
    processes: AtomicU32,
    open_files: AtomicU32,
}

impl UserAccount {
    fn new(uid: Uid) -> Arc<Self> {
        Arc::new(Self {
            uid,
            processes: AtomicU32::new(0),
            open_files: AtomicU32::new(0),
        })
    }

    /// The uid this account charges
    #[must_use]
    pub const fn uid(&self) -> Uid {
        self.uid
    }

    /// Number of processes currently charged to this account
    #[must_use]
    pub fn process_count(&self) -> u32 {
        self.processes.load(Ordering::Acquire)
    }

    /// Number of open files currently charged to this account
    #[must_use]
    pub fn file_count(&self) -> u32 {
        self.open_files.load(Ordering::Acquire)
    }

    /// Charge one process
    pub fn note_process_started(&self) {
        self.processes.fetch_add(1, Ordering::AcqRel);
    }

    /// Release one process charge
    pub fn note_process_exited(&self) {
        let prev = self.processes.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "process count underflow");
    }

    /// Charge one open file
    pub fn note_file_opened(&self) {
        self.open_files.fetch_add(1, Ordering::AcqRel);
    }

    /// Release one open-file charge
    pub fn note_file_closed(&self) {
        let prev = self.open_files.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "file count underflow");
    }
}

impl std::fmt::Debug for UserAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserAccount")
            .field("uid", &self.uid)
            .field("processes", &self.process_count())
            .field("open_files", &self.file_count())
            .finish()
    }
}

/// A private uid-to-account view
///
/// Destroyed when the last holder releases it, which drops every account
/// the namespace still holds.
pub struct UserNamespace {
    accounts: RwLock<HashMap<Uid, Arc<UserAccount>>>,
    root_account: Arc<UserAccount>,
}

impl UserNamespace {
    /// Create a namespace containing only a root account
    #[must_use]
    pub fn new_root() -> Arc<Self> {
        let root_account = UserAccount::new(Uid::ROOT);
        let mut accounts = HashMap::new();
        accounts.insert(Uid::ROOT, Arc::clone(&root_account));
        Arc::new(Self {
            accounts: RwLock::new(accounts),
            root_account,
        })
    }

    /// The namespace's root account
    #[must_use]
    pub const fn root_account(&self) -> &Arc<UserAccount> {
        &self.root_account
    }

    /// The account for `uid`, if one exists
    #[must_use]
    pub fn lookup_account(&self, uid: Uid) -> Option<Arc<UserAccount>> {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&uid)
            .cloned()
    }

    /// The account for `uid`, created if absent
    ///
    /// # Errors
    /// [`Error::AllocationFailure`] if the account table cannot grow.
    pub fn resolve_account(&self, uid: Uid) -> Result<Arc<UserAccount>> {
        if let Some(account) = self.lookup_account(uid) {
            return Ok(account);
        }
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        // Re-check under the write lock; another resolver may have won.
        if let Some(account) = accounts.get(&uid) {
            return Ok(Arc::clone(account));
        }
        accounts
            .try_reserve(1)
            .map_err(|_| Error::AllocationFailure {
                what: "user account table",
            })?;
        let account = UserAccount::new(uid);
        accounts.insert(uid, Arc::clone(&account));
        tracing::debug!(uid = %uid, "user account created");
        Ok(account)
    }

    /// Number of accounts currently held
    #[must_use]
    pub fn account_count(&self) -> usize {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for UserNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserNamespace")
            .field("accounts", &self.account_count())
            .finish_non_exhaustive()
    }
}

impl Drop for UserNamespace {
    fn drop(&mut self) {
        // The account table is released with the namespace; accounts still
        // shared elsewhere survive on their own counts.
        tracing::debug!(accounts = self.account_count(), "user namespace destroyed");
    }
}

/// Clone or share the user namespace
///
/// Without [`IsolationFlags::NEW_USER`], the existing namespace is shared
/// with its count incremented. With it, a fresh namespace is created with
/// a new root account and an account for `current_uid` already resolved;
/// the caller is expected to switch its accounting identity to that
/// account (the proxy layer does this on rewiring).
///
/// # Errors
/// [`Error::AllocationFailure`] if the fresh account table cannot grow.
pub fn copy_user_ns(
    flags: IsolationFlags,
    old: &Arc<UserNamespace>,
    current_uid: Uid,
) -> Result<Arc<UserNamespace>> {
    if !flags.contains(IsolationFlags::NEW_USER) {
        return Ok(Arc::clone(old));
    }
    let ns = UserNamespace::new_root();
    ns.resolve_account(current_uid)?;
    tracing::info!(uid = %current_uid, "user namespace cloned");
    Ok(ns)
}
