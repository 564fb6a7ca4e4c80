//! The per-task namespace proxy
//!
//! Every task points at one `NsProxy`, the bundle of namespace handles it
//! resolves identity through. An isolation request does not mutate the
//! bundle in place: [`copy_namespaces`] builds a rewired bundle - sharing
//! the namespaces whose flag is absent, cloning the ones requested - and
//! the task-creation machinery swaps it in.

use std::sync::Arc;

use nucleus_core::{Error, IsolationFlags, Result, Uid};
use nucleus_pid::{PidNamespace, copy_pid_ns};

use crate::user::{UserAccount, UserNamespace, copy_user_ns};
use crate::uts::{UtsNamespace, copy_utsname};

/// Bundle of the namespace handles one task resolves through
///
/// Cloning the proxy shares every handle; rewiring goes through
/// [`copy_namespaces`].
#[derive(Debug, Clone)]
pub struct NsProxy {
    pid_ns: Arc<PidNamespace>,
    user_ns: Arc<UserNamespace>,
    uts_ns: Arc<UtsNamespace>,
    account: Arc<UserAccount>,
}

impl NsProxy {
    /// Assemble a proxy from existing namespaces, acting as `uid`
    ///
    /// # Errors
    /// [`Error::AllocationFailure`] if the accounting identity cannot be
    /// resolved in `user_ns`.
    pub fn new(
        pid_ns: Arc<PidNamespace>,
        user_ns: Arc<UserNamespace>,
        uts_ns: Arc<UtsNamespace>,
        uid: Uid,
    ) -> Result<Self> {
        let account = user_ns.resolve_account(uid)?;
        Ok(Self {
            pid_ns,
            user_ns,
            uts_ns,
            account,
        })
    }

    /// Build the initial proxy: fresh root user namespace, host identity
    /// seeded from the running system, acting as root
    pub fn for_system(pid_ns: Arc<PidNamespace>) -> Result<Self> {
        Self::new(
            pid_ns,
            UserNamespace::new_root(),
            UtsNamespace::from_system()?,
            Uid::ROOT,
        )
    }

    /// The pid namespace this proxy allocates from
    #[must_use]
    pub const fn pid_namespace(&self) -> &Arc<PidNamespace> {
        &self.pid_ns
    }

    /// The user namespace resources are charged in
    #[must_use]
    pub const fn user_namespace(&self) -> &Arc<UserNamespace> {
        &self.user_ns
    }

    /// The host-identity namespace
    #[must_use]
    pub const fn uts_namespace(&self) -> &Arc<UtsNamespace> {
        &self.uts_ns
    }

    /// The account resource consumption is currently charged against
    #[must_use]
    pub const fn accounting_identity(&self) -> &Arc<UserAccount> {
        &self.account
    }
}

/// Build a rewired proxy according to the isolation flags
///
/// Each namespace kind follows the same rule: flag absent, share the old
/// handle (count incremented); flag present, clone. When a new user
/// namespace is created the accounting identity switches to the account
/// resolved for `current_uid` inside it; otherwise the old identity keeps
/// accumulating charges.
///
/// # Errors
/// [`Error::Unsupported`] for flag bits this build does not recognize;
/// allocation and depth failures from the individual clone paths surface
/// unchanged.
pub fn copy_namespaces(
    flags: IsolationFlags,
    old: &NsProxy,
    current_uid: Uid,
) -> Result<NsProxy> {
    let unknown = flags.unknown();
    if !unknown.is_empty() {
        return Err(Error::Unsupported { flags: unknown });
    }

    let pid_ns = copy_pid_ns(flags, &old.pid_ns)?;
    let user_ns = copy_user_ns(flags, &old.user_ns, current_uid)?;
    let uts_ns = copy_utsname(flags, &old.uts_ns);
    let account = if flags.contains(IsolationFlags::NEW_USER) {
        user_ns.resolve_account(current_uid)?
    } else {
        Arc::clone(&old.account)
    };

    tracing::debug!(flags = %flags, uid = %current_uid, "namespace proxy rewired");
    Ok(NsProxy {
        pid_ns,
        user_ns,
        uts_ns,
        account,
    })
}
