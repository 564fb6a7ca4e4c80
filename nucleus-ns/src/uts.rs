//! Host-identity namespace
//!
//! The UTS namespace needs almost no special handling: no hierarchy, just a
//! reference-counted wrapper around the host identity record. The record
//! has its own reader/writer lock, separate from the structural lock over
//! the task/pid graph - any task reads it, only explicit identity-change
//! requests write it.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use nucleus_core::{Error, IsolationFlags, Result};

/// Maximum byte length of one host identity field
pub const IDENTITY_FIELD_MAX: usize = 64;

/// The host identity record
///
/// The fields a `uname`-style query reports: system name, node (host)
/// name, kernel release and version, machine architecture, and the NIS
/// domain name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentity {
    /// Operating system name
    pub sysname: String,
    /// Network node (host) name
    pub nodename: String,
    /// Operating system release
    pub release: String,
    /// Operating system version
    pub version: String,
    /// Hardware architecture identifier
    pub machine: String,
    /// NIS domain name
    pub domainname: String,
}

impl HostIdentity {
    /// Snapshot the identity of the running system via `uname(2)`
    ///
    /// The NIS domain name is read separately; `nix` has no wrapper for
    /// it, so that one field goes through raw `libc`.
    pub fn from_system() -> Result<Self> {
        let uts = nix::sys::utsname::uname()?;
        Ok(Self {
            sysname: uts.sysname().to_string_lossy().into_owned(),
            nodename: uts.nodename().to_string_lossy().into_owned(),
            release: uts.release().to_string_lossy().into_owned(),
            version: uts.version().to_string_lossy().into_owned(),
            machine: uts.machine().to_string_lossy().into_owned(),
            domainname: read_domainname(),
        })
    }

    fn validate_field(name: &'static str, value: &str) -> Result<()> {
        if value.len() > IDENTITY_FIELD_MAX {
            return Err(Error::InvalidIdentity {
                message: format!("{name} longer than {IDENTITY_FIELD_MAX} bytes"),
            });
        }
        if value.contains('\0') {
            return Err(Error::InvalidIdentity {
                message: format!("{name} contains an interior NUL"),
            });
        }
        Ok(())
    }
}

fn read_domainname() -> String {
    let mut buf = [0_u8; IDENTITY_FIELD_MAX + 1];
    // SAFETY: the buffer outlives the call and its length is passed along.
    let rc = unsafe { libc::getdomainname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc != 0 {
        return String::from("(none)");
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// A private view of the host identity record
///
/// Shared (`Arc`) like every namespace object; cloned views diverge from
/// the moment of the copy, so identity changes inside one are invisible
/// outside it.
pub struct UtsNamespace {
    name: RwLock<HostIdentity>,
}

impl UtsNamespace {
    /// Wrap an identity record in a fresh namespace
    #[must_use]
    pub fn new(identity: HostIdentity) -> Arc<Self> {
        Arc::new(Self {
            name: RwLock::new(identity),
        })
    }

    /// Create the initial namespace seeded from the running system
    pub fn from_system() -> Result<Arc<Self>> {
        Ok(Self::new(HostIdentity::from_system()?))
    }

    /// Snapshot the current record
    #[must_use]
    pub fn identity(&self) -> HostIdentity {
        self.name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The current host name
    #[must_use]
    pub fn hostname(&self) -> String {
        self.name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .nodename
            .clone()
    }

    /// Change the host name, visible only within this namespace
    pub fn set_hostname(&self, name: &str) -> Result<()> {
        HostIdentity::validate_field("hostname", name)?;
        self.name
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .nodename = name.to_owned();
        tracing::debug!(hostname = %name, "hostname changed");
        Ok(())
    }

    /// Change the NIS domain name, visible only within this namespace
    pub fn set_domainname(&self, name: &str) -> Result<()> {
        HostIdentity::validate_field("domainname", name)?;
        self.name
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .domainname = name.to_owned();
        tracing::debug!(domainname = %name, "domain name changed");
        Ok(())
    }
}

impl std::fmt::Debug for UtsNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UtsNamespace")
            .field("nodename", &self.hostname())
            .finish_non_exhaustive()
    }
}

/// Clone or share the host-identity namespace
///
/// Without [`IsolationFlags::NEW_UTS`], the existing namespace is returned
/// with its count incremented. With it, the record is flat-copied under
/// the read lock; later changes on either side stay private.
#[must_use]
pub fn copy_utsname(flags: IsolationFlags, old: &Arc<UtsNamespace>) -> Arc<UtsNamespace> {
    if !flags.contains(IsolationFlags::NEW_UTS) {
        return Arc::clone(old);
    }
    let snapshot = old.identity();
    tracing::debug!(nodename = %snapshot.nodename, "uts namespace cloned");
    UtsNamespace::new(snapshot)
}
