//! Isolation request configuration

use serde::{Deserialize, Serialize};

use nucleus_core::{IsolationFlags, Result};

use crate::uts::UtsNamespace;

/// Declarative isolation request
///
/// The builder form of an [`IsolationFlags`] set, plus the identity values
/// to apply to a freshly cloned UTS namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IsolationConfig {
    /// Request a child pid namespace
    pub pid: bool,

    /// Request a child user namespace
    pub user: bool,

    /// Request a child host-identity namespace
    pub uts: bool,

    /// Hostname to set in the cloned identity record
    pub hostname: Option<String>,

    /// Domain name to set in the cloned identity record
    pub domainname: Option<String>,
}

impl IsolationConfig {
    /// Create a request with no isolation: everything shared
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every supported namespace kind
    #[must_use]
    pub fn all() -> Self {
        Self {
            pid: true,
            user: true,
            uts: true,
            hostname: None,
            domainname: None,
        }
    }

    /// Request a pid namespace
    #[must_use]
    pub fn with_pid(mut self, enable: bool) -> Self {
        self.pid = enable;
        self
    }

    /// Request a user namespace
    #[must_use]
    pub fn with_user(mut self, enable: bool) -> Self {
        self.user = enable;
        self
    }

    /// Request a host-identity namespace
    #[must_use]
    pub fn with_uts(mut self, enable: bool) -> Self {
        self.uts = enable;
        self
    }

    /// Set the hostname for the cloned identity record
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Set the domain name for the cloned identity record
    #[must_use]
    pub fn with_domainname(mut self, domainname: impl Into<String>) -> Self {
        self.domainname = Some(domainname.into());
        self
    }

    /// Convert to the flag set the clone entry points take
    #[must_use]
    pub fn to_flags(&self) -> IsolationFlags {
        let mut bits = 0;
        if self.pid {
            bits |= IsolationFlags::NEW_PID.bits();
        }
        if self.user {
            bits |= IsolationFlags::NEW_USER.bits();
        }
        if self.uts {
            bits |= IsolationFlags::NEW_UTS.bits();
        }
        IsolationFlags::from_bits(bits)
    }

    /// Check if any namespace is requested
    #[must_use]
    pub const fn has_any(&self) -> bool {
        self.pid || self.user || self.uts
    }

    /// Names of the requested namespace kinds
    #[must_use]
    pub fn enabled_namespaces(&self) -> Vec<&'static str> {
        let mut namespaces = Vec::new();
        if self.pid {
            namespaces.push("pid");
        }
        if self.user {
            namespaces.push("user");
        }
        if self.uts {
            namespaces.push("uts");
        }
        namespaces
    }

    /// Apply the configured identity values to a cloned UTS namespace
    ///
    /// # Errors
    /// Field validation errors from the identity setters.
    pub fn apply_identity(&self, uts: &UtsNamespace) -> Result<()> {
        if let Some(ref hostname) = self.hostname {
            uts.set_hostname(hostname)?;
        }
        if let Some(ref domainname) = self.domainname {
            uts.set_domainname(domainname)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uts::HostIdentity;

    #[test]
    fn default_config_shares_everything() {
        let config = IsolationConfig::new();
        assert!(!config.has_any());
        assert!(config.to_flags().is_empty());
    }

    #[test]
    fn builder_pattern() {
        let config = IsolationConfig::new()
            .with_pid(true)
            .with_uts(true)
            .with_hostname("sandbox");

        assert!(config.pid);
        assert!(!config.user);
        assert_eq!(config.hostname.as_deref(), Some("sandbox"));
    }

    #[test]
    fn flags_conversion() {
        let flags = IsolationConfig::all().to_flags();
        assert_eq!(flags, IsolationFlags::ALL);

        let flags = IsolationConfig::new().with_user(true).to_flags();
        assert!(flags.contains(IsolationFlags::NEW_USER));
        assert!(!flags.contains(IsolationFlags::NEW_PID));
    }

    #[test]
    fn enabled_namespaces_lists_requested_kinds() {
        let config = IsolationConfig::new().with_pid(true).with_uts(true);
        let enabled = config.enabled_namespaces();
        assert!(enabled.contains(&"pid"));
        assert!(enabled.contains(&"uts"));
        assert!(!enabled.contains(&"user"));
    }

    #[test]
    fn apply_identity_sets_configured_fields() {
        let uts = UtsNamespace::new(HostIdentity::default());
        let config = IsolationConfig::new()
            .with_uts(true)
            .with_hostname("sandbox")
            .with_domainname("example.org");

        config.apply_identity(&uts).unwrap();
        let identity = uts.identity();
        assert_eq!(identity.nodename, "sandbox");
        assert_eq!(identity.domainname, "example.org");
    }

    #[test]
    fn config_serde_roundtrip() {
        let config = IsolationConfig::all().with_hostname("sandbox");
        let json = serde_json::to_string(&config).unwrap();
        let back: IsolationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pid, config.pid);
        assert_eq!(back.hostname, config.hostname);
    }
}
