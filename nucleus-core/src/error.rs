//! Error types for Nucleus

use thiserror::Error;

use crate::types::IsolationFlags;

/// Nucleus error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The numeric id range of a namespace is fully in use
    #[error("pid range exhausted in namespace at level {level}")]
    Exhausted {
        /// Depth of the namespace whose range ran out
        level: u32,
    },

    /// Backing memory could not be obtained
    ///
    /// Distinct from [`Error::Exhausted`]: the id range may still have free
    /// slots, but the storage needed to track or link them was unavailable.
    #[error("allocation failure: {what}")]
    AllocationFailure {
        /// The structure that could not grow
        what: &'static str,
    },

    /// An isolation flag was requested that this build does not recognize
    #[error("unsupported isolation request: {flags}")]
    Unsupported {
        /// The offending flag set
        flags: IsolationFlags,
    },

    /// An id projection was asked for a namespace the pid has no entry in
    #[error("pid has no entry at the requested namespace level")]
    NamespaceMismatch,

    /// A host identity field failed validation
    #[error("invalid host identity: {message}")]
    InvalidIdentity {
        /// Error message
        message: String,
    },

    /// System error from nix
    #[error("system error: {0}")]
    System(#[from] nix::Error),
}

/// Result type alias for Nucleus operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::Exhausted { level: 2 };
        assert_eq!(
            err.to_string(),
            "pid range exhausted in namespace at level 2"
        );

        let err = Error::AllocationFailure { what: "pid bitmap page" };
        assert!(err.to_string().contains("pid bitmap page"));
    }

    #[test]
    fn unsupported_names_the_flags() {
        let err = Error::Unsupported {
            flags: IsolationFlags::NEW_PID | IsolationFlags::NEW_UTS,
        };
        let text = err.to_string();
        assert!(text.contains("pid"));
        assert!(text.contains("uts"));
    }
}
