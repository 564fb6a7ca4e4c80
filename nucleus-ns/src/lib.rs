//! User and host-identity namespaces, and the per-task namespace proxy
//!
//! This crate carries the simpler namespaced objects next to the pid
//! hierarchy:
//! - UTS namespace - private view of the host identity record
//! - User namespace - private uid-keyed resource accounting
//! - `NsProxy` - the per-task bundle rewired on an isolation request
//!
//! Cloning follows one rule everywhere: without the matching isolation
//! flag the existing namespace is shared with its count incremented; with
//! it, a fresh object is created and the caller's proxy points at it.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod config;
pub mod proxy;
pub mod user;
pub mod uts;

pub use config::IsolationConfig;
pub use proxy::{NsProxy, copy_namespaces};
pub use user::{UserAccount, UserNamespace, copy_user_ns};
pub use uts::{HostIdentity, IDENTITY_FIELD_MAX, UtsNamespace, copy_utsname};

// Re-export commonly used core types
pub use nucleus_core::{Error, IsolationFlags, Result, Uid};
