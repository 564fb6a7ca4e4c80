//! Process-identity allocation and pid namespace hierarchy
//!
//! This crate models the identity half of task management:
//! - `PidBitmap` - per-namespace numeric id allocator
//! - `PidTable` - shared (namespace, id) lookup table
//! - `Pid` - the identity object tasks attach to
//! - `PidNamespace` - the isolation hierarchy ids are relative to
//! - `PidRegistry` - the coarse-locked entry point tying them together
//!
//! A task visible in N nested namespaces holds one numeric id per level;
//! the `Pid` object is shared, never copied, and a numeric value is only
//! recycled once the object representing its previous use is fully gone.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod bitmap;
pub mod namespace;
pub mod pid;
pub mod registry;
pub mod table;
pub mod task;

pub use bitmap::{PID_MAX_DEFAULT, PidBitmap, RESERVED_PIDS};
pub use namespace::{MAX_PID_NS_LEVEL, NsId, PidNamespace, copy_pid_ns};
pub use pid::{Pid, UPid};
pub use registry::PidRegistry;
pub use table::{PidKey, PidTable};
pub use task::Task;

// Re-export commonly used core types
pub use nucleus_core::{Error, IsolationFlags, PidType, RawPid, Result, TaskId};
