//! Core type definitions with strong typing

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric process identifier, relative to one namespace
///
/// The same process carries one of these per namespace level it is visible
/// in; a raw value on its own is meaningless without the namespace it was
/// allocated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct RawPid(i32);

impl RawPid {
    /// Create from a raw numeric value
    #[must_use]
    pub const fn from_raw(nr: i32) -> Self {
        Self(nr)
    }

    /// Get the raw numeric value
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for RawPid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Uid(u32);

impl Uid {
    /// The superuser identity
    pub const ROOT: Self = Self(0);

    /// Create from a raw uid value
    #[must_use]
    pub const fn from_raw(uid: u32) -> Self {
        Self(uid)
    }

    /// Get the raw uid value
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Whether this is the superuser identity
    #[must_use]
    pub const fn is_root(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque task identifier assigned by the task-creation machinery
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// Create from a raw value
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a task is attached to a pid
///
/// A pid names a single process, but the same object also serves as the
/// identity of a process group or a session; each role keeps its own list of
/// attached tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PidType {
    /// The task is the process the pid names
    Process,
    /// The task belongs to the process group the pid names
    Group,
    /// The task belongs to the session the pid names
    Session,
}

impl PidType {
    /// Number of attachment types
    pub const COUNT: usize = 3;

    /// All attachment types, in index order
    pub const ALL: [Self; Self::COUNT] = [Self::Process, Self::Group, Self::Session];

    /// Index of this type into per-type attachment arrays
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Process => 0,
            Self::Group => 1,
            Self::Session => 2,
        }
    }

    /// Short name, as used in log fields
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Group => "group",
            Self::Session => "session",
        }
    }
}

impl fmt::Display for PidType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Isolation flags for namespace cloning
///
/// Absence of a flag means "share the existing namespace, do not clone".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IsolationFlags(u32);

impl IsolationFlags {
    /// Allocate a child pid namespace
    pub const NEW_PID: Self = Self(0b0000_0001);
    /// Allocate a child user namespace
    pub const NEW_USER: Self = Self(0b0000_0010);
    /// Allocate a child host-identity namespace
    pub const NEW_UTS: Self = Self(0b0000_0100);

    /// All recognized flags
    pub const ALL: Self = Self(0b0000_0111);
    /// No isolation requested
    pub const NONE: Self = Self(0);

    /// Create from raw bits
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Get raw bits
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check if every flag in `other` is set
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Check if no flag is set
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The subset of bits this build does not recognize
    #[must_use]
    pub const fn unknown(self) -> Self {
        Self(self.0 & !Self::ALL.0)
    }
}

impl std::ops::BitOr for IsolationFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for IsolationFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for IsolationFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        let mut emit = |f: &mut fmt::Formatter<'_>, name: &str| -> fmt::Result {
            if !first {
                f.write_str("|")?;
            }
            first = false;
            f.write_str(name)
        };
        if self.contains(Self::NEW_PID) {
            emit(f, "pid")?;
        }
        if self.contains(Self::NEW_USER) {
            emit(f, "user")?;
        }
        if self.contains(Self::NEW_UTS) {
            emit(f, "uts")?;
        }
        if !self.unknown().is_empty() {
            emit(f, "unknown")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_pid_roundtrip() {
        let pid = RawPid::from_raw(123);
        assert_eq!(pid.as_raw(), 123);
        assert_eq!(format!("{pid}"), "123");
    }

    #[test]
    fn uid_root() {
        assert!(Uid::ROOT.is_root());
        assert!(!Uid::from_raw(1000).is_root());
    }

    #[test]
    fn pid_type_indices_are_dense() {
        for (i, ty) in PidType::ALL.iter().enumerate() {
            assert_eq!(ty.index(), i);
        }
    }

    #[test]
    fn isolation_flags_ops() {
        let flags = IsolationFlags::NEW_PID | IsolationFlags::NEW_UTS;
        assert!(flags.contains(IsolationFlags::NEW_PID));
        assert!(flags.contains(IsolationFlags::NEW_UTS));
        assert!(!flags.contains(IsolationFlags::NEW_USER));
        assert!(flags.unknown().is_empty());
        assert!(!IsolationFlags::from_bits(0b1000).unknown().is_empty());
    }

    #[test]
    fn isolation_flags_display() {
        assert_eq!(format!("{}", IsolationFlags::NONE), "none");
        assert_eq!(
            format!("{}", IsolationFlags::NEW_PID | IsolationFlags::NEW_USER),
            "pid|user"
        );
    }

    #[test]
    fn raw_pid_serde() {
        let pid = RawPid::from_raw(42);
        let json = serde_json::to_string(&pid).unwrap();
        assert_eq!(json, "42");
        let back: RawPid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pid);
    }
}
