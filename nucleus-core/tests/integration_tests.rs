use nucleus_core::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_isolation_flags_composition() {
    let flags = IsolationFlags::NEW_PID | IsolationFlags::NEW_USER | IsolationFlags::NEW_UTS;
    assert_eq!(flags, IsolationFlags::ALL);
    assert!(flags.contains(IsolationFlags::NEW_PID));
    assert!(flags.contains(IsolationFlags::NEW_USER));
    assert!(flags.contains(IsolationFlags::NEW_UTS));

    let none = IsolationFlags::NONE;
    assert!(none.is_empty());
    assert!(!none.contains(IsolationFlags::NEW_PID));
}

#[test]
fn test_isolation_flags_roundtrip_bits() {
    let flags = IsolationFlags::NEW_USER | IsolationFlags::NEW_UTS;
    let bits = flags.bits();
    assert_eq!(IsolationFlags::from_bits(bits), flags);
}

#[test]
fn test_pid_type_exhaustive() {
    assert_eq!(PidType::ALL.len(), PidType::COUNT);
    assert_eq!(PidType::Process.index(), 0);
    assert_eq!(PidType::Group.index(), 1);
    assert_eq!(PidType::Session.index(), 2);
}

#[test]
fn test_pid_type_serde() {
    let json = serde_json::to_string(&PidType::Group).unwrap();
    assert_eq!(json, "\"group\"");
    let back: PidType = serde_json::from_str(&json).unwrap();
    assert_eq!(back, PidType::Group);
}

#[test]
fn test_newtype_display() {
    assert_eq!(format!("{}", RawPid::from_raw(17)), "17");
    assert_eq!(format!("{}", Uid::from_raw(1000)), "1000");
    assert_eq!(format!("{}", TaskId::from_raw(9)), "9");
}

#[test]
fn test_error_taxonomy_is_matchable() {
    fn classify(err: &Error) -> &'static str {
        match err {
            Error::Exhausted { .. } => "exhausted",
            Error::AllocationFailure { .. } => "alloc",
            Error::Unsupported { .. } => "unsupported",
            Error::NamespaceMismatch => "mismatch",
            _ => "other",
        }
    }

    assert_eq!(classify(&Error::Exhausted { level: 0 }), "exhausted");
    assert_eq!(classify(&Error::NamespaceMismatch), "mismatch");
}

/// Many readers and reclaimers running together: nothing retired while a
/// reader is pinned may be dropped before that reader unpins.
#[test]
fn test_grace_domain_under_contention() {
    struct CountDrop(Arc<AtomicUsize>);
    impl Drop for CountDrop {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let domain = Arc::new(GraceDomain::new());
    let drops = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();

    for _ in 0..4 {
        let domain = Arc::clone(&domain);
        handles.push(std::thread::spawn(move || {
            for _ in 0..100 {
                let _pin = domain.pin();
            }
        }));
    }

    for _ in 0..4 {
        let domain = Arc::clone(&domain);
        let drops = Arc::clone(&drops);
        handles.push(std::thread::spawn(move || {
            for _ in 0..100 {
                domain.retire(CountDrop(Arc::clone(&drops)));
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    domain.synchronize();
    assert_eq!(drops.load(Ordering::SeqCst), 400);
    assert_eq!(domain.pending(), 0);
}
