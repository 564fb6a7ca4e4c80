use std::sync::Arc;

use nucleus_ns::*;
use nucleus_pid::{PidRegistry, PidType};

fn system_proxy(registry: &PidRegistry) -> NsProxy {
    NsProxy::new(
        Arc::clone(registry.root()),
        UserNamespace::new_root(),
        UtsNamespace::new(HostIdentity {
            sysname: "Nucleus".into(),
            nodename: "host".into(),
            release: "0.1.0".into(),
            version: "#1".into(),
            machine: "x86_64".into(),
            domainname: "(none)".into(),
        }),
        Uid::ROOT,
    )
    .unwrap()
}

#[test]
fn test_isolated_container_end_to_end() {
    let registry = PidRegistry::new();
    let host = system_proxy(&registry);

    // A fully isolated "container": own pid numbering, own accounting,
    // own hostname.
    let config = IsolationConfig::all().with_hostname("container-1");
    let container = copy_namespaces(config.to_flags(), &host, Uid::from_raw(1000)).unwrap();
    config.apply_identity(container.uts_namespace()).unwrap();

    // Pid isolation: ids restart inside, while staying visible outside.
    let task = registry.create_task(container.pid_namespace()).unwrap();
    let pid = task.pid(PidType::Process).unwrap();
    assert_eq!(pid.vnr().as_raw(), 1);
    assert_eq!(pid.level(), 1);
    assert!(registry.find_pid(pid.nr()).is_some());

    // Identity isolation: the host record is untouched.
    assert_eq!(container.uts_namespace().hostname(), "container-1");
    assert_eq!(host.uts_namespace().hostname(), "host");

    // Accounting isolation: charges land on the container's account.
    container.accounting_identity().note_process_started();
    assert_eq!(container.accounting_identity().process_count(), 1);
    assert_eq!(
        host.user_namespace()
            .lookup_account(Uid::from_raw(1000))
            .map(|a| a.process_count()),
        None
    );

    registry.exit_task(&task);
    registry.synchronize();
    assert_eq!(container.pid_namespace().resident_count(), 0);
}

#[test]
fn test_shared_proxy_keeps_namespace_identity() {
    let registry = PidRegistry::new();
    let host = system_proxy(&registry);

    let sibling = copy_namespaces(IsolationFlags::NONE, &host, Uid::ROOT).unwrap();
    assert!(Arc::ptr_eq(host.pid_namespace(), sibling.pid_namespace()));

    // Tasks created through either proxy see each other.
    let a = registry.create_task(host.pid_namespace()).unwrap();
    let nr = a.pid(PidType::Process).unwrap().vnr();
    let found = registry.find_pid_ns(nr, sibling.pid_namespace()).unwrap();
    assert_eq!(found.vnr(), nr);

    registry.exit_task(&a);
}

#[test]
fn test_nested_containers_translate_ids_per_level() {
    let registry = PidRegistry::new();
    let host = system_proxy(&registry);

    let outer = copy_namespaces(IsolationFlags::NEW_PID, &host, Uid::ROOT).unwrap();
    let inner = copy_namespaces(IsolationFlags::NEW_PID, &outer, Uid::ROOT).unwrap();

    // Two tasks in the outer namespace push its numbering past the
    // inner's.
    let t1 = registry.create_task(outer.pid_namespace()).unwrap();
    let t2 = registry.create_task(outer.pid_namespace()).unwrap();
    let t3 = registry.create_task(inner.pid_namespace()).unwrap();

    let pid3 = t3.pid(PidType::Process).unwrap();
    assert_eq!(pid3.numbers().len(), 3);
    assert_eq!(pid3.vnr().as_raw(), 1);
    assert_eq!(pid3.nr_ns(outer.pid_namespace()).unwrap().as_raw(), 3);
    assert_eq!(pid3.nr_ns(inner.pid_namespace()).unwrap(), pid3.vnr());

    for task in [&t1, &t2, &t3] {
        registry.exit_task(task);
    }
}

#[test]
fn test_unsupported_isolation_surfaces_to_the_requester() {
    let registry = PidRegistry::new();
    let host = system_proxy(&registry);

    let bogus = IsolationFlags::from_bits(0b100_0000 | IsolationFlags::NEW_PID.bits());
    match copy_namespaces(bogus, &host, Uid::ROOT) {
        Err(Error::Unsupported { flags }) => assert!(flags.unknown() == flags),
        other => panic!("expected Unsupported, got {other:?}"),
    }
}
