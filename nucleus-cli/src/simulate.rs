//! The `simulate` subcommand: nested namespaces with live tasks

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use nucleus_core::{PidType, Uid};
use nucleus_ns::{IsolationConfig, NsProxy, copy_namespaces};
use nucleus_pid::{PidNamespace, PidRegistry};

use crate::cli::SimulateArgs;

#[derive(Serialize)]
struct TaskRow {
    task: u64,
    /// The task's numeric id at each namespace level, root first
    ids: Vec<i32>,
}

#[derive(Serialize)]
struct SimulationReport {
    depth: u32,
    hostname: String,
    tasks: Vec<TaskRow>,
    hashed_entries: usize,
}

pub fn execute(args: &SimulateArgs) -> anyhow::Result<()> {
    let registry = PidRegistry::new();
    let host = NsProxy::for_system(Arc::clone(registry.root()))
        .context("seeding the root namespaces")?;

    // Nest one pid namespace per level; the deepest also gets its own
    // identity record.
    let mut current = host;
    for level in 1..=args.depth {
        let config = if level == args.depth {
            let mut config = IsolationConfig::new().with_pid(true).with_uts(true);
            if let Some(ref hostname) = args.hostname {
                config = config.with_hostname(hostname.as_str());
            }
            config
        } else {
            IsolationConfig::new().with_pid(true)
        };
        current = copy_namespaces(config.to_flags(), &current, Uid::from_raw(1000))
            .with_context(|| format!("cloning namespaces at level {level}"))?;
        config
            .apply_identity(current.uts_namespace())
            .context("applying the configured identity")?;
    }

    let leaf: Arc<PidNamespace> = Arc::clone(current.pid_namespace());
    let lineage = leaf.lineage();

    // Create the tasks and record every level's view of each one.
    let mut tasks = Vec::with_capacity(args.tasks);
    let mut rows = Vec::with_capacity(args.tasks);
    for _ in 0..args.tasks {
        let task = registry.create_task(&leaf).context("creating a task")?;
        let pid = task
            .pid(PidType::Process)
            .context("freshly created task has no pid")?;
        let ids = lineage
            .iter()
            .map(|ns| pid.nr_ns(ns).map(nucleus_core::RawPid::as_raw))
            .collect::<Result<Vec<_>, _>>()
            .context("projecting ids through the lineage")?;
        rows.push(TaskRow {
            task: task.id().as_raw(),
            ids,
        });
        tasks.push(task);
    }

    let report = SimulationReport {
        depth: args.depth,
        hostname: current.uts_namespace().hostname(),
        tasks: rows,
        hashed_entries: registry.hashed_entries(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    // Tear the scenario down the way task exit does, and wait for the
    // deferred releases so the drain is visible below.
    for task in &tasks {
        registry.exit_task(task);
    }
    registry.synchronize();

    if !args.json {
        println!();
        println!(
            "Drained: {} resident, {} hashed entries",
            leaf.resident_count(),
            registry.hashed_entries()
        );
    }

    Ok(())
}

fn print_report(report: &SimulationReport) {
    println!(
        "🧪 {} task(s) at namespace depth {} (hostname: {})",
        report.tasks.len(),
        report.depth,
        report.hostname
    );
    println!();
    println!("{:<6} {}", "TASK", "IDS (root → leaf)");
    for row in &report.tasks {
        let ids: Vec<String> = row.ids.iter().map(ToString::to_string).collect();
        println!("{:<6} {}", row.task, ids.join(" → "));
    }
    println!();
    println!("Hashed entries: {}", report.hashed_entries);
}
