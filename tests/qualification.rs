// tests/qualification.rs

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use promoted::badge::Badge;
use promoted::condition::{ConditionExtension, ConditionRegistry, EvaluationContext};
use promoted::config::ProcessConfig;
use promoted::dispatch::Dispatcher;
use promoted::engine::{CoreCommand, CoreRuntime, CoreStep, EngineContext, EngineEvent, RuntimeOptions};
use promoted::fs::mock::MockFileSystem;
use promoted::host::{ScriptError, ScriptValue};
use promoted::ledger::{Ledger, LedgerStore};
use promoted::process::{Enqueued, Qualification, consider_promotion};
use promoted::registry::ProcessRegistry;
use promoted::types::{BuildRef, BuildResult};
use promoted_test_utils::builders::{BuildBuilder, ProcessConfigBuilder};
use promoted_test_utils::fake_host::InMemoryHost;
use promoted_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn registry(processes: Vec<ProcessConfig>, extensions: &ConditionRegistry) -> Result<ProcessRegistry, Box<dyn Error>> {
    let registry = ProcessRegistry::new(Arc::new(MockFileSystem::new()), "/data", "app");
    registry.reconfigure(processes, extensions)?;
    Ok(registry)
}

fn core(host: Arc<InMemoryHost>, processes: Vec<ProcessConfig>) -> Result<CoreRuntime, Box<dyn Error>> {
    let fs = Arc::new(MockFileSystem::new());
    let ctx = EngineContext {
        host,
        dispatcher: Arc::new(Dispatcher::new(fs.clone(), "/data")),
        ledgers: Arc::new(LedgerStore::new(fs, "/data")),
        extensions: Arc::new(ConditionRegistry::new()),
    };
    ctx.dispatcher
        .subscribe("app")?
        .reconfigure(processes, &ctx.extensions)?;
    Ok(CoreRuntime::new(ctx, RuntimeOptions::default()))
}

fn dispatched(step: &CoreStep) -> Vec<String> {
    step.commands
        .iter()
        .flat_map(|c| match c {
            CoreCommand::DispatchRuns(runs) => runs.iter().map(|r| r.process.name()).collect(),
            CoreCommand::RequestExit => Vec::new(),
        })
        .collect()
}

/// Extension that is always met and counts how often it was asked.
#[derive(Default)]
struct CountingExtension {
    calls: AtomicUsize,
}

impl ConditionExtension for CountingExtension {
    fn id(&self) -> &str {
        "counting"
    }

    fn display_name(&self) -> &str {
        "Counts its evaluations"
    }

    fn evaluate(
        &self,
        _settings: &BTreeMap<String, String>,
        _ctx: &EvaluationContext<'_>,
    ) -> Option<BTreeMap<String, String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Some(BTreeMap::from([("CHECKED".to_string(), "yes".to_string())]))
    }
}

#[test]
fn concurrent_evaluations_qualify_a_build_once() -> TestResult {
    init_tracing();
    let extensions = ConditionRegistry::new();
    let registry = registry(
        vec![ProcessConfigBuilder::new("qa").self_promotion(false).build()],
        &extensions,
    )?;
    let qa = registry.get("qa").ok_or("qa missing")?;
    let host = InMemoryHost::new();
    let build = BuildBuilder::new("app", 1).build();
    let ledger = Ledger::in_memory(build.reference.clone());

    let outcomes: Vec<Qualification> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| consider_promotion(&qa, &build, &ledger, &host, &extensions)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let qualified = outcomes
        .iter()
        .filter(|o| matches!(o, Qualification::Qualified { .. }))
        .count();
    assert_eq!(qualified, 1);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, Qualification::Qualified { .. } | Qualification::AlreadyQualified))
    );
    assert_eq!(ledger.statuses().len(), 1);
    assert_eq!(qa.queue().len(), 1);
    Ok(())
}

#[test]
fn first_unmet_condition_stops_evaluation() -> TestResult {
    init_tracing();
    let counting = Arc::new(CountingExtension::default());
    let mut extensions = ConditionRegistry::new();
    extensions.register(counting.clone());

    let registry = registry(
        vec![
            ProcessConfigBuilder::new("gated")
                .scripted("gate-open")
                .extension("counting")
                .build(),
        ],
        &extensions,
    )?;
    let gated = registry.get("gated").ok_or("gated missing")?;

    let host = InMemoryHost::new();
    host.set_script("gate-open", Ok(ScriptValue::Bool(false)));
    let build = BuildBuilder::new("app", 3).build();
    let ledger = Ledger::in_memory(build.reference.clone());

    assert_eq!(
        consider_promotion(&gated, &build, &ledger, &host, &extensions),
        Qualification::NotMet
    );
    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);

    host.set_script("gate-open", Ok(ScriptValue::Bool(true)));
    assert_eq!(
        consider_promotion(&gated, &build, &ledger, &host, &extensions),
        Qualification::Qualified {
            enqueued: Enqueued::Dispatch
        }
    );
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);

    let status = ledger.status("gated").ok_or("status missing")?;
    assert_eq!(status.badges.len(), 2);
    assert!(matches!(
        &status.badges[1],
        Badge::Extension { id, variables } if id == "counting" && variables["CHECKED"] == "yes"
    ));
    Ok(())
}

#[test]
fn failing_scripts_leave_other_processes_alone() -> TestResult {
    init_tracing();
    let host = Arc::new(InMemoryHost::new());
    host.add_build(BuildBuilder::new("app", 5).build());
    host.set_script("boom", Err(ScriptError::Failed("division by zero".to_string())));
    host.set_script("odd", Ok(ScriptValue::Other("42".to_string())));

    let mut core = core(
        Arc::clone(&host),
        vec![
            ProcessConfigBuilder::new("broken").scripted("boom").build(),
            ProcessConfigBuilder::new("weird").scripted("odd").build(),
            ProcessConfigBuilder::new("plain").self_promotion(false).build(),
        ],
    )?;

    let step = core.step(EngineEvent::BuildCompleted {
        build: BuildRef::new("app", 5),
    });
    assert!(step.keep_running);
    assert_eq!(dispatched(&step), vec!["plain".to_string()]);
    Ok(())
}

#[test]
fn triggered_builds_gate_the_upstream_build() -> TestResult {
    init_tracing();
    let host = Arc::new(InMemoryHost::new());
    host.add_build(BuildBuilder::new("app", 1).build());
    let mut core = core(
        Arc::clone(&host),
        vec![ProcessConfigBuilder::new("qa").triggered().build()],
    )?;

    let step = core.step(EngineEvent::BuildCompleted {
        build: BuildRef::new("app", 1),
    });
    assert!(dispatched(&step).is_empty(), "nothing triggered yet");

    core.step(EngineEvent::BuildTriggered {
        upstream: BuildRef::new("app", 1),
        project: "tests".to_string(),
        number: Some(5),
    });
    core.step(EngineEvent::BuildTriggered {
        upstream: BuildRef::new("app", 1),
        project: "lint".to_string(),
        number: Some(9),
    });

    // Only one of the two triggered builds has finished.
    host.add_build(BuildBuilder::new("tests", 5).caused_by("app", 1).build());
    let step = core.step(EngineEvent::BuildCompleted {
        build: BuildRef::new("tests", 5),
    });
    assert!(dispatched(&step).is_empty(), "lint#9 has not run");

    host.add_build(
        BuildBuilder::new("lint", 9)
            .result(BuildResult::Unstable)
            .caused_by("app", 1)
            .build(),
    );
    let step = core.step(EngineEvent::BuildCompleted {
        build: BuildRef::new("lint", 9),
    });
    assert!(dispatched(&step).is_empty(), "unstable does not pass by default");
    assert!(core.context().ledgers.ledger(&BuildRef::new("app", 1)).statuses().is_empty());
    assert_eq!(core.context().ledgers.ledger(&BuildRef::new("app", 1)).triggered().len(), 2);
    Ok(())
}

#[test]
fn triggered_pass_qualifies_once_every_triggered_build_succeeds() -> TestResult {
    init_tracing();
    let host = Arc::new(InMemoryHost::new());
    host.add_build(BuildBuilder::new("app", 1).build());
    let mut core = core(
        Arc::clone(&host),
        vec![ProcessConfigBuilder::new("qa").triggered().build()],
    )?;

    core.step(EngineEvent::BuildTriggered {
        upstream: BuildRef::new("app", 1),
        project: "tests".to_string(),
        number: Some(5),
    });
    host.add_build(BuildBuilder::new("tests", 5).caused_by("app", 1).build());
    let step = core.step(EngineEvent::BuildCompleted {
        build: BuildRef::new("tests", 5),
    });
    assert_eq!(dispatched(&step), vec!["qa".to_string()]);
    Ok(())
}
