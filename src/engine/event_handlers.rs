// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::condition::TriggerRecord;
use crate::engine::{EngineContext, RuntimeOptions};
use crate::process::{Enqueued, ProcessDefinition, Qualification, consider_promotion, force_promotion};
use crate::promotion::RunOutcome;
use crate::types::{Actor, BuildRef, Parameters};

/// A process that should start its next run.
#[derive(Clone)]
pub struct ScheduledPromotion {
    pub job: String,
    pub process: Arc<ProcessDefinition>,
}

impl fmt::Debug for ScheduledPromotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledPromotion")
            .field("job", &self.job)
            .field("process", &self.process.name())
            .finish()
    }
}

/// Command produced by the core, to be executed by the outer async shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Hand these runs to the executor.
    DispatchRuns(Vec<ScheduledPromotion>),
    /// Request that the runtime exits (idle with `exit_when_idle`).
    RequestExit,
}

/// Decision returned by the core after handling a single `EngineEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    pub keep_running: bool,
}

impl CoreStep {
    fn dispatch(runs: Vec<ScheduledPromotion>) -> Self {
        let commands = if runs.is_empty() {
            Vec::new()
        } else {
            vec![CoreCommand::DispatchRuns(runs)]
        };
        Self {
            commands,
            keep_running: true,
        }
    }
}

/// Handle a finished build.
///
/// The build itself is considered for its job's processes, and so is every
/// build that caused it, transitively: downstream results can complete an
/// upstream build's conditions.
pub fn handle_build_completed(ctx: &EngineContext, build: BuildRef) -> CoreStep {
    let mut runs = Vec::new();
    let mut seen = HashSet::new();
    let mut pending = VecDeque::from([build]);

    while let Some(current) = pending.pop_front() {
        if !seen.insert(current.clone()) {
            continue;
        }
        let Some(info) = ctx.host.resolve(&current) else {
            debug!(build = %current, "build not found on host; skipping");
            continue;
        };
        pending.extend(info.upstream_causes.iter().cloned());
        runs.extend(consider_build(ctx, &current));
    }

    CoreStep::dispatch(runs)
}

/// Record that `upstream` triggered a build of `project`.
pub fn handle_build_triggered(ctx: &EngineContext, upstream: BuildRef, project: String, number: Option<u64>) -> CoreStep {
    if ctx.dispatcher.registry(&upstream.job).is_some() {
        ctx.ledgers
            .ledger(&upstream)
            .record_trigger(TriggerRecord::new(project, number));
    }
    CoreStep::dispatch(Vec::new())
}

/// Handle a finished promotion run.
///
/// The queue is released through the definition that ran, so a rename of
/// the process or its job while the run was in flight cannot strand it. If
/// more targets are queued the next run is dispatched right away, and the
/// promoted build is considered again for the job's other processes.
pub fn handle_run_finished(
    ctx: &EngineContext,
    options: &RuntimeOptions,
    run: ScheduledPromotion,
    outcome: RunOutcome,
) -> CoreStep {
    let mut runs = Vec::new();

    let process = run.process;
    if process.queue().finish() {
        runs.push(ScheduledPromotion {
            job: process.owner(),
            process,
        });
    }

    if let Some(target) = &outcome.target {
        runs.extend(consider_build(ctx, target));
    }

    let mut step = CoreStep::dispatch(runs);
    if options.exit_when_idle && step.commands.is_empty() && ctx.dispatcher.all_idle() {
        step.commands.push(CoreCommand::RequestExit);
        step.keep_running = false;
    }
    step
}

/// Handle a forced promotion. Authorization was checked by the caller.
pub fn handle_promotion_requested(
    ctx: &EngineContext,
    job: String,
    process: String,
    build: BuildRef,
    actor: Actor,
    parameters: Parameters,
) -> CoreStep {
    let Some(def) = ctx.dispatcher.registry(&job).and_then(|r| r.get(&process)) else {
        warn!(job = %job, process = %process, "forced promotion for unknown process");
        return CoreStep::dispatch(Vec::new());
    };
    let Some(info) = ctx.host.resolve(&build) else {
        warn!(build = %build, "forced promotion of unknown build");
        return CoreStep::dispatch(Vec::new());
    };

    let ledger = ctx.ledgers.ledger(&build);
    let mut runs = Vec::new();
    if force_promotion(&def, &info, &ledger, &actor, &parameters) == Enqueued::Dispatch {
        runs.push(ScheduledPromotion { job, process: def });
    }
    CoreStep::dispatch(runs)
}

/// Consider `build` for every active process of its job.
fn consider_build(ctx: &EngineContext, build: &BuildRef) -> Vec<ScheduledPromotion> {
    let Some(registry) = ctx.dispatcher.registry(&build.job) else {
        return Vec::new();
    };
    let active = registry.active_definitions();
    if active.is_empty() {
        return Vec::new();
    }
    let Some(info) = ctx.host.resolve(build) else {
        return Vec::new();
    };

    let ledger = ctx.ledgers.ledger(build);
    let mut runs = Vec::new();
    for def in active {
        let outcome = consider_promotion(&def, &info, &ledger, ctx.host.as_ref(), &ctx.extensions);
        if matches!(
            outcome,
            Qualification::Qualified {
                enqueued: Enqueued::Dispatch
            }
        ) {
            runs.push(ScheduledPromotion {
                job: build.job.clone(),
                process: def,
            });
        }
    }
    runs
}
