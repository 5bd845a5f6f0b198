// src/promotion/runner.rs

//! Executing one promotion run.

use tracing::{error, info, warn};

use crate::host::{Host, StepContext, StepPhase};
use crate::ledger::LedgerStore;
use crate::process::ProcessDefinition;
use crate::promotion::environment::{promotion_environment, promotion_user};
use crate::promotion::record::{PromotionRun, RunResult, TargetRef};
use crate::types::BuildRef;

/// What happened to one run, reported back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub job: String,
    pub process: String,
    /// `None` if no number could be allocated.
    pub number: Option<u64>,
    pub target: Option<BuildRef>,
    pub result: RunResult,
}

/// Take the next queued target of `process` and promote it.
///
/// Runs pre-build then build steps through the host; a failing phase stops
/// the run with `Failure`. The run record is written at start and again at
/// the end. Never panics on storage errors: the outcome is always returned
/// so the engine can release the queue.
pub fn run_next(host: &dyn Host, ledgers: &LedgerStore, process: &ProcessDefinition) -> RunOutcome {
    let job = process.owner();
    let name = process.name();

    let Some(entry) = process.queue().take_next() else {
        let mut run = PromotionRun::start(&name, 0, None);
        run.note = Some("nothing to promote".to_string());
        run.finish(RunResult::Aborted);
        let number = match process.runs().allocate_number() {
            Ok(n) => {
                run.number = n;
                save(process, &run);
                Some(n)
            }
            Err(e) => {
                warn!(job = %job, process = %name, error = %e, "could not allocate run number");
                None
            }
        };
        warn!(job = %job, process = %name, "promotion run started with an empty queue");
        return RunOutcome {
            job,
            process: name,
            number,
            target: None,
            result: RunResult::Aborted,
        };
    };

    let number = match process.runs().allocate_number() {
        Ok(n) => n,
        Err(e) => {
            error!(job = %job, process = %name, target_build = %entry.target, error = %e, "could not allocate run number");
            return RunOutcome {
                job,
                process: name,
                number: None,
                target: Some(entry.target),
                result: RunResult::Failure,
            };
        }
    };

    let target_ref = TargetRef::from(&entry.target);
    let mut run = PromotionRun::start(&name, number, Some(target_ref.clone()));
    run.parameters = entry.parameters.clone();

    let Some(target) = target_ref.resolve(host, Some(&job)) else {
        run.note = Some(format!("build {target_ref} no longer exists"));
        run.finish(RunResult::Aborted);
        save(process, &run);
        warn!(job = %job, process = %name, run = number, target_build = %target_ref, "target build not found");
        return RunOutcome {
            job,
            process: name,
            number: Some(number),
            target: Some(entry.target),
            result: RunResult::Aborted,
        };
    };

    let ledger = ledgers.ledger(&target.reference);
    let status = ledger.status(&name);
    let user = promotion_user(status.as_ref(), entry.requested_by.as_ref(), &target);
    run.environment = promotion_environment(&name, &target, &user, &entry.parameters, status.as_ref());

    save(process, &run);
    ledger.record_attempt(&name, number);
    info!(job = %job, process = %name, run = number, target_build = %target.reference, user = %user, "promotion run started");

    let steps = process.config().steps;
    let ctx = StepContext {
        process: &name,
        run_number: number,
        target: &target.reference,
        parameters: &run.parameters,
        environment: &run.environment,
    };
    let passed = host.run_steps(StepPhase::PreBuild, &steps, &ctx)
        && host.run_steps(StepPhase::Build, &steps, &ctx);
    let result = if passed {
        RunResult::Success
    } else {
        RunResult::Failure
    };

    run.finish(result);
    save(process, &run);
    if result.is_success() {
        ledger.record_success(&name, number);
    }
    info!(job = %job, process = %name, run = number, %result, "promotion run finished");

    RunOutcome {
        job,
        process: name,
        number: Some(number),
        target: Some(target.reference),
        result,
    }
}

fn save(process: &ProcessDefinition, run: &PromotionRun) {
    if let Err(e) = process.runs().save(run) {
        warn!(process = %run.process, run = run.number, error = %e, "failed to write run record");
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::config::{ProcessConfig, StepConfig};
    use crate::fs::mock::MockFileSystem;
    use crate::process::QueuedPromotion;
    use crate::status::Status;
    use crate::test_support::{StubHost, finished_build};
    use crate::types::{BuildResult, Parameters};

    fn setup(steps: &[&str]) -> (MockFileSystem, LedgerStore, ProcessDefinition) {
        let fs = MockFileSystem::new();
        let mut config = ProcessConfig::new("qa");
        config.steps = steps.iter().map(|s| StepConfig::new(*s)).collect();
        let def = ProcessDefinition::create(
            Arc::new(fs.clone()),
            PathBuf::from("/data/jobs/app/promotions/qa"),
            "app",
            config,
        )
        .unwrap();
        let ledgers = LedgerStore::new(Arc::new(fs.clone()), "/data");
        (fs, ledgers, def)
    }

    fn queue(def: &ProcessDefinition, ledgers: &LedgerStore, build: &BuildRef) {
        ledgers.ledger(build).add(Status::new("qa", Vec::new()));
        def.queue()
            .enqueue(QueuedPromotion::new(build.clone(), Parameters::new(), None));
    }

    #[test]
    fn successful_run_marks_the_status() {
        let (_fs, ledgers, def) = setup(&["deploy"]);
        let host = StubHost::default();
        host.add_build(finished_build("app", 5, BuildResult::Success));
        let target = BuildRef::new("app", 5);
        queue(&def, &ledgers, &target);

        let outcome = run_next(&host, &ledgers, &def);

        assert_eq!(outcome.result, RunResult::Success);
        assert_eq!(outcome.number, Some(1));
        let status = ledgers.ledger(&target).status("qa").unwrap();
        assert_eq!(status.promotion_attempts, vec![1]);
        assert_eq!(status.successful_promotion, Some(1));

        let record = def.runs().load(1).unwrap();
        assert_eq!(record.result, Some(RunResult::Success));
        assert_eq!(
            record.environment.get("PROMOTED_NUMBER").map(String::as_str),
            Some("5")
        );
        let phases: Vec<StepPhase> = host.steps_run().into_iter().map(|(p, ..)| p).collect();
        assert_eq!(phases, vec![StepPhase::PreBuild, StepPhase::Build]);
    }

    #[test]
    fn failing_pre_build_skips_build_phase() {
        let (_fs, ledgers, def) = setup(&["check", "deploy"]);
        let host = StubHost::default();
        host.fail_step("check");
        host.add_build(finished_build("app", 1, BuildResult::Success));
        let target = BuildRef::new("app", 1);
        queue(&def, &ledgers, &target);

        let outcome = run_next(&host, &ledgers, &def);

        assert_eq!(outcome.result, RunResult::Failure);
        assert_eq!(host.steps_run().len(), 1);
        let status = ledgers.ledger(&target).status("qa").unwrap();
        assert_eq!(status.promotion_attempts, vec![1]);
        assert!(status.successful_promotion.is_none());
    }

    #[test]
    fn empty_queue_is_recorded_as_aborted() {
        let (_fs, ledgers, def) = setup(&[]);
        let host = StubHost::default();

        let outcome = run_next(&host, &ledgers, &def);

        assert_eq!(outcome.result, RunResult::Aborted);
        let record = def.runs().load(outcome.number.unwrap()).unwrap();
        assert_eq!(record.note.as_deref(), Some("nothing to promote"));
        assert_eq!(record.result, Some(RunResult::Aborted));
    }

    #[test]
    fn vanished_target_aborts() {
        let (_fs, ledgers, def) = setup(&["deploy"]);
        let host = StubHost::default();
        queue(&def, &ledgers, &BuildRef::new("app", 9));

        let outcome = run_next(&host, &ledgers, &def);

        assert_eq!(outcome.result, RunResult::Aborted);
        assert!(host.steps_run().is_empty());
    }
}
