// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime hands scheduled runs to an `ExecutorBackend`, which executes
//! them and reports each completion back as [`EngineEvent::RunFinished`].
//!
//! - [`HostExecutorBackend`] is the production implementation. Host step
//!   execution is synchronous, so each run goes to a blocking thread.
//! - Tests can provide their own backend, e.g. one that runs inline.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::error;

use crate::engine::{EngineEvent, ScheduledPromotion};
use crate::errors::{Error, Result};
use crate::host::Host;
use crate::ledger::LedgerStore;
use crate::promotion::{RunOutcome, RunResult, run_next};

/// Trait abstracting how scheduled promotion runs are executed.
pub trait ExecutorBackend: Send {
    /// Start the given runs. Implementations must eventually send one
    /// `RunFinished` per run, whatever happens to it.
    fn dispatch_runs(
        &mut self,
        runs: Vec<ScheduledPromotion>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Runs promotions against the host on tokio's blocking pool.
pub struct HostExecutorBackend {
    host: Arc<dyn Host>,
    ledgers: Arc<LedgerStore>,
    runtime_tx: mpsc::Sender<EngineEvent>,
}

impl HostExecutorBackend {
    pub fn new(host: Arc<dyn Host>, ledgers: Arc<LedgerStore>, runtime_tx: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            host,
            ledgers,
            runtime_tx,
        }
    }
}

impl ExecutorBackend for HostExecutorBackend {
    fn dispatch_runs(
        &mut self,
        runs: Vec<ScheduledPromotion>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for scheduled in runs {
                let host = Arc::clone(&self.host);
                let ledgers = Arc::clone(&self.ledgers);
                let tx = self.runtime_tx.clone();

                tokio::spawn(async move {
                    let process = Arc::clone(&scheduled.process);
                    let handle = tokio::task::spawn_blocking(move || {
                        run_next(host.as_ref(), &ledgers, &process)
                    });

                    let outcome = match handle.await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            let job = scheduled.process.owner();
                            let process = scheduled.process.name();
                            error!(job = %job, process = %process, error = %e, "promotion run panicked");
                            RunOutcome {
                                job,
                                process,
                                number: None,
                                target: None,
                                result: RunResult::Failure,
                            }
                        }
                    };

                    let finished = EngineEvent::RunFinished {
                        run: scheduled,
                        outcome,
                    };
                    if let Err(e) = tx.send(finished).await {
                        error!(error = %Error::from(e), "runtime gone; dropping run outcome");
                    }
                });
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::condition::{ConditionConfig, ConditionRegistry, SelfPromotionCondition};
    use crate::config::{ProcessConfig, StepConfig};
    use crate::fs::mock::MockFileSystem;
    use crate::process::{ProcessDefinition, Qualification, consider_promotion};
    use crate::test_support::{StubHost, finished_build};
    use crate::types::BuildResult;

    #[tokio::test]
    async fn reports_each_run_back_to_the_runtime() {
        let fs = Arc::new(MockFileSystem::new());
        let host = Arc::new(StubHost::default());
        let build = finished_build("app", 9, BuildResult::Success);
        host.add_build(build.clone());

        let mut config = ProcessConfig::new("qa");
        config
            .conditions
            .push(ConditionConfig::SelfPromotion(SelfPromotionCondition::default()));
        config.steps.push(StepConfig::new("deploy"));
        let process = Arc::new(
            ProcessDefinition::create(
                fs.clone(),
                PathBuf::from("/data/jobs/app/promotions/qa"),
                "app",
                config,
            )
            .unwrap(),
        );

        let ledgers = Arc::new(LedgerStore::new(fs, "/data"));
        let ledger = ledgers.ledger(&build.reference);
        assert!(matches!(
            consider_promotion(&process, &build, &ledger, host.as_ref(), &ConditionRegistry::new()),
            Qualification::Qualified { .. }
        ));

        let (tx, mut rx) = mpsc::channel(4);
        let mut backend = HostExecutorBackend::new(host.clone(), ledgers, tx);
        backend
            .dispatch_runs(vec![ScheduledPromotion {
                job: "app".to_string(),
                process,
            }])
            .await
            .unwrap();

        match rx.recv().await {
            Some(EngineEvent::RunFinished { outcome, .. }) => {
                assert_eq!(outcome.result, RunResult::Success);
                assert_eq!(outcome.number, Some(1));
                assert_eq!(outcome.target, Some(build.reference));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(host.steps_run().len(), 2);
    }
}
