use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use promoted::engine::{EngineEvent, ScheduledPromotion};
use promoted::errors::{Error, Result};
use promoted::exec::ExecutorBackend;
use promoted::host::Host;
use promoted::ledger::LedgerStore;
use promoted::promotion::run_next;

/// An executor that:
/// - runs each scheduled promotion to completion before returning
/// - records `(job, process)` in dispatch order
/// - reports every outcome back as `RunFinished`.
pub struct InlineExecutor {
    host: Arc<dyn Host>,
    ledgers: Arc<LedgerStore>,
    runtime_tx: mpsc::Sender<EngineEvent>,
    dispatched: Arc<Mutex<Vec<(String, String)>>>,
}

impl InlineExecutor {
    pub fn new(
        host: Arc<dyn Host>,
        ledgers: Arc<LedgerStore>,
        runtime_tx: mpsc::Sender<EngineEvent>,
        dispatched: Arc<Mutex<Vec<(String, String)>>>,
    ) -> Self {
        Self {
            host,
            ledgers,
            runtime_tx,
            dispatched,
        }
    }
}

impl ExecutorBackend for InlineExecutor {
    fn dispatch_runs(
        &mut self,
        runs: Vec<ScheduledPromotion>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();

        Box::pin(async move {
            for scheduled in runs {
                {
                    let mut guard = self.dispatched.lock().unwrap();
                    guard.push((scheduled.job.clone(), scheduled.process.name()));
                }

                let outcome = run_next(self.host.as_ref(), &self.ledgers, &scheduled.process);
                tx.send(EngineEvent::RunFinished {
                    run: scheduled,
                    outcome,
                })
                .await
                .map_err(Error::from)?;
            }
            Ok(())
        })
    }
}
