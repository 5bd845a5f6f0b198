// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the dispatcher (which jobs have promotion processes)
//! - per-build ledgers
//! - the main runtime event loop that reacts to:
//!   - build completion and trigger events from the host
//!   - promotion run completions
//!   - forced promotions and manual approvals
//!   - shutdown signals
//!
//! The synchronous core state machine lives in [`core`]; the async shell is
//! implemented in [`runtime`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::PromotionService;
use crate::condition::ConditionRegistry;
use crate::dispatch::Dispatcher;
use crate::errors::{Error, Result};
use crate::exec::HostExecutorBackend;
use crate::host::Host;
use crate::ledger::LedgerStore;
use crate::promotion::RunOutcome;
use crate::types::{Actor, BuildRef, Parameters};

/// Shared services every part of the engine works against.
#[derive(Clone)]
pub struct EngineContext {
    pub host: Arc<dyn Host>,
    pub dispatcher: Arc<Dispatcher>,
    pub ledgers: Arc<LedgerStore>,
    pub extensions: Arc<ConditionRegistry>,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("jobs", &self.dispatcher.jobs())
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Exit once a run finishes and nothing is running or queued anywhere.
    pub exit_when_idle: bool,
}

/// Events flowing into the runtime from the host, executors and the API.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A build finished on the host.
    BuildCompleted { build: BuildRef },
    /// `upstream` queued a build of `project` (number known once assigned).
    BuildTriggered {
        upstream: BuildRef,
        project: String,
        number: Option<u64>,
    },
    /// A promotion run finished. `run` is what was dispatched.
    RunFinished {
        run: ScheduledPromotion,
        outcome: RunOutcome,
    },
    /// Promote `build` with `process` regardless of conditions.
    PromotionRequested {
        job: String,
        process: String,
        build: BuildRef,
        actor: Actor,
        parameters: Parameters,
    },
    /// A manual approval was recorded on `build`.
    ApprovalRecorded { build: BuildRef },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep, ScheduledPromotion};
pub use runtime::Runtime;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A running engine: where to send host events, the API bound to it, and
/// the runtime task.
pub struct EngineHandle {
    pub events: mpsc::Sender<EngineEvent>,
    pub service: PromotionService,
    task: JoinHandle<Result<()>>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl EngineHandle {
    /// Ask the runtime to stop and wait for it. Runs already handed to the
    /// executor finish on their own.
    pub async fn shutdown(self) -> Result<()> {
        if self.events.send(EngineEvent::ShutdownRequested).await.is_err() {
            debug!("runtime already stopped");
        }
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Error::from(e).into()),
        }
    }
}

/// Spawn the runtime on the current tokio runtime, executing promotions
/// through the host.
pub fn start(ctx: EngineContext, options: RuntimeOptions) -> EngineHandle {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let executor = HostExecutorBackend::new(Arc::clone(&ctx.host), Arc::clone(&ctx.ledgers), tx.clone());
    let runtime = Runtime::new(CoreRuntime::new(ctx.clone(), options), rx, executor);
    let task = tokio::spawn(runtime.run());

    info!(jobs = ctx.dispatcher.jobs().len(), "promotion engine started");
    EngineHandle {
        service: PromotionService::new(ctx, tx.clone()),
        events: tx,
        task,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::test_support::{StubHost, finished_build};
    use crate::types::BuildResult;

    #[tokio::test]
    async fn started_engine_promotes_completed_builds() {
        let fs = Arc::new(MockFileSystem::new());
        let host = Arc::new(StubHost::default());
        host.add_build(finished_build("app", 1, BuildResult::Success));
        let ctx = EngineContext {
            host: host.clone(),
            dispatcher: Arc::new(Dispatcher::new(fs.clone(), "/data")),
            ledgers: Arc::new(LedgerStore::new(fs, "/data")),
            extensions: Arc::new(ConditionRegistry::new()),
        };

        let engine = start(ctx, RuntimeOptions::default());
        engine
            .service
            .import_config(
                "app",
                "[[process]]\nname = \"qa\"\n\n[[process.conditions]]\nkind = \"self-promotion\"\n",
            )
            .unwrap();
        engine
            .events
            .send(EngineEvent::BuildCompleted {
                build: BuildRef::new("app", 1),
            })
            .await
            .unwrap();

        let mut promoted = false;
        for _ in 0..100 {
            if engine
                .service
                .statuses("app", 1)
                .first()
                .is_some_and(|s| s.is_promotion_successful())
            {
                promoted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(promoted, "build was not promoted");
        engine.shutdown().await.unwrap();
    }
}
