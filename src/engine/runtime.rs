// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::Result;
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::{CoreCommand, EngineEvent, ScheduledPromotion};

/// Feeds [`EngineEvent`]s into the core and hands the runs it schedules to
/// an [`ExecutorBackend`].
///
/// All promotion semantics live in `CoreRuntime`; this struct only does the
/// async plumbing.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<EngineEvent>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<EngineEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
        }
    }

    /// Main event loop. Returns when the channel closes, on shutdown, or
    /// when the core asks to exit.
    pub async fn run(mut self) -> Result<()> {
        info!("promotion runtime started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");
            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
        Ok(())
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchRuns(runs) => self.dispatch(runs).await?,
            CoreCommand::RequestExit => info!("core issued RequestExit command"),
        }
        Ok(())
    }

    async fn dispatch(&mut self, runs: Vec<ScheduledPromotion>) -> Result<()> {
        if runs.is_empty() {
            return Ok(());
        }
        debug!(?runs, "dispatching promotion runs");
        self.executor.dispatch_runs(runs).await
    }
}
