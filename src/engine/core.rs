// src/engine/core.rs

//! Core runtime state machine.
//!
//! This module contains a synchronous "core runtime" that consumes
//! [`EngineEvent`]s and produces a list of commands describing what the
//! async shell should do next.
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - handing `ScheduledPromotion`s to the executor
//! - stopping on `ShutdownRequested`
//!
//! The core has no Tokio types and can be unit tested with an in-memory host
//! and filesystem.

use crate::engine::event_handlers::{
    CoreStep, handle_build_completed, handle_build_triggered, handle_promotion_requested,
    handle_run_finished,
};
use crate::engine::{EngineContext, EngineEvent, RuntimeOptions};

#[derive(Debug)]
pub struct CoreRuntime {
    ctx: EngineContext,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(ctx: EngineContext, options: RuntimeOptions) -> Self {
        Self { ctx, options }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Nothing running or queued in any subscribed job.
    pub fn is_idle(&self) -> bool {
        self.ctx.dispatcher.all_idle()
    }

    /// Handle a single event and return the resulting commands.
    pub fn step(&mut self, event: EngineEvent) -> CoreStep {
        match event {
            EngineEvent::BuildCompleted { build } => handle_build_completed(&self.ctx, build),
            EngineEvent::BuildTriggered {
                upstream,
                project,
                number,
            } => handle_build_triggered(&self.ctx, upstream, project, number),
            EngineEvent::RunFinished { run, outcome } => {
                handle_run_finished(&self.ctx, &self.options, run, outcome)
            }
            EngineEvent::PromotionRequested {
                job,
                process,
                build,
                actor,
                parameters,
            } => handle_promotion_requested(&self.ctx, job, process, build, actor, parameters),
            EngineEvent::ApprovalRecorded { build } => handle_build_completed(&self.ctx, build),
            EngineEvent::ShutdownRequested => CoreStep {
                commands: Vec::new(),
                keep_running: false,
            },
        }
    }
}
