// src/host/mod.rs

//! Interfaces consumed from the build host.
//!
//! The host runs builds, numbers them, keeps their records and fires
//! completion events. The promotion engine only reads build state through
//! [`Host`] and hands promotion steps back to it for execution.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::model::StepConfig;
use crate::types::{Actor, BuildRef, BuildResult, Parameters};

/// Phase a promotion's step list is executed in. Both phases receive the same
/// step list; a step that fails its pre-build check never reaches `Build`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    PreBuild,
    Build,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub full_name: String,
    pub display_name: String,
}

/// Snapshot of a host build's recorded state.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildInfo {
    pub reference: BuildRef,
    pub display_name: String,
    /// `None` while the build is still running.
    pub result: Option<BuildResult>,
    pub parameters: Parameters,
    /// Builds that directly caused this one, primary cause first.
    pub upstream_causes: Vec<BuildRef>,
    pub started_by: Option<Actor>,
    pub timestamp: DateTime<Utc>,
}

impl BuildInfo {
    pub fn new(reference: BuildRef) -> Self {
        let display_name = format!("#{}", reference.number);
        Self {
            reference,
            display_name,
            result: None,
            parameters: Parameters::new(),
            upstream_causes: Vec::new(),
            started_by: None,
            timestamp: Utc::now(),
        }
    }

    /// Completed with a result at least as good as `threshold`.
    pub fn passed(&self, threshold: BuildResult) -> bool {
        self.result
            .is_some_and(|r| r.is_better_or_equal_to(threshold))
    }
}

/// Values a script can hand back to the scripted condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Bool(bool),
    Map(BTreeMap<String, String>),
    /// Anything else, rendered for logging.
    Other(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("script rejected by sandbox: {0}")]
    Rejected(String),

    #[error("script failed: {0}")]
    Failed(String),
}

/// Bindings exposed to a scripted condition.
#[derive(Debug, Clone, Copy)]
pub struct ScriptBindings<'a> {
    pub process: &'a str,
    pub build: &'a BuildInfo,
}

/// Everything a host needs to execute one phase of a promotion run.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub process: &'a str,
    pub run_number: u64,
    pub target: &'a BuildRef,
    pub parameters: &'a Parameters,
    pub environment: &'a BTreeMap<String, String>,
}

/// The build host, as seen by the promotion engine.
pub trait Host: Send + Sync {
    fn resolve_job(&self, full_name: &str) -> Option<JobInfo>;

    fn resolve_build(&self, job: &str, number: u64) -> Option<BuildInfo>;

    fn current_actor(&self) -> Option<Actor>;

    /// Whether `actor` holds the promote capability on `job`.
    fn can_promote(&self, actor: &Actor, job: &str) -> bool;

    /// Projects the job triggers directly (edges of the trigger graph).
    fn downstream_projects(&self, job: &str) -> Vec<String>;

    /// Builds of `project` caused by `upstream`.
    fn builds_caused_by(&self, upstream: &BuildRef, project: &str) -> Vec<BuildInfo>;

    fn evaluate_script(
        &self,
        script: &str,
        bindings: &ScriptBindings<'_>,
    ) -> std::result::Result<ScriptValue, ScriptError>;

    /// Execute `steps` for one phase; `false` means the phase failed.
    fn run_steps(&self, phase: StepPhase, steps: &[StepConfig], ctx: &StepContext<'_>) -> bool;

    fn resolve(&self, build: &BuildRef) -> Option<BuildInfo> {
        self.resolve_build(&build.job, build.number)
    }
}
