// src/promotion/record.rs

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::host::{BuildInfo, Host};
use crate::types::{BuildRef, Parameters};

/// Outcome of one promotion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunResult {
    Success,
    Unstable,
    Failure,
    Aborted,
}

impl RunResult {
    pub fn is_success(self) -> bool {
        matches!(self, RunResult::Success | RunResult::Unstable)
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunResult::Success => "SUCCESS",
            RunResult::Unstable => "UNSTABLE",
            RunResult::Failure => "FAILURE",
            RunResult::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// The promoted build, stored by job full name and number and resolved only
/// when needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub job: String,
    pub number: u64,
}

impl TargetRef {
    pub fn build_ref(&self) -> BuildRef {
        BuildRef::new(&self.job, self.number)
    }

    /// Look the build up on the host. If the recorded job name no longer
    /// resolves (the job was renamed since), the job that currently owns
    /// the process is tried with the same number.
    pub fn resolve(&self, host: &dyn Host, owner: Option<&str>) -> Option<BuildInfo> {
        host.resolve_build(&self.job, self.number).or_else(|| {
            owner
                .filter(|o| *o != self.job)
                .and_then(|o| host.resolve_build(o, self.number))
        })
    }
}

impl From<&BuildRef> for TargetRef {
    fn from(build: &BuildRef) -> Self {
        Self {
            job: build.job.clone(),
            number: build.number,
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.job, self.number)
    }
}

/// Persisted record of one promotion run (`runs/<n>/run.toml`).
///
/// Written once when the run starts, with `result` unset, and again when it
/// ends. A record without a result after a restart is an interrupted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionRun {
    pub process: String,
    pub number: u64,
    #[serde(default)]
    pub target: Option<TargetRef>,
    #[serde(default)]
    pub result: Option<RunResult>,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub note: Option<String>,
}

impl PromotionRun {
    pub fn start(process: impl Into<String>, number: u64, target: Option<TargetRef>) -> Self {
        Self {
            process: process.into(),
            number,
            target,
            result: None,
            parameters: Parameters::new(),
            environment: BTreeMap::new(),
            started_at: Utc::now(),
            finished_at: None,
            note: None,
        }
    }

    pub fn finish(&mut self, result: RunResult) {
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
    }

    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }
}
