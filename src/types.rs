// src/types.rs

//! Small value types shared across the crate.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Parameter name → value, ordered so persisted records are stable.
pub type Parameters = BTreeMap<String, String>;

/// Reference to a build on the host: the owning job's full name plus the
/// build number within that job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildRef {
    pub job: String,
    pub number: u64,
}

impl BuildRef {
    pub fn new(job: impl Into<String>, number: u64) -> Self {
        Self {
            job: job.into(),
            number,
        }
    }

    /// Last path segment of the job's full name (`folder/app` → `app`).
    pub fn short_job_name(&self) -> &str {
        short_name(&self.job)
    }
}

impl fmt::Display for BuildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.job, self.number)
    }
}

/// Last `/`-separated segment of a job full name.
pub fn short_name(full_name: &str) -> &str {
    full_name.rsplit('/').next().unwrap_or(full_name)
}

/// `job` with its `old` prefix swapped for `new`, if `job` is `old` itself or
/// lives inside the folder `old`.
pub fn rebase_job(job: &str, old: &str, new: &str) -> Option<String> {
    if job == old {
        return Some(new.to_string());
    }
    let rest = job.strip_prefix(old)?.strip_prefix('/')?;
    Some(format!("{new}/{rest}"))
}

/// Result of a host build, ordered best → worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Unstable,
    Failure,
    NotBuilt,
    Aborted,
}

impl BuildResult {
    fn ordinal(self) -> u8 {
        match self {
            BuildResult::Success => 0,
            BuildResult::Unstable => 1,
            BuildResult::Failure => 2,
            BuildResult::NotBuilt => 3,
            BuildResult::Aborted => 4,
        }
    }

    /// `true` if `self` is the same as or better than `threshold`.
    pub fn is_better_or_equal_to(self, threshold: BuildResult) -> bool {
        self.ordinal() <= threshold.ordinal()
    }

    /// Threshold used by conditions that accept unstable builds on request.
    pub fn pass_threshold(even_if_unstable: bool) -> BuildResult {
        if even_if_unstable {
            BuildResult::Unstable
        } else {
            BuildResult::Success
        }
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildResult::Success => "SUCCESS",
            BuildResult::Unstable => "UNSTABLE",
            BuildResult::Failure => "FAILURE",
            BuildResult::NotBuilt => "NOT_BUILT",
            BuildResult::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

impl FromStr for BuildResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SUCCESS" => Ok(BuildResult::Success),
            "UNSTABLE" => Ok(BuildResult::Unstable),
            "FAILURE" => Ok(BuildResult::Failure),
            "NOT_BUILT" => Ok(BuildResult::NotBuilt),
            "ABORTED" => Ok(BuildResult::Aborted),
            other => Err(format!("invalid build result: {other}")),
        }
    }
}

/// An authenticated identity on the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub display_name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// Identity used when nobody in particular caused an action.
    pub fn anonymous() -> Self {
        Self::new("anonymous", "anonymous")
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebasing_follows_folders_only() {
        assert_eq!(rebase_job("app", "app", "web").as_deref(), Some("web"));
        assert_eq!(
            rebase_job("team/svc", "team", "org/team").as_deref(),
            Some("org/team/svc")
        );
        assert_eq!(rebase_job("application", "app", "web"), None);
        assert_eq!(rebase_job("other/app", "app", "web"), None);
    }

    #[test]
    fn result_thresholds() {
        let strict = BuildResult::pass_threshold(false);
        let lenient = BuildResult::pass_threshold(true);

        assert!(BuildResult::Success.is_better_or_equal_to(strict));
        assert!(!BuildResult::Unstable.is_better_or_equal_to(strict));
        assert!(BuildResult::Unstable.is_better_or_equal_to(lenient));
        assert!(!BuildResult::Failure.is_better_or_equal_to(lenient));
        assert!(!BuildResult::Aborted.is_better_or_equal_to(lenient));
    }

    #[test]
    fn short_job_name_strips_folders() {
        assert_eq!(BuildRef::new("team/app", 3).short_job_name(), "app");
        assert_eq!(short_name("app"), "app");
    }

    #[test]
    fn parses_results_case_insensitively() {
        assert_eq!("unstable".parse::<BuildResult>(), Ok(BuildResult::Unstable));
        assert!("green".parse::<BuildResult>().is_err());
    }
}
