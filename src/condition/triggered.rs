// src/condition/triggered.rs

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::badge::Badge;
use crate::condition::{Condition, EvaluationContext};
use crate::host::BuildInfo;
use crate::types::{BuildRef, BuildResult};

/// A downstream build this build triggered, recorded when it was queued.
///
/// `number` is `None` until the triggered build has been assigned one; the
/// condition then falls back to asking the host for builds of `project`
/// caused by this build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub project: String,
    #[serde(default)]
    pub number: Option<u64>,
    pub recorded_at: DateTime<Utc>,
}

impl TriggerRecord {
    pub fn new(project: impl Into<String>, number: Option<u64>) -> Self {
        Self {
            project: project.into(),
            number,
            recorded_at: Utc::now(),
        }
    }
}

/// Met when every build triggered by this build has completed at or above
/// the threshold. Projects matching an `excluded` glob are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggeredPassCondition {
    pub even_if_unstable: bool,
    /// Only consider builds whose primary upstream cause is this build.
    pub direct_only: bool,
    pub excluded: Vec<String>,
}

impl TriggeredPassCondition {
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.exclusions().map(|_| ())
    }

    fn exclusions(&self) -> std::result::Result<GlobSet, String> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.excluded {
            let glob = Glob::new(pattern.trim())
                .map_err(|e| format!("invalid exclusion pattern '{pattern}': {e}"))?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| format!("invalid exclusion patterns: {e}"))
    }

    fn triggered_builds(&self, ctx: &EvaluationContext<'_>, excluded: &GlobSet) -> Vec<BuildInfo> {
        let origin = &ctx.build.reference;
        let mut builds = Vec::new();
        for record in ctx.ledger.triggered() {
            if excluded.is_match(&record.project) {
                continue;
            }
            match record.number {
                Some(number) => match ctx.host.resolve_build(&record.project, number) {
                    Some(build) => builds.push(build),
                    None => {
                        // Recorded but gone from the host: count it as not passed.
                        let mut missing = BuildInfo::new(BuildRef::new(&record.project, number));
                        missing.upstream_causes.push(origin.clone());
                        builds.push(missing);
                    }
                },
                None => builds.extend(ctx.host.builds_caused_by(origin, &record.project)),
            }
        }

        if self.direct_only {
            builds.retain(|b| b.upstream_causes.first() == Some(origin));
        }
        builds
    }
}

impl Condition for TriggeredPassCondition {
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Option<Badge> {
        let excluded = match self.exclusions() {
            Ok(set) => set,
            Err(e) => {
                warn!(process = %ctx.process, error = %e, "ignoring triggered-pass condition");
                return None;
            }
        };

        let builds = self.triggered_builds(ctx, &excluded);
        if builds.is_empty() {
            debug!(build = %ctx.build.reference, "no triggered builds to check");
            return None;
        }

        let threshold = BuildResult::pass_threshold(self.even_if_unstable);
        if builds.iter().all(|b| b.passed(threshold)) {
            Some(Badge::TriggeredPass {
                builds: builds.into_iter().map(|b| b.reference).collect(),
            })
        } else {
            None
        }
    }

    fn describe(&self) -> String {
        let scope = if self.direct_only {
            "directly triggered"
        } else {
            "triggered"
        };
        if self.excluded.is_empty() {
            format!("all {scope} builds pass")
        } else {
            format!(
                "all {scope} builds pass, except {}",
                self.excluded.join(", ")
            )
        }
    }
}
