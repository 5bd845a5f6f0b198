// src/condition/mod.rs

//! Promotion conditions.
//!
//! A condition looks at a finished build and either hands back a [`Badge`]
//! (evidence that it is met) or `None`. A process qualifies a build only when
//! every one of its conditions is met; evaluation follows the configured
//! order and stops at the first condition that is not.
//!
//! Built-in conditions are cases of [`ConditionConfig`], each with a stable
//! identifier (see [`descriptors`]). Anything else plugs in through
//! [`ConditionRegistry`] and is configured as an `extension` condition.
//!
//! Evaluation never mutates the build or its ledger.

use crate::badge::Badge;
use crate::host::{BuildInfo, Host};
use crate::ledger::Ledger;

use serde::{Deserialize, Serialize};

pub mod downstream;
pub mod extension;
pub mod manual;
pub mod scripted;
pub mod self_promotion;
pub mod triggered;
pub mod upstream;

pub use downstream::{DownstreamPassCondition, TriggerGraph};
pub use extension::{ConditionExtension, ConditionRegistry, ExtensionCondition};
pub use manual::{ManualApproval, ManualCondition};
pub use scripted::ScriptedCondition;
pub use self_promotion::SelfPromotionCondition;
pub use triggered::{TriggerRecord, TriggeredPassCondition};
pub use upstream::UpstreamPromotionCondition;

/// What a condition can see while evaluating.
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub host: &'a dyn Host,
    /// Name of the process being evaluated.
    pub process: &'a str,
    pub build: &'a BuildInfo,
    pub ledger: &'a Ledger,
    pub extensions: &'a ConditionRegistry,
}

/// Capabilities every condition offers.
pub trait Condition {
    /// `Some(badge)` if met for `ctx.build`, `None` otherwise.
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Option<Badge>;

    /// Short human-readable summary of the configured condition.
    fn describe(&self) -> String;
}

/// Stable identifier and display name of a built-in condition kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionDescriptor {
    pub id: &'static str,
    pub display_name: &'static str,
}

const BUILTIN_DESCRIPTORS: &[ConditionDescriptor] = &[
    ConditionDescriptor {
        id: "self-promotion",
        display_name: "Promote immediately once the build is complete",
    },
    ConditionDescriptor {
        id: "manual",
        display_name: "Only when manually approved",
    },
    ConditionDescriptor {
        id: "downstream-pass",
        display_name: "When the following downstream projects build successfully",
    },
    ConditionDescriptor {
        id: "upstream-promotion",
        display_name: "When the following upstream promotions are complete",
    },
    ConditionDescriptor {
        id: "triggered-pass",
        display_name: "When every build triggered by this build succeeds",
    },
    ConditionDescriptor {
        id: "scripted",
        display_name: "When the script returns true",
    },
    ConditionDescriptor {
        id: "extension",
        display_name: "Registered extension condition",
    },
];

/// All built-in condition kinds.
pub fn descriptors() -> &'static [ConditionDescriptor] {
    BUILTIN_DESCRIPTORS
}

/// Look up a built-in condition kind by its stable identifier.
pub fn descriptor(id: &str) -> Option<&'static ConditionDescriptor> {
    BUILTIN_DESCRIPTORS.iter().find(|d| d.id == id)
}

/// A configured condition, tagged by its stable identifier in TOML
/// (`kind = "self-promotion"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConditionConfig {
    SelfPromotion(SelfPromotionCondition),
    Manual(ManualCondition),
    DownstreamPass(DownstreamPassCondition),
    UpstreamPromotion(UpstreamPromotionCondition),
    TriggeredPass(TriggeredPassCondition),
    Scripted(ScriptedCondition),
    Extension(ExtensionCondition),
}

impl ConditionConfig {
    pub fn id(&self) -> &'static str {
        match self {
            ConditionConfig::SelfPromotion(_) => "self-promotion",
            ConditionConfig::Manual(_) => "manual",
            ConditionConfig::DownstreamPass(_) => "downstream-pass",
            ConditionConfig::UpstreamPromotion(_) => "upstream-promotion",
            ConditionConfig::TriggeredPass(_) => "triggered-pass",
            ConditionConfig::Scripted(_) => "scripted",
            ConditionConfig::Extension(_) => "extension",
        }
    }

    /// Static checks on the configured values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            ConditionConfig::SelfPromotion(_) => Ok(()),
            ConditionConfig::Manual(c) => c.validate(),
            ConditionConfig::DownstreamPass(c) => c.validate(),
            ConditionConfig::UpstreamPromotion(c) => c.validate(),
            ConditionConfig::TriggeredPass(c) => c.validate(),
            ConditionConfig::Scripted(c) => c.validate(),
            ConditionConfig::Extension(c) => c.validate(),
        }
    }

    fn as_condition(&self) -> &dyn Condition {
        match self {
            ConditionConfig::SelfPromotion(c) => c,
            ConditionConfig::Manual(c) => c,
            ConditionConfig::DownstreamPass(c) => c,
            ConditionConfig::UpstreamPromotion(c) => c,
            ConditionConfig::TriggeredPass(c) => c,
            ConditionConfig::Scripted(c) => c,
            ConditionConfig::Extension(c) => c,
        }
    }
}

impl Condition for ConditionConfig {
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Option<Badge> {
        self.as_condition().evaluate(ctx)
    }

    fn describe(&self) -> String {
        self.as_condition().describe()
    }
}

/// Evaluate `conditions` in order, stopping at the first one that is not met.
///
/// Returns the collected badges if every condition is met.
pub fn evaluate_all(conditions: &[ConditionConfig], ctx: &EvaluationContext<'_>) -> Option<Vec<Badge>> {
    let mut badges = Vec::with_capacity(conditions.len());
    for condition in conditions {
        match condition.evaluate(ctx) {
            Some(badge) => badges.push(badge),
            None => {
                tracing::debug!(
                    process = %ctx.process,
                    build = %ctx.build.reference,
                    condition = condition.id(),
                    "condition not met"
                );
                return None;
            }
        }
    }
    Some(badges)
}

#[cfg(test)]
mod tests {
    use crate::test_support::{StubHost, finished_build};
    use super::*;
    use crate::types::BuildResult;

    #[test]
    fn descriptors_cover_every_kind() {
        let configs = [
            ConditionConfig::SelfPromotion(SelfPromotionCondition::default()),
            ConditionConfig::Manual(ManualCondition::default()),
            ConditionConfig::DownstreamPass(DownstreamPassCondition::default()),
            ConditionConfig::UpstreamPromotion(UpstreamPromotionCondition::default()),
            ConditionConfig::TriggeredPass(TriggeredPassCondition::default()),
            ConditionConfig::Scripted(ScriptedCondition::default()),
            ConditionConfig::Extension(ExtensionCondition::default()),
        ];
        for cfg in &configs {
            assert!(descriptor(cfg.id()).is_some(), "{} has no descriptor", cfg.id());
        }
        assert_eq!(descriptors().len(), configs.len());
    }

    #[test]
    fn empty_condition_list_qualifies_with_no_badges() {
        let host = StubHost::default();
        let build = finished_build("app", 1, BuildResult::Failure);
        let ledger = Ledger::in_memory(build.reference.clone());
        let extensions = ConditionRegistry::new();
        let ctx = EvaluationContext {
            host: &host,
            process: "qa",
            build: &build,
            ledger: &ledger,
            extensions: &extensions,
        };

        assert_eq!(evaluate_all(&[], &ctx), Some(Vec::new()));
    }

    #[test]
    fn stops_at_first_unmet_condition() {
        let host = StubHost::default();
        let build = finished_build("app", 1, BuildResult::Failure);
        let ledger = Ledger::in_memory(build.reference.clone());
        let extensions = ConditionRegistry::new();
        let ctx = EvaluationContext {
            host: &host,
            process: "qa",
            build: &build,
            ledger: &ledger,
            extensions: &extensions,
        };

        let conditions = [
            ConditionConfig::SelfPromotion(SelfPromotionCondition::default()),
            ConditionConfig::Scripted(ScriptedCondition {
                script: "true".into(),
                label: None,
            }),
        ];

        assert_eq!(evaluate_all(&conditions, &ctx), None);
        assert!(host.scripts_evaluated().is_empty());
    }
}
