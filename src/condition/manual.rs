// src/condition/manual.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::badge::Badge;
use crate::condition::{Condition, EvaluationContext};
use crate::config::model::ParameterDefinition;
use crate::host::Host;
use crate::types::{Actor, Parameters};

/// Never met on its own: a person has to approve the promotion.
///
/// If `users` is non-empty only those users may approve; otherwise anyone
/// holding the promote capability on the job may.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualCondition {
    pub users: Vec<String>,
    pub parameters: Vec<ParameterDefinition>,
}

impl ManualCondition {
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut names = std::collections::HashSet::new();
        for def in &self.parameters {
            if def.name.trim().is_empty() {
                return Err("parameter names must not be empty".to_string());
            }
            if !names.insert(def.name.as_str()) {
                return Err(format!("parameter '{}' is declared twice", def.name));
            }
        }
        Ok(())
    }

    /// Whether `actor` may approve promotions of `job` under this condition.
    pub fn can_approve(&self, host: &dyn Host, actor: &Actor, job: &str) -> bool {
        if self.users.is_empty() {
            host.can_promote(actor, job)
        } else {
            self.users.iter().any(|u| u.trim() == actor.id)
        }
    }

    /// Values supplied by an approver, completed with declared defaults.
    /// Undeclared names are dropped.
    pub fn resolve_parameters(&self, supplied: &Parameters) -> Parameters {
        let mut resolved = Parameters::new();
        for def in &self.parameters {
            if let Some(value) = supplied.get(&def.name).or(def.default.as_ref()) {
                resolved.insert(def.name.clone(), value.clone());
            }
        }
        resolved
    }
}

/// A recorded approval of one process for one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualApproval {
    pub process: String,
    pub approver: Actor,
    #[serde(default)]
    pub parameters: Parameters,
    pub approved_at: DateTime<Utc>,
}

impl ManualApproval {
    pub fn new(process: impl Into<String>, approver: Actor, parameters: Parameters) -> Self {
        Self {
            process: process.into(),
            approver,
            parameters,
            approved_at: Utc::now(),
        }
    }
}

impl Condition for ManualCondition {
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Option<Badge> {
        let approval = ctx.ledger.approval(ctx.process)?;
        Some(Badge::Manual {
            approver: approval.approver,
            parameters: approval.parameters,
        })
    }

    fn describe(&self) -> String {
        if self.users.is_empty() {
            "manually approved".to_string()
        } else {
            format!("manually approved by one of: {}", self.users.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionRegistry;
    use crate::ledger::Ledger;
    use crate::test_support::{StubHost, finished_build};
    use crate::types::BuildResult;

    fn param(name: &str, default: Option<&str>) -> ParameterDefinition {
        ParameterDefinition {
            name: name.to_string(),
            default: default.map(str::to_string),
            description: None,
        }
    }

    #[test]
    fn met_only_after_approval_for_the_same_process() {
        let host = StubHost::default();
        let build = finished_build("app", 4, BuildResult::Success);
        let ledger = Ledger::in_memory(build.reference.clone());
        let extensions = ConditionRegistry::new();
        let cond = ManualCondition::default();
        let ctx = EvaluationContext {
            host: &host,
            process: "prod",
            build: &build,
            ledger: &ledger,
            extensions: &extensions,
        };

        assert!(cond.evaluate(&ctx).is_none());

        ledger.record_approval(ManualApproval::new(
            "qa",
            Actor::new("alice", "Alice"),
            Parameters::new(),
        ));
        assert!(cond.evaluate(&ctx).is_none());

        ledger.record_approval(ManualApproval::new(
            "prod",
            Actor::new("alice", "Alice"),
            Parameters::from([("TARGET".to_string(), "eu".to_string())]),
        ));
        match cond.evaluate(&ctx) {
            Some(Badge::Manual {
                approver,
                parameters,
            }) => {
                assert_eq!(approver.id, "alice");
                assert_eq!(parameters.get("TARGET").map(String::as_str), Some("eu"));
            }
            other => panic!("expected manual badge, got {other:?}"),
        }
    }

    #[test]
    fn allow_list_overrides_host_permission() {
        let host = StubHost::default();
        host.grant_promote("carol");
        let listed = ManualCondition {
            users: vec!["alice".to_string()],
            parameters: Vec::new(),
        };
        let open = ManualCondition::default();

        assert!(listed.can_approve(&host, &Actor::new("alice", "Alice"), "app"));
        assert!(!listed.can_approve(&host, &Actor::new("carol", "Carol"), "app"));
        assert!(open.can_approve(&host, &Actor::new("carol", "Carol"), "app"));
        assert!(!open.can_approve(&host, &Actor::new("mallory", "Mallory"), "app"));
    }

    #[test]
    fn resolves_supplied_values_over_defaults() {
        let cond = ManualCondition {
            users: Vec::new(),
            parameters: vec![param("TARGET", Some("staging")), param("TICKET", None)],
        };

        let supplied = Parameters::from([
            ("TICKET".to_string(), "OPS-1".to_string()),
            ("EXTRA".to_string(), "ignored".to_string()),
        ]);
        let resolved = cond.resolve_parameters(&supplied);

        assert_eq!(resolved.get("TARGET").map(String::as_str), Some("staging"));
        assert_eq!(resolved.get("TICKET").map(String::as_str), Some("OPS-1"));
        assert!(!resolved.contains_key("EXTRA"));
    }

    #[test]
    fn duplicate_parameter_names_are_rejected() {
        let cond = ManualCondition {
            users: Vec::new(),
            parameters: vec![param("A", None), param("A", Some("x"))],
        };
        assert!(cond.validate().is_err());
    }
}
