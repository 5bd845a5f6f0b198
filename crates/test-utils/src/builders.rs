#![allow(dead_code)]

use std::collections::BTreeMap;

use promoted::condition::{
    ConditionConfig, DownstreamPassCondition, ExtensionCondition, ManualCondition,
    ScriptedCondition, SelfPromotionCondition, TriggeredPassCondition,
    UpstreamPromotionCondition,
};
use promoted::config::{ParameterDefinition, ProcessConfig, StepConfig};
use promoted::host::BuildInfo;
use promoted::types::{Actor, BuildRef, BuildResult};

/// Builder for `ProcessConfig` to simplify test setup.
pub struct ProcessConfigBuilder {
    config: ProcessConfig,
}

impl ProcessConfigBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            config: ProcessConfig::new(name),
        }
    }

    pub fn self_promotion(mut self, even_if_unstable: bool) -> Self {
        self.config
            .conditions
            .push(ConditionConfig::SelfPromotion(SelfPromotionCondition { even_if_unstable }));
        self
    }

    pub fn manual(mut self, users: &[&str]) -> Self {
        self.config.conditions.push(ConditionConfig::Manual(ManualCondition {
            users: users.iter().map(|u| u.to_string()).collect(),
            parameters: Vec::new(),
        }));
        self
    }

    /// Declare a parameter on the most recently added manual condition.
    pub fn parameter(mut self, name: &str, default: Option<&str>) -> Self {
        let def = ParameterDefinition {
            name: name.to_string(),
            default: default.map(str::to_string),
            description: None,
        };
        if let Some(ConditionConfig::Manual(m)) = self
            .config
            .conditions
            .iter_mut()
            .rev()
            .find(|c| matches!(c, ConditionConfig::Manual(_)))
        {
            m.parameters.push(def);
        }
        self
    }

    pub fn downstream(mut self, jobs: &[&str]) -> Self {
        self.config
            .conditions
            .push(ConditionConfig::DownstreamPass(DownstreamPassCondition {
                jobs: jobs.iter().map(|j| j.to_string()).collect(),
                even_if_unstable: false,
            }));
        self
    }

    pub fn upstream(mut self, processes: &[&str]) -> Self {
        self.config
            .conditions
            .push(ConditionConfig::UpstreamPromotion(UpstreamPromotionCondition {
                required: processes.iter().map(|p| p.to_string()).collect(),
            }));
        self
    }

    pub fn triggered(mut self) -> Self {
        self.config
            .conditions
            .push(ConditionConfig::TriggeredPass(TriggeredPassCondition::default()));
        self
    }

    pub fn scripted(mut self, script: &str) -> Self {
        self.config.conditions.push(ConditionConfig::Scripted(ScriptedCondition {
            script: script.to_string(),
            label: None,
        }));
        self
    }

    pub fn extension(mut self, id: &str) -> Self {
        self.config
            .conditions
            .push(ConditionConfig::Extension(ExtensionCondition {
                id: id.to_string(),
                settings: BTreeMap::new(),
            }));
        self
    }

    pub fn step(mut self, name: &str) -> Self {
        self.config.steps.push(StepConfig::new(name));
        self
    }

    pub fn build(self) -> ProcessConfig {
        self.config
    }
}

/// Builder for host `BuildInfo` records.
pub struct BuildBuilder {
    build: BuildInfo,
}

impl BuildBuilder {
    /// A successful build.
    pub fn new(job: &str, number: u64) -> Self {
        let mut build = BuildInfo::new(BuildRef::new(job, number));
        build.result = Some(BuildResult::Success);
        Self { build }
    }

    pub fn result(mut self, result: BuildResult) -> Self {
        self.build.result = Some(result);
        self
    }

    pub fn running(mut self) -> Self {
        self.build.result = None;
        self
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.build
            .parameters
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn caused_by(mut self, job: &str, number: u64) -> Self {
        self.build.upstream_causes.push(BuildRef::new(job, number));
        self
    }

    pub fn started_by(mut self, id: &str) -> Self {
        self.build.started_by = Some(Actor::new(id, id));
        self
    }

    pub fn build(self) -> BuildInfo {
        self.build
    }
}
