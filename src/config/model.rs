// src/config/model.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::condition::ConditionConfig;

/// Icon used when a definition does not name one.
pub const DEFAULT_ICON: &str = "star-gold";

/// Configuration of one promotion process, as persisted in
/// `promotions/<name>/config.toml`:
///
/// ```toml
/// name = "qa"
/// icon = "star-silver"
///
/// [[conditions]]
/// kind = "self-promotion"
/// even_if_unstable = true
///
/// [[conditions]]
/// kind = "manual"
/// users = ["alice", "bob"]
///
/// [[steps]]
/// name = "deploy"
/// args = { target = "qa" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub name: String,

    #[serde(default = "default_icon")]
    pub icon: String,

    /// Evaluated in order; all must be met for a build to qualify.
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,

    /// Executed in order by the host when a promotion runs.
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

fn default_icon() -> String {
    DEFAULT_ICON.to_string()
}

impl ProcessConfig {
    /// An empty definition: no conditions, no steps.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            icon: default_icon(),
            conditions: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Default values of every parameter declared by the process's
    /// conditions.
    pub fn default_parameters(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        for condition in &self.conditions {
            if let ConditionConfig::Manual(manual) = condition {
                for def in &manual.parameters {
                    if let Some(ref value) = def.default {
                        params.insert(def.name.clone(), value.clone());
                    }
                }
            }
        }
        params
    }
}

/// One executable step. The host decides what `name` means; `args` is passed
/// through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: String,

    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

impl StepConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: BTreeMap::new(),
        }
    }
}

/// A parameter a promotion may be supplied with (e.g. by the approver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,

    #[serde(default)]
    pub default: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

/// Persisted set of active process names for one job
/// (`promotions/active.toml`). Order is display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveProcesses {
    #[serde(default)]
    pub active: Vec<String>,
}

/// A whole job's submission: every `[[process]]` table becomes an active
/// definition, anything else is archived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessesDocument {
    #[serde(default, rename = "process")]
    pub processes: Vec<ProcessConfig>,
}
