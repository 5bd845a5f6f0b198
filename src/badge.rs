// src/badge.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Actor, BuildRef, BuildResult, Parameters};

/// Evidence that one condition was met, kept on the build's status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Badge {
    SelfSuccess {
        result: BuildResult,
    },
    Manual {
        approver: Actor,
        #[serde(default)]
        parameters: Parameters,
    },
    DownstreamPass {
        builds: Vec<BuildRef>,
    },
    UpstreamPromotions {
        processes: Vec<String>,
    },
    Scripted {
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        variables: BTreeMap<String, String>,
    },
    TriggeredPass {
        builds: Vec<BuildRef>,
    },
    Extension {
        id: String,
        #[serde(default)]
        variables: BTreeMap<String, String>,
    },
}

impl Badge {
    /// Add this badge's variables to a run environment.
    pub fn contribute_env(&self, env: &mut BTreeMap<String, String>) {
        match self {
            Badge::Manual { parameters, .. } => {
                env.extend(parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Badge::Scripted { variables, .. } | Badge::Extension { variables, .. } => {
                env.extend(variables.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Badge::SelfSuccess { .. }
            | Badge::DownstreamPass { .. }
            | Badge::UpstreamPromotions { .. }
            | Badge::TriggeredPass { .. } => {}
        }
    }

    pub fn describe(&self) -> String {
        fn builds(list: &[BuildRef]) -> String {
            list.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        }

        match self {
            Badge::SelfSuccess { result } => format!("build result {result}"),
            Badge::Manual { approver, .. } => format!("approved by {}", approver.display_name),
            Badge::DownstreamPass { builds: b } => format!("downstream passed: {}", builds(b)),
            Badge::UpstreamPromotions { processes } => {
                format!("promoted by {}", processes.join(", "))
            }
            Badge::Scripted { label: Some(l), .. } => format!("script '{l}' satisfied"),
            Badge::Scripted { label: None, .. } => "script satisfied".to_string(),
            Badge::TriggeredPass { builds: b } => format!("triggered builds passed: {}", builds(b)),
            Badge::Extension { id, .. } => format!("extension '{id}' satisfied"),
        }
    }

    /// The approver, if this badge records a manual approval.
    pub fn approver(&self) -> Option<&Actor> {
        match self {
            Badge::Manual { approver, .. } => Some(approver),
            _ => None,
        }
    }
}
