// src/condition/scripted.rs

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::badge::Badge;
use crate::condition::{Condition, EvaluationContext};
use crate::host::{ScriptBindings, ScriptValue};

/// Met when the host-evaluated script returns `true` or a non-empty map.
/// Map entries become badge variables and end up in the run environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptedCondition {
    pub script: String,
    pub label: Option<String>,
}

impl ScriptedCondition {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.script.trim().is_empty() {
            return Err("script must not be empty".to_string());
        }
        Ok(())
    }
}

impl Condition for ScriptedCondition {
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Option<Badge> {
        let bindings = ScriptBindings {
            process: ctx.process,
            build: ctx.build,
        };

        match ctx.host.evaluate_script(&self.script, &bindings) {
            Ok(ScriptValue::Bool(true)) => Some(Badge::Scripted {
                label: self.label.clone(),
                variables: Default::default(),
            }),
            Ok(ScriptValue::Map(variables)) if !variables.is_empty() => Some(Badge::Scripted {
                label: self.label.clone(),
                variables,
            }),
            Ok(ScriptValue::Bool(false)) | Ok(ScriptValue::Map(_)) => None,
            Ok(ScriptValue::Other(value)) => {
                warn!(
                    process = %ctx.process,
                    build = %ctx.build.reference,
                    value = %value,
                    "script returned neither a boolean nor a map"
                );
                None
            }
            Err(e) => {
                warn!(
                    process = %ctx.process,
                    build = %ctx.build.reference,
                    error = %e,
                    "script evaluation failed"
                );
                None
            }
        }
    }

    fn describe(&self) -> String {
        match &self.label {
            Some(label) => format!("script '{label}' is satisfied"),
            None => "script is satisfied".to_string(),
        }
    }
}
