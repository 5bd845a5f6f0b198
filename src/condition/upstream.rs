// src/condition/upstream.rs

use serde::{Deserialize, Serialize};

use crate::badge::Badge;
use crate::condition::{Condition, EvaluationContext};

/// Met once every `required` process of the same job has successfully
/// promoted the build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamPromotionCondition {
    pub required: Vec<String>,
}

impl UpstreamPromotionCondition {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.required.is_empty() {
            return Err("at least one required process is needed".to_string());
        }
        if self.required.iter().any(|r| r.trim().is_empty()) {
            return Err("required process names must not be empty".to_string());
        }
        Ok(())
    }
}

impl Condition for UpstreamPromotionCondition {
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Option<Badge> {
        let mut processes = Vec::with_capacity(self.required.len());
        for name in &self.required {
            let name = name.trim();
            if !ctx.ledger.promoted_by(name) {
                return None;
            }
            processes.push(name.to_string());
        }
        Some(Badge::UpstreamPromotions { processes })
    }

    fn describe(&self) -> String {
        format!("promoted by {}", self.required.join(", "))
    }
}
