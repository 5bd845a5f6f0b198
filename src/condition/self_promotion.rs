// src/condition/self_promotion.rs

use serde::{Deserialize, Serialize};

use crate::badge::Badge;
use crate::condition::{Condition, EvaluationContext};
use crate::types::BuildResult;

/// Met as soon as the build itself succeeded (or was unstable, if allowed).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfPromotionCondition {
    pub even_if_unstable: bool,
}

impl Condition for SelfPromotionCondition {
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Option<Badge> {
        let result = ctx.build.result?;
        if result.is_better_or_equal_to(BuildResult::pass_threshold(self.even_if_unstable)) {
            Some(Badge::SelfSuccess { result })
        } else {
            None
        }
    }

    fn describe(&self) -> String {
        if self.even_if_unstable {
            "build is successful or unstable".to_string()
        } else {
            "build is successful".to_string()
        }
    }
}
