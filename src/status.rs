// src/status.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::badge::Badge;
use crate::process::ProcessDefinition;
use crate::registry::ProcessRegistry;

/// One process's qualification of one build.
///
/// Badges are fixed when the status is created; later promotion runs only
/// append to `promotion_attempts` and set `successful_promotion`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub process: String,
    #[serde(default, rename = "badge")]
    pub badges: Vec<Badge>,
    pub timestamp: DateTime<Utc>,
    /// Run numbers, ascending.
    #[serde(default)]
    pub promotion_attempts: Vec<u64>,
    #[serde(default)]
    pub successful_promotion: Option<u64>,
}

impl Status {
    pub fn new(process: impl Into<String>, badges: Vec<Badge>) -> Self {
        Self {
            process: process.into(),
            badges,
            timestamp: Utc::now(),
            promotion_attempts: Vec::new(),
            successful_promotion: None,
        }
    }

    /// The definition this status belongs to, if the registry still has it.
    pub fn process(&self, registry: &ProcessRegistry) -> Option<Arc<ProcessDefinition>> {
        registry.get(&self.process)
    }

    pub fn is_promotion_successful(&self) -> bool {
        self.successful_promotion.is_some()
    }

    pub fn last_attempt(&self) -> Option<u64> {
        self.promotion_attempts.last().copied()
    }

    /// Variables contributed by every badge, in badge order.
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        for badge in &self.badges {
            badge.contribute_env(&mut env);
        }
        env
    }

    pub(crate) fn record_attempt(&mut self, run: u64) {
        if let Err(pos) = self.promotion_attempts.binary_search(&run) {
            self.promotion_attempts.insert(pos, run);
        }
    }
}
