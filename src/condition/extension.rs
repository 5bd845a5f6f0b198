// src/condition/extension.rs

//! Conditions contributed from outside the crate.
//!
//! An extension registers under a stable identifier; definitions refer to it
//! with `kind = "extension"` plus `id` and free-form `settings`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::badge::Badge;
use crate::condition::{Condition, EvaluationContext};

/// A condition kind provided by an extension.
pub trait ConditionExtension: Send + Sync {
    /// Stable identifier referenced from configuration.
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    /// Static checks on configured settings.
    fn validate(&self, _settings: &BTreeMap<String, String>) -> std::result::Result<(), String> {
        Ok(())
    }

    /// `Some(variables)` if met; the variables are contributed to the run
    /// environment.
    fn evaluate(
        &self,
        settings: &BTreeMap<String, String>,
        ctx: &EvaluationContext<'_>,
    ) -> Option<BTreeMap<String, String>>;
}

/// Lookup table of registered extensions, keyed by identifier.
#[derive(Default, Clone)]
pub struct ConditionRegistry {
    extensions: HashMap<String, Arc<dyn ConditionExtension>>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `extension`, replacing any earlier one with the same id.
    pub fn register(&mut self, extension: Arc<dyn ConditionExtension>) {
        let id = extension.id().to_string();
        if self.extensions.insert(id.clone(), extension).is_some() {
            warn!(id = %id, "replaced previously registered condition extension");
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn ConditionExtension>> {
        self.extensions.get(id)
    }

    /// `(id, display name)` of every registered extension, sorted by id.
    pub fn registered(&self) -> Vec<(String, String)> {
        let mut out: Vec<_> = self
            .extensions
            .values()
            .map(|e| (e.id().to_string(), e.display_name().to_string()))
            .collect();
        out.sort();
        out
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.extensions.keys().collect();
        ids.sort();
        f.debug_struct("ConditionRegistry").field("ids", &ids).finish()
    }
}

/// Configured reference to a registered extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionCondition {
    pub id: String,
    pub settings: BTreeMap<String, String>,
}

impl ExtensionCondition {
    /// Only the identifier can be checked without a registry at hand.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("extension id must not be empty".to_string());
        }
        Ok(())
    }

    /// Checks against the registered extension, if there is one.
    pub fn validate_with(&self, registry: &ConditionRegistry) -> std::result::Result<(), String> {
        self.validate()?;
        match registry.get(&self.id) {
            Some(ext) => ext.validate(&self.settings),
            None => Err(format!("no condition extension registered as '{}'", self.id)),
        }
    }
}

impl Condition for ExtensionCondition {
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Option<Badge> {
        let Some(extension) = ctx.extensions.get(&self.id) else {
            warn!(process = %ctx.process, id = %self.id, "unknown condition extension");
            return None;
        };

        let variables = extension.evaluate(&self.settings, ctx)?;
        debug!(process = %ctx.process, id = %self.id, "extension condition met");
        Some(Badge::Extension {
            id: self.id.clone(),
            variables,
        })
    }

    fn describe(&self) -> String {
        format!("extension '{}'", self.id)
    }
}
