// src/config/validate.rs

use std::collections::HashMap;
use std::sync::LazyLock;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::condition::{ConditionConfig, ConditionRegistry};
use crate::config::model::ProcessConfig;
use crate::errors::{PromotionError, Result};

/// Characters that may not appear in a process name: definitions are stored
/// as directories named after the process.
static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[?*/\\%!@#$^&|<>\[\]:;"]"#).expect("static regex"));

/// Check that `name` is usable as a process name (and directory name).
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PromotionError::invalid_name(name, "name must not be empty"));
    }
    if name == "." || name == ".." {
        return Err(PromotionError::invalid_name(name, "name must not be '.' or '..'"));
    }
    if name.trim() != name {
        return Err(PromotionError::invalid_name(
            name,
            "name must not start or end with whitespace",
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(PromotionError::invalid_name(
            name,
            "name must not contain control characters",
        ));
    }
    if let Some(m) = UNSAFE_NAME_CHARS.find(name) {
        return Err(PromotionError::invalid_name(
            name,
            format!("'{}' is an unsafe character", m.as_str()),
        ));
    }
    Ok(())
}

/// Validate one process definition on its own.
pub fn validate_process(cfg: &ProcessConfig) -> Result<()> {
    validate_name(&cfg.name)?;

    for (idx, condition) in cfg.conditions.iter().enumerate() {
        condition.validate().map_err(|msg| {
            PromotionError::ConfigError(format!(
                "process '{}' condition #{} ({}): {}",
                cfg.name,
                idx + 1,
                condition.id(),
                msg
            ))
        })?;

        if let ConditionConfig::UpstreamPromotion(up) = condition {
            if up.required.iter().any(|r| r.eq_ignore_ascii_case(&cfg.name)) {
                return Err(PromotionError::ConfigError(format!(
                    "process '{}' cannot require its own promotion",
                    cfg.name
                )));
            }
        }
    }

    for (idx, step) in cfg.steps.iter().enumerate() {
        if step.name.trim().is_empty() {
            return Err(PromotionError::ConfigError(format!(
                "process '{}' step #{} has an empty name",
                cfg.name,
                idx + 1
            )));
        }
    }

    Ok(())
}

/// Validate a whole submission before any of it is applied.
///
/// Checks every definition, including extension conditions against
/// `extensions`, rejects names that collide ignoring case, and rejects
/// cycles between `upstream-promotion` requirements (a cycle could never
/// qualify).
pub fn validate_submission(processes: &[ProcessConfig], extensions: &ConditionRegistry) -> Result<()> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for cfg in processes {
        validate_process(cfg)?;
        validate_extensions(cfg, extensions)?;
        if let Some(previous) = seen.insert(cfg.name.to_lowercase(), cfg.name.as_str()) {
            return Err(PromotionError::DuplicateName(format!(
                "{} (collides with {})",
                cfg.name, previous
            )));
        }
    }

    validate_upstream_requirements(processes)
}

/// An extension condition naming an unregistered id would never qualify.
fn validate_extensions(cfg: &ProcessConfig, extensions: &ConditionRegistry) -> Result<()> {
    for condition in &cfg.conditions {
        if let ConditionConfig::Extension(ext) = condition {
            ext.validate_with(extensions).map_err(|msg| {
                PromotionError::ConfigError(format!("process '{}': {msg}", cfg.name))
            })?;
        }
    }
    Ok(())
}

fn validate_upstream_requirements(processes: &[ProcessConfig]) -> Result<()> {
    // Edge direction: required -> requiring
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    let canonical: HashMap<String, &str> = processes
        .iter()
        .map(|p| (p.name.to_lowercase(), p.name.as_str()))
        .collect();

    for cfg in processes {
        graph.add_node(cfg.name.as_str());
    }

    for cfg in processes {
        for condition in &cfg.conditions {
            if let ConditionConfig::UpstreamPromotion(up) = condition {
                for required in &up.required {
                    // Requirements on archived or unknown processes simply
                    // never qualify; they cannot form a cycle here.
                    if let Some(&dep) = canonical.get(&required.to_lowercase()) {
                        graph.add_edge(dep, cfg.name.as_str(), ());
                    }
                }
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(PromotionError::ConfigError(format!(
            "cycle detected in upstream-promotion requirements involving process '{}'",
            cycle.node_id()
        ))),
    }
}
