// src/process/qualify.rs

//! Turning a finished build into a queued promotion.

use tracing::{debug, info};

use crate::badge::Badge;
use crate::condition::{ConditionRegistry, EvaluationContext, evaluate_all};
use crate::host::{BuildInfo, Host};
use crate::ledger::Ledger;
use crate::process::ProcessDefinition;
use crate::process::queue::{Enqueued, QueuedPromotion};
use crate::status::Status;
use crate::types::{Actor, Parameters};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Qualification {
    /// The ledger already holds a status for this process.
    AlreadyQualified,
    NotMet,
    Qualified { enqueued: Enqueued },
}

/// Evaluate `process` against `build` and, if every condition is met, record
/// the qualification and queue the build.
///
/// A build qualifies at most once per process: the ledger's add-if-absent
/// decides the winner when two evaluations race.
pub fn consider_promotion(
    process: &ProcessDefinition,
    build: &BuildInfo,
    ledger: &Ledger,
    host: &dyn Host,
    extensions: &ConditionRegistry,
) -> Qualification {
    let name = process.name();
    if process.is_disabled() || build.result.is_none() {
        return Qualification::NotMet;
    }
    if ledger.contains(&name) {
        return Qualification::AlreadyQualified;
    }

    let config = process.config();
    let ctx = EvaluationContext {
        host,
        process: &name,
        build,
        ledger,
        extensions,
    };
    let Some(badges) = evaluate_all(&config.conditions, &ctx) else {
        return Qualification::NotMet;
    };

    let requested_by = badges.iter().find_map(Badge::approver).cloned();
    let mut parameters = build.parameters.clone();
    let approved = badges.iter().find_map(|b| match b {
        Badge::Manual { parameters: values, .. } => Some(values.clone()),
        _ => None,
    });
    parameters.extend(approved.unwrap_or_else(|| config.default_parameters()));

    if !ledger.add(Status::new(&name, badges)) {
        debug!(process = %name, build = %build.reference, "lost qualification race");
        return Qualification::AlreadyQualified;
    }

    let enqueued = process.queue().enqueue(QueuedPromotion::new(
        build.reference.clone(),
        parameters,
        requested_by,
    ));
    info!(process = %name, build = %build.reference, ?enqueued, "build qualified for promotion");
    Qualification::Qualified { enqueued }
}

/// Queue `build` regardless of conditions, recording an empty status if the
/// process never qualified it. `supplied` wins over every other parameter
/// source.
pub fn force_promotion(
    process: &ProcessDefinition,
    build: &BuildInfo,
    ledger: &Ledger,
    actor: &Actor,
    supplied: &Parameters,
) -> Enqueued {
    let name = process.name();
    if ledger.add(Status::new(&name, Vec::new())) {
        debug!(process = %name, build = %build.reference, "recorded forced qualification");
    }

    let mut parameters = build.parameters.clone();
    match ledger.approval(&name) {
        Some(approval) => parameters.extend(approval.parameters),
        None => parameters.extend(process.config().default_parameters()),
    }
    parameters.extend(supplied.iter().map(|(k, v)| (k.clone(), v.clone())));

    let enqueued = process.queue().enqueue(QueuedPromotion::new(
        build.reference.clone(),
        parameters,
        Some(actor.clone()),
    ));
    info!(process = %name, build = %build.reference, actor = %actor, ?enqueued, "promotion forced");
    enqueued
}
