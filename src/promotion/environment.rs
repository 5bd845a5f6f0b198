// src/promotion/environment.rs

use std::collections::BTreeMap;

use crate::host::BuildInfo;
use crate::status::Status;
use crate::types::{Actor, Parameters};

pub const PROMOTED_JOB_NAME: &str = "PROMOTED_JOB_NAME";
pub const PROMOTED_JOB_FULL_NAME: &str = "PROMOTED_JOB_FULL_NAME";
pub const PROMOTED_USER_NAME: &str = "PROMOTED_USER_NAME";
pub const PROMOTED_USER_ID: &str = "PROMOTED_USER_ID";
pub const PROMOTED_DISPLAY_NAME: &str = "PROMOTED_DISPLAY_NAME";
pub const PROMOTED_NUMBER: &str = "PROMOTED_NUMBER";
pub const PROMOTED_ID: &str = "PROMOTED_ID";
pub const PROMOTED_TIMESTAMP: &str = "PROMOTED_TIMESTAMP";
pub const PROMOTION_NAME: &str = "PROMOTION_NAME";

/// Who a run is attributed to: the manual approver, else whoever asked for
/// the promotion, else whoever started the target build.
pub fn promotion_user(status: Option<&Status>, requested_by: Option<&Actor>, target: &BuildInfo) -> Actor {
    status
        .and_then(|s| s.badges.iter().find_map(|b| b.approver()))
        .or(requested_by)
        .or(target.started_by.as_ref())
        .cloned()
        .unwrap_or_else(Actor::anonymous)
}

/// Environment handed to a run's steps.
///
/// Badge variables come first, then run parameters; the `PROMOTED_*`
/// variables are applied last and cannot be overridden.
pub fn promotion_environment(
    process: &str,
    target: &BuildInfo,
    user: &Actor,
    parameters: &Parameters,
    status: Option<&Status>,
) -> BTreeMap<String, String> {
    let mut env = status.map(Status::environment).unwrap_or_default();
    env.extend(parameters.iter().map(|(k, v)| (k.clone(), v.clone())));

    let build = &target.reference;
    let fixed = [
        (PROMOTED_JOB_NAME, build.short_job_name().to_string()),
        (PROMOTED_JOB_FULL_NAME, build.job.clone()),
        (PROMOTED_USER_NAME, user.display_name.clone()),
        (PROMOTED_USER_ID, user.id.clone()),
        (PROMOTED_DISPLAY_NAME, target.display_name.clone()),
        (PROMOTED_NUMBER, build.number.to_string()),
        (PROMOTED_ID, build.number.to_string()),
        (PROMOTED_TIMESTAMP, target.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        (PROMOTION_NAME, process.to_string()),
    ];
    env.extend(fixed.into_iter().map(|(k, v)| (k.to_string(), v)));
    env
}
