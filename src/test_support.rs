// src/test_support.rs

//! Minimal host used by unit tests inside the crate.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use crate::config::model::StepConfig;
use crate::host::{
    BuildInfo, Host, JobInfo, ScriptBindings, ScriptError, ScriptValue, StepContext, StepPhase,
};
use crate::types::{Actor, BuildRef, BuildResult};

pub fn finished_build(job: &str, number: u64, result: BuildResult) -> BuildInfo {
    let mut build = BuildInfo::new(BuildRef::new(job, number));
    build.result = Some(result);
    build
}

#[derive(Default)]
pub struct StubHost {
    builds: Mutex<BTreeMap<BuildRef, BuildInfo>>,
    edges: Mutex<BTreeMap<String, Vec<String>>>,
    scripts: Mutex<BTreeMap<String, Result<ScriptValue, ScriptError>>>,
    evaluated: Mutex<Vec<String>>,
    promoters: Mutex<HashSet<String>>,
    failing_steps: Mutex<HashSet<String>>,
    steps_run: Mutex<Vec<(StepPhase, String, BuildRef)>>,
    actor: Mutex<Option<Actor>>,
}

impl StubHost {
    pub fn add_build(&self, build: BuildInfo) {
        self.builds
            .lock()
            .unwrap()
            .insert(build.reference.clone(), build);
    }

    pub fn add_edge(&self, from: &str, to: &str) {
        self.edges
            .lock()
            .unwrap()
            .entry(from.to_string())
            .or_default()
            .push(to.to_string());
    }

    pub fn set_script(&self, script: &str, value: Result<ScriptValue, ScriptError>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(script.to_string(), value);
    }

    pub fn scripts_evaluated(&self) -> Vec<String> {
        self.evaluated.lock().unwrap().clone()
    }

    pub fn grant_promote(&self, actor_id: &str) {
        self.promoters.lock().unwrap().insert(actor_id.to_string());
    }

    pub fn fail_step(&self, name: &str) {
        self.failing_steps.lock().unwrap().insert(name.to_string());
    }

    pub fn set_actor(&self, actor: Option<Actor>) {
        *self.actor.lock().unwrap() = actor;
    }

    pub fn steps_run(&self) -> Vec<(StepPhase, String, BuildRef)> {
        self.steps_run.lock().unwrap().clone()
    }
}

impl Host for StubHost {
    fn resolve_job(&self, full_name: &str) -> Option<JobInfo> {
        let builds = self.builds.lock().unwrap();
        builds
            .keys()
            .any(|b| b.job == full_name)
            .then(|| JobInfo {
                full_name: full_name.to_string(),
                display_name: crate::types::short_name(full_name).to_string(),
            })
    }

    fn resolve_build(&self, job: &str, number: u64) -> Option<BuildInfo> {
        self.builds
            .lock()
            .unwrap()
            .get(&BuildRef::new(job, number))
            .cloned()
    }

    fn current_actor(&self) -> Option<Actor> {
        self.actor.lock().unwrap().clone()
    }

    fn can_promote(&self, actor: &Actor, _job: &str) -> bool {
        self.promoters.lock().unwrap().contains(&actor.id)
    }

    fn downstream_projects(&self, job: &str) -> Vec<String> {
        self.edges
            .lock()
            .unwrap()
            .get(job)
            .cloned()
            .unwrap_or_default()
    }

    fn builds_caused_by(&self, upstream: &BuildRef, project: &str) -> Vec<BuildInfo> {
        self.builds
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.reference.job == project && b.upstream_causes.contains(upstream))
            .cloned()
            .collect()
    }

    fn evaluate_script(
        &self,
        script: &str,
        _bindings: &ScriptBindings<'_>,
    ) -> Result<ScriptValue, ScriptError> {
        self.evaluated.lock().unwrap().push(script.to_string());
        self.scripts
            .lock()
            .unwrap()
            .get(script)
            .cloned()
            .unwrap_or_else(|| Err(ScriptError::Failed(format!("unknown script: {script}"))))
    }

    fn run_steps(&self, phase: StepPhase, steps: &[StepConfig], ctx: &StepContext<'_>) -> bool {
        let failing = self.failing_steps.lock().unwrap();
        let mut log = self.steps_run.lock().unwrap();
        for step in steps {
            log.push((phase, step.name.clone(), ctx.target.clone()));
            if failing.contains(&step.name) {
                return false;
            }
        }
        true
    }
}
