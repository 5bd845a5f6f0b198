use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use promoted::config::StepConfig;
use promoted::host::{
    BuildInfo, Host, JobInfo, ScriptBindings, ScriptError, ScriptValue, StepContext, StepPhase,
};
use promoted::types::{Actor, BuildRef, short_name};

/// One step the host was asked to execute.
#[derive(Debug, Clone)]
pub struct RecordedStep {
    pub phase: StepPhase,
    pub step: String,
    pub process: String,
    pub run_number: u64,
    pub target: BuildRef,
    pub environment: BTreeMap<String, String>,
}

/// A host whose builds, trigger edges and scripts live in memory.
///
/// - records every executed step with the environment it received
/// - fails any step whose name was passed to `fail_step`
/// - panics on any step whose name was passed to `panic_on_step`
#[derive(Default)]
pub struct InMemoryHost {
    builds: Mutex<BTreeMap<BuildRef, BuildInfo>>,
    edges: Mutex<BTreeMap<String, Vec<String>>>,
    scripts: Mutex<BTreeMap<String, Result<ScriptValue, ScriptError>>>,
    promoters: Mutex<HashSet<String>>,
    failing_steps: Mutex<HashSet<String>>,
    panicking_steps: Mutex<HashSet<String>>,
    steps: Mutex<Vec<RecordedStep>>,
    actor: Mutex<Option<Actor>>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_build(&self, build: BuildInfo) {
        self.builds
            .lock()
            .unwrap()
            .insert(build.reference.clone(), build);
    }

    /// `from` triggers `to`.
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

    pub fn grant_promote(&self, actor_id: &str) {
        self.promoters.lock().unwrap().insert(actor_id.to_string());
    }

    pub fn fail_step(&self, name: &str) {
        self.failing_steps.lock().unwrap().insert(name.to_string());
    }

    pub fn panic_on_step(&self, name: &str) {
        self.panicking_steps.lock().unwrap().insert(name.to_string());
    }

    /// Act as `id` for subsequent API calls.
    pub fn login(&self, id: &str) {
        *self.actor.lock().unwrap() = Some(Actor::new(id, id));
    }

    pub fn logout(&self) {
        *self.actor.lock().unwrap() = None;
    }

    pub fn steps(&self) -> Vec<RecordedStep> {
        self.steps.lock().unwrap().clone()
    }

    /// Targets of `Build`-phase executions of `step`, in execution order.
    pub fn promoted_targets(&self, step: &str) -> Vec<BuildRef> {
        self.steps()
            .into_iter()
            .filter(|s| s.phase == StepPhase::Build && s.step == step)
            .map(|s| s.target)
            .collect()
    }

    /// Move every build of `old` to `new`, as the host does on a job rename.
    pub fn rename_job(&self, old: &str, new: &str) {
        let mut builds = self.builds.lock().unwrap();
        let moved: Vec<BuildRef> = builds.keys().filter(|b| b.job == old).cloned().collect();
        for key in moved {
            if let Some(mut build) = builds.remove(&key) {
                build.reference.job = new.to_string();
                builds.insert(build.reference.clone(), build);
            }
        }
    }
}

impl Host for InMemoryHost {
    fn resolve_job(&self, full_name: &str) -> Option<JobInfo> {
        let builds = self.builds.lock().unwrap();
        builds
            .keys()
            .any(|b| b.job == full_name)
            .then(|| JobInfo {
                full_name: full_name.to_string(),
                display_name: short_name(full_name).to_string(),
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
        self.scripts
            .lock()
            .unwrap()
            .get(script)
            .cloned()
            .unwrap_or_else(|| Err(ScriptError::Failed(format!("unknown script: {script}"))))
    }

    fn run_steps(&self, phase: StepPhase, steps: &[StepConfig], ctx: &StepContext<'_>) -> bool {
        // Checked before any lock is taken so a panic poisons nothing.
        let exploding = {
            let panicking = self.panicking_steps.lock().unwrap();
            steps.iter().find(|s| panicking.contains(&s.name)).cloned()
        };
        if let Some(step) = exploding {
            panic!("step '{}' blew up on {}", step.name, ctx.target);
        }

        let failing = self.failing_steps.lock().unwrap();
        let mut log = self.steps.lock().unwrap();
        for step in steps {
            log.push(RecordedStep {
                phase,
                step: step.name.clone(),
                process: ctx.process.to_string(),
                run_number: ctx.run_number,
                target: ctx.target.clone(),
                environment: ctx.environment.clone(),
            });
            if failing.contains(&step.name) {
                return false;
            }
        }
        true
    }
}
