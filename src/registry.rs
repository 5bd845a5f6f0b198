// src/registry.rs

//! Per-job set of promotion processes.
//!
//! A registry owns every definition it ever loaded or created (`all`) and
//! the ordered list of active names. Definitions dropped from the active set
//! are archived (`disabled`), never deleted, so their run history survives.
//! Only [`ProcessRegistry::purge`] removes a directory, and only for an
//! archived definition.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::condition::ConditionRegistry;
use crate::config::{
    ActiveProcesses, ProcessConfig, to_toml, validate_name, validate_submission,
};
use crate::errors::{PromotionError, Result};
use crate::fs::FileSystem;
use crate::layout;
use crate::process::ProcessDefinition;

#[derive(Debug, Default)]
struct RegistryState {
    job: String,
    all: BTreeMap<String, Arc<ProcessDefinition>>,
    active: Vec<String>,
}

impl RegistryState {
    /// Key of the definition matching `name`, preferring an exact match.
    fn key_for(&self, name: &str) -> Option<String> {
        if self.all.contains_key(name) {
            return Some(name.to_string());
        }
        let lower = name.to_lowercase();
        self.all.keys().find(|k| k.to_lowercase() == lower).cloned()
    }

    fn is_active(&self, key: &str) -> bool {
        self.active.iter().any(|a| a == key)
    }
}

#[derive(Debug)]
pub struct ProcessRegistry {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    state: RwLock<RegistryState>,
}

impl ProcessRegistry {
    /// An empty registry for `job`. Nothing is written until the first
    /// mutation.
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>, job: &str) -> Self {
        Self {
            fs,
            root: root.into(),
            state: RwLock::new(RegistryState {
                job: job.to_string(),
                ..RegistryState::default()
            }),
        }
    }

    /// Load every definition stored for `job`. Definitions that fail to
    /// load are logged and skipped.
    pub fn load(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>, job: &str) -> Result<Self> {
        let registry = Self::new(fs, root, job);
        {
            let mut state = registry.write();
            registry.sync_from_storage(&mut state)?;
        }
        Ok(registry)
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn job(&self) -> String {
        self.read().job.clone()
    }

    /// Look up a definition by name. Exact spelling wins; otherwise names
    /// match ignoring case.
    pub fn get(&self, name: &str) -> Option<Arc<ProcessDefinition>> {
        let state = self.read();
        let key = state.key_for(name)?;
        state.all.get(&key).cloned()
    }

    pub fn is_active(&self, name: &str) -> bool {
        let state = self.read();
        state.key_for(name).is_some_and(|k| state.is_active(&k))
    }

    /// Active definitions, in active-set order.
    pub fn active_definitions(&self) -> Vec<Arc<ProcessDefinition>> {
        let state = self.read();
        state
            .active
            .iter()
            .filter_map(|name| state.all.get(name).cloned())
            .collect()
    }

    /// Active definitions first, then archived ones by name.
    pub fn all_definitions(&self) -> Vec<Arc<ProcessDefinition>> {
        let state = self.read();
        let mut out: Vec<_> = state
            .active
            .iter()
            .filter_map(|name| state.all.get(name).cloned())
            .collect();
        out.extend(
            state
                .all
                .iter()
                .filter(|(k, _)| !state.is_active(k))
                .map(|(_, d)| Arc::clone(d)),
        );
        out
    }

    /// Create an empty active process, or reactivate an archived one with
    /// the same name.
    pub fn add_process(&self, name: &str) -> Result<Arc<ProcessDefinition>> {
        validate_name(name)?;
        let mut state = self.write();

        if let Some(key) = state.key_for(name) {
            if state.is_active(&key) {
                return Err(PromotionError::DuplicateName(name.to_string()));
            }
            if key != name {
                self.move_definition(&mut state, &key, name)?;
            }
            let def = state
                .all
                .get(name)
                .cloned()
                .ok_or_else(|| PromotionError::ProcessNotFound(name.to_string()))?;
            def.set_disabled(false);
            state.active.push(name.to_string());
            self.save_active(&state)?;
            info!(job = %state.job, process = %name, "reactivated archived promotion process");
            return Ok(def);
        }

        let dir = layout::process_dir(&self.root, &state.job, name);
        let def = Arc::new(ProcessDefinition::create(
            Arc::clone(&self.fs),
            dir,
            &state.job,
            ProcessConfig::new(name),
        )?);
        state.all.insert(name.to_string(), Arc::clone(&def));
        state.active.push(name.to_string());
        self.save_active(&state)?;
        info!(job = %state.job, process = %name, "added promotion process");
        Ok(def)
    }

    /// Replace the whole active set with `submission`.
    ///
    /// The submission is validated as a whole, extension conditions against
    /// `extensions`, before anything changes. Each named definition is
    /// created or updated (written only if its content changed) and
    /// activated; every other definition is archived.
    pub fn reconfigure(&self, submission: Vec<ProcessConfig>, extensions: &ConditionRegistry) -> Result<()> {
        validate_submission(&submission, extensions)?;
        let mut state = self.write();

        let mut active = Vec::with_capacity(submission.len());
        for config in submission {
            let name = config.name.clone();
            match state.key_for(&name) {
                Some(key) => {
                    if key != name {
                        self.move_definition(&mut state, &key, &name)?;
                    }
                    let def = state
                        .all
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| PromotionError::ProcessNotFound(name.clone()))?;
                    def.replace_config(config)?;
                    def.set_disabled(false);
                }
                None => {
                    let dir = layout::process_dir(&self.root, &state.job, &name);
                    let def = ProcessDefinition::create(Arc::clone(&self.fs), dir, &state.job, config)?;
                    state.all.insert(name.clone(), Arc::new(def));
                }
            }
            active.push(name);
        }

        for (key, def) in &state.all {
            if !active.contains(key) && !def.is_disabled() {
                archive_definition(&state.job, key, def);
            }
        }

        state.active = active;
        self.save_active(&state)?;
        info!(job = %state.job, active = state.active.len(), "reconfigured promotion processes");
        Ok(())
    }

    /// Rename a process. A rename that only changes case keeps everything
    /// and normalizes the stored name.
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        validate_name(new)?;
        let mut state = self.write();
        let key = state
            .key_for(old)
            .ok_or_else(|| PromotionError::ProcessNotFound(old.to_string()))?;

        if key == new {
            return Ok(());
        }
        if key.to_lowercase() != new.to_lowercase() && state.key_for(new).is_some() {
            return Err(PromotionError::DuplicateName(new.to_string()));
        }

        self.move_definition(&mut state, &key, new)?;
        self.save_active(&state)?;
        info!(job = %state.job, from = %key, to = %new, "renamed promotion process");
        Ok(())
    }

    /// Remove a process from the active set, keeping its history.
    pub fn archive(&self, name: &str) -> Result<Arc<ProcessDefinition>> {
        let mut state = self.write();
        let key = state
            .key_for(name)
            .ok_or_else(|| PromotionError::ProcessNotFound(name.to_string()))?;
        let def = state
            .all
            .get(&key)
            .cloned()
            .ok_or_else(|| PromotionError::ProcessNotFound(name.to_string()))?;

        if state.is_active(&key) {
            state.active.retain(|a| a != &key);
            archive_definition(&state.job, &key, &def);
            self.save_active(&state)?;
        }
        Ok(def)
    }

    /// Delete an archived process and its history from storage.
    pub fn purge(&self, name: &str) -> Result<()> {
        let mut state = self.write();
        let key = state
            .key_for(name)
            .ok_or_else(|| PromotionError::ProcessNotFound(name.to_string()))?;
        if state.is_active(&key) {
            return Err(PromotionError::ConfigError(format!(
                "process '{key}' is active; archive it before purging"
            )));
        }
        if let Some(def) = state.all.remove(&key) {
            let dir = def.dir();
            if self.fs.is_dir(&dir) {
                self.fs.remove_dir_all(&dir)?;
            }
        }
        warn!(job = %state.job, process = %key, "purged archived promotion process");
        Ok(())
    }

    /// Re-sync with storage. Definitions whose files did not change keep
    /// their in-memory state (queues included).
    pub fn refresh(&self) -> Result<()> {
        let mut state = self.write();
        self.sync_from_storage(&mut state)
    }

    /// Follow a rename of the owning job. The caller has already moved the
    /// job's directory.
    pub fn set_owner(&self, job: &str) -> Result<()> {
        let mut state = self.write();
        state.job = job.to_string();
        for (key, def) in &state.all {
            def.relocate(job, key, layout::process_dir(&self.root, job, key))?;
        }
        Ok(())
    }

    /// Drop every waiting target. Runs in progress are left to finish.
    pub fn clear_queues(&self) -> usize {
        self.read().all.values().map(|d| d.queue().clear()).sum()
    }

    /// No run in progress and nothing queued, for every definition.
    pub fn is_idle(&self) -> bool {
        self.read().all.values().all(|d| d.queue().is_idle())
    }

    fn move_definition(&self, state: &mut RegistryState, from: &str, to: &str) -> Result<()> {
        let def = state
            .all
            .remove(from)
            .ok_or_else(|| PromotionError::ProcessNotFound(from.to_string()))?;

        let old_dir = def.dir();
        let new_dir = layout::process_dir(&self.root, &state.job, to);
        if self.fs.exists(&old_dir) {
            if from.to_lowercase() == to.to_lowercase() {
                // Case-insensitive filesystems see both names as one entry.
                let tmp = layout::process_dir(&self.root, &state.job, &format!(".{to}.renaming"));
                self.fs.rename(&old_dir, &tmp)?;
                self.fs.rename(&tmp, &new_dir)?;
            } else {
                self.fs.rename(&old_dir, &new_dir)?;
            }
        }
        def.relocate(&state.job, to, new_dir)?;

        for name in state.active.iter_mut() {
            if name == from {
                *name = to.to_string();
            }
        }
        state.all.insert(to.to_string(), def);
        Ok(())
    }

    fn save_active(&self, state: &RegistryState) -> Result<()> {
        let doc = ActiveProcesses {
            active: state.active.clone(),
        };
        let text = to_toml(&doc)?;
        self.fs
            .write(&layout::active_file(&self.root, &state.job), text.as_bytes())?;
        Ok(())
    }

    fn load_active(&self, job: &str) -> Vec<String> {
        let path = layout::active_file(&self.root, job);
        if !self.fs.exists(&path) {
            return Vec::new();
        }
        let parsed = self
            .fs
            .read_to_string(&path)
            .map_err(PromotionError::from)
            .and_then(|text| Ok(toml::from_str::<ActiveProcesses>(&text)?));
        match parsed {
            Ok(doc) => doc.active,
            Err(e) => {
                warn!(job = %job, error = %e, "unreadable active process list; treating all as archived");
                Vec::new()
            }
        }
    }

    fn sync_from_storage(&self, state: &mut RegistryState) -> Result<()> {
        let dir = layout::promotions_dir(&self.root, &state.job);
        let mut seen = Vec::new();

        if self.fs.is_dir(&dir) {
            for entry in self.fs.read_dir(&dir)? {
                let Some(name) = definition_name(self.fs.as_ref(), &entry) else {
                    continue;
                };
                seen.push(name.clone());

                if let Some(def) = state.all.get(&name) {
                    if let Err(e) = def.refresh() {
                        warn!(job = %state.job, process = %name, error = %e, "failed to refresh promotion process");
                    }
                    continue;
                }

                match ProcessDefinition::load(Arc::clone(&self.fs), entry.clone(), &state.job) {
                    Ok(def) => {
                        if def.name() != name {
                            warn!(
                                job = %state.job,
                                process = %name,
                                recorded = %def.name(),
                                "definition name differs from its directory; using the directory name"
                            );
                            def.relocate(&state.job, &name, entry)?;
                        }
                        debug!(job = %state.job, process = %name, "loaded promotion process");
                        state.all.insert(name, Arc::new(def));
                    }
                    Err(e) => {
                        warn!(job = %state.job, process = %name, error = %e, "skipping promotion process that failed to load");
                    }
                }
            }
        }

        // Definitions that vanished from storage are forgotten.
        state.all.retain(|k, _| seen.contains(k));

        let job = state.job.clone();
        state.active = self
            .load_active(&job)
            .into_iter()
            .filter(|name| state.all.contains_key(name))
            .collect();
        for (key, def) in &state.all {
            def.set_disabled(!state.active.contains(key));
        }
        Ok(())
    }
}

fn archive_definition(job: &str, key: &str, def: &ProcessDefinition) {
    def.set_disabled(true);
    let dropped = def.queue().clear();
    info!(job = %job, process = %key, dropped, "archived promotion process");
}

/// Directory name of a stored definition, or `None` for anything else.
fn definition_name(fs: &dyn FileSystem, entry: &Path) -> Option<String> {
    let name = entry.file_name()?.to_str()?;
    if name.starts_with('.') || !fs.is_dir(entry) {
        return None;
    }
    fs.exists(&layout::process_config_file(entry))
        .then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{ConditionConfig, SelfPromotionCondition, UpstreamPromotionCondition};
    use crate::fs::mock::MockFileSystem;
    use crate::promotion::record::PromotionRun;

    fn registry(fs: &MockFileSystem) -> ProcessRegistry {
        ProcessRegistry::new(Arc::new(fs.clone()), "/data", "app")
    }

    fn names(defs: &[Arc<ProcessDefinition>]) -> Vec<String> {
        defs.iter().map(|d| d.name()).collect()
    }

    #[test]
    fn add_rejects_case_insensitive_duplicates() {
        let fs = MockFileSystem::new();
        let reg = registry(&fs);
        reg.add_process("Foo").unwrap();
        assert!(matches!(
            reg.add_process("foo"),
            Err(PromotionError::DuplicateName(_))
        ));
        assert!(matches!(
            reg.add_process("a/b"),
            Err(PromotionError::InvalidName { .. })
        ));
    }

    #[test]
    fn reconfigure_archives_what_was_left_out() {
        let fs = MockFileSystem::new();
        let reg = registry(&fs);
        reg.reconfigure(
            vec![ProcessConfig::new("qa"), ProcessConfig::new("prod")],
            &ConditionRegistry::new(),
        )
        .unwrap();
        let prod = reg.get("prod").unwrap();
        prod.runs()
            .save(&PromotionRun::start("prod", 1, None))
            .unwrap();

        reg.reconfigure(vec![ProcessConfig::new("qa")], &ConditionRegistry::new())
            .unwrap();

        assert_eq!(names(&reg.active_definitions()), vec!["qa"]);
        assert_eq!(names(&reg.all_definitions()), vec!["qa", "prod"]);
        assert!(prod.is_disabled());
        assert_eq!(prod.runs().history().len(), 1);
    }

    #[test]
    fn invalid_submission_changes_nothing() {
        let fs = MockFileSystem::new();
        let reg = registry(&fs);
        reg.reconfigure(vec![ProcessConfig::new("qa")], &ConditionRegistry::new())
            .unwrap();

        let mut cyclic_a = ProcessConfig::new("a");
        cyclic_a
            .conditions
            .push(ConditionConfig::UpstreamPromotion(UpstreamPromotionCondition {
                required: vec!["b".to_string()],
            }));
        let mut cyclic_b = ProcessConfig::new("b");
        cyclic_b
            .conditions
            .push(ConditionConfig::UpstreamPromotion(UpstreamPromotionCondition {
                required: vec!["a".to_string()],
            }));

        assert!(
            reg.reconfigure(vec![cyclic_a, cyclic_b], &ConditionRegistry::new())
                .is_err()
        );
        assert_eq!(names(&reg.active_definitions()), vec!["qa"]);
        assert!(reg.get("a").is_none());
    }

    #[test]
    fn adding_an_archived_name_reactivates_it() {
        let fs = MockFileSystem::new();
        let reg = registry(&fs);
        let mut qa = ProcessConfig::new("QA");
        qa.conditions
            .push(ConditionConfig::SelfPromotion(SelfPromotionCondition::default()));
        reg.reconfigure(vec![qa], &ConditionRegistry::new()).unwrap();
        reg.archive("QA").unwrap();

        let def = reg.add_process("qa").unwrap();
        assert_eq!(def.name(), "qa");
        assert!(!def.is_disabled());
        assert_eq!(def.config().conditions.len(), 1);
        assert!(fs.exists(Path::new("/data/jobs/app/promotions/qa/config.toml")));
        assert!(!fs.exists(Path::new("/data/jobs/app/promotions/QA")));
    }

    #[test]
    fn case_only_rename_keeps_history() {
        let fs = MockFileSystem::new();
        let reg = registry(&fs);
        let def = reg.add_process("deploy").unwrap();
        def.runs()
            .save(&PromotionRun::start("deploy", 1, None))
            .unwrap();

        reg.rename("deploy", "Deploy").unwrap();

        let renamed = reg.get("Deploy").unwrap();
        assert_eq!(renamed.name(), "Deploy");
        assert_eq!(renamed.runs().history().len(), 1);
        assert_eq!(names(&reg.active_definitions()), vec!["Deploy"]);
    }

    #[test]
    fn rename_onto_another_process_is_rejected() {
        let fs = MockFileSystem::new();
        let reg = registry(&fs);
        reg.add_process("qa").unwrap();
        reg.add_process("prod").unwrap();
        assert!(matches!(
            reg.rename("qa", "PROD"),
            Err(PromotionError::DuplicateName(_))
        ));
    }

    #[test]
    fn load_skips_broken_definitions() {
        let fs = MockFileSystem::new();
        {
            let reg = registry(&fs);
            reg.add_process("qa").unwrap();
            reg.add_process("prod").unwrap();
        }
        fs.add_file("/data/jobs/app/promotions/prod/config.toml", "name = [");

        let reg = ProcessRegistry::load(Arc::new(fs.clone()), "/data", "app").unwrap();
        assert_eq!(names(&reg.active_definitions()), vec!["qa"]);
        assert!(reg.get("prod").is_none());
    }

    #[test]
    fn purge_only_removes_archived_definitions() {
        let fs = MockFileSystem::new();
        let reg = registry(&fs);
        reg.add_process("qa").unwrap();
        assert!(reg.purge("qa").is_err());

        reg.archive("qa").unwrap();
        reg.purge("qa").unwrap();
        assert!(reg.get("qa").is_none());
        assert!(!fs.exists(Path::new("/data/jobs/app/promotions/qa")));
    }
}
