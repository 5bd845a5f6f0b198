// src/dispatch.rs

//! Job name → registry lookup.
//!
//! Jobs subscribe explicitly; build events for a job without a registry are
//! ignored.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::errors::{PromotionError, Result};
use crate::fs::FileSystem;
use crate::layout;
use crate::registry::ProcessRegistry;
use crate::types::rebase_job;

#[derive(Debug)]
pub struct Dispatcher {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    registries: RwLock<BTreeMap<String, Arc<ProcessRegistry>>>,
}

impl Dispatcher {
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
            registries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fs(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.fs)
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<ProcessRegistry>>> {
        self.registries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<ProcessRegistry>>> {
        self.registries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe every job that has promotion data under the storage root.
    /// Returns the number of jobs loaded; jobs that fail to load are skipped.
    pub fn load_all(&self) -> usize {
        let mut jobs = Vec::new();
        self.discover_jobs(&self.root, "", &mut jobs);

        let mut loaded = 0;
        for job in jobs {
            match self.load_job(&job) {
                Ok(_) => loaded += 1,
                Err(e) => warn!(job = %job, error = %e, "skipping job that failed to load"),
            }
        }
        info!(jobs = loaded, "loaded promotion registries");
        loaded
    }

    /// Load (or reload) the registry of `job` from storage and subscribe it.
    pub fn load_job(&self, job: &str) -> Result<Arc<ProcessRegistry>> {
        let registry = Arc::new(ProcessRegistry::load(self.fs(), &self.root, job)?);
        self.write().insert(job.to_string(), Arc::clone(&registry));
        debug!(job = %job, "subscribed job");
        Ok(registry)
    }

    /// The registry of `job`, loading or creating it as needed.
    pub fn subscribe(&self, job: &str) -> Result<Arc<ProcessRegistry>> {
        if let Some(registry) = self.registry(job) {
            return Ok(registry);
        }
        self.load_job(job)
    }

    pub fn registry(&self, job: &str) -> Option<Arc<ProcessRegistry>> {
        self.read().get(job).cloned()
    }

    /// Like [`Dispatcher::registry`], but an error for unknown jobs.
    pub fn require(&self, job: &str) -> Result<Arc<ProcessRegistry>> {
        self.registry(job)
            .ok_or_else(|| PromotionError::JobNotFound(job.to_string()))
    }

    pub fn jobs(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Follow a job rename on the host: move its storage and re-key its
    /// registry. Renaming a folder re-keys every job inside it.
    pub fn rename_job(&self, old: &str, new: &str) -> Result<()> {
        let mut registries = self.write();
        if registries.contains_key(new) {
            return Err(PromotionError::DuplicateName(new.to_string()));
        }

        let from = layout::job_dir(&self.root, old);
        let to = layout::job_dir(&self.root, new);
        if self.fs.exists(&from) {
            self.fs.rename(&from, &to)?;
        }

        let moved: Vec<(String, String)> = registries
            .keys()
            .filter_map(|job| rebase_job(job, old, new).map(|renamed| (job.clone(), renamed)))
            .collect();
        for (job, renamed) in moved {
            if let Some(registry) = registries.remove(&job) {
                registry.set_owner(&renamed)?;
                debug!(from = %job, to = %renamed, "re-keyed job registry");
                registries.insert(renamed, registry);
            }
        }
        info!(from = %old, to = %new, "job renamed");
        Ok(())
    }

    /// Follow a job deletion on the host: drop the registries of the job
    /// and of any job inside it, and remove their storage. Runs already in
    /// flight finish against the dropped definitions.
    pub fn delete_job(&self, job: &str) -> Result<usize> {
        let mut registries = self.write();
        let doomed: Vec<String> = registries
            .keys()
            .filter(|k| rebase_job(k, job, job).is_some())
            .cloned()
            .collect();
        for key in &doomed {
            if let Some(registry) = registries.remove(key) {
                registry.clear_queues();
            }
        }

        let dir = layout::job_dir(&self.root, job);
        if self.fs.is_dir(&dir) {
            self.fs.remove_dir_all(&dir)?;
        }
        info!(job = %job, registries = doomed.len(), "job deleted");
        Ok(doomed.len())
    }

    /// Nothing running or queued in any subscribed job.
    pub fn all_idle(&self) -> bool {
        self.read().values().all(|r| r.is_idle())
    }

    fn discover_jobs(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) {
        let jobs_dir = dir.join("jobs");
        if !self.fs.is_dir(&jobs_dir) {
            return;
        }
        let entries = match self.fs.read_dir(&jobs_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = ?jobs_dir, error = %e, "failed to list jobs");
                return;
            }
        };

        for entry in entries {
            let Some(segment) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !self.fs.is_dir(&entry) {
                continue;
            }
            let job = if prefix.is_empty() {
                segment.to_string()
            } else {
                format!("{prefix}/{segment}")
            };
            if self.fs.is_dir(&entry.join("promotions")) {
                out.push(job.clone());
            }
            self.discover_jobs(&entry, &job, out);
        }
    }
}
