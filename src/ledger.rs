// src/ledger.rs

//! Per-build promotion bookkeeping.
//!
//! Every build that any process has looked at gets a [`Ledger`], stored next
//! to the build as `builds/<n>/promotions.toml`. It holds at most one
//! [`Status`] per process plus the side records conditions read (manual
//! approvals and the builds this build triggered).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::condition::{ManualApproval, TriggerRecord};
use crate::config::to_toml;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::layout;
use crate::process::ProcessDefinition;
use crate::registry::ProcessRegistry;
use crate::status::Status;
use crate::types::{BuildRef, rebase_job};

/// Persisted form of a ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default, rename = "status")]
    pub statuses: Vec<Status>,
    #[serde(default, rename = "approval")]
    pub approvals: Vec<ManualApproval>,
    #[serde(default, rename = "trigger")]
    pub triggered: Vec<TriggerRecord>,
}

/// Promotion state attached to one build.
#[derive(Debug)]
pub struct Ledger {
    build: BuildRef,
    persistence: Option<(Arc<dyn FileSystem>, PathBuf)>,
    state: Mutex<LedgerSnapshot>,
}

impl Ledger {
    /// A ledger that is never written anywhere.
    pub fn in_memory(build: BuildRef) -> Self {
        Self {
            build,
            persistence: None,
            state: Mutex::new(LedgerSnapshot::default()),
        }
    }

    fn persisted(build: BuildRef, fs: Arc<dyn FileSystem>, path: PathBuf, state: LedgerSnapshot) -> Self {
        Self {
            build,
            persistence: Some((fs, path)),
            state: Mutex::new(state),
        }
    }

    pub fn build(&self) -> &BuildRef {
        &self.build
    }

    fn lock(&self) -> MutexGuard<'_, LedgerSnapshot> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add `status` unless the ledger already has one for the same process.
    ///
    /// Returns `false` if another status got there first.
    pub fn add(&self, status: Status) -> bool {
        let mut state = self.lock();
        if state.statuses.iter().any(|s| s.process == status.process) {
            return false;
        }
        debug!(build = %self.build, process = %status.process, "recording qualification");
        state.statuses.push(status);
        self.persist(&state);
        true
    }

    pub fn contains(&self, process: &str) -> bool {
        self.lock().statuses.iter().any(|s| s.process == process)
    }

    pub fn status(&self, process: &str) -> Option<Status> {
        self.lock()
            .statuses
            .iter()
            .find(|s| s.process == process)
            .cloned()
    }

    pub fn statuses(&self) -> Vec<Status> {
        self.lock().statuses.clone()
    }

    /// Whether `process` has successfully promoted this build.
    pub fn promoted_by(&self, process: &str) -> bool {
        self.lock()
            .statuses
            .iter()
            .any(|s| s.process == process && s.is_promotion_successful())
    }

    /// Active definitions of `registry` that have not qualified this build.
    pub fn pending_promotions(&self, registry: &ProcessRegistry) -> Vec<Arc<ProcessDefinition>> {
        let state = self.lock();
        registry
            .active_definitions()
            .into_iter()
            .filter(|p| !state.statuses.iter().any(|s| s.process == p.name()))
            .collect()
    }

    /// Latest recorded approval for `process`.
    pub fn approval(&self, process: &str) -> Option<ManualApproval> {
        self.lock()
            .approvals
            .iter()
            .rev()
            .find(|a| a.process == process)
            .cloned()
    }

    /// Record an approval, replacing any earlier one for the same process.
    pub fn record_approval(&self, approval: ManualApproval) {
        let mut state = self.lock();
        state.approvals.retain(|a| a.process != approval.process);
        state.approvals.push(approval);
        self.persist(&state);
    }

    /// Record a downstream build triggered by this build. A numbered record
    /// completes an earlier unnumbered one for the same project.
    pub fn record_trigger(&self, record: TriggerRecord) {
        let mut state = self.lock();
        let existing = state
            .triggered
            .iter_mut()
            .find(|t| t.project == record.project && (t.number == record.number || t.number.is_none()));
        match existing {
            Some(t) if t.number == record.number => return,
            Some(t) => t.number = record.number,
            None => state.triggered.push(record),
        }
        self.persist(&state);
    }

    pub fn triggered(&self) -> Vec<TriggerRecord> {
        self.lock().triggered.clone()
    }

    /// Note that run `run` of `process` targeted this build. Returns `false`
    /// if the process never qualified it.
    pub fn record_attempt(&self, process: &str, run: u64) -> bool {
        let mut state = self.lock();
        let Some(status) = state.statuses.iter_mut().find(|s| s.process == process) else {
            return false;
        };
        status.record_attempt(run);
        self.persist(&state);
        true
    }

    pub fn record_success(&self, process: &str, run: u64) -> bool {
        let mut state = self.lock();
        let Some(status) = state.statuses.iter_mut().find(|s| s.process == process) else {
            return false;
        };
        status.record_attempt(run);
        status.successful_promotion = Some(run);
        self.persist(&state);
        true
    }

    fn write(&self, state: &LedgerSnapshot) -> Result<()> {
        let Some((fs, path)) = &self.persistence else {
            return Ok(());
        };
        let text = to_toml(state)?;
        fs.write(path, text.as_bytes())?;
        Ok(())
    }

    // Mutations stay applied in memory even if the write fails.
    fn persist(&self, state: &LedgerSnapshot) {
        if let Err(e) = self.write(state) {
            warn!(build = %self.build, error = %e, "failed to persist promotion ledger");
        }
    }
}

/// Loads ledgers on demand and hands out one shared instance per build.
#[derive(Debug)]
pub struct LedgerStore {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    cache: Mutex<HashMap<BuildRef, Arc<Ledger>>>,
}

impl LedgerStore {
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<BuildRef, Arc<Ledger>>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The ledger of `build`, loading it or creating an empty one.
    pub fn ledger(&self, build: &BuildRef) -> Arc<Ledger> {
        if let Some(ledger) = self.cache().get(build) {
            return Arc::clone(ledger);
        }

        let path = layout::ledger_file(&self.root, &build.job, build.number);
        let state = self.load(build, &path);
        let loaded = Arc::new(Ledger::persisted(
            build.clone(),
            Arc::clone(&self.fs),
            path,
            state,
        ));

        // Another caller may have loaded it meanwhile; first one wins.
        Arc::clone(self.cache().entry(build.clone()).or_insert(loaded))
    }

    /// The ledger of `build` only if one exists in memory or on disk.
    pub fn existing(&self, build: &BuildRef) -> Option<Arc<Ledger>> {
        if let Some(ledger) = self.cache().get(build) {
            return Some(Arc::clone(ledger));
        }
        let path = layout::ledger_file(&self.root, &build.job, build.number);
        if self.fs.exists(&path) {
            Some(self.ledger(build))
        } else {
            None
        }
    }

    /// Drop cached ledgers of `job` and of any job nested inside it, e.g.
    /// after its directory moved.
    pub fn forget_job(&self, job: &str) {
        self.cache()
            .retain(|b, _| rebase_job(&b.job, job, job).is_none());
    }

    fn load(&self, build: &BuildRef, path: &Path) -> LedgerSnapshot {
        if !self.fs.exists(path) {
            return LedgerSnapshot::default();
        }

        let parsed = self
            .fs
            .read_to_string(path)
            .map_err(crate::errors::PromotionError::from)
            .and_then(|text| Ok(toml::from_str::<LedgerSnapshot>(&text)?));

        match parsed {
            Ok(state) => state,
            Err(e) => {
                let mut aside = path.as_os_str().to_owned();
                aside.push(".corrupt");
                let aside = PathBuf::from(aside);
                warn!(
                    build = %build,
                    path = ?path,
                    error = %e,
                    "unreadable promotion ledger moved aside; starting empty"
                );
                if let Err(e) = self.fs.rename(path, &aside) {
                    warn!(build = %build, error = %e, "failed to move unreadable ledger aside");
                }
                LedgerSnapshot::default()
            }
        }
    }
}
