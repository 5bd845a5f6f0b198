// src/process/mod.rs

//! Promotion process definitions.
//!
//! A [`ProcessDefinition`] is the live form of one persisted
//! [`ProcessConfig`]: its configuration, whether it is archived, its queue of
//! builds waiting to be promoted and its run records.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use tracing::{debug, info};

use crate::config::{ProcessConfig, config_digest, parse_process_config, to_toml};
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::layout;
use crate::promotion::store::RunStore;

pub mod qualify;
pub mod queue;

pub use qualify::{Qualification, consider_promotion, force_promotion};
pub use queue::{Enqueued, PromotionQueue, QueuedPromotion};

#[derive(Debug)]
struct DefinitionState {
    owner: String,
    config: ProcessConfig,
    /// Digest of the canonical serialized config.
    digest: String,
    /// Digest of the file text last read or written.
    source_digest: String,
}

#[derive(Debug)]
pub struct ProcessDefinition {
    fs: Arc<dyn FileSystem>,
    state: RwLock<DefinitionState>,
    disabled: AtomicBool,
    queue: PromotionQueue,
    runs: RunStore,
}

impl ProcessDefinition {
    /// Create a definition and write its config to `dir`.
    pub fn create(fs: Arc<dyn FileSystem>, dir: PathBuf, owner: &str, config: ProcessConfig) -> Result<Self> {
        let text = to_toml(&config)?;
        fs.write(&layout::process_config_file(&dir), text.as_bytes())?;
        let digest = config_digest(&text);
        debug!(job = %owner, process = %config.name, "created promotion process");
        Ok(Self::from_parts(fs, dir, owner, config, digest.clone(), digest))
    }

    /// Load a definition previously written to `dir`.
    pub fn load(fs: Arc<dyn FileSystem>, dir: PathBuf, owner: &str) -> Result<Self> {
        let path = layout::process_config_file(&dir);
        let text = fs.read_to_string(&path)?;
        let (config, digest) = parse_process_config(&text)?;
        Ok(Self::from_parts(
            fs,
            dir,
            owner,
            config,
            digest,
            config_digest(&text),
        ))
    }

    fn from_parts(
        fs: Arc<dyn FileSystem>,
        dir: PathBuf,
        owner: &str,
        config: ProcessConfig,
        digest: String,
        source_digest: String,
    ) -> Self {
        Self {
            runs: RunStore::new(Arc::clone(&fs), dir),
            fs,
            state: RwLock::new(DefinitionState {
                owner: owner.to_string(),
                config,
                digest,
                source_digest,
            }),
            disabled: AtomicBool::new(false),
            queue: PromotionQueue::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, DefinitionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn name(&self) -> String {
        self.read().config.name.clone()
    }

    /// Full name of the job this process belongs to.
    pub fn owner(&self) -> String {
        self.read().owner.clone()
    }

    pub fn config(&self) -> ProcessConfig {
        self.read().config.clone()
    }

    pub fn digest(&self) -> String {
        self.read().digest.clone()
    }

    pub fn dir(&self) -> PathBuf {
        self.runs.dir()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    pub(crate) fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::SeqCst);
    }

    pub fn queue(&self) -> &PromotionQueue {
        &self.queue
    }

    pub fn runs(&self) -> &RunStore {
        &self.runs
    }

    /// Replace the whole configuration. The name is kept; renaming goes
    /// through the registry. Returns `false` if nothing changed, in which case
    /// nothing is written.
    pub fn replace_config(&self, mut config: ProcessConfig) -> Result<bool> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        config.name = state.config.name.clone();

        let text = to_toml(&config)?;
        let digest = config_digest(&text);
        if digest == state.digest {
            debug!(process = %config.name, "configuration unchanged");
            return Ok(false);
        }

        self.fs
            .write(&layout::process_config_file(&self.runs.dir()), text.as_bytes())?;
        info!(job = %state.owner, process = %config.name, "updated promotion process configuration");
        state.config = config;
        state.source_digest = digest.clone();
        state.digest = digest;
        Ok(true)
    }

    /// Re-read the config file. Unchanged text is not parsed again.
    /// Returns `true` if the definition changed.
    pub fn refresh(&self) -> Result<bool> {
        let path = layout::process_config_file(&self.runs.dir());
        let text = self.fs.read_to_string(&path)?;
        let source_digest = config_digest(&text);

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if source_digest == state.source_digest {
            return Ok(false);
        }
        let (config, digest) = parse_process_config(&text)?;
        let changed = digest != state.digest;
        state.config = config;
        state.digest = digest;
        state.source_digest = source_digest;
        Ok(changed)
    }

    /// Follow a rename of the process or its job. The caller has already
    /// moved the directory.
    pub(crate) fn relocate(&self, owner: &str, name: &str, dir: PathBuf) -> Result<()> {
        self.runs.relocate(dir);
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.owner = owner.to_string();
        if state.config.name != name {
            state.config.name = name.to_string();
            let text = to_toml(&state.config)?;
            self.fs
                .write(&layout::process_config_file(&self.runs.dir()), text.as_bytes())?;
            state.digest = config_digest(&text);
            state.source_digest = state.digest.clone();
        }
        Ok(())
    }
}
