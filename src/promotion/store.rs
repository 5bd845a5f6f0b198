// src/promotion/store.rs

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use tracing::warn;

use crate::config::to_toml;
use crate::errors::{PromotionError, Result};
use crate::fs::FileSystem;
use crate::layout;
use crate::promotion::record::PromotionRun;

/// Run records and run numbering of one process, stored under the
/// process's directory.
#[derive(Debug)]
pub struct RunStore {
    fs: Arc<dyn FileSystem>,
    dir: RwLock<PathBuf>,
    numbering: Mutex<()>,
}

impl RunStore {
    pub fn new(fs: Arc<dyn FileSystem>, dir: PathBuf) -> Self {
        Self {
            fs,
            dir: RwLock::new(dir),
            numbering: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.dir.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Point at a new directory after the process or its job was renamed.
    pub fn relocate(&self, dir: PathBuf) {
        *self.dir.write().unwrap_or_else(|e| e.into_inner()) = dir;
    }

    /// Hand out the next run number and persist the counter.
    pub fn allocate_number(&self) -> Result<u64> {
        let _guard = self.numbering.lock().unwrap_or_else(|e| e.into_inner());
        let dir = self.dir();
        let counter = layout::next_run_number_file(&dir);

        let next = if self.fs.exists(&counter) {
            let text = self.fs.read_to_string(&counter)?;
            text.trim().parse::<u64>().map_err(|e| {
                PromotionError::ConfigError(format!("corrupt run counter {counter:?}: {e}"))
            })?
        } else {
            // Start after any runs already on disk.
            self.numbers_on_disk(&dir).last().map_or(1, |n| n + 1)
        };

        self.fs
            .write(&counter, (next + 1).to_string().as_bytes())?;
        Ok(next)
    }

    pub fn save(&self, run: &PromotionRun) -> Result<()> {
        let path = layout::run_file(&self.dir(), run.number);
        let text = to_toml(run)?;
        self.fs.write(&path, text.as_bytes())?;
        Ok(())
    }

    pub fn load(&self, number: u64) -> Result<PromotionRun> {
        let path = layout::run_file(&self.dir(), number);
        let text = self.fs.read_to_string(&path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Every readable run record, newest first. Unreadable records are
    /// logged and skipped.
    pub fn history(&self) -> Vec<PromotionRun> {
        let dir = self.dir();
        let mut runs: Vec<PromotionRun> = self
            .numbers_on_disk(&dir)
            .into_iter()
            .filter_map(|n| match self.load(n) {
                Ok(run) => Some(run),
                Err(e) => {
                    warn!(run = n, dir = ?dir, error = %e, "skipping unreadable run record");
                    None
                }
            })
            .collect();
        runs.reverse();
        runs
    }

    fn numbers_on_disk(&self, dir: &Path) -> Vec<u64> {
        let runs = layout::runs_dir(dir);
        if !self.fs.is_dir(&runs) {
            return Vec::new();
        }
        let mut numbers: Vec<u64> = match self.fs.read_dir(&runs) {
            Ok(entries) => entries
                .iter()
                .filter_map(|p| p.file_name()?.to_str()?.parse().ok())
                .collect(),
            Err(e) => {
                warn!(dir = ?runs, error = %e, "failed to list run records");
                Vec::new()
            }
        };
        numbers.sort_unstable();
        numbers
    }
}
