// src/layout.rs

//! On-disk layout under the storage root.
//!
//! ```text
//! jobs/<job>/promotions/active.toml
//! jobs/<job>/promotions/<process>/config.toml
//! jobs/<job>/promotions/<process>/next_run_number
//! jobs/<job>/promotions/<process>/runs/<n>/run.toml
//! jobs/<job>/builds/<n>/promotions.toml
//! ```
//!
//! A job full name `folder/app` maps to `jobs/folder/jobs/app`.

use std::path::{Path, PathBuf};

/// Directory holding everything about one job.
pub fn job_dir(root: &Path, job: &str) -> PathBuf {
    let mut dir = root.to_path_buf();
    for segment in job.split('/').filter(|s| !s.is_empty()) {
        dir.push("jobs");
        dir.push(segment);
    }
    dir
}

pub fn promotions_dir(root: &Path, job: &str) -> PathBuf {
    job_dir(root, job).join("promotions")
}

pub fn active_file(root: &Path, job: &str) -> PathBuf {
    promotions_dir(root, job).join("active.toml")
}

pub fn process_dir(root: &Path, job: &str, process: &str) -> PathBuf {
    promotions_dir(root, job).join(process)
}

pub fn process_config_file(process_dir: &Path) -> PathBuf {
    process_dir.join("config.toml")
}

pub fn next_run_number_file(process_dir: &Path) -> PathBuf {
    process_dir.join("next_run_number")
}

pub fn runs_dir(process_dir: &Path) -> PathBuf {
    process_dir.join("runs")
}

pub fn run_file(process_dir: &Path, number: u64) -> PathBuf {
    runs_dir(process_dir).join(number.to_string()).join("run.toml")
}

pub fn ledger_file(root: &Path, job: &str, build: u64) -> PathBuf {
    job_dir(root, job)
        .join("builds")
        .join(build.to_string())
        .join("promotions.toml")
}
