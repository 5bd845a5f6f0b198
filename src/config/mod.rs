// src/config/mod.rs

//! Promotion process configuration.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Read/write definitions and documents (`loader.rs`).
//! - Validate names and submissions before anything is applied (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    config_digest, load_processes_document, parse_process_config,
    parse_processes_document, to_toml,
};
pub use model::{
    ActiveProcesses, ParameterDefinition, ProcessConfig, ProcessesDocument, StepConfig,
    DEFAULT_ICON,
};
pub use validate::{validate_name, validate_process, validate_submission};
