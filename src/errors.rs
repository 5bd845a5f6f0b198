// src/errors.rs

//! Crate-wide error type and `Result` alias.
//!
//! Callers can tell "you may not do this" ([`PromotionError::Unauthorized`])
//! apart from "the build does not qualify" ([`PromotionError::NotQualified`]).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromotionError {
    #[error("Invalid process name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("A promotion process named '{0}' already exists")]
    DuplicateName(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("'{actor}' is not allowed to {action}")]
    Unauthorized { actor: String, action: String },

    #[error("Build {build} does not qualify for promotion process '{process}'")]
    NotQualified { build: String, process: String },

    #[error("Promotion process not found: {0}")]
    ProcessNotFound(String),

    #[error("Build not found: {0}")]
    BuildNotFound(String),

    #[error("No promotion registry for job: {0}")]
    JobNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PromotionError {
    pub fn invalid_name(name: &str, reason: impl Into<String>) -> Self {
        PromotionError::InvalidName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unauthorized(actor: &str, action: impl Into<String>) -> Self {
        PromotionError::Unauthorized {
            actor: actor.to_string(),
            action: action.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PromotionError>;
