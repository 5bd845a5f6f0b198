// src/config/loader.rs

use std::path::Path;

use serde::Serialize;

use crate::config::model::{ProcessConfig, ProcessesDocument};
use crate::errors::Result;
use crate::fs::FileSystem;

/// Parse one persisted definition from its TOML text.
///
/// Returns the parsed config plus the digest of its canonical TOML form, so
/// callers can tell later whether anything actually changed.
pub fn parse_process_config(contents: &str) -> Result<(ProcessConfig, String)> {
    let config: ProcessConfig = toml::from_str(contents)?;
    let digest = config_digest(&to_toml(&config)?);
    Ok((config, digest))
}

/// Parse a job-wide submission (`[[process]]` tables).
///
/// This only performs TOML deserialization; semantic checks happen in
/// [`crate::config::validate_submission`] when the document is applied.
pub fn parse_processes_document(contents: &str) -> Result<ProcessesDocument> {
    let doc: ProcessesDocument = toml::from_str(contents)?;
    Ok(doc)
}

/// Load a job-wide submission from disk (used by the CLI `apply` command).
pub fn load_processes_document(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<ProcessesDocument> {
    let contents = fs.read_to_string(path.as_ref())?;
    parse_processes_document(&contents)
}

/// Serialize any persisted record to pretty TOML.
pub fn to_toml<T: Serialize>(value: &T) -> Result<String> {
    Ok(toml::to_string_pretty(value)?)
}

/// Content digest of a serialized record.
pub fn config_digest(serialized: &str) -> String {
    blake3::hash(serialized.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionConfig;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn loads_definition_with_conditions_and_steps() {
        let fs = MockFileSystem::new();
        fs.add_file(
            "jobs/app/promotions/qa/config.toml",
            r#"
name = "qa"

[[conditions]]
kind = "self-promotion"
even_if_unstable = true

[[conditions]]
kind = "manual"
users = ["alice"]

[[conditions.parameters]]
name = "TARGET"
default = "staging"

[[steps]]
name = "deploy"
args = { env = "qa" }
"#,
        );

        let text = fs
            .read_to_string(Path::new("jobs/app/promotions/qa/config.toml"))
            .unwrap();
        let (cfg, digest) = parse_process_config(&text).unwrap();

        assert_eq!(cfg.name, "qa");
        assert_eq!(cfg.icon, crate::config::DEFAULT_ICON);
        assert_eq!(cfg.conditions.len(), 2);
        assert!(matches!(cfg.conditions[1], ConditionConfig::Manual(_)));
        assert_eq!(cfg.steps[0].args.get("env").map(String::as_str), Some("qa"));
        assert_eq!(
            cfg.default_parameters().get("TARGET").map(String::as_str),
            Some("staging")
        );
        assert_eq!(digest, config_digest(&to_toml(&cfg).unwrap()));
    }

    #[test]
    fn unknown_condition_kind_is_a_parse_error() {
        let result = parse_processes_document(
            r#"
[[process]]
name = "qa"

[[process.conditions]]
kind = "phase-of-the-moon"
"#,
        );
        assert!(matches!(result, Err(crate::errors::PromotionError::TomlError(_))));
    }

    #[test]
    fn serialized_definition_parses_back() {
        let doc = parse_processes_document(
            r#"
[[process]]
name = "release"

[[process.conditions]]
kind = "upstream-promotion"
required = ["qa"]
"#,
        )
        .unwrap();

        let text = to_toml(&doc.processes[0]).unwrap();
        let back: ProcessConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, doc.processes[0]);
    }
}
