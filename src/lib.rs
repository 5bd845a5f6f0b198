// src/lib.rs

pub mod api;
pub mod badge;
pub mod cli;
pub mod condition;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod host;
pub mod layout;
pub mod ledger;
pub mod logging;
pub mod process;
pub mod promotion;
pub mod registry;
pub mod status;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::cli::{CliArgs, Command};
use crate::condition::{Condition, ConditionRegistry};
use crate::config::{ProcessesDocument, load_processes_document, to_toml};
use crate::dispatch::Dispatcher;
use crate::fs::{FileSystem, RealFileSystem};
use crate::ledger::LedgerStore;
use crate::process::ProcessDefinition;
use crate::registry::ProcessRegistry;
use crate::types::BuildRef;

/// High-level entry point used by `main.rs`.
///
/// Every command opens the job's registry from `args.root`, acts on it and
/// prints the result to stdout.
pub fn run(args: CliArgs) -> Result<()> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let dispatcher = Dispatcher::new(Arc::clone(&fs), &args.root);

    match args.command {
        Command::Processes { job, all } => {
            let registry = dispatcher.subscribe(&job)?;
            let defs = if all {
                registry.all_definitions()
            } else {
                registry.active_definitions()
            };
            print_processes(&registry, &defs);
        }
        Command::Add { job, name } => {
            let def = dispatcher.subscribe(&job)?.add_process(&name)?;
            println!("added {} to {job}", def.name());
        }
        Command::Archive { job, name } => {
            let def = dispatcher.subscribe(&job)?.archive(&name)?;
            println!("archived {} of {job}", def.name());
        }
        Command::Rename { job, old, new } => {
            dispatcher.subscribe(&job)?.rename(&old, &new)?;
            println!("renamed {old} to {new} in {job}");
        }
        Command::Show { job, name } => {
            let registry = dispatcher.subscribe(&job)?;
            let def = require_process(&registry, &name)?;
            print!("{}", to_toml(&def.config())?);
        }
        Command::Export { job } => {
            let registry = dispatcher.subscribe(&job)?;
            let doc = ProcessesDocument {
                processes: registry
                    .active_definitions()
                    .iter()
                    .map(|d| d.config())
                    .collect(),
            };
            print!("{}", to_toml(&doc)?);
        }
        Command::Apply { job, file } => {
            let doc = load_processes_document(fs.as_ref(), &file)
                .with_context(|| format!("applying {}", file.display()))?;
            let count = doc.processes.len();
            // Only built-in conditions are known outside a running engine.
            dispatcher
                .subscribe(&job)?
                .reconfigure(doc.processes, &ConditionRegistry::new())?;
            println!("{job}: {count} active process(es)");
        }
        Command::History { job, name } => {
            let registry = dispatcher.subscribe(&job)?;
            let def = require_process(&registry, &name)?;
            print_history(&def);
        }
        Command::Statuses { job, build } => {
            let ledgers = LedgerStore::new(Arc::clone(&fs), &args.root);
            let build = BuildRef::new(job, build);
            match ledgers.existing(&build) {
                Some(ledger) => print_statuses(&build, &ledger.statuses()),
                None => println!("{build}: no promotion records"),
            }
        }
        Command::Conditions => {
            for d in condition::descriptors() {
                println!("{:<20} {}", d.id, d.display_name);
            }
        }
    }

    debug!("command complete");
    Ok(())
}

fn require_process(registry: &ProcessRegistry, name: &str) -> Result<Arc<ProcessDefinition>> {
    registry
        .get(name)
        .ok_or_else(|| errors::PromotionError::ProcessNotFound(name.to_string()).into())
}

fn print_processes(registry: &ProcessRegistry, defs: &[Arc<ProcessDefinition>]) {
    println!("{} ({}):", registry.job(), defs.len());
    for def in defs {
        let config = def.config();
        let state = if def.is_disabled() { " [archived]" } else { "" };
        println!("  - {}{state}", def.name());
        for condition in &config.conditions {
            println!("      when: {}", condition.describe());
        }
        if !config.steps.is_empty() {
            let steps: Vec<&str> = config.steps.iter().map(|s| s.name.as_str()).collect();
            println!("      steps: {steps:?}");
        }
    }
}

fn print_history(def: &ProcessDefinition) {
    let runs = def.runs().history();
    println!("{} ({} run(s)):", def.name(), runs.len());
    for run in runs {
        let target = run
            .target
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        let result = run
            .result
            .map(|r| r.to_string())
            .unwrap_or_else(|| "INCOMPLETE".to_string());
        println!(
            "  #{:<4} {target:<24} {result:<9} {}",
            run.number,
            run.started_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

fn print_statuses(build: &BuildRef, statuses: &[status::Status]) {
    println!("{build}:");
    for status in statuses {
        let state = match status.successful_promotion {
            Some(n) => format!("promoted by run #{n}"),
            None => match status.last_attempt() {
                Some(n) => format!("last attempt #{n} failed or running"),
                None => "qualified, not yet run".to_string(),
            },
        };
        println!("  - {}: {state}", status.process);
        for badge in &status.badges {
            println!("      {}", badge.describe());
        }
    }
}
