// src/api.rs

//! Operations exposed to users and tooling: configuration, forced
//! promotions, approvals and read-only queries.
//!
//! Anything that schedules work goes through the engine's event channel, so
//! queue handling stays on the engine task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::condition::{ConditionConfig, ManualApproval};
use crate::config::{ProcessConfig, ProcessesDocument, parse_processes_document, to_toml, validate_submission};
use crate::engine::{EngineContext, EngineEvent};
use crate::errors::{Error, PromotionError, Result};
use crate::host::BuildInfo;
use crate::process::ProcessDefinition;
use crate::promotion::PromotionRun;
use crate::registry::ProcessRegistry;
use crate::status::Status;
use crate::types::{Actor, BuildRef, Parameters};

#[derive(Debug, Clone)]
pub struct PromotionService {
    ctx: EngineContext,
    events: mpsc::Sender<EngineEvent>,
}

impl PromotionService {
    pub fn new(ctx: EngineContext, events: mpsc::Sender<EngineEvent>) -> Self {
        Self { ctx, events }
    }

    fn registry(&self, job: &str) -> Result<Arc<ProcessRegistry>> {
        self.ctx.dispatcher.require(job)
    }

    fn process(&self, job: &str, name: &str) -> Result<Arc<ProcessDefinition>> {
        self.registry(job)?
            .get(name)
            .ok_or_else(|| PromotionError::ProcessNotFound(name.to_string()))
    }

    fn build(&self, job: &str, number: u64) -> Result<BuildInfo> {
        self.ctx
            .host
            .resolve_build(job, number)
            .ok_or_else(|| PromotionError::BuildNotFound(BuildRef::new(job, number).to_string()))
    }

    fn actor(&self) -> Actor {
        self.ctx.host.current_actor().unwrap_or_else(Actor::anonymous)
    }

    async fn send(&self, event: EngineEvent) -> Result<()> {
        self.events.send(event).await.map_err(Error::from)?;
        Ok(())
    }

    pub fn process_config(&self, job: &str, name: &str) -> Result<ProcessConfig> {
        Ok(self.process(job, name)?.config())
    }

    /// Active definitions of `job` as one TOML document.
    pub fn export_config(&self, job: &str) -> Result<String> {
        let doc = ProcessesDocument {
            processes: self
                .registry(job)?
                .active_definitions()
                .iter()
                .map(|d| d.config())
                .collect(),
        };
        to_toml(&doc)
    }

    /// Replace the active set of `job` with the processes in `document`.
    pub fn import_config(&self, job: &str, document: &str) -> Result<()> {
        let doc = parse_processes_document(document)?;
        self.ctx
            .dispatcher
            .subscribe(job)?
            .reconfigure(doc.processes, &self.ctx.extensions)
    }

    /// Replace one definition, checked together with the job's other
    /// active definitions.
    pub fn set_process_config(&self, job: &str, name: &str, mut config: ProcessConfig) -> Result<()> {
        let registry = self.registry(job)?;
        let def = registry
            .get(name)
            .ok_or_else(|| PromotionError::ProcessNotFound(name.to_string()))?;
        config.name = def.name();

        let mut submission: Vec<ProcessConfig> = registry
            .active_definitions()
            .iter()
            .filter(|d| !Arc::ptr_eq(d, &def))
            .map(|d| d.config())
            .collect();
        submission.push(config.clone());
        validate_submission(&submission, &self.ctx.extensions)?;

        def.replace_config(config)?;
        Ok(())
    }

    pub fn create_process(&self, job: &str, name: &str) -> Result<Arc<ProcessDefinition>> {
        self.ctx.dispatcher.subscribe(job)?.add_process(name)
    }

    /// Archive a process; its history is kept.
    pub fn delete_process(&self, job: &str, name: &str) -> Result<()> {
        self.registry(job)?.archive(name)?;
        Ok(())
    }

    pub fn rename_process(&self, job: &str, old: &str, new: &str) -> Result<()> {
        self.registry(job)?.rename(old, new)
    }

    /// Active processes first, then archived ones.
    pub fn processes(&self, job: &str, include_archived: bool) -> Result<Vec<Arc<ProcessDefinition>>> {
        let registry = self.registry(job)?;
        Ok(if include_archived {
            registry.all_definitions()
        } else {
            registry.active_definitions()
        })
    }

    /// Queue `build` for `process` regardless of its conditions.
    pub async fn force_promote(&self, job: &str, process: &str, number: u64, parameters: Parameters) -> Result<()> {
        let actor = self.actor();
        if !self.ctx.host.can_promote(&actor, job) {
            return Err(PromotionError::unauthorized(&actor.id, format!("promote builds of {job}")));
        }

        let def = self.process(job, process)?;
        if def.is_disabled() {
            return Err(PromotionError::ConfigError(format!(
                "process '{}' is archived",
                def.name()
            )));
        }
        let build = self.build(job, number)?;

        info!(job = %job, process = %def.name(), build = %build.reference, actor = %actor, "forced promotion requested");
        self.send(EngineEvent::PromotionRequested {
            job: job.to_string(),
            process: def.name(),
            build: build.reference,
            actor,
            parameters,
        })
        .await
    }

    /// Record the current actor's approval of `build` for `process`.
    pub async fn approve(&self, job: &str, process: &str, number: u64, parameters: Parameters) -> Result<()> {
        let actor = self.actor();
        let def = self.process(job, process)?;
        let config = def.config();

        let Some(manual) = config.conditions.iter().find_map(|c| match c {
            ConditionConfig::Manual(m) => Some(m),
            _ => None,
        }) else {
            return Err(PromotionError::NotQualified {
                build: BuildRef::new(job, number).to_string(),
                process: def.name(),
            });
        };

        if !manual.can_approve(self.ctx.host.as_ref(), &actor, job) {
            return Err(PromotionError::unauthorized(
                &actor.id,
                format!("approve promotion process '{}'", def.name()),
            ));
        }

        let build = self.build(job, number)?;
        let values = manual.resolve_parameters(&parameters);
        self.ctx
            .ledgers
            .ledger(&build.reference)
            .record_approval(ManualApproval::new(def.name(), actor.clone(), values));

        info!(job = %job, process = %def.name(), build = %build.reference, actor = %actor, "promotion approved");
        self.send(EngineEvent::ApprovalRecorded {
            build: build.reference,
        })
        .await
    }

    /// Statuses recorded on a build, empty if it has no ledger.
    pub fn statuses(&self, job: &str, number: u64) -> Vec<Status> {
        self.ctx
            .ledgers
            .existing(&BuildRef::new(job, number))
            .map(|l| l.statuses())
            .unwrap_or_default()
    }

    /// Active processes that have not qualified the build yet.
    pub fn pending_promotions(&self, job: &str, number: u64) -> Result<Vec<Arc<ProcessDefinition>>> {
        let registry = self.registry(job)?;
        Ok(self
            .ctx
            .ledgers
            .ledger(&BuildRef::new(job, number))
            .pending_promotions(&registry))
    }

    /// Run records of a process, newest first.
    pub fn history(&self, job: &str, process: &str) -> Result<Vec<PromotionRun>> {
        Ok(self.process(job, process)?.runs().history())
    }

    pub fn rename_job(&self, old: &str, new: &str) -> Result<()> {
        self.ctx.dispatcher.rename_job(old, new)?;
        self.ctx.ledgers.forget_job(old);
        Ok(())
    }

    /// Forget a job the host deleted, along with its promotion data.
    pub fn delete_job(&self, job: &str) -> Result<()> {
        let dropped = self.ctx.dispatcher.delete_job(job)?;
        self.ctx.ledgers.forget_job(job);
        info!(job = %job, registries = dropped, "promotion data of deleted job removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{ConditionRegistry, ManualCondition};
    use crate::dispatch::Dispatcher;
    use crate::fs::mock::MockFileSystem;
    use crate::ledger::LedgerStore;
    use crate::test_support::{StubHost, finished_build};
    use crate::types::BuildResult;

    fn service(host: Arc<StubHost>) -> (PromotionService, mpsc::Receiver<EngineEvent>) {
        let fs = Arc::new(MockFileSystem::new());
        let ctx = EngineContext {
            host,
            dispatcher: Arc::new(Dispatcher::new(fs.clone(), "/data")),
            ledgers: Arc::new(LedgerStore::new(fs, "/data")),
            extensions: Arc::new(ConditionRegistry::new()),
        };
        let (tx, rx) = mpsc::channel(8);
        (PromotionService::new(ctx, tx), rx)
    }

    fn manual(users: &[&str]) -> ProcessConfig {
        let mut cfg = ProcessConfig::new("prod");
        cfg.conditions.push(ConditionConfig::Manual(ManualCondition {
            users: users.iter().map(|u| u.to_string()).collect(),
            parameters: Vec::new(),
        }));
        cfg
    }

    #[tokio::test]
    async fn force_requires_the_promote_capability() {
        let host = Arc::new(StubHost::default());
        host.add_build(finished_build("app", 1, BuildResult::Success));
        host.set_actor(Some(Actor::new("mallory", "Mallory")));
        let (api, mut rx) = service(Arc::clone(&host));
        api.create_process("app", "qa").unwrap();

        let denied = api.force_promote("app", "qa", 1, Parameters::new()).await;
        assert!(matches!(denied, Err(PromotionError::Unauthorized { .. })));

        host.grant_promote("mallory");
        api.force_promote("app", "qa", 1, Parameters::new())
            .await
            .unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(EngineEvent::PromotionRequested { .. })
        ));

        let missing = api.force_promote("app", "qa", 99, Parameters::new()).await;
        assert!(matches!(missing, Err(PromotionError::BuildNotFound(_))));
    }

    #[tokio::test]
    async fn approval_checks_are_distinct() {
        let host = Arc::new(StubHost::default());
        host.add_build(finished_build("app", 1, BuildResult::Success));
        host.set_actor(Some(Actor::new("bob", "Bob")));
        let (api, mut rx) = service(Arc::clone(&host));
        api.import_config(
            "app",
            &to_toml(&ProcessesDocument {
                processes: vec![manual(&["alice"]), ProcessConfig::new("qa")],
            })
            .unwrap(),
        )
        .unwrap();

        assert!(matches!(
            api.approve("app", "qa", 1, Parameters::new()).await,
            Err(PromotionError::NotQualified { .. })
        ));
        assert!(matches!(
            api.approve("app", "prod", 1, Parameters::new()).await,
            Err(PromotionError::Unauthorized { .. })
        ));

        host.set_actor(Some(Actor::new("alice", "Alice")));
        api.approve("app", "prod", 1, Parameters::new())
            .await
            .unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(EngineEvent::ApprovalRecorded { .. })
        ));
    }

    #[test]
    fn config_round_trips_through_export() {
        let host = Arc::new(StubHost::default());
        let (api, _rx) = service(host);
        api.import_config(
            "app",
            r#"
[[process]]
name = "qa"

[[process.conditions]]
kind = "self-promotion"
"#,
        )
        .unwrap();

        let exported = api.export_config("app").unwrap();
        let doc = parse_processes_document(&exported).unwrap();
        assert_eq!(doc.processes.len(), 1);
        assert_eq!(api.process_config("app", "qa").unwrap(), doc.processes[0]);

        api.delete_process("app", "qa").unwrap();
        assert!(api.processes("app", false).unwrap().is_empty());
        assert_eq!(api.processes("app", true).unwrap().len(), 1);
    }

    #[test]
    fn unknown_extensions_are_rejected_on_import() {
        let host = Arc::new(StubHost::default());
        let (api, _rx) = service(host);
        api.create_process("app", "qa").unwrap();

        let result = api.import_config(
            "app",
            r#"
[[process]]
name = "gated"

[[process.conditions]]
kind = "extension"
id = "change-window"
"#,
        );
        assert!(matches!(result, Err(PromotionError::ConfigError(_))));
        let active: Vec<String> = api
            .processes("app", false)
            .unwrap()
            .iter()
            .map(|d| d.name())
            .collect();
        assert_eq!(active, vec!["qa"]);
    }

    #[test]
    fn deleted_jobs_lose_their_processes_and_ledgers() {
        let host = Arc::new(StubHost::default());
        let (api, _rx) = service(host);
        api.create_process("app", "qa").unwrap();
        let build = BuildRef::new("app", 1);
        api.ctx.ledgers.ledger(&build).add(Status::new("qa", Vec::new()));
        assert_eq!(api.statuses("app", 1).len(), 1);

        api.delete_job("app").unwrap();

        assert!(matches!(
            api.processes("app", true),
            Err(PromotionError::JobNotFound(_))
        ));
        assert!(api.statuses("app", 1).is_empty());
    }

    #[test]
    fn single_definition_updates_are_cycle_checked() {
        let host = Arc::new(StubHost::default());
        let (api, _rx) = service(host);
        api.import_config(
            "app",
            r#"
[[process]]
name = "qa"

[[process]]
name = "prod"

[[process.conditions]]
kind = "upstream-promotion"
required = ["qa"]
"#,
        )
        .unwrap();

        let mut qa = api.process_config("app", "qa").unwrap();
        qa.conditions.push(ConditionConfig::UpstreamPromotion(
            crate::condition::UpstreamPromotionCondition {
                required: vec!["prod".to_string()],
            },
        ));
        assert!(matches!(
            api.set_process_config("app", "qa", qa),
            Err(PromotionError::ConfigError(_))
        ));
    }
}
