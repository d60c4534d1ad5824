// crates/pipeline-engine/src/engine.rs
// ============================================================================
// Module: Engine API
// Description: The plain-Rust surface exposed to controllers — Run,
//              GetLogs, ListForPipeline, ApproveStage — composing the
//              Tenant Router, Execution Coordinator, Approval Bridge, and
//              Audit Recorder.
// Purpose: One entry point a controller (HTTP handler, CLI, test harness)
//          can hold without knowing the component wiring underneath.
// Dependencies: pipeline-core, pipeline-compiler, pipeline-config,
//               pipeline-dispatcher, pipeline-providers, uuid
// ============================================================================

//! ## Overview
//! [`Engine::run`] admits an execution (compiles the plan, resolves the
//! tenant route, persists the initial row) and then drives it on a detached
//! worker thread, returning the new `executionId` immediately — `GetLogs`
//! is expected to poll the persisted snapshot while the run is in flight
//! (`spec.md` §6). Approval resumption closes a cycle: the Execution
//! Coordinator hands the Approval Bridge an [`ApprovalSink`], and the
//! Approval Bridge hands back an [`ExecutionResumer`] that reconstructs a
//! fresh coordinator and calls [`ExecutionCoordinator::resume`] — built with
//! `Arc::new_cyclic` so neither side needs a forward declaration of the
//! other.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Weak;

use pipeline_compiler::compile_and_schedule;
use pipeline_compiler::PlanError;
use pipeline_config::PipelineConfig;
use pipeline_core::entities::BuildJob;
use pipeline_core::entities::Execution;
use pipeline_core::entities::ExecutionStatus;
use pipeline_core::entities::NodeResult;
use pipeline_core::entities::Pipeline;
use pipeline_core::entities::StageResult;
use pipeline_core::identifiers::AccountId;
use pipeline_core::identifiers::BuildJobId;
use pipeline_core::identifiers::ExecutionId;
use pipeline_core::identifiers::PipelineId;
use pipeline_core::identifiers::StageId;
use pipeline_core::interfaces::ItemRecord as _;
use pipeline_core::telemetry::EventSink;
use pipeline_core::ItemKey;
use pipeline_core::ItemStore;
use pipeline_core::KeyCondition;
use pipeline_core::StoreError;
use pipeline_dispatcher::HandlerRegistry;
use pipeline_dispatcher::Sleeper;
use pipeline_providers::HttpGateway;
use thiserror::Error;

use crate::approval::ApprovalBridge;
use crate::approval::ApprovalError;
use crate::approval::ApprovalOutcome;
use crate::approval::ExecutionResumer;
use crate::audit::AuditParams;
use crate::audit::AuditRecorder;
use crate::coordinator::CoordinatorError;
use crate::coordinator::ExecutionCoordinator;
use crate::credentials::CredentialResolver;
use crate::tenant_router::TenantError;
use crate::tenant_router::TenantRouter;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the [`Engine`] API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No pipeline with this id exists for this account.
    #[error("pipeline {0} not found")]
    PipelineNotFound(PipelineId),
    /// No build job with this id exists for this account.
    #[error("build job {0} not found")]
    BuildJobNotFound(BuildJobId),
    /// No execution with this id exists for this account.
    #[error("execution {0} not found")]
    ExecutionNotFound(ExecutionId),
    /// Tenant route resolution failed.
    #[error(transparent)]
    Tenant(#[from] TenantError),
    /// Plan compilation failed.
    #[error(transparent)]
    Plan(#[from] PlanError),
    /// The coordinator failed to admit or resume the execution.
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    /// An approval action failed.
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    /// The item store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Return Shapes
// ============================================================================

/// Result of [`Engine::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// The newly admitted execution's id.
    pub execution_id: ExecutionId,
}

/// Result of [`Engine::get_logs`] (`spec.md` §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSnapshot {
    /// Current execution-level status.
    pub status: ExecutionStatus,
    /// Per-node result rollups.
    pub node_results: Vec<NodeResult>,
    /// Per-stage results so far.
    pub stage_results: Vec<StageResult>,
    /// Totally ordered log lines.
    pub logs: Vec<String>,
    /// Stage awaiting approval, when `status == Paused`.
    pub suspended_stage: Option<StageId>,
}

/// One row of [`Engine::list_for_pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionListItem {
    /// Execution id.
    pub execution_id: ExecutionId,
    /// Current status.
    pub status: ExecutionStatus,
    /// Creation timestamp, RFC-3339.
    pub created_at: String,
    /// Last mutation timestamp, RFC-3339.
    pub updated_at: String,
}

// ============================================================================
// SECTION: Resumption Glue
// ============================================================================

/// Bridges [`ExecutionResumer`] (owned by the Approval Bridge) back to
/// [`Engine`], without either side needing to own the other directly.
struct EngineResumer {
    engine: Weak<Engine>,
}

impl ExecutionResumer for EngineResumer {
    fn resume(&self, execution_id: &ExecutionId, stage_id: &StageId, outcome: ApprovalOutcome) {
        let Some(engine) = self.engine.upgrade() else { return };
        let execution_id = execution_id.clone();
        let stage_id = stage_id.clone();
        // Fire-and-forget per `spec.md` §4.9: the approval action that
        // triggered this must never block on, or observe a failure from,
        // the resumed execution.
        std::thread::spawn(move || engine.resume_execution(&execution_id, &stage_id, outcome));
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// The composed Pipeline Execution Engine.
pub struct Engine {
    tenant_router: Arc<TenantRouter>,
    coordinator: Arc<ExecutionCoordinator>,
    approval_bridge: Arc<ApprovalBridge>,
    audit: Arc<AuditRecorder>,
    event_sink: Arc<dyn EventSink>,
}

impl Engine {
    /// Builds an `Engine` wired to the given collaborators.
    #[expect(clippy::too_many_arguments, reason = "mirrors the component list the engine composes; a bag-of-fields builder would only indirect it")]
    #[must_use]
    pub fn new(
        tenant_router: Arc<TenantRouter>,
        gateway: Arc<HttpGateway>,
        registry: Arc<HandlerRegistry>,
        sleeper: Arc<dyn Sleeper>,
        event_sink: Arc<dyn EventSink>,
        audit_store: Arc<dyn ItemStore>,
        config: &PipelineConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_engine| {
            let credential_resolver = Arc::new(CredentialResolver::new(Arc::clone(&tenant_router)));
            let resumer = Arc::new(EngineResumer { engine: weak_engine.clone() });
            let approval_bridge = Arc::new(ApprovalBridge::new(resumer, config.approval_email_enabled));
            let coordinator = Arc::new(ExecutionCoordinator::new(
                Arc::clone(&tenant_router),
                credential_resolver,
                gateway,
                registry,
                Arc::clone(&approval_bridge),
                sleeper,
                Arc::clone(&event_sink),
                config,
            ));
            Self { tenant_router, coordinator, approval_bridge, audit: Arc::new(AuditRecorder::new(audit_store)), event_sink }
        })
    }

    /// Exposes the Approval Bridge for controllers that need the standalone
    /// inbox API (`ListForUser`/`Approve`/`Reject`/`Dismiss`/`GetPendingCount`).
    #[must_use]
    pub fn approval_bridge(&self) -> &Arc<ApprovalBridge> {
        &self.approval_bridge
    }

    fn fetch_pipeline(&self, store: &Arc<dyn ItemStore>, account_id: &AccountId, pipeline_id: &PipelineId) -> Result<Pipeline, EngineError> {
        let key = ItemKey::new(format!("ACCOUNT#{account_id}"), format!("PIPELINE#{pipeline_id}"));
        let item = store.get(&key, true)?.ok_or_else(|| EngineError::PipelineNotFound(pipeline_id.clone()))?;
        parse_item(item).ok_or_else(|| EngineError::PipelineNotFound(pipeline_id.clone()))
    }

    fn fetch_build_job(&self, store: &Arc<dyn ItemStore>, account_id: &AccountId, is_private: bool, build_job_id: &BuildJobId) -> Result<BuildJob, EngineError> {
        let partition = if is_private { "BUILD_JOB#LIST".to_owned() } else { format!("ACCOUNT#{account_id}") };
        let key = ItemKey::new(partition, format!("BUILD_JOB#{build_job_id}"));
        let item = store.get(&key, true)?.ok_or_else(|| EngineError::BuildJobNotFound(build_job_id.clone()))?;
        parse_item(item).ok_or_else(|| EngineError::BuildJobNotFound(build_job_id.clone()))
    }

    fn fetch_execution(&self, store: &Arc<dyn ItemStore>, is_private: bool, account_id: &AccountId, execution_id: &ExecutionId) -> Result<Execution, EngineError> {
        let partition = if is_private { "BUILD_JOB#LIST".to_owned() } else { format!("ACCOUNT#{account_id}") };
        let key = ItemKey::new(partition, format!("EXECUTION#{execution_id}"));
        let item = store.get(&key, true)?.ok_or_else(|| EngineError::ExecutionNotFound(execution_id.clone()))?;
        parse_item(item).ok_or_else(|| EngineError::ExecutionNotFound(execution_id.clone()))
    }

    /// Admits and starts a new execution, returning its id immediately while
    /// the run continues on a detached worker thread.
    ///
    /// When `build_job_id` is omitted, a throwaway [`BuildJob`] is
    /// synthesized with every stage enabled, no tool overrides, and
    /// `approvers`/`branch` taken from the caller — the one-off "just run
    /// it" path a controller offers alongside the saved-build-job path.
    ///
    /// # Errors
    /// Returns [`EngineError`] if the pipeline or build job cannot be found,
    /// the tenant route cannot be resolved, or compilation fails.
    pub fn run(
        &self,
        account_id: &AccountId,
        pipeline_id: &PipelineId,
        build_job_id: Option<BuildJobId>,
        branch: Option<String>,
        approvers: Vec<String>,
    ) -> Result<RunOutcome, EngineError> {
        let route = self.tenant_router.resolve(account_id, self.event_sink.as_ref())?;
        let pipeline = self.fetch_pipeline(&route.store, account_id, pipeline_id)?;

        let build_job = match build_job_id {
            Some(id) => self.fetch_build_job(&route.store, account_id, route.is_private, &id)?,
            None => {
                let synthesized = BuildJob {
                    account_id: account_id.clone(),
                    build_job_id: BuildJobId::new(uuid::Uuid::new_v4().to_string()),
                    pipeline_id: pipeline_id.clone(),
                    is_private: route.is_private,
                    pipeline_stages_state: Vec::new(),
                    selected_artifacts: Vec::new(),
                    branch,
                    approvers,
                };
                // Persisted (not just held in memory) so a later resumption
                // can refetch it by id to recompile the plan — `resume`
                // never carries the in-flight `BuildJob` across the
                // suspend/resume boundary, only the execution id.
                route.store.put(synthesized.to_item()?)?;
                synthesized
            }
        };

        let (execution, plan) = self.coordinator.admit(account_id, &pipeline, &build_job)?;
        let execution_id = execution.execution_id.clone();
        self.audit.record(AuditParams {
            entity: "execution".to_owned(),
            account_id: Some(account_id.clone()),
            status: "admitted".to_owned(),
            detail: None,
        });

        let coordinator = Arc::clone(&self.coordinator);
        let account_id = account_id.clone();
        let store = Arc::clone(&route.store);
        let audit = Arc::clone(&self.audit);
        std::thread::spawn(move || {
            if coordinator.run(&account_id, execution, &plan, &store, None).is_err() {
                audit.record(AuditParams { entity: "execution".to_owned(), account_id: Some(account_id), status: "run_error".to_owned(), detail: None });
            }
        });

        Ok(RunOutcome { execution_id })
    }

    /// Returns the current persisted snapshot of `execution_id`
    /// (`spec.md` §6: always the current snapshot, including partial logs
    /// from in-flight stages).
    ///
    /// # Errors
    /// Returns [`EngineError::ExecutionNotFound`] if no such execution
    /// exists for `account_id`.
    pub fn get_logs(&self, account_id: &AccountId, execution_id: &ExecutionId) -> Result<ExecutionSnapshot, EngineError> {
        let route = self.tenant_router.resolve(account_id, self.event_sink.as_ref())?;
        let execution = self.fetch_execution(&route.store, route.is_private, account_id, execution_id)?;
        Ok(ExecutionSnapshot {
            status: execution.status,
            node_results: execution.node_results,
            stage_results: execution.stage_results,
            logs: execution.logs,
            suspended_stage: execution.paused.map(|marker| marker.stage_id),
        })
    }

    /// Lists every execution of `pipeline_id` under `account_id`
    /// (`spec.md` §6 scopes this by account partition per the REDESIGN
    /// FLAGS note on unscoped GSI1 sibling-stale scans — the same
    /// tenant-isolation concern applies to any cross-execution scan).
    ///
    /// # Errors
    /// Returns [`EngineError`] if the tenant route cannot be resolved or the
    /// scan fails.
    pub fn list_for_pipeline(&self, account_id: &AccountId, pipeline_id: &PipelineId) -> Result<Vec<ExecutionListItem>, EngineError> {
        let route = self.tenant_router.resolve(account_id, self.event_sink.as_ref())?;
        let partition = if route.is_private { "BUILD_JOB#LIST".to_owned() } else { format!("ACCOUNT#{account_id}") };
        let items = route.store.query(&KeyCondition { partition, sk_prefix: "EXECUTION#".to_owned() })?;
        let mut executions: Vec<ExecutionListItem> = items
            .into_iter()
            .filter_map(parse_item::<Execution>)
            .filter(|execution| execution.pipeline_id == *pipeline_id)
            .map(|execution| ExecutionListItem {
                execution_id: execution.execution_id,
                status: execution.status,
                created_at: execution.created_at.as_str().to_owned(),
                updated_at: execution.updated_at.as_str().to_owned(),
            })
            .collect();
        executions.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(executions)
    }

    /// Approves, on behalf of `actor_id`, whichever pending inbox item
    /// matches `(execution_id, stage_id)` — the coarser, per-stage surface
    /// `spec.md` §6 exposes alongside the Approval Bridge's per-recipient
    /// `Approve(accountId, inboxId, actor)`. Idempotent: a second call after
    /// the stage has already been actioned returns `NoPendingApproval`.
    ///
    /// # Errors
    /// Returns [`EngineError`] if the tenant route cannot be resolved, no
    /// pending item matches, or the underlying store write fails.
    pub fn approve_stage(&self, account_id: &AccountId, execution_id: &ExecutionId, stage_id: &StageId, actor_id: &str) -> Result<(), EngineError> {
        let route = self.tenant_router.resolve(account_id, self.event_sink.as_ref())?;
        self.approval_bridge.approve_by_stage(&route.store, account_id, route.is_private, execution_id, stage_id, actor_id)?;
        Ok(())
    }

    fn resume_execution(&self, execution_id: &ExecutionId, _stage_id: &StageId, outcome: ApprovalOutcome) {
        let Some((account_id, store, is_private)) = self.approval_bridge.execution_route(execution_id) else { return };
        let Ok(execution) = self.fetch_execution(&store, is_private, &account_id, execution_id) else { return };
        if !matches!(execution.status, ExecutionStatus::Paused) {
            return;
        }
        let Ok(pipeline) = self.fetch_pipeline(&store, &account_id, &execution.pipeline_id) else { return };
        let Ok(build_job) = self.fetch_build_job(&store, &account_id, is_private, &execution.build_job_id) else { return };
        let Ok(plan) = compile_and_schedule(&pipeline, &build_job) else { return };

        if self.coordinator.resume(&account_id, execution, &plan, &store, outcome, None).is_err() {
            self.audit.record(AuditParams {
                entity: "execution".to_owned(),
                account_id: Some(account_id),
                status: "resume_error".to_owned(),
                detail: None,
            });
            return;
        }
        self.audit.record(AuditParams { entity: "execution".to_owned(), account_id: Some(account_id), status: "resumed".to_owned(), detail: None });
    }
}

fn parse_item<T: serde::de::DeserializeOwned>(item: pipeline_core::Item) -> Option<T> {
    let value = serde_json::Value::Object(item.attributes.into_iter().collect());
    serde_json::from_value(value).ok()
}
