// crates/pipeline-engine/src/coordinator.rs
// ============================================================================
// Module: Execution Coordinator (C8)
// Description: Tier fan-out, per-node serial stage execution, suspension and
//              resumption around an approval gate, cancellation, terminality.
// Purpose: The only component that actually runs a compiled pipeline plan.
// Dependencies: pipeline-core, pipeline-compiler, pipeline-dispatcher,
//               pipeline-providers, pipeline-config, uuid
// ============================================================================

//! ## Overview
//! One tier is a batch of independent nodes; [`ExecutionCoordinator::run`]
//! fans a tier out across `PipelineConfig::effective_max_workers()` OS
//! threads at a time via [`std::thread::scope`], joins the batch, then
//! decides whether to advance, fail fast, or suspend. Within one node,
//! stages run serially — never in parallel — per `spec.md` §4.6.
//!
//! Suspension never parks a thread. `spec.md` §9's redesign of "approval
//! callbacks as coroutines" is implemented literally: [`ExecutionCoordinator::run`]
//! returns as soon as a tier suspends, and [`ExecutionCoordinator::resume`]
//! is called later — potentially from a freshly constructed coordinator,
//! possibly in a different process — against the persisted [`Execution`].
//! The execution's cross-stage [`pipeline_dispatcher::SharedContext`] (the
//! GitHub→SAP handoff) is snapshotted into [`Execution::context`] on every
//! persist so a resumed run does not lose it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::sync::Mutex;

use pipeline_compiler::compile_and_schedule;
use pipeline_compiler::PlanError;
use pipeline_config::PipelineConfig;
use pipeline_core::entities::BuildJob;
use pipeline_core::entities::Execution;
use pipeline_core::entities::ExecutionStatus;
use pipeline_core::entities::NodeResult;
use pipeline_core::entities::PausedMarker;
use pipeline_core::entities::Pipeline;
use pipeline_core::entities::StageResult;
use pipeline_core::entities::StageStatus;
use pipeline_core::identifiers::AccountId;
use pipeline_core::identifiers::ExecutionId;
use pipeline_core::identifiers::ResumeToken;
use pipeline_core::identifiers::StageId;
use pipeline_core::interfaces::ItemRecord as _;
use pipeline_core::plan::CompiledPlan;
use pipeline_core::plan::StageType;
use pipeline_core::telemetry::EngineEvent;
use pipeline_core::telemetry::EventSink;
use pipeline_core::time::Timestamp;
use pipeline_core::CircuitBreaker;
use pipeline_core::CircuitBreakerConfig;
use pipeline_core::ItemStore;
use pipeline_core::StoreError;
use pipeline_dispatcher::dispatch;
use pipeline_dispatcher::DispatchContext;
use pipeline_dispatcher::HandlerRegistry;
use pipeline_dispatcher::RetryPolicy;
use pipeline_dispatcher::Sleeper;
use pipeline_providers::HttpGateway;
use thiserror::Error;

use crate::approval::ApprovalBridge;
use crate::approval::ApprovalOutcome;
use crate::credentials::CredentialError;
use crate::credentials::CredentialResolver;
use crate::tenant_router::TenantError;
use crate::tenant_router::TenantRouter;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while admitting or running an execution.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Compiling or scheduling the pipeline failed.
    #[error(transparent)]
    Plan(#[from] PlanError),
    /// The tenant route for this account could not be resolved.
    #[error(transparent)]
    Tenant(#[from] TenantError),
    /// The item store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// `resume` was called on an execution that is not currently `Paused`,
    /// or whose paused stage no longer exists in the compiled plan.
    #[error("execution {0} is not awaiting resumption")]
    NotPaused(ExecutionId),
}

// ============================================================================
// SECTION: Per-Connector Breakers
// ============================================================================

/// One [`CircuitBreaker`] per outbound connector, per `spec.md` §4.3/§4.7:
/// Plan stages call JIRA, Code stages call GitHub, Deploy stages call SAP.
pub struct Breakers {
    jira: CircuitBreaker,
    github: CircuitBreaker,
    sap: CircuitBreaker,
}

impl Breakers {
    /// Builds one breaker per connector from `config`'s thresholds.
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        let build = |name: &str| {
            CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: config.circuit_failure_threshold,
                reset_timeout: std::time::Duration::from_millis(config.circuit_reset_ms),
                half_open_success_threshold: config.circuit_half_open_successes,
                name: name.to_owned(),
            })
        };
        Self { jira: build("jira"), github: build("github"), sap: build("sap") }
    }

    fn for_stage_type(&self, stage_type: StageType) -> Option<&CircuitBreaker> {
        match stage_type {
            StageType::Plan => Some(&self.jira),
            StageType::Code => Some(&self.github),
            StageType::Deploy => Some(&self.sap),
            StageType::Build | StageType::Test | StageType::Approval | StageType::Release | StageType::Generic => None,
        }
    }
}

// ============================================================================
// SECTION: Per-Node Outcome
// ============================================================================

struct TierNodeOutcome {
    node_index: usize,
    stage_results: Vec<StageResult>,
    logs: Vec<String>,
    suspended: Option<StageId>,
    failed: bool,
}

impl TierNodeOutcome {
    fn panicked(node_index: usize) -> Self {
        Self {
            node_index,
            stage_results: Vec::new(),
            logs: vec![format!("[NODE:{node_index}] worker thread panicked")],
            suspended: None,
            failed: true,
        }
    }
}

// ============================================================================
// SECTION: Coordinator
// ============================================================================

/// Runs compiled pipeline plans: tier fan-out, suspension, resumption.
pub struct ExecutionCoordinator {
    tenant_router: Arc<TenantRouter>,
    credential_resolver: Arc<CredentialResolver>,
    gateway: Arc<HttpGateway>,
    registry: Arc<HandlerRegistry>,
    breakers: Arc<Breakers>,
    approval_bridge: Arc<ApprovalBridge>,
    sleeper: Arc<dyn Sleeper>,
    event_sink: Arc<dyn EventSink>,
    retry_policy: RetryPolicy,
    max_workers: usize,
}

impl ExecutionCoordinator {
    /// Builds a coordinator wired to the given collaborators.
    #[expect(clippy::too_many_arguments, reason = "mirrors the component list C8 is defined against; a bag-of-fields builder would only indirect it")]
    #[must_use]
    pub fn new(
        tenant_router: Arc<TenantRouter>,
        credential_resolver: Arc<CredentialResolver>,
        gateway: Arc<HttpGateway>,
        registry: Arc<HandlerRegistry>,
        approval_bridge: Arc<ApprovalBridge>,
        sleeper: Arc<dyn Sleeper>,
        event_sink: Arc<dyn EventSink>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            tenant_router,
            credential_resolver,
            gateway,
            registry,
            breakers: Arc::new(Breakers::new(config)),
            approval_bridge,
            sleeper,
            event_sink,
            retry_policy: RetryPolicy { max_retries: config.stage_max_retries, ..RetryPolicy::default() },
            max_workers: config.effective_max_workers().max(1),
        }
    }

    /// Compiles `pipeline`/`build_job`, resolves the tenant route, persists
    /// the initial `RUNNING` [`Execution`] row, and registers the execution
    /// with the Approval Bridge so later `create_requests` calls know where
    /// to write.
    ///
    /// # Errors
    /// Returns [`CoordinatorError`] if compilation, tenant resolution, or
    /// the initial persist fails.
    pub fn admit(&self, account_id: &AccountId, pipeline: &Pipeline, build_job: &BuildJob) -> Result<(Execution, CompiledPlan), CoordinatorError> {
        let plan = compile_and_schedule(pipeline, build_job)?;
        let route = self.tenant_router.resolve(account_id, self.event_sink.as_ref())?;
        let now = Timestamp::now();
        let execution = Execution {
            account_id: account_id.clone(),
            is_private: route.is_private,
            execution_id: ExecutionId::new(uuid::Uuid::new_v4().to_string()),
            pipeline_id: pipeline.pipeline_id.clone(),
            build_job_id: build_job.build_job_id.clone(),
            status: ExecutionStatus::Running,
            node_results: Vec::new(),
            stage_results: Vec::new(),
            logs: Vec::new(),
            context: BTreeMap::new(),
            paused: None,
            created_at: now.clone(),
            updated_at: now,
        };
        route.store.put(execution.to_item()?)?;
        self.approval_bridge.register_execution(execution.execution_id.clone(), account_id.clone(), Arc::clone(&route.store), route.is_private);
        Ok((execution, plan))
    }

    /// Runs `execution` (freshly admitted, `status == Running`) to
    /// completion, suspension, cancellation, or failure, persisting to
    /// `store` after every tier.
    ///
    /// # Errors
    /// Returns [`CoordinatorError`] if a persist fails.
    pub fn run(&self, account_id: &AccountId, mut execution: Execution, plan: &CompiledPlan, store: &Arc<dyn ItemStore>, cancel: Option<&Receiver<()>>) -> Result<Execution, CoordinatorError> {
        if plan.total_stage_count() == 0 {
            execution.status = ExecutionStatus::Completed;
            execution.updated_at = Timestamp::now();
            store.put(execution.to_item()?)?;
            return Ok(execution);
        }
        self.run_tiers(&mut execution, plan, account_id, store, cancel, &plan.tiers)?;
        Ok(execution)
    }

    /// Resumes a `Paused` execution with the given approval `outcome`,
    /// persisted the same way `run` does.
    ///
    /// # Errors
    /// Returns [`CoordinatorError::NotPaused`] if `execution` carries no
    /// [`PausedMarker`] or its stage no longer exists in `plan`, or
    /// [`CoordinatorError::Store`] if a persist fails.
    pub fn resume(
        &self,
        account_id: &AccountId,
        mut execution: Execution,
        plan: &CompiledPlan,
        store: &Arc<dyn ItemStore>,
        outcome: ApprovalOutcome,
        cancel: Option<&Receiver<()>>,
    ) -> Result<Execution, CoordinatorError> {
        let PausedMarker { stage_id, .. } = execution.paused.take().ok_or_else(|| CoordinatorError::NotPaused(execution.execution_id.clone()))?;
        let (node_index, stage_index) =
            locate_stage(plan, &stage_id).ok_or_else(|| CoordinatorError::NotPaused(execution.execution_id.clone()))?;

        self.event_sink.record(EngineEvent::ExecutionResumed {
            execution_id: execution.execution_id.to_string(),
            stage_outcome: outcome_label(outcome).to_owned(),
        });

        if let Some(result) = execution.stage_results.iter_mut().rev().find(|result| result.stage_id == stage_id) {
            result.status = match outcome {
                ApprovalOutcome::Approved => StageStatus::Success,
                ApprovalOutcome::Rejected => StageStatus::Failed,
            };
            result.message = Some(outcome_label(outcome).to_owned());
        }

        if matches!(outcome, ApprovalOutcome::Rejected) {
            execution.status = ExecutionStatus::Failed;
            execution.updated_at = Timestamp::now();
            store.put(execution.to_item()?)?;
            return Ok(execution);
        }

        let shared_context = Arc::new(Mutex::new(execution.context.clone()));
        let node_outcome = self.run_node(plan, node_index, account_id, &execution.execution_id, &shared_context, stage_index.saturating_add(1));
        self.merge_continuation(&mut execution, &shared_context, node_outcome);

        if execution.status.is_terminal() || matches!(execution.status, ExecutionStatus::Paused) {
            store.put(execution.to_item()?)?;
            return Ok(execution);
        }

        let resumed_tier = tier_index_of(plan, node_index);
        let remaining = plan.tiers.get(resumed_tier.saturating_add(1)..).unwrap_or_default();
        self.run_tiers(&mut execution, plan, account_id, store, cancel, remaining)?;
        Ok(execution)
    }

    fn run_tiers(
        &self,
        execution: &mut Execution,
        plan: &CompiledPlan,
        account_id: &AccountId,
        store: &Arc<dyn ItemStore>,
        cancel: Option<&Receiver<()>>,
        tiers: &[Vec<usize>],
    ) -> Result<(), CoordinatorError> {
        let shared_context = Arc::new(Mutex::new(execution.context.clone()));
        for tier in tiers {
            if cancel.is_some_and(|receiver| receiver.try_recv().is_ok()) {
                execution.status = ExecutionStatus::Cancelled;
                execution.updated_at = Timestamp::now();
                store.put(execution.to_item()?)?;
                return Ok(());
            }
            let outcomes = self.run_tier(plan, tier, account_id, &execution.execution_id, &shared_context);
            self.apply_tier_outcomes(execution, plan, &shared_context, outcomes);
            if execution.status.is_terminal() || matches!(execution.status, ExecutionStatus::Paused) {
                store.put(execution.to_item()?)?;
                return Ok(());
            }
        }
        execution.status = ExecutionStatus::Completed;
        execution.updated_at = Timestamp::now();
        store.put(execution.to_item()?)?;
        Ok(())
    }

    fn run_tier(&self, plan: &CompiledPlan, tier: &[usize], account_id: &AccountId, execution_id: &ExecutionId, shared_context: &Arc<Mutex<BTreeMap<String, serde_json::Value>>>) -> Vec<TierNodeOutcome> {
        let mut outcomes = Vec::with_capacity(tier.len());
        for batch in tier.chunks(self.max_workers) {
            let batch_outcomes = std::thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|&node_index| {
                        let handle = scope.spawn(move || self.run_node(plan, node_index, account_id, execution_id, shared_context, 0));
                        (node_index, handle)
                    })
                    .collect();
                handles.into_iter().map(|(node_index, handle)| handle.join().unwrap_or_else(|_| TierNodeOutcome::panicked(node_index))).collect::<Vec<_>>()
            });
            outcomes.extend(batch_outcomes);
        }
        outcomes
    }

    fn run_node(
        &self,
        plan: &CompiledPlan,
        node_index: usize,
        account_id: &AccountId,
        execution_id: &ExecutionId,
        shared_context: &Arc<Mutex<BTreeMap<String, serde_json::Value>>>,
        from_stage: usize,
    ) -> TierNodeOutcome {
        let Some(node) = plan.node(node_index) else {
            return TierNodeOutcome { node_index, stage_results: Vec::new(), logs: Vec::new(), suspended: None, failed: true };
        };

        let mut stage_results = Vec::new();
        let mut logs = Vec::new();
        if from_stage == 0 {
            logs.push(format!("[NODE:{}] STARTED", node.id));
        }

        let ctx = DispatchContext {
            gateway: Arc::clone(&self.gateway),
            execution_id: execution_id.clone(),
            node_id: node.id.clone(),
            shared_context: Arc::clone(shared_context),
            approval_sink: Arc::clone(&self.approval_bridge),
            retry_policy: self.retry_policy.clone(),
            sleeper: Arc::clone(&self.sleeper),
            event_sink: Arc::clone(&self.event_sink),
        };

        for stage in node.stages.iter().skip(from_stage) {
            let auth = match self.credential_resolver.resolve(stage, account_id, self.event_sink.as_ref()) {
                Ok(auth) => auth,
                Err(err) => {
                    logs.push(format!("[NODE:{}] {}", node.id, credential_failure_message(&err)));
                    stage_results.push(StageResult {
                        stage_id: stage.id.clone(),
                        node_id: node.id.clone(),
                        status: StageStatus::Failed,
                        message: Some(credential_failure_message(&err)),
                        duration_ms: 0,
                        data: None,
                        log_lines: Vec::new(),
                    });
                    return TierNodeOutcome { node_index, stage_results, logs, suspended: None, failed: true };
                }
            };

            let breaker = self.breakers.for_stage_type(stage.stage_type);
            let result = dispatch(&ctx, &self.registry, breaker, stage, auth.as_ref());
            logs.extend(result.log_lines.iter().map(|line| format!("[NODE:{}] {line}", node.id)));
            let status = result.status;
            stage_results.push(result);

            match status {
                StageStatus::Failed => return TierNodeOutcome { node_index, stage_results, logs, suspended: None, failed: true },
                StageStatus::WaitingApproval => {
                    return TierNodeOutcome { node_index, stage_results, logs, suspended: Some(stage.id.clone()), failed: false };
                }
                StageStatus::Pending | StageStatus::Running | StageStatus::Success | StageStatus::Skipped | StageStatus::Stale => {}
            }
        }

        logs.push(format!("[NODE:{}] COMPLETED", node.id));
        TierNodeOutcome { node_index, stage_results, logs, suspended: None, failed: false }
    }

    fn apply_tier_outcomes(&self, execution: &mut Execution, plan: &CompiledPlan, shared_context: &Arc<Mutex<BTreeMap<String, serde_json::Value>>>, outcomes: Vec<TierNodeOutcome>) {
        for outcome in &outcomes {
            if let Some(node) = plan.node(outcome.node_index) {
                execution.node_results.push(NodeResult { node_id: node.id.clone(), name: node.name.clone(), tier: tier_index_of(plan, outcome.node_index) });
            }
        }
        self.merge_many(execution, shared_context, outcomes);
    }

    fn merge_continuation(&self, execution: &mut Execution, shared_context: &Arc<Mutex<BTreeMap<String, serde_json::Value>>>, outcome: TierNodeOutcome) {
        self.merge_many(execution, shared_context, vec![outcome]);
    }

    fn merge_many(&self, execution: &mut Execution, shared_context: &Arc<Mutex<BTreeMap<String, serde_json::Value>>>, outcomes: Vec<TierNodeOutcome>) {
        let mut suspended = None;
        let mut failed = false;
        for outcome in outcomes {
            execution.stage_results.extend(outcome.stage_results);
            execution.logs.extend(outcome.logs);
            failed |= outcome.failed;
            if suspended.is_none() {
                suspended = outcome.suspended;
            }
        }
        execution.context = shared_context.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
        execution.updated_at = Timestamp::now();

        if failed {
            execution.status = ExecutionStatus::Failed;
        } else if let Some(stage_id) = suspended {
            execution.paused = Some(PausedMarker { execution_id: execution.execution_id.clone(), stage_id: stage_id.clone(), resume_token: ResumeToken::new(uuid::Uuid::new_v4().to_string()) });
            execution.status = ExecutionStatus::Paused;
            self.event_sink.record(EngineEvent::ExecutionSuspended { execution_id: execution.execution_id.to_string(), stage_id: stage_id.to_string() });
        }
    }
}

fn credential_failure_message(err: &CredentialError) -> String {
    format!("credential resolution failed: {err}")
}

fn outcome_label(outcome: ApprovalOutcome) -> &'static str {
    match outcome {
        ApprovalOutcome::Approved => "approved",
        ApprovalOutcome::Rejected => "rejected",
    }
}

fn tier_index_of(plan: &CompiledPlan, node_index: usize) -> usize {
    plan.tiers.iter().position(|tier| tier.contains(&node_index)).unwrap_or(0)
}

fn locate_stage(plan: &CompiledPlan, stage_id: &StageId) -> Option<(usize, usize)> {
    for (node_index, node) in plan.nodes.iter().enumerate() {
        if let Some(stage_index) = node.stages.iter().position(|stage| &stage.id == stage_id) {
            return Some((node_index, stage_index));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pipeline_core::entities::BuildJob;
    use pipeline_core::entities::Pipeline;
    use pipeline_core::entities::PipelineEdge;
    use pipeline_core::entities::PipelineNodeLayout;
    use pipeline_core::entities::StageOverride;
    use pipeline_core::entities::StageStatus;
    use pipeline_core::identifiers::AccountId;
    use pipeline_core::identifiers::BuildJobId;
    use pipeline_core::identifiers::PipelineId;
    use pipeline_core::identifiers::StageId;
    use pipeline_core::telemetry::NoopEventSink;
    use pipeline_dispatcher::HandlerRegistry;
    use pipeline_dispatcher::retry::RealSleeper;
    use pipeline_providers::HttpGateway;
    use pipeline_providers::HttpGatewayConfig;
    use pipeline_store_sqlite::SqliteItemStore;

    use super::ExecutionCoordinator;
    use crate::approval::ApprovalBridge;
    use crate::credentials::CredentialResolver;
    use crate::tenant_router::DedicatedStoreResolver;
    use crate::tenant_router::DirectoryEntry;
    use crate::tenant_router::TenantDirectory;
    use crate::tenant_router::TenantRouter;

    struct NoPrivateAccounts;
    impl TenantDirectory for NoPrivateAccounts {
        fn lookup(&self, account_id: &AccountId) -> Result<DirectoryEntry, String> {
            Err(format!("unknown account {account_id}"))
        }
    }
    struct NoDedicatedStores;
    impl DedicatedStoreResolver for NoDedicatedStores {
        fn resolve(&self, store_name: &str) -> Result<Arc<dyn pipeline_core::ItemStore>, String> {
            Err(format!("no dedicated store named {store_name}"))
        }
    }

    struct NoopResumer;
    impl crate::approval::ExecutionResumer for NoopResumer {
        fn resume(&self, _execution_id: &pipeline_core::identifiers::ExecutionId, _stage_id: &StageId, _outcome: crate::approval::ApprovalOutcome) {}
    }

    fn coordinator(shared_store: Arc<dyn pipeline_core::ItemStore>) -> ExecutionCoordinator {
        let tenant_router = Arc::new(TenantRouter::new(Arc::new(NoPrivateAccounts), Arc::new(NoDedicatedStores), shared_store, Duration::from_secs(300)));
        let credential_resolver = Arc::new(CredentialResolver::new(Arc::clone(&tenant_router)));
        let gateway = Arc::new(HttpGateway::new(HttpGatewayConfig::default()).expect("gateway"));
        let registry = Arc::new(HandlerRegistry::with_builtin_handlers());
        let approval_bridge = Arc::new(ApprovalBridge::new(Arc::new(NoopResumer), false));
        let config = pipeline_config::PipelineConfig::default();
        ExecutionCoordinator::new(tenant_router, credential_resolver, gateway, registry, approval_bridge, Arc::new(RealSleeper), Arc::new(NoopEventSink), &config)
    }

    fn build_job_only_generic_stage(account_id: &AccountId, pipeline_id: &PipelineId) -> BuildJob {
        BuildJob {
            account_id: account_id.clone(),
            build_job_id: BuildJobId::new("bj-1"),
            pipeline_id: pipeline_id.clone(),
            is_private: false,
            pipeline_stages_state: vec![StageOverride { stage_id: StageId::new("s1"), execution_enabled: true, tool_selected: false, credential_id: None }],
            selected_artifacts: Vec::new(),
            branch: None,
            approvers: Vec::new(),
        }
    }

    fn simple_pipeline(account_id: &AccountId) -> Pipeline {
        Pipeline {
            account_id: account_id.clone(),
            pipeline_id: PipelineId::new("p1"),
            nodes: vec![PipelineNodeLayout { node_id: pipeline_core::identifiers::NodeId::new("n1"), name: "env-1".to_owned() }],
            edges: Vec::<PipelineEdge>::new(),
            yaml_content: r#"
nodes:
  - id: n1
    name: env-1
    stages:
      - id: s1
        name: build
        type: build
"#
            .to_owned(),
        }
    }

    #[test]
    fn linear_single_node_pipeline_completes() {
        let shared_store: Arc<dyn pipeline_core::ItemStore> = Arc::new(SqliteItemStore::open_in_memory().expect("open store"));
        let account_id = AccountId::new("acct-1");
        let pipeline = simple_pipeline(&account_id);
        let build_job = build_job_only_generic_stage(&account_id, &pipeline.pipeline_id);
        let coordinator = coordinator(Arc::clone(&shared_store));

        let (execution, plan) = coordinator.admit(&account_id, &pipeline, &build_job).expect("admit");
        let finished = coordinator.run(&account_id, execution, &plan, &shared_store, None).expect("run");

        assert!(matches!(finished.status, pipeline_core::entities::ExecutionStatus::Completed));
        assert_eq!(finished.stage_results.len(), 1);
        assert!(matches!(finished.stage_results[0].status, StageStatus::Success));
    }

    #[test]
    fn empty_pipeline_completes_with_no_stages() {
        let shared_store: Arc<dyn pipeline_core::ItemStore> = Arc::new(SqliteItemStore::open_in_memory().expect("open store"));
        let account_id = AccountId::new("acct-2");
        let pipeline = Pipeline {
            account_id: account_id.clone(),
            pipeline_id: PipelineId::new("p2"),
            nodes: Vec::new(),
            edges: Vec::new(),
            yaml_content: "nodes: []\n".to_owned(),
        };
        let build_job = BuildJob {
            account_id: account_id.clone(),
            build_job_id: BuildJobId::new("bj-2"),
            pipeline_id: pipeline.pipeline_id.clone(),
            is_private: false,
            pipeline_stages_state: Vec::new(),
            selected_artifacts: Vec::new(),
            branch: None,
            approvers: Vec::new(),
        };
        let coordinator = coordinator(shared_store.clone());
        let (execution, plan) = coordinator.admit(&account_id, &pipeline, &build_job).expect("admit");
        let finished = coordinator.run(&account_id, execution, &plan, &shared_store, None).expect("run");
        assert!(matches!(finished.status, pipeline_core::entities::ExecutionStatus::Completed));
        assert!(finished.stage_results.is_empty());
    }

    #[test]
    fn cancel_signal_is_observed_before_a_tier_starts() {
        let shared_store: Arc<dyn pipeline_core::ItemStore> = Arc::new(SqliteItemStore::open_in_memory().expect("open store"));
        let account_id = AccountId::new("acct-3");
        let pipeline = simple_pipeline(&account_id);
        let build_job = build_job_only_generic_stage(&account_id, &pipeline.pipeline_id);
        let coordinator = coordinator(Arc::clone(&shared_store));
        let (execution, plan) = coordinator.admit(&account_id, &pipeline, &build_job).expect("admit");

        let (tx, rx) = std::sync::mpsc::channel();
        tx.send(()).expect("send cancel");
        let finished = coordinator.run(&account_id, execution, &plan, &shared_store, Some(&rx)).expect("run");
        assert!(matches!(finished.status, pipeline_core::entities::ExecutionStatus::Cancelled));
    }

    #[test]
    fn resume_with_rejection_fails_without_running_downstream_tiers() {
        // An execution manually paused mid-flight (as if a prior coordinator
        // suspended it) rejects cleanly without needing a live plan replay.
        let shared_store: Arc<dyn pipeline_core::ItemStore> = Arc::new(SqliteItemStore::open_in_memory().expect("open store"));
        let account_id = AccountId::new("acct-4");
        let pipeline = Pipeline {
            account_id: account_id.clone(),
            pipeline_id: PipelineId::new("p4"),
            nodes: vec![PipelineNodeLayout { node_id: pipeline_core::identifiers::NodeId::new("n1"), name: "env-1".to_owned() }],
            edges: Vec::new(),
            yaml_content: r#"
nodes:
  - id: n1
    name: env-1
    stages:
      - id: approve
        name: approval
        type: approval
        approvers: ["alice@x"]
"#
            .to_owned(),
        };
        let build_job = BuildJob {
            account_id: account_id.clone(),
            build_job_id: BuildJobId::new("bj-4"),
            pipeline_id: pipeline.pipeline_id.clone(),
            is_private: false,
            pipeline_stages_state: vec![StageOverride { stage_id: StageId::new("approve"), execution_enabled: true, tool_selected: false, credential_id: None }],
            selected_artifacts: Vec::new(),
            branch: None,
            approvers: vec!["alice@x".to_owned()],
        };
        let coordinator = coordinator(Arc::clone(&shared_store));
        let (execution, plan) = coordinator.admit(&account_id, &pipeline, &build_job).expect("admit");
        let suspended = coordinator.run(&account_id, execution, &plan, &shared_store, None).expect("run");
        assert!(matches!(suspended.status, pipeline_core::entities::ExecutionStatus::Paused));

        let rejected = coordinator.resume(&account_id, suspended, &plan, &shared_store, crate::approval::ApprovalOutcome::Rejected, None).expect("resume");
        assert!(matches!(rejected.status, pipeline_core::entities::ExecutionStatus::Failed));
    }
}
