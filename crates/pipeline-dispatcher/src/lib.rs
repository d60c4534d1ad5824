// crates/pipeline-dispatcher/src/lib.rs
// ============================================================================
// Crate: pipeline-dispatcher
// Description: Stage Dispatcher (C7) — per-stage-type handlers, retry, and
//              circuit-breaker wrapping around outbound calls.
// Dependencies: pipeline-core, pipeline-providers, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`dispatch`] is the single entry point the Execution Coordinator calls
//! per stage. It short-circuits compiled-skipped stages, routes to the
//! [`StageHandler`] registered for the stage's [`StageType`], and — only for
//! handlers that make outbound network calls — wraps the call in the
//! relevant [`CircuitBreaker`]. Handlers never touch the breaker or the
//! retry loop directly; both live at this layer so a handler's job stays
//! "make the call, interpret the response."

pub mod handlers;
pub mod retry;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use pipeline_core::identifiers::ExecutionId;
use pipeline_core::identifiers::NodeId;
use pipeline_core::plan::CompiledStage;
use pipeline_core::plan::StageType;
use pipeline_core::telemetry::EventSink;
use pipeline_core::CircuitBreaker;
use pipeline_core::ResolvedAuth;
use pipeline_core::entities::StageResult;
use pipeline_core::entities::StageStatus;
use pipeline_providers::HttpGateway;
use thiserror::Error;

pub use handlers::approval::ApprovalSink;
pub use handlers::HandlerRegistry;
pub use handlers::StageHandler;
pub use handlers::StageOutcome;
pub use retry::RetryPolicy;
pub use retry::Sleeper;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors a [`StageHandler`] can raise. These map onto `spec.md` §7's
/// `Transient`/`AuthUnresolved`/`Validation` error kinds.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The stage required credentials and none resolved.
    #[error("no credentials resolved for stage")]
    AuthUnresolved,
    /// An outbound call exhausted its retry budget.
    #[error(transparent)]
    Transient(#[from] retry::RetryExhausted),
    /// The stage's declared configuration was invalid (e.g. missing a
    /// required connector field).
    #[error("invalid stage configuration: {0}")]
    Validation(String),
}

impl DispatchError {
    /// Whether this error should count toward the circuit breaker's
    /// consecutive-failure count (`spec.md` §7: only `Transient` failures
    /// that exhaust retries count; `AuthUnresolved`/`Validation` do not).
    #[must_use]
    pub const fn counts_as_breaker_failure(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

// ============================================================================
// SECTION: Dispatch Context
// ============================================================================

/// Shared, execution-scoped state handlers may read and write (e.g. the
/// GitHub handler's `{repo, branch, token, basePath}` context for
/// downstream Deploy stages). This is explicit state the coordinator passes
/// in, never process-global state.
pub type SharedContext = Arc<Mutex<BTreeMap<String, serde_json::Value>>>;

/// Per-dispatch-call context, constructed once per execution by the
/// Execution Coordinator and passed to every stage dispatch within it.
pub struct DispatchContext {
    /// SSRF-safe HTTP client shared across stages in this execution.
    pub gateway: Arc<HttpGateway>,
    /// Execution this dispatch belongs to, for log tagging.
    pub execution_id: ExecutionId,
    /// Node this dispatch belongs to, for `[NODE:<id>]` log tagging.
    pub node_id: NodeId,
    /// Shared execution context (GitHub repo/branch/token/basePath, etc).
    pub shared_context: SharedContext,
    /// Destination for completed/pending Approval stages.
    pub approval_sink: Arc<dyn ApprovalSink>,
    /// Retry/backoff tuning for outbound calls.
    pub retry_policy: RetryPolicy,
    /// Backoff sleep implementation (real or test double).
    pub sleeper: Arc<dyn Sleeper>,
    /// Event sink for circuit-breaker transition telemetry.
    pub event_sink: Arc<dyn EventSink>,
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Stage types whose handlers make outbound network calls and are therefore
/// wrapped in a circuit breaker (`spec.md` §4.7).
const fn uses_network(stage_type: StageType) -> bool {
    matches!(stage_type, StageType::Plan | StageType::Code | StageType::Deploy)
}

/// Dispatches one compiled stage: short-circuits a compiled-skipped stage,
/// otherwise routes to the registered handler, wrapping network-calling
/// handlers in `breaker`.
#[must_use]
pub fn dispatch(
    ctx: &DispatchContext,
    registry: &HandlerRegistry,
    breaker: Option<&CircuitBreaker>,
    stage: &CompiledStage,
    auth: Option<&ResolvedAuth>,
) -> StageResult {
    if stage.compiles_skipped() {
        return skipped_result(ctx, stage, "stage disabled or tool not selected");
    }
    if matches!(stage.stage_type, StageType::Approval) && stage.approvers.is_empty() {
        return skipped_result(ctx, stage, "No approvers configured");
    }

    let handler = registry.get(stage.stage_type);
    let start = Instant::now();

    let outcome = if uses_network(stage.stage_type) {
        run_through_breaker(ctx, handler, breaker, stage, auth)
    } else {
        handler.execute(ctx, stage, auth).unwrap_or_else(outcome_from_error)
    };

    StageResult {
        stage_id: stage.id.clone(),
        node_id: ctx.node_id.clone(),
        status: outcome.status,
        message: outcome.message,
        duration_ms: duration_ms(start),
        data: outcome.data,
        log_lines: outcome.log_lines,
    }
}

fn run_through_breaker(
    ctx: &DispatchContext,
    handler: &dyn StageHandler,
    breaker: Option<&CircuitBreaker>,
    stage: &CompiledStage,
    auth: Option<&ResolvedAuth>,
) -> StageOutcome {
    let Some(breaker) = breaker else {
        return handler.execute(ctx, stage, auth).unwrap_or_else(outcome_from_error);
    };
    let result = breaker.call(ctx.event_sink.as_ref(), DispatchError::counts_as_breaker_failure, || {
        handler.execute(ctx, stage, auth)
    });
    match result {
        Ok(outcome) => outcome,
        Err(pipeline_core::BreakerError::CircuitOpen(_)) => {
            StageOutcome::failed("downstream unavailable")
        }
        Err(pipeline_core::BreakerError::Inner(err)) => outcome_from_error(err),
    }
}

fn outcome_from_error(err: DispatchError) -> StageOutcome {
    StageOutcome::failed(err.to_string())
}

fn skipped_result(ctx: &DispatchContext, stage: &CompiledStage, message: &str) -> StageResult {
    StageResult {
        stage_id: stage.id.clone(),
        node_id: ctx.node_id.clone(),
        status: StageStatus::Skipped,
        message: Some(message.to_owned()),
        duration_ms: 0,
        data: None,
        log_lines: Vec::new(),
    }
}

#[expect(clippy::cast_possible_truncation, reason = "stage durations never approach u64::MAX milliseconds")]
fn duration_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
