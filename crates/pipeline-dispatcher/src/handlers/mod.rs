// crates/pipeline-dispatcher/src/handlers/mod.rs
// ============================================================================
// Module: Stage Handlers
// Description: `StageHandler` trait, per-stage-type implementations, and the
//              registry mapping `StageType -> Box<dyn StageHandler>`.
// Dependencies: pipeline-core
// ============================================================================

pub mod approval;
pub mod code;
pub mod deploy;
pub mod generic;
pub mod plan;

use std::collections::HashMap;

use pipeline_core::plan::CompiledStage;
use pipeline_core::plan::StageType;
use pipeline_core::ResolvedAuth;
use serde_json::Value;

use crate::DispatchContext;
use crate::DispatchError;

/// Outcome of one handler invocation, prior to the duration/ids the
/// dispatcher fills in.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// Terminal (or `WaitingApproval`) status this attempt produced.
    pub status: pipeline_core::entities::StageStatus,
    /// Optional human-readable outcome message.
    pub message: Option<String>,
    /// Optional structured data (e.g. GitHub repo/branch context).
    pub data: Option<Value>,
    /// Log lines emitted while executing this stage.
    pub log_lines: Vec<String>,
}

impl StageOutcome {
    /// Builds a `SUCCESS` outcome with a single informational log line.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        let message = message.into();
        Self { status: pipeline_core::entities::StageStatus::Success, log_lines: vec![message.clone()], message: Some(message), data: None }
    }

    /// Builds a `FAILED` outcome carrying `message`.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self { status: pipeline_core::entities::StageStatus::Failed, log_lines: vec![message.clone()], message: Some(message), data: None }
    }

    /// Builds a `WAITING_APPROVAL` outcome.
    #[must_use]
    pub fn waiting_approval() -> Self {
        Self {
            status: pipeline_core::entities::StageStatus::WaitingApproval,
            message: None,
            data: None,
            log_lines: vec!["waiting for approval".to_owned()],
        }
    }

    /// Attaches structured `data` to this outcome.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// One stage-type-specific handler. Implementations write no state of their
/// own beyond what they return or write into [`DispatchContext::shared_context`];
/// retry and circuit-breaker wrapping happen one layer up, in [`crate::dispatch`].
pub trait StageHandler: Send + Sync {
    /// Executes `stage`, using `auth` if the stage requires credentials.
    ///
    /// # Errors
    /// Returns [`DispatchError`] on an unresolvable-auth, validation, or
    /// (after retry exhaustion) transient failure.
    fn execute(&self, ctx: &DispatchContext, stage: &CompiledStage, auth: Option<&ResolvedAuth>) -> Result<StageOutcome, DispatchError>;
}

/// Maps each [`StageType`] to its registered handler.
pub struct HandlerRegistry {
    /// Handlers for stage types with dedicated behavior.
    handlers: HashMap<StageType, Box<dyn StageHandler>>,
    /// Fallback for `Build`/`Test`/`Release`/`Generic`/any unmapped type
    /// (`spec.md` §4.5: "unknown stage types compile to the generic handler").
    generic: Box<dyn StageHandler>,
}

impl HandlerRegistry {
    /// Builds the default registry: built-in handlers for every
    /// [`StageType`] variant.
    #[must_use]
    pub fn with_builtin_handlers() -> Self {
        let mut handlers: HashMap<StageType, Box<dyn StageHandler>> = HashMap::new();
        handlers.insert(StageType::Plan, Box::new(plan::JiraPlanHandler));
        handlers.insert(StageType::Code, Box::new(code::GithubCodeHandler));
        handlers.insert(StageType::Deploy, Box::new(deploy::SapDeployHandler));
        handlers.insert(StageType::Approval, Box::new(approval::ApprovalHandler));
        Self { handlers, generic: Box::new(generic::GenericHandler) }
    }

    /// Returns the handler registered for `stage_type`, falling back to the
    /// generic handler for `Build`/`Test`/`Release`/`Generic`.
    #[must_use]
    pub fn get(&self, stage_type: StageType) -> &dyn StageHandler {
        self.handlers.get(&stage_type).map_or_else(|| self.generic.as_ref(), AsRef::as_ref)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtin_handlers()
    }
}
