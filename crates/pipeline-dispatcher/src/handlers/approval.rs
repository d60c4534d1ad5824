// crates/pipeline-dispatcher/src/handlers/approval.rs
// ============================================================================
// Module: Approval Stage Handler
// Description: Delegates inbox-item creation to the Inbox/Approval Bridge
//              (C9) and suspends the stage pending a human decision.
// Purpose: `spec.md` §4.7 Approval handler contract.
// ============================================================================

//! ## Overview
//! The dispatcher crate has no dependency on the approval bridge's storage
//! implementation; [`ApprovalSink`] is the seam pipeline-engine's
//! `ApprovalBridge` implements, so this handler stays independent of any
//! concrete item-store backend.

use pipeline_core::identifiers::ExecutionId;
use pipeline_core::identifiers::StageId;
use pipeline_core::plan::CompiledStage;
use pipeline_core::ResolvedAuth;

use crate::handlers::StageHandler;
use crate::handlers::StageOutcome;
use crate::DispatchContext;
use crate::DispatchError;

/// Destination for a newly suspended Approval stage; implemented by the
/// Inbox/Approval Bridge (C9).
pub trait ApprovalSink: Send + Sync {
    /// Creates one inbox item per entry in `approvers`, scoped to
    /// `(execution_id, stage_id)`.
    ///
    /// # Errors
    /// Returns a message describing the failure; the caller treats any
    /// error as a stage failure (`AuthUnresolved`/`Validation`-class, never
    /// retried).
    fn create_requests(&self, execution_id: &ExecutionId, stage_id: &StageId, approvers: &[String]) -> Result<(), String>;
}

/// Handles `Approval` stages by fanning out inbox items and suspending.
pub struct ApprovalHandler;

impl StageHandler for ApprovalHandler {
    fn execute(&self, ctx: &DispatchContext, stage: &CompiledStage, _auth: Option<&ResolvedAuth>) -> Result<StageOutcome, DispatchError> {
        ctx.approval_sink
            .create_requests(&ctx.execution_id, &stage.id, &stage.approvers)
            .map_err(DispatchError::Validation)?;
        Ok(StageOutcome::waiting_approval())
    }
}
