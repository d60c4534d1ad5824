// crates/pipeline-dispatcher/src/handlers/generic.rs
// ============================================================================
// Module: Generic Stage Handler
// Description: Fallback handler for Build/Test/Release/Generic stages.
// Purpose: `spec.md` §4.7: "No external call; return SUCCESS with a single
//          informational log line."
// ============================================================================

use pipeline_core::plan::CompiledStage;
use pipeline_core::ResolvedAuth;

use crate::handlers::StageHandler;
use crate::handlers::StageOutcome;
use crate::DispatchContext;
use crate::DispatchError;

/// Handles `Build`, `Test`, `Release`, and any stage type the compiler
/// could not recognize.
pub struct GenericHandler;

impl StageHandler for GenericHandler {
    fn execute(&self, _ctx: &DispatchContext, stage: &CompiledStage, _auth: Option<&ResolvedAuth>) -> Result<StageOutcome, DispatchError> {
        Ok(StageOutcome::success(format!("{} completed", stage.name)))
    }
}
