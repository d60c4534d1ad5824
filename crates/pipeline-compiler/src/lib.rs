// crates/pipeline-compiler/src/lib.rs
// ============================================================================
// Crate: pipeline-compiler
// Description: Pipeline Compiler (C5) and Dependency Scheduler (C6).
// Purpose: Turns a stored Pipeline + BuildJob into the tiered CompiledPlan
//          the Stage Dispatcher and Execution Coordinator execute.
// Dependencies: pipeline-core, serde, serde_yaml
// ============================================================================

//! ## Overview
//! `compile()` folds a pipeline's authoritative YAML graph and a build
//! job's per-stage overrides into `Vec<CompiledNode>`; `schedule()` then
//! tiers those nodes and linearizes each node's stages. [`compile_and_schedule`]
//! composes both into the `CompiledPlan` the rest of the engine consumes.

pub mod compile;
pub mod schedule;
pub mod yaml;

use pipeline_core::entities::BuildJob;
use pipeline_core::entities::Pipeline;
use pipeline_core::plan::CompiledPlan;
use thiserror::Error;

pub use compile::CompileError;
pub use schedule::SchedulerError;

/// Either stage of the compile-then-schedule pipeline can fail.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// Compilation failed.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// Scheduling failed.
    #[error(transparent)]
    Schedule(#[from] SchedulerError),
}

/// Compiles `pipeline` against `build_job`, then schedules the result into
/// node tiers and per-node stage chains.
///
/// # Errors
/// Returns [`PlanError`] if compilation or scheduling fails.
pub fn compile_and_schedule(pipeline: &Pipeline, build_job: &BuildJob) -> Result<CompiledPlan, PlanError> {
    let mut nodes = compile::compile(pipeline, build_job)?;
    let tiers = schedule::schedule(&nodes)?;

    for node in &mut nodes {
        let order = schedule::order_stages(&node.stages)?;
        let ordered = order.into_iter().map(|idx| node.stages[idx].clone()).collect();
        node.stages = ordered;
    }

    Ok(CompiledPlan { nodes, tiers })
}
