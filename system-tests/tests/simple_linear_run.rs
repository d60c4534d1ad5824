// system-tests/tests/simple_linear_run.rs
// ============================================================================
// Scenario: simple linear run.
// ============================================================================

//! Two generic nodes, `Dev -> Test`, no approvers: run to completion and
//! check both stages succeeded in node order.

mod common;

use std::time::Duration;

use pipeline_config::PipelineConfig;
use pipeline_core::entities::StageStatus;
use pipeline_core::identifiers::AccountId;
use pipeline_core::identifiers::PipelineId;

#[test]
fn linear_pipeline_completes_in_node_order() {
    let store = common::in_memory_store();
    let account_id = AccountId::new("acct-linear");
    let pipeline_id = PipelineId::new("pipe-linear");
    common::store_pipeline(
        &store,
        &account_id,
        &pipeline_id,
        &["dev", "test"],
        "nodes:\n  \
         - id: dev\n    \
           stages:\n      \
             - id: g1\n        type: generic\n  \
         - id: test\n    depends_on: [dev]\n    \
           stages:\n      \
             - id: g2\n        type: generic\n",
    );

    let config = PipelineConfig::default();
    let engine = common::public_engine(store.clone(), pipeline_providers::HttpGatewayConfig::default(), &config);

    let outcome = engine.run(&account_id, &pipeline_id, None, None, Vec::new()).expect("run");

    let snapshot = common::wait_until(Duration::from_secs(5), || {
        let snapshot = engine.get_logs(&account_id, &outcome.execution_id).expect("get logs");
        snapshot.status.is_terminal().then_some(snapshot)
    });

    assert_eq!(snapshot.stage_results.len(), 2);
    assert!(snapshot.stage_results.iter().all(|stage| stage.status == StageStatus::Success));

    let dev_started = snapshot.logs.iter().position(|line| line.contains("[NODE:dev] STARTED")).expect("dev started logged");
    let test_started = snapshot.logs.iter().position(|line| line.contains("[NODE:test] STARTED")).expect("test started logged");
    assert!(dev_started < test_started, "dev must start strictly before test");
}
