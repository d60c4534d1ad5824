// system-tests/tests/circuit_opens_then_recovers.rs
// ============================================================================
// Scenario: circuit opens then recovers.
// ============================================================================

//! Five consecutive JIRA failures open the breaker; a call issued inside
//! the reset window is rejected without ever reaching the stub; two
//! successes after the reset window closes the breaker again.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pipeline_config::PipelineConfig;
use pipeline_core::entities::BuildJob;
use pipeline_core::entities::StageOverride;
use pipeline_core::entities::StageStatus;
use pipeline_core::identifiers::AccountId;
use pipeline_core::identifiers::BuildJobId;
use pipeline_core::identifiers::CredentialId;
use pipeline_core::identifiers::PipelineId;
use pipeline_core::identifiers::StageId;
use pipeline_dispatcher::retry::RealSleeper;

use common::ScriptedResponse;

fn run_once(
    engine: &pipeline_engine::Engine,
    account_id: &AccountId,
    pipeline_id: &PipelineId,
    build_job_id: &BuildJobId,
) -> StageStatus {
    let outcome = engine.run(account_id, pipeline_id, Some(build_job_id.clone()), None, Vec::new()).expect("run");
    let snapshot = common::wait_until(Duration::from_secs(5), || {
        let snapshot = engine.get_logs(account_id, &outcome.execution_id).expect("get logs");
        snapshot.status.is_terminal().then_some(snapshot)
    });
    snapshot.stage_results[0].status
}

#[test]
fn breaker_opens_then_half_opens_then_closes() {
    // Five failures to open the breaker, then two more 503s that must
    // never be observed by the stub while the breaker is open, then two
    // successes to close it again.
    let stub = common::JiraStub::start(vec![
        ScriptedResponse::status(503),
        ScriptedResponse::status(503),
        ScriptedResponse::status(503),
        ScriptedResponse::status(503),
        ScriptedResponse::status(503),
        ScriptedResponse::ok_json("{}"),
        ScriptedResponse::ok_json("{}"),
    ]);

    let store = common::in_memory_store();
    let account_id = AccountId::new("acct-breaker");
    let pipeline_id = PipelineId::new("pipe-breaker");
    let credential_id = CredentialId::new("cred-jira-breaker");
    common::store_jira_bearer_credential(&store, &account_id, &credential_id, "token-value");

    let yaml = format!(
        "nodes:\n  - id: n1\n    stages:\n      - id: s1\n        type: plan\n        tool:\n          connector: jira\n          base_url: {}\n          issue_key: ABC-1\n",
        stub.base_url()
    );
    common::store_pipeline(&store, &account_id, &pipeline_id, &["n1"], &yaml);

    let build_job = BuildJob {
        account_id: account_id.clone(),
        build_job_id: BuildJobId::new("job-breaker"),
        pipeline_id: pipeline_id.clone(),
        is_private: false,
        pipeline_stages_state: vec![StageOverride {
            stage_id: StageId::new("s1"),
            execution_enabled: true,
            tool_selected: true,
            credential_id: Some(credential_id),
        }],
        selected_artifacts: Vec::new(),
        branch: None,
        approvers: Vec::new(),
    };
    common::store_build_job(&store, &build_job);

    let config = PipelineConfig { stage_max_retries: 0, circuit_failure_threshold: 5, circuit_reset_ms: 100, circuit_half_open_successes: 2, ..PipelineConfig::default() };
    let engine = common::build_engine(
        Arc::new(common::AllPublic),
        Arc::new(common::NoDedicatedStores),
        store.clone(),
        Arc::new(RealSleeper),
        common::stub_gateway_config(),
        &config,
    );

    for _ in 0..5 {
        let status = run_once(&engine, &account_id, &pipeline_id, &build_job.build_job_id);
        assert_eq!(status, StageStatus::Failed);
    }
    assert_eq!(stub.requests_seen(), 5);

    // Breaker is now open: this run must be rejected without an HTTP call.
    let rejected_outcome = engine.run(&account_id, &pipeline_id, Some(build_job.build_job_id.clone()), None, Vec::new()).expect("run");
    let rejected_snapshot = common::wait_until(Duration::from_secs(5), || {
        let snapshot = engine.get_logs(&account_id, &rejected_outcome.execution_id).expect("get logs");
        snapshot.status.is_terminal().then_some(snapshot)
    });
    assert_eq!(rejected_snapshot.stage_results[0].status, StageStatus::Failed);
    assert!(rejected_snapshot.stage_results[0].message.as_deref().unwrap_or_default().contains("downstream unavailable"));
    assert_eq!(stub.requests_seen(), 5, "no HTTP call should have been issued while the breaker is open");

    std::thread::sleep(Duration::from_millis(150));

    let first_recovery = run_once(&engine, &account_id, &pipeline_id, &build_job.build_job_id);
    assert_eq!(first_recovery, StageStatus::Success);
    let second_recovery = run_once(&engine, &account_id, &pipeline_id, &build_job.build_job_id);
    assert_eq!(second_recovery, StageStatus::Success);
    assert_eq!(stub.requests_seen(), 7);
}
