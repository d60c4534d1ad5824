// system-tests/tests/jira_retry_then_success.rs
// ============================================================================
// Scenario: retry then success.
// ============================================================================

//! A JIRA stage whose stub fails with `503` twice before returning `200`
//! succeeds on the third attempt, sleeping at least 2s then 4s between
//! attempts.

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

use common::ScriptedResponse;

#[test]
fn retries_twice_then_succeeds_with_backoff() {
    let stub = common::JiraStub::start(vec![ScriptedResponse::status(503), ScriptedResponse::status(503), ScriptedResponse::ok_json(r#"{"key":"ABC-1"}"#)]);

    let store = common::in_memory_store();
    let account_id = AccountId::new("acct-retry");
    let pipeline_id = PipelineId::new("pipe-retry");
    let credential_id = CredentialId::new("cred-jira");
    common::store_jira_bearer_credential(&store, &account_id, &credential_id, "token-value");

    let yaml = format!(
        "nodes:\n  - id: n1\n    stages:\n      - id: s1\n        type: plan\n        tool:\n          connector: jira\n          base_url: {}\n          issue_key: ABC-1\n",
        stub.base_url()
    );
    common::store_pipeline(&store, &account_id, &pipeline_id, &["n1"], &yaml);

    let build_job = BuildJob {
        account_id: account_id.clone(),
        build_job_id: BuildJobId::new("job-retry"),
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

    let config = PipelineConfig { stage_max_retries: 3, ..PipelineConfig::default() };
    let sleeper = Arc::new(common::RecordingSleeper::default());
    let engine = common::build_engine(
        Arc::new(common::AllPublic),
        Arc::new(common::NoDedicatedStores),
        store.clone(),
        sleeper.clone(),
        common::stub_gateway_config(),
        &config,
    );

    let outcome = engine.run(&account_id, &pipeline_id, Some(build_job.build_job_id.clone()), None, Vec::new()).expect("run");

    let snapshot = common::wait_until(Duration::from_secs(5), || {
        let snapshot = engine.get_logs(&account_id, &outcome.execution_id).expect("get logs");
        snapshot.status.is_terminal().then_some(snapshot)
    });

    assert_eq!(snapshot.stage_results.len(), 1);
    assert_eq!(snapshot.stage_results[0].status, StageStatus::Success);
    assert_eq!(stub.requests_seen(), 3);

    let delays = sleeper.requested();
    assert_eq!(delays.len(), 2, "exactly two backoff sleeps between three attempts");
    assert!(delays[0] >= Duration::from_secs(2));
    assert!(delays[1] >= Duration::from_secs(4));
}
