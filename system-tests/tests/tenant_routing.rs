// system-tests/tests/tenant_routing.rs
// ============================================================================
// Scenario: tenant routing.
// ============================================================================

//! A private account with a dedicated store only ever writes its build
//! job there; the shared store never sees it.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pipeline_config::PipelineConfig;
use pipeline_core::entities::CloudType;
use pipeline_core::identifiers::AccountId;
use pipeline_core::identifiers::PipelineId;
use pipeline_core::ItemKey;
use pipeline_core::ItemStore as _;
use pipeline_dispatcher::retry::RealSleeper;
use pipeline_engine::tenant_router::DirectoryEntry;

#[test]
fn private_account_build_job_lands_only_in_dedicated_store() {
    let shared_store = common::in_memory_store();
    let dedicated_store = common::in_memory_store();

    let account_id = AccountId::new("acct-private-p");
    let pipeline_id = PipelineId::new("pipe-private");
    common::store_pipeline(
        &shared_store,
        &account_id,
        &pipeline_id,
        &["n1"],
        "nodes:\n  - id: n1\n    stages:\n      - id: g1\n        type: generic\n",
    );
    // The authoritative pipeline must also be resolvable from the
    // dedicated store once this account routes there.
    common::store_pipeline(
        &dedicated_store,
        &account_id,
        &pipeline_id,
        &["n1"],
        "nodes:\n  - id: n1\n    stages:\n      - id: g1\n        type: generic\n",
    );

    let mut directory = HashMap::new();
    directory.insert(account_id.as_str().to_owned(), DirectoryEntry { cloud_type: CloudType::Private, dedicated_store: Some("cust-p".to_owned()) });
    let mut stores: HashMap<String, Arc<dyn pipeline_core::ItemStore>> = HashMap::new();
    stores.insert("cust-p".to_owned(), dedicated_store.clone());

    let config = PipelineConfig::default();
    let engine = common::build_engine(
        Arc::new(common::FixedDirectory(directory)),
        Arc::new(common::FixedDedicatedStores(stores)),
        shared_store.clone(),
        Arc::new(RealSleeper),
        pipeline_providers::HttpGatewayConfig::default(),
        &config,
    );

    let outcome = engine.run(&account_id, &pipeline_id, None, None, Vec::new()).expect("run");
    common::wait_until(Duration::from_secs(5), || {
        let snapshot = engine.get_logs(&account_id, &outcome.execution_id).expect("get logs");
        snapshot.status.is_terminal().then_some(())
    });

    let key = ItemKey::new("BUILD_JOB#LIST".to_owned(), format!("BUILD_JOB#{}", build_job_id_of(&dedicated_store, &account_id)));
    let in_dedicated = dedicated_store.get(&key, true).expect("query dedicated store");
    assert!(in_dedicated.is_some(), "build job must be present in the dedicated store");

    let in_shared = shared_store.get(&key, true).expect("query shared store");
    assert!(in_shared.is_none(), "build job must be absent from the shared store");
}

/// Finds the single `BUILD_JOB#<id>` item under the dedicated-store
/// partition and returns its id, so the test does not need to know the
/// synthesized build job's id ahead of time.
fn build_job_id_of(store: &Arc<dyn pipeline_core::ItemStore>, _account_id: &AccountId) -> String {
    let items = store.query(&pipeline_core::KeyCondition { partition: "BUILD_JOB#LIST".to_owned(), sk_prefix: "BUILD_JOB#".to_owned() }).expect("query build jobs");
    let item = items.into_iter().next().expect("one build job present");
    item.key.sk.trim_start_matches("BUILD_JOB#").to_owned()
}
