// enterprise/pipeline-store-enterprise/tests/postgres_store.rs
// ============================================================================
// Module: Postgres Store Integration Tests
// Description: Validates configuration and resolver behavior without a live
//              database.
// Purpose: Exercise the public surface a caller outside this crate sees.
// ============================================================================

//! Postgres store integration tests.

use std::collections::HashMap;

use pipeline_engine::DedicatedStoreResolver as _;
use pipeline_store_enterprise::postgres_store::PostgresDedicatedStoreResolver;
use pipeline_store_enterprise::postgres_store::PostgresItemStore;
use pipeline_store_enterprise::postgres_store::PostgresStoreConfig;

#[test]
fn default_config_is_valid_shape() {
    let config = PostgresStoreConfig::default();
    assert!(!config.connection.is_empty());
    assert!(config.max_connections > 0);
}

#[test]
fn invalid_connection_string_fails_to_connect() {
    let config = PostgresStoreConfig { connection: "not-a-url".to_string(), ..PostgresStoreConfig::default() };
    assert!(PostgresItemStore::connect(&config).is_err());
}

#[test]
fn resolver_with_no_configured_stores_resolves_nothing() {
    let resolver = PostgresDedicatedStoreResolver::new(HashMap::new()).expect("empty resolver");
    assert!(resolver.resolve("any-store").is_err());
}
