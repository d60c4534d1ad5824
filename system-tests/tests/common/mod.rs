// system-tests/tests/common/mod.rs
// ============================================================================
// Module: System Test Harness
// Description: In-process `Engine` construction, pipeline/credential
//              fixtures, and a scripted loopback HTTP stub, shared by
//              every end-to-end scenario in this crate.
// Dependencies: pipeline-core, pipeline-config, pipeline-dispatcher,
//               pipeline-engine, pipeline-providers, pipeline-store-sqlite,
//               tiny_http
// ============================================================================

//! Shared fixtures for the end-to-end scenarios in this crate. Each
//! scenario builds its own `Engine` over a fresh in-memory store rather
//! than sharing one across tests, so tests never interfere with each
//! other's tenant routing or breaker state.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use pipeline_config::PipelineConfig;
use pipeline_core::entities::BuildJob;
use pipeline_core::entities::CloudType;
use pipeline_core::entities::Credential;
use pipeline_core::entities::InboxItem;
use pipeline_core::entities::Pipeline;
use pipeline_core::entities::PipelineEdge;
use pipeline_core::entities::PipelineNodeLayout;
use pipeline_core::identifiers::AccountId;
use pipeline_core::identifiers::CredentialId;
use pipeline_core::identifiers::NodeId;
use pipeline_core::identifiers::PipelineId;
use pipeline_core::interfaces::ItemRecord as _;
use pipeline_core::telemetry::NoopEventSink;
use pipeline_core::Item;
use pipeline_core::ItemStore;
use pipeline_core::KeyCondition;
use pipeline_dispatcher::retry::RealSleeper;
use pipeline_dispatcher::HandlerRegistry;
use pipeline_dispatcher::Sleeper;
use pipeline_engine::Engine;
use pipeline_engine::DedicatedStoreResolver;
use pipeline_engine::TenantDirectory;
use pipeline_engine::TenantRouter;
use pipeline_engine::tenant_router::DirectoryEntry;
use pipeline_providers::HttpGateway;
use pipeline_providers::HttpGatewayConfig;
use pipeline_store_sqlite::SqliteItemStore;

// ============================================================================
// SECTION: Tenant Fixtures
// ============================================================================

/// Routes every account to a single, always-public directory entry.
pub struct AllPublic;
impl TenantDirectory for AllPublic {
    fn lookup(&self, account_id: &AccountId) -> Result<DirectoryEntry, String> {
        let _ = account_id;
        Ok(DirectoryEntry { cloud_type: CloudType::Public, dedicated_store: None })
    }
}

/// Never resolves a dedicated store; pairs with [`AllPublic`].
pub struct NoDedicatedStores;
impl DedicatedStoreResolver for NoDedicatedStores {
    fn resolve(&self, store_name: &str) -> Result<Arc<dyn ItemStore>, String> {
        Err(format!("no dedicated store named {store_name}"))
    }
}

/// Routes a fixed set of accounts by `account_id`, falling back to public
/// for anything unlisted.
pub struct FixedDirectory(pub HashMap<String, DirectoryEntry>);
impl TenantDirectory for FixedDirectory {
    fn lookup(&self, account_id: &AccountId) -> Result<DirectoryEntry, String> {
        Ok(self.0.get(account_id.as_str()).cloned().unwrap_or(DirectoryEntry { cloud_type: CloudType::Public, dedicated_store: None }))
    }
}

/// Resolves named dedicated stores from a fixed map, built ahead of time.
pub struct FixedDedicatedStores(pub HashMap<String, Arc<dyn ItemStore>>);
impl DedicatedStoreResolver for FixedDedicatedStores {
    fn resolve(&self, store_name: &str) -> Result<Arc<dyn ItemStore>, String> {
        self.0.get(store_name).cloned().ok_or_else(|| format!("no dedicated store named {store_name}"))
    }
}

// ============================================================================
// SECTION: Engine Construction
// ============================================================================

/// Builds an `Engine` with every account routed to `shared_store`, the
/// built-in stage handlers, and a real (non-simulated) sleeper.
pub fn public_engine(shared_store: Arc<dyn ItemStore>, gateway_config: HttpGatewayConfig, config: &PipelineConfig) -> Arc<Engine> {
    build_engine(Arc::new(AllPublic), Arc::new(NoDedicatedStores), shared_store, Arc::new(RealSleeper), gateway_config, config)
}

/// Builds an `Engine` over arbitrary tenant routing, for scenarios that
/// need private/dedicated accounts or a scripted sleeper.
pub fn build_engine(
    directory: Arc<dyn TenantDirectory>,
    dedicated: Arc<dyn DedicatedStoreResolver>,
    shared_store: Arc<dyn ItemStore>,
    sleeper: Arc<dyn Sleeper>,
    gateway_config: HttpGatewayConfig,
    config: &PipelineConfig,
) -> Arc<Engine> {
    let tenant_router = Arc::new(TenantRouter::new(directory, dedicated, Arc::clone(&shared_store), Duration::from_secs(config.tenant_cache_ttl_seconds)));
    let gateway = Arc::new(HttpGateway::new(gateway_config).expect("gateway config"));
    let registry = Arc::new(HandlerRegistry::with_builtin_handlers());
    Engine::new(tenant_router, gateway, registry, sleeper, Arc::new(NoopEventSink), shared_store, config)
}

/// Opens a fresh in-memory item store.
pub fn in_memory_store() -> Arc<dyn ItemStore> {
    Arc::new(SqliteItemStore::open_in_memory().expect("open in-memory store"))
}

// ============================================================================
// SECTION: Pipeline / Credential Fixtures
// ============================================================================

/// Persists a `Pipeline` with the given id whose authoritative graph is
/// `yaml_content`, and whose layout-only `nodes[]` names one layout entry
/// per `node_ids`.
pub fn store_pipeline(store: &Arc<dyn ItemStore>, account_id: &AccountId, pipeline_id: &PipelineId, node_ids: &[&str], yaml_content: &str) {
    let nodes = node_ids.iter().map(|id| PipelineNodeLayout { node_id: NodeId::new(*id), name: (*id).to_owned() }).collect();
    let pipeline = Pipeline { account_id: account_id.clone(), pipeline_id: pipeline_id.clone(), nodes, edges: Vec::<PipelineEdge>::new(), yaml_content: yaml_content.to_owned() };
    store.put(pipeline.to_item().expect("serialize pipeline")).expect("put pipeline");
}

/// Persists a `BuildJob` directly (bypassing `Engine::run`'s synthesized
/// one-off path), for scenarios that need explicit stage overrides.
pub fn store_build_job(store: &Arc<dyn ItemStore>, build_job: &BuildJob) {
    store.put(build_job.to_item().expect("serialize build job")).expect("put build job");
}

/// Persists a bearer-token JIRA credential under `credential_id`.
pub fn store_jira_bearer_credential(store: &Arc<dyn ItemStore>, account_id: &AccountId, credential_id: &CredentialId, token: &str) {
    let mut fields = BTreeMap::new();
    fields.insert("token".to_owned(), token.to_owned());
    let credential = Credential { account_id: account_id.clone(), credential_id: credential_id.clone(), connector_type: "jira".to_owned(), fields };
    store.put(credential.to_item().expect("serialize credential")).expect("put credential");
}

// ============================================================================
// SECTION: Item Parsing
// ============================================================================

/// Deserializes a raw `Item`'s attribute map into `T`, mirroring the
/// engine's own internal item-parsing helper.
pub fn parse_item<T: serde::de::DeserializeOwned>(item: Item) -> Option<T> {
    let value = serde_json::Value::Object(item.attributes.into_iter().collect());
    serde_json::from_value(value).ok()
}

/// Lists every `InboxItem` stored for `account_id` (public partition).
pub fn inbox_items_for(store: &Arc<dyn ItemStore>, account_id: &AccountId) -> Vec<InboxItem> {
    let partition = format!("ACCOUNT#{account_id}");
    store
        .query(&KeyCondition { partition, sk_prefix: "INBOX#".to_owned() })
        .expect("query inbox items")
        .into_iter()
        .filter_map(parse_item::<InboxItem>)
        .collect()
}

// ============================================================================
// SECTION: Polling
// ============================================================================

/// Polls `poll` until it returns `Some`, or panics once `timeout` elapses.
pub fn wait_until<T>(timeout: Duration, mut poll: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = poll() {
            return value;
        }
        assert!(Instant::now() < deadline, "condition did not become true within {timeout:?}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

// ============================================================================
// SECTION: Recording Sleeper
// ============================================================================

/// A [`Sleeper`] that records requested durations instead of blocking,
/// so retry-backoff assertions run without real wall-clock delay.
#[derive(Default)]
pub struct RecordingSleeper {
    requested: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Returns every duration requested so far, in request order.
    pub fn requested(&self) -> Vec<Duration> {
        self.requested.lock().expect("lock poisoned").clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.requested.lock().expect("lock poisoned").push(duration);
    }
}

// ============================================================================
// SECTION: JIRA Stub Server
// ============================================================================

/// A scripted response: an HTTP status code and a JSON body.
#[derive(Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub body: String,
}

impl ScriptedResponse {
    /// A bare status code with an empty body.
    pub fn status(status: u16) -> Self {
        Self { status, body: String::new() }
    }

    /// A `200` with a small JSON body.
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self { status: 200, body: body.into() }
    }
}

/// A loopback HTTP server that replies to each request with the next
/// entry in a fixed script, repeating the last entry once exhausted, and
/// records how many requests it has seen.
pub struct JiraStub {
    base_url: String,
    requests_seen: Arc<std::sync::atomic::AtomicUsize>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl JiraStub {
    /// Starts the stub on an OS-assigned loopback port, replying per
    /// `script` in order (the last entry repeats once the script is
    /// exhausted).
    pub fn start(script: Vec<ScriptedResponse>) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind stub server");
        let base_url = format!("http://{}", server.server_addr());
        let requests_seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let requests_seen_worker = Arc::clone(&requests_seen);
        let shutdown_worker = Arc::clone(&shutdown);
        let join = std::thread::spawn(move || {
            let mut script = script;
            let mut next = 0usize;
            loop {
                if shutdown_worker.load(std::sync::atomic::Ordering::SeqCst) {
                    return;
                }
                let Ok(Some(request)) = server.recv_timeout(Duration::from_millis(50)) else { continue };
                let index = next.min(script.len().saturating_sub(1));
                let response = script.get_mut(index).cloned().unwrap_or_else(|| ScriptedResponse::status(200));
                next += 1;
                requests_seen_worker.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                let body = response.body.into_bytes();
                let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).expect("header");
                let reply = tiny_http::Response::from_data(body).with_status_code(response.status).with_header(header);
                let _ = request.respond(reply);
            }
        });

        Self { base_url, requests_seen, shutdown, join: Some(join) }
    }

    /// The stub's `http://host:port` prefix; point a connector's
    /// `base_url` at this.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Number of requests the stub has handled so far.
    pub fn requests_seen(&self) -> usize {
        self.requests_seen.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Drop for JiraStub {
    fn drop(&mut self) {
        self.shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// A gateway configuration that allows plain `http://127.0.0.1` calls,
/// for tests driving a [`JiraStub`].
pub fn stub_gateway_config() -> HttpGatewayConfig {
    HttpGatewayConfig { allow_http: true, allowed_hosts: vec!["127.0.0.1".to_owned()], ..HttpGatewayConfig::default() }
}
