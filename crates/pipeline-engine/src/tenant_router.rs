// crates/pipeline-engine/src/tenant_router.rs
// ============================================================================
// Module: Tenant Router (C1)
// Description: Resolves AccountId -> { store, isPrivate }, TTL-cached, with
//              per-account serialized cache-miss resolution.
// Purpose: Keep every C2 caller ignorant of which concrete store backs a
//          given account.
// Dependencies: pipeline-core, std::sync
// ============================================================================

//! ## Overview
//! [`TenantRouter`] sits in front of a [`TenantDirectory`] (the
//! account-metadata lookup) and a [`DedicatedStoreResolver`] (turns a
//! dedicated-store name into a live [`ItemStore`] handle). Routes are
//! cached with a bounded TTL; a cache miss locks a per-account mutex before
//! calling the directory, so concurrent callers for the same account don't
//! all hit the directory at once.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::time::Duration;
use std::time::Instant;

use pipeline_core::entities::CloudType;
use pipeline_core::identifiers::AccountId;
use pipeline_core::telemetry::EngineEvent;
use pipeline_core::telemetry::EventSink;
use pipeline_core::ItemStore;
use thiserror::Error;

// ============================================================================
// SECTION: Directory & Store Resolution
// ============================================================================

/// One account's data-plane placement, as recorded in the control-plane
/// account-metadata store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Data-plane placement.
    pub cloud_type: CloudType,
    /// Dedicated store name, present when `cloud_type != Public`.
    pub dedicated_store: Option<String>,
}

/// Looks up an account's data-plane placement. Implementations back this
/// with whatever control-plane store holds account metadata.
pub trait TenantDirectory: Send + Sync {
    /// Looks up `account_id`'s placement.
    ///
    /// # Errors
    /// Returns a human-readable error string on any lookup failure
    /// (unknown account, backend unavailable).
    fn lookup(&self, account_id: &AccountId) -> Result<DirectoryEntry, String>;
}

/// Resolves a dedicated-store name to a live [`ItemStore`] handle.
pub trait DedicatedStoreResolver: Send + Sync {
    /// Resolves `store_name` to a live store.
    ///
    /// # Errors
    /// Returns a human-readable error string if the named store cannot be
    /// reached.
    fn resolve(&self, store_name: &str) -> Result<Arc<dyn ItemStore>, String>;
}

// ============================================================================
// SECTION: Route & Errors
// ============================================================================

/// A resolved route for one account.
#[derive(Clone)]
pub struct TenantRoute {
    /// Store handle to use for this account's items.
    pub store: Arc<dyn ItemStore>,
    /// Whether this account resolves to a dedicated data plane.
    pub is_private: bool,
}

/// Errors raised while resolving a tenant route.
#[derive(Debug, Error)]
pub enum TenantError {
    /// A known-private account's dedicated store could not be reached; the
    /// router never silently downgrades this to the shared store.
    #[error("dedicated store unavailable for account {account_id}: {reason}")]
    RouteUnavailable {
        /// The account whose route could not be resolved.
        account_id: AccountId,
        /// Underlying resolver failure.
        reason: String,
    },
}

struct CachedRoute {
    route: TenantRoute,
    expires_at: Instant,
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Resolves and caches `AccountId -> TenantRoute`.
pub struct TenantRouter {
    directory: Arc<dyn TenantDirectory>,
    dedicated: Arc<dyn DedicatedStoreResolver>,
    shared_store: Arc<dyn ItemStore>,
    ttl: Duration,
    cache: RwLock<HashMap<AccountId, CachedRoute>>,
    resolution_locks: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
}

impl TenantRouter {
    /// Builds a router backed by `directory` and `dedicated`, falling back
    /// to `shared_store` for public/hybrid accounts and for accounts the
    /// directory cannot place.
    #[must_use]
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        dedicated: Arc<dyn DedicatedStoreResolver>,
        shared_store: Arc<dyn ItemStore>,
        ttl: Duration,
    ) -> Self {
        Self { directory, dedicated, shared_store, ttl, cache: RwLock::new(HashMap::new()), resolution_locks: Mutex::new(HashMap::new()) }
    }

    /// Resolves `account_id`'s route, serving from cache when fresh.
    ///
    /// # Errors
    /// Returns [`TenantError::RouteUnavailable`] if the account is known to
    /// be private but its dedicated store cannot be reached.
    pub fn resolve(&self, account_id: &AccountId, sink: &dyn EventSink) -> Result<TenantRoute, TenantError> {
        if let Some(route) = self.cached(account_id) {
            sink.record(EngineEvent::TenantRouted { account_id: account_id.to_string(), is_private: route.is_private, cache_hit: true });
            return Ok(route);
        }

        let account_lock = self.account_lock(account_id);
        let _guard = account_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(route) = self.cached(account_id) {
            sink.record(EngineEvent::TenantRouted { account_id: account_id.to_string(), is_private: route.is_private, cache_hit: true });
            return Ok(route);
        }

        let route = self.resolve_uncached(account_id)?;
        self.cache_route(account_id, route.clone());
        sink.record(EngineEvent::TenantRouted { account_id: account_id.to_string(), is_private: route.is_private, cache_hit: false });
        Ok(route)
    }

    fn resolve_uncached(&self, account_id: &AccountId) -> Result<TenantRoute, TenantError> {
        match self.directory.lookup(account_id) {
            Ok(DirectoryEntry { cloud_type: CloudType::Private, dedicated_store: Some(name) }) => match self.dedicated.resolve(&name) {
                Ok(store) => Ok(TenantRoute { store, is_private: true }),
                Err(reason) => Err(TenantError::RouteUnavailable { account_id: account_id.clone(), reason }),
            },
            Ok(DirectoryEntry { cloud_type: CloudType::Private, dedicated_store: None }) => {
                Err(TenantError::RouteUnavailable { account_id: account_id.clone(), reason: "private account has no dedicated store name recorded".to_owned() })
            }
            // Hybrid accounts keep operational records (executions, inbox items) on the shared
            // store; only selected control-plane records diverge, which this router does not model.
            Ok(DirectoryEntry { cloud_type: CloudType::Public | CloudType::Hybrid, .. }) => {
                Ok(TenantRoute { store: Arc::clone(&self.shared_store), is_private: false })
            }
            // Unknown account: fall back to the shared store rather than fail admission.
            Err(_) => Ok(TenantRoute { store: Arc::clone(&self.shared_store), is_private: false }),
        }
    }

    fn cached(&self, account_id: &AccountId) -> Option<TenantRoute> {
        let cache = self.cache.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = cache.get(account_id)?;
        if entry.expires_at > Instant::now() {
            Some(entry.route.clone())
        } else {
            None
        }
    }

    fn cache_route(&self, account_id: &AccountId, route: TenantRoute) {
        let mut cache = self.cache.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        cache.insert(account_id.clone(), CachedRoute { route, expires_at: Instant::now() + self.ttl });
    }

    fn account_lock(&self, account_id: &AccountId) -> Arc<Mutex<()>> {
        let mut locks = self.resolution_locks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(locks.entry(account_id.clone()).or_insert_with(|| Arc::new(Mutex::new(()))))
    }
}
