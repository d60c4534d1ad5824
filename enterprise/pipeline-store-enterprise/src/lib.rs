// enterprise/pipeline-store-enterprise/src/lib.rs
// ============================================================================
// Crate: pipeline-store-enterprise
// Description: Postgres-backed Item Store Gateway (C2) for dedicated/private
//              cloudType accounts.
// Dependencies: pipeline-core, pipeline-engine, postgres, r2d2, r2d2_postgres
// ============================================================================

//! Dedicated-tenant storage backend.
//!
//! The shared data plane runs on [`pipeline_store_sqlite`](../pipeline_store_sqlite/index.html);
//! accounts provisioned onto a dedicated data plane resolve here instead. A
//! [`postgres_store::PostgresDedicatedStoreResolver`] holds one connection
//! pool per named dedicated store and implements the Tenant Router's
//! [`pipeline_engine::DedicatedStoreResolver`] trait, so `TenantRouter::new`
//! can be handed this crate's resolver without knowing it is Postgres
//! underneath.

/// Postgres-backed item store and dedicated-store resolver.
pub mod postgres_store;
