// crates/pipeline-core/src/lib.rs
// ============================================================================
// Crate: pipeline-core
// Description: Domain types, item-store interface, circuit breaker, and
//              telemetry shared by every other Pipeline Execution Engine
//              crate.
// ============================================================================

//! ## Overview
//! `pipeline-core` has no dependency on any concrete storage, HTTP, or
//! scheduling implementation. It defines the vocabulary the rest of the
//! workspace shares: identifiers, persisted entity shapes, the compiled
//! pipeline IR, the [`interfaces::ItemStore`] trait, the circuit breaker
//! (C3), and the event-telemetry seam.

pub mod auth;
pub mod breaker;
pub mod entities;
pub mod identifiers;
pub mod interfaces;
pub mod plan;
pub mod telemetry;
pub mod time;

pub use auth::AuthType;
pub use auth::ResolvedAuth;
pub use breaker::BreakerError;
pub use breaker::BreakerMetrics;
pub use breaker::BreakerPhase;
pub use breaker::CircuitBreaker;
pub use breaker::CircuitBreakerConfig;
pub use interfaces::AttributeMap;
pub use interfaces::Condition;
pub use interfaces::Item;
pub use interfaces::ItemKey;
pub use interfaces::ItemRecord;
pub use interfaces::ItemStore;
pub use interfaces::KeyCondition;
pub use interfaces::StoreError;
pub use interfaces::TransactOp;
pub use interfaces::MAX_BATCH_ITEMS;
