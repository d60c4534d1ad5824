// crates/pipeline-engine/src/lib.rs
// ============================================================================
// Crate: pipeline-engine
// Description: Composes the Tenant Router (C1), Credential Resolver (C4),
//              Execution Coordinator (C8), Inbox/Approval Bridge (C9), and
//              Audit Recorder (C10) into the `Engine` API exposed to
//              controllers.
// Dependencies: pipeline-core, pipeline-compiler, pipeline-config,
//               pipeline-dispatcher, pipeline-providers
// ============================================================================

//! ## Overview
//! This crate is the outermost layer of the Pipeline Execution Engine. The
//! other workspace crates each own one narrow concern — compiling a graph,
//! dispatching one stage, speaking to one storage backend — and this crate
//! wires them into the handful of entities a controller actually calls:
//! [`Engine::run`], [`Engine::get_logs`], [`Engine::list_for_pipeline`], and
//! [`Engine::approve_stage`], plus the approval-inbox surface re-exported
//! from [`approval`].

pub mod approval;
pub mod audit;
pub mod coordinator;
pub mod credentials;
pub mod engine;
pub mod tenant_router;

pub use approval::ApprovalBridge;
pub use approval::ApprovalError;
pub use approval::ApprovalOutcome;
pub use audit::AuditParams;
pub use audit::AuditRecorder;
pub use coordinator::CoordinatorError;
pub use coordinator::ExecutionCoordinator;
pub use credentials::CredentialError;
pub use credentials::CredentialResolver;
pub use engine::Engine;
pub use engine::EngineError;
pub use engine::ExecutionSnapshot;
pub use engine::ExecutionListItem;
pub use engine::RunOutcome;
pub use tenant_router::DedicatedStoreResolver;
pub use tenant_router::TenantDirectory;
pub use tenant_router::TenantError;
pub use tenant_router::TenantRouter;
