// crates/pipeline-providers/src/lib.rs
// ============================================================================
// Crate: pipeline-providers
// Description: Blocking, SSRF-safe HTTP gateway for outbound stage calls.
// Purpose: Shared transport used by the Stage Dispatcher (C7) to reach JIRA,
//          GitHub, and SAP Cloud Integration.
// Dependencies: pipeline-core, reqwest, serde_json, url, base64, thiserror
// ============================================================================

//! ## Overview
//! Stage handlers never build their own [`reqwest::blocking::Client`]; they
//! go through [`HttpGateway`], which pins the connect timeout, caps response
//! size, forbids redirects, and restricts outbound hosts to an explicit
//! allowlist. The client is blocking rather than async even though the rest
//! of the workspace may use `tokio` elsewhere: stage execution is dispatched
//! from worker *threads* (see the Execution Coordinator), not async tasks,
//! so a blocking client is the natural fit here.
//!
//! Security posture: target URLs are effectively caller-controlled (derived
//! from stored connector configuration); every request is validated against
//! `HttpGatewayConfig` before being sent.

pub mod auth;
pub mod gateway;

pub use auth::basic_auth_header;
pub use auth::bearer_auth_header;
pub use gateway::HttpError;
pub use gateway::HttpGateway;
pub use gateway::HttpGatewayConfig;
pub use gateway::HttpMethod;
pub use gateway::HttpRequest;
pub use gateway::HttpResponse;
