// crates/pipeline-providers/src/gateway.rs
// ============================================================================
// Module: HTTP Gateway
// Description: SSRF-safe, size-limited blocking HTTP client wrapper.
// Purpose: Single chokepoint for every outbound call the Stage Dispatcher
//          (C7) makes to JIRA, GitHub, and SAP Cloud Integration.
// Dependencies: reqwest, url, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`HttpGateway`] enforces the transport-level posture `spec.md` §4.7/§5
//! requires: a 60s per-call timeout, no redirect following, and (new in this
//! gateway relative to a bare `reqwest` client) an explicit host allowlist
//! and a response-size cap. Retry and circuit-breaker wrapping happen one
//! layer up, in the dispatcher, so this type stays a thin, single-attempt
//! transport.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Read as _;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::redirect::Policy;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default per-call timeout (`spec.md` §6 `STAGE_TIMEOUT_MS`).
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
/// Default maximum response body size accepted from a downstream.
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 10 * 1024 * 1024;

/// Configuration for an [`HttpGateway`].
///
/// # Invariants
/// - `allowed_hosts`, when non-empty, is the exhaustive set of hosts this
///   gateway will contact; anything else is rejected before a connection is
///   attempted.
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// Per-call timeout.
    pub timeout: Duration,
    /// Maximum response body size accepted.
    pub max_response_bytes: u64,
    /// Host allowlist; empty means "no restriction" (used for stub servers
    /// in tests, never in production configuration).
    pub allowed_hosts: Vec<String>,
    /// Whether plain `http://` URLs are permitted (tests only; production
    /// connector configuration should always be `https://`).
    pub allow_http: bool,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            allowed_hosts: Vec::new(),
            allow_http: false,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors surfaced by [`HttpGateway`]. These map onto `spec.md` §7's
/// `Transient` error kind at the dispatcher layer; the gateway itself does
/// not classify retryability.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The target URL failed validation (scheme, host allowlist).
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
    /// The response body exceeded `max_response_bytes`.
    #[error("response body exceeded {limit} bytes")]
    ResponseTooLarge {
        /// Configured limit in bytes.
        limit: u64,
    },
    /// The underlying transport failed (connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),
}

impl HttpError {
    /// Whether this error should count as a `spec.md` §4.7 transport-level
    /// retry condition (as opposed to a validation failure at the call
    /// site).
    #[must_use]
    pub const fn is_transport_failure(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

// ============================================================================
// SECTION: Request / Response
// ============================================================================

/// HTTP method, kept as a closed set matching what stage handlers need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// `GET`.
    Get,
    /// `POST`.
    Post,
    /// `PUT`.
    Put,
}

/// An outbound HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute target URL.
    pub url: String,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// Optional request body.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Builds a bare `GET` request to `url`.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self { method: HttpMethod::Get, url: url.into(), headers: BTreeMap::new(), body: None }
    }

    /// Sets a single request header, replacing any existing value.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Response from a completed request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes, truncation-checked against the gateway's limit.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is a server error (`spec.md` §4.7 retry condition).
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

// ============================================================================
// SECTION: Gateway
// ============================================================================

/// SSRF-safe, size-limited blocking HTTP gateway.
pub struct HttpGateway {
    /// Static configuration.
    config: HttpGatewayConfig,
    /// Underlying blocking client, built once per gateway with redirects
    /// disabled and the configured timeout.
    client: Client,
}

impl HttpGateway {
    /// Builds a gateway from `config`.
    ///
    /// # Errors
    /// Returns [`HttpError::Transport`] if the underlying client cannot be
    /// constructed (e.g. an invalid TLS configuration).
    pub fn new(config: HttpGatewayConfig) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|err| HttpError::Transport(err.to_string()))?;
        Ok(Self { config, client })
    }

    /// Validates `request.url` against the scheme and host allowlist before
    /// a connection is attempted.
    fn validate_url(&self, raw: &str) -> Result<Url, HttpError> {
        let url = Url::parse(raw).map_err(|err| HttpError::InvalidUrl(err.to_string()))?;
        match url.scheme() {
            "https" => {}
            "http" if self.config.allow_http => {}
            other => return Err(HttpError::InvalidUrl(format!("unsupported scheme: {other}"))),
        }
        if !self.config.allowed_hosts.is_empty() {
            let host = url.host_str().unwrap_or_default();
            if !self.config.allowed_hosts.iter().any(|allowed| allowed == host) {
                return Err(HttpError::InvalidUrl(format!("host not allowlisted: {host}")));
            }
        }
        Ok(url)
    }

    /// Sends `request` once (no retry — callers wrap this with their own
    /// retry/backoff policy, typically through a [`pipeline_core::CircuitBreaker`]).
    ///
    /// # Errors
    /// Returns [`HttpError`] on URL validation failure, transport failure,
    /// or an oversized response body.
    pub fn send(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        let url = self.validate_url(&request.url)?;
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        let response = builder.send().map_err(|err| HttpError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        let body = self.read_response_limited(response)?;
        Ok(HttpResponse { status, body })
    }

    /// Reads the response body, aborting once `max_response_bytes` is
    /// exceeded rather than buffering an unbounded downstream response.
    fn read_response_limited(&self, response: Response) -> Result<Vec<u8>, HttpError> {
        let limit = self.config.max_response_bytes;
        let mut reader = response.take(limit + 1);
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).map_err(|err| HttpError::Transport(err.to_string()))?;
        if buffer.len() as u64 > limit {
            return Err(HttpError::ResponseTooLarge { limit });
        }
        Ok(buffer)
    }
}
