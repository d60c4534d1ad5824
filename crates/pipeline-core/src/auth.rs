// crates/pipeline-core/src/auth.rs
// ============================================================================
// Module: Resolved Auth
// Description: Normalized credential shape handed from the Credential
//              Resolver (C4) to Stage Dispatcher (C7) handlers.
// Dependencies: std::fmt
// ============================================================================

//! ## Overview
//! [`ResolvedAuth`] is the one shape every stage handler receives, whether
//! the underlying credential came from an inline YAML block or a stored
//! [`crate::entities::Credential`]. Its [`fmt::Debug`] impl is redacted so a
//! resolved auth value is safe to include in a log line by accident.

use std::fmt;

/// Authentication scheme a resolved credential carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    /// HTTP Basic, `username` + `api_key`/token.
    Basic,
    /// Bearer token / personal access token.
    Bearer,
    /// OAuth2 client-credentials grant (`client_id` + `client_secret` + `token_url`).
    OAuth2ClientCredentials,
}

/// Normalized credential resolved for one stage.
///
/// # Invariants
/// - Never printed via `{}`/`{:?}` with secret fields in the clear; use
///   [`ResolvedAuth::redacted`] for any surface a human or log sink reads.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedAuth {
    /// Authentication scheme.
    pub auth_type: AuthType,
    /// Username, for [`AuthType::Basic`].
    pub username: Option<String>,
    /// API key / token value, for [`AuthType::Basic`] or [`AuthType::Bearer`].
    pub token: Option<String>,
    /// OAuth2 client id, for [`AuthType::OAuth2ClientCredentials`].
    pub client_id: Option<String>,
    /// OAuth2 client secret, for [`AuthType::OAuth2ClientCredentials`].
    pub client_secret: Option<String>,
    /// OAuth2 token endpoint, for [`AuthType::OAuth2ClientCredentials`].
    pub token_url: Option<String>,
}

impl ResolvedAuth {
    /// Returns a value safe to log: every secret field replaced with a
    /// fixed-width redaction marker, non-secret shape preserved.
    #[must_use]
    pub fn redacted(&self) -> String {
        format!(
            "ResolvedAuth {{ auth_type: {:?}, username: {}, token: {}, client_id: {}, client_secret: {}, token_url: {} }}",
            self.auth_type,
            redact_opt(&self.username, false),
            redact_opt(&self.token, true),
            redact_opt(&self.client_id, false),
            redact_opt(&self.client_secret, true),
            redact_opt(&self.token_url, false),
        )
    }
}

fn redact_opt(value: &Option<String>, is_secret: bool) -> String {
    match value {
        None => "None".to_owned(),
        Some(_) if is_secret => "Some(<redacted>)".to_owned(),
        Some(v) => format!("Some({v:?})"),
    }
}

impl fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}
