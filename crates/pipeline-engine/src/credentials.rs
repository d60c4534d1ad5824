// crates/pipeline-engine/src/credentials.rs
// ============================================================================
// Module: Credential Resolver (C4)
// Description: Resolves a stage's ResolvedAuth from a stored Credential,
//              probing well-known label spellings.
// Purpose: Normalize whatever raw label a credential was entered under into
//          the shape the Stage Dispatcher's handlers expect.
// Dependencies: pipeline-core, pipeline-engine::tenant_router
// ============================================================================

//! ## Overview
//! [`CredentialResolver::resolve`] is the only path a stage handler's
//! secrets travel through. A [`CompiledStage`] in this redesign never
//! carries inline plaintext auth — `ToolConfig` holds structural connector
//! fields only — so resolution always goes through a stored [`Credential`],
//! fetched via the Tenant Router (C1) and Item Store Gateway (C2). A stage
//! with no `credential_id` resolves to `Ok(None)`; handlers that require
//! auth surface `DispatchError::AuthUnresolved` themselves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use pipeline_core::entities::Credential;
use pipeline_core::identifiers::AccountId;
use pipeline_core::identifiers::CredentialId;
use pipeline_core::plan::CompiledStage;
use pipeline_core::telemetry::EventSink;
use pipeline_core::AuthType;
use pipeline_core::ItemKey;
use pipeline_core::ItemStore as _;
use pipeline_core::ResolvedAuth;
use pipeline_core::StoreError;
use thiserror::Error;

use crate::tenant_router::TenantError;
use crate::tenant_router::TenantRouter;

// ============================================================================
// SECTION: Label Probing
// ============================================================================

const USERNAME_LABELS: &[&str] = &["username", "Username", "user", "User"];
const SECRET_LABELS: &[&str] = &["apiToken", "API Key", "Personal Access Token", "token", "Token", "apiKey", "api_key"];
const CLIENT_ID_LABELS: &[&str] = &["clientId", "Client ID", "client_id"];
const CLIENT_SECRET_LABELS: &[&str] = &["clientSecret", "Client Secret", "client_secret"];
const TOKEN_URL_LABELS: &[&str] = &["tokenUrl", "Token URL", "token_url"];

fn probe<'a>(fields: &'a std::collections::BTreeMap<String, String>, labels: &[&str]) -> Option<&'a str> {
    labels.iter().find_map(|label| fields.get(*label)).map(String::as_str)
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while resolving a stage's credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The stage's `credential_id` does not exist for this account.
    #[error("credential {0} not found")]
    NotFound(CredentialId),
    /// The tenant route for this account could not be resolved.
    #[error(transparent)]
    Tenant(#[from] TenantError),
    /// The item store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The stored credential's attributes did not deserialize as expected.
    #[error("invalid credential record: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Resolves [`ResolvedAuth`] for compiled stages.
pub struct CredentialResolver {
    tenant_router: Arc<TenantRouter>,
}

impl CredentialResolver {
    /// Builds a resolver backed by `tenant_router`.
    #[must_use]
    pub const fn new(tenant_router: Arc<TenantRouter>) -> Self {
        Self { tenant_router }
    }

    /// Resolves `stage`'s auth for `account_id`. Returns `Ok(None)` when the
    /// stage declares no `credential_id` — the caller's handler is
    /// responsible for erroring if auth turns out to be required.
    ///
    /// # Errors
    /// Returns [`CredentialError`] if the credential is declared but cannot
    /// be fetched or does not parse.
    pub fn resolve(&self, stage: &CompiledStage, account_id: &AccountId, sink: &dyn EventSink) -> Result<Option<ResolvedAuth>, CredentialError> {
        let Some(credential_id) = &stage.credential_id else {
            return Ok(None);
        };

        let route = self.tenant_router.resolve(account_id, sink)?;
        let key = ItemKey::new(format!("ACCOUNT#{account_id}"), format!("CREDENTIAL#{credential_id}"));
        let item = route.store.get(&key, false)?.ok_or_else(|| CredentialError::NotFound(credential_id.clone()))?;
        let value = serde_json::Value::Object(item.attributes.into_iter().collect());
        let credential: Credential = serde_json::from_value(value).map_err(|err| CredentialError::Invalid(err.to_string()))?;

        normalize(&credential).map(Some)
    }
}

fn normalize(credential: &Credential) -> Result<ResolvedAuth, CredentialError> {
    let username = probe(&credential.fields, USERNAME_LABELS).map(ToOwned::to_owned);
    let token = probe(&credential.fields, SECRET_LABELS).map(ToOwned::to_owned);
    let client_id = probe(&credential.fields, CLIENT_ID_LABELS).map(ToOwned::to_owned);
    let client_secret = probe(&credential.fields, CLIENT_SECRET_LABELS).map(ToOwned::to_owned);
    let token_url = probe(&credential.fields, TOKEN_URL_LABELS).map(ToOwned::to_owned);

    let auth_type = match credential.connector_type.as_str() {
        "sap" => AuthType::OAuth2ClientCredentials,
        "jira" if username.is_some() && token.is_some() => AuthType::Basic,
        "jira" | "github" => AuthType::Bearer,
        other => return Err(CredentialError::Invalid(format!("unrecognized connector type: {other}"))),
    };

    Ok(ResolvedAuth { auth_type, username, token, client_id, client_secret, token_url })
}
