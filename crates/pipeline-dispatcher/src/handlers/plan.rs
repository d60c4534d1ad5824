// crates/pipeline-dispatcher/src/handlers/plan.rs
// ============================================================================
// Module: Plan Stage Handler (JIRA)
// Description: Verifies a JIRA issue, or probes connectivity when no issue
//              key is configured.
// Purpose: `spec.md` §4.7 Plan handler contract.
// ============================================================================

use pipeline_core::plan::CompiledStage;
use pipeline_core::plan::ToolConfig;
use pipeline_core::AuthType;
use pipeline_core::ResolvedAuth;
use pipeline_providers::basic_auth_header;
use pipeline_providers::bearer_auth_header;
use pipeline_providers::HttpRequest;

use crate::handlers::StageHandler;
use crate::handlers::StageOutcome;
use crate::retry::send_with_retry;
use crate::DispatchContext;
use crate::DispatchError;

/// Handles `Plan` stages against a JIRA instance.
pub struct JiraPlanHandler;

impl StageHandler for JiraPlanHandler {
    fn execute(&self, ctx: &DispatchContext, stage: &CompiledStage, auth: Option<&ResolvedAuth>) -> Result<StageOutcome, DispatchError> {
        let ToolConfig::Jira { base_url, issue_key } = &stage.tool_config else {
            return Err(DispatchError::Validation("Plan stage missing jira tool configuration".to_owned()));
        };
        let auth = auth.ok_or(DispatchError::AuthUnresolved)?;
        let header_value = auth_header(auth)?;

        let path = issue_key
            .as_ref()
            .map_or_else(|| "rest/api/3/myself".to_owned(), |key| format!("rest/api/3/issue/{key}"));
        let url = format!("{}/{path}", base_url.trim_end_matches('/'));
        let request = HttpRequest::get(url).with_header("Authorization", header_value);

        let response = send_with_retry(&ctx.gateway, &request, &ctx.retry_policy, ctx.sleeper.as_ref())?;
        if response.status >= 400 {
            return Ok(StageOutcome::failed(format!("jira responded with status {}", response.status)));
        }
        let probe = issue_key.as_deref().map_or_else(|| "connectivity probe".to_owned(), |key| format!("issue {key} verified"));
        Ok(StageOutcome::success(format!("jira {probe}")))
    }
}

fn auth_header(auth: &ResolvedAuth) -> Result<String, DispatchError> {
    match auth.auth_type {
        AuthType::Basic => {
            let username = auth.username.as_deref().ok_or(DispatchError::AuthUnresolved)?;
            let token = auth.token.as_deref().ok_or(DispatchError::AuthUnresolved)?;
            Ok(basic_auth_header(username, token))
        }
        AuthType::Bearer => {
            let token = auth.token.as_deref().ok_or(DispatchError::AuthUnresolved)?;
            Ok(bearer_auth_header(token))
        }
        AuthType::OAuth2ClientCredentials => Err(DispatchError::Validation("jira does not support oauth2 client-credentials".to_owned())),
    }
}
