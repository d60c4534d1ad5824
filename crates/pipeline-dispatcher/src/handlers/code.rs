// crates/pipeline-dispatcher/src/handlers/code.rs
// ============================================================================
// Module: Code Stage Handler (GitHub)
// Description: Verifies a repository and branch, then publishes connection
//              details into the execution's shared context for downstream
//              Deploy stages.
// Purpose: `spec.md` §4.7 Code handler contract.
// ============================================================================

use pipeline_core::plan::CompiledStage;
use pipeline_core::plan::ToolConfig;
use pipeline_core::ResolvedAuth;
use pipeline_providers::bearer_auth_header;
use pipeline_providers::HttpRequest;
use serde_json::json;

use crate::handlers::StageHandler;
use crate::handlers::StageOutcome;
use crate::retry::send_with_retry;
use crate::DispatchContext;
use crate::DispatchError;

/// Key the Code handler publishes its context under
/// (`spec.md` §4.7: "store `{repo, branch, token, basePath="pipelines"}`").
pub const SHARED_CONTEXT_KEY: &str = "github";

/// Handles `Code` stages against GitHub.
pub struct GithubCodeHandler;

impl StageHandler for GithubCodeHandler {
    fn execute(&self, ctx: &DispatchContext, stage: &CompiledStage, auth: Option<&ResolvedAuth>) -> Result<StageOutcome, DispatchError> {
        let ToolConfig::Github { owner, repo, branch } = &stage.tool_config else {
            return Err(DispatchError::Validation("Code stage missing github tool configuration".to_owned()));
        };
        let token = auth.and_then(|resolved| resolved.token.clone()).ok_or(DispatchError::AuthUnresolved)?;
        let header_value = bearer_auth_header(&token);

        let repo_url = format!("https://api.github.com/repos/{owner}/{repo}");
        let repo_request = HttpRequest::get(repo_url)
            .with_header("Authorization", header_value.clone())
            .with_header("User-Agent", "pipeline-dispatcher");
        let repo_response = send_with_retry(&ctx.gateway, &repo_request, &ctx.retry_policy, ctx.sleeper.as_ref())?;
        if repo_response.status >= 400 {
            return Ok(StageOutcome::failed(format!("repository lookup failed with status {}", repo_response.status)));
        }

        let branch_url = format!("https://api.github.com/repos/{owner}/{repo}/branches/{branch}");
        let branch_request = HttpRequest::get(branch_url).with_header("Authorization", header_value).with_header("User-Agent", "pipeline-dispatcher");
        let branch_response = send_with_retry(&ctx.gateway, &branch_request, &ctx.retry_policy, ctx.sleeper.as_ref())?;
        if branch_response.status >= 400 {
            return Ok(StageOutcome::failed(format!("branch lookup failed with status {}", branch_response.status)));
        }

        let context = json!({ "repo": format!("{owner}/{repo}"), "branch": branch, "token": token, "basePath": "pipelines" });
        if let Ok(mut shared) = ctx.shared_context.lock() {
            shared.insert(SHARED_CONTEXT_KEY.to_owned(), context.clone());
        }

        Ok(StageOutcome::success(format!("{owner}/{repo}@{branch} verified")).with_data(context))
    }
}
