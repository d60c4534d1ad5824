// crates/pipeline-providers/src/auth.rs
// ============================================================================
// Module: Auth headers
// Description: Header construction for JIRA Basic/PAT authentication.
// Purpose: Shared by Stage Dispatcher (C7) handlers talking to JIRA, which
//          the spec allows to authenticate with either scheme.
// Dependencies: base64
// ============================================================================

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Builds an `Authorization: Basic base64(username:token)` header value.
#[must_use]
pub fn basic_auth_header(username: &str, token: &str) -> String {
    let raw = format!("{username}:{token}");
    format!("Basic {}", STANDARD.encode(raw))
}

/// Builds an `Authorization: Bearer <token>` header value.
#[must_use]
pub fn bearer_auth_header(token: &str) -> String {
    format!("Bearer {token}")
}

#[cfg(test)]
mod tests {
    use super::basic_auth_header;
    use super::bearer_auth_header;

    #[test]
    fn basic_auth_encodes_username_and_token() {
        let header = basic_auth_header("alice", "secret");
        assert_eq!(header, "Basic YWxpY2U6c2VjcmV0");
    }

    #[test]
    fn bearer_auth_wraps_token() {
        assert_eq!(bearer_auth_header("pat-123"), "Bearer pat-123");
    }
}
