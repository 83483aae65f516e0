//! Basic authentication header used by Jira Cloud API tokens.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

/// Builds the `Authorization` value for an email/API-token pair.
pub fn basic_auth_value(email: &str, api_token: &str) -> String {
    let credentials = format!("{}:{}", email.trim(), api_token.trim());
    format!("Basic {}", BASE64_STANDARD.encode(credentials))
}
