//! Account model returned by the `myself` endpoint.

use serde::{Deserialize, Serialize};

/// Authenticated Jira account: the id used to match worklog authors plus display data.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JiraUser {
    pub account_id: String,
    pub display_name: String,
    #[serde(default)]
    pub email_address: Option<String>,
}
