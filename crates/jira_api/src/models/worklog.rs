use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::Value;

use crate::models::adf;

/// Timestamp layout Jira uses for `started`, e.g. `2021-01-17T12:34:00.000+0000`.
pub const JIRA_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WorklogAuthor {
    pub account_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WorklogEntry {
    pub id: String,
    pub started: String,
    #[serde(default)]
    pub updated: Option<String>,
    pub time_spent_seconds: i64,
    #[serde(default)]
    pub comment: Option<Value>,
    pub author: WorklogAuthor,
}

impl WorklogEntry {
    /// Parses `started`, accepting both Jira's compact offset and RFC 3339.
    pub fn started_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_str(&self.started, "%Y-%m-%dT%H:%M:%S%.f%z")
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(&self.started).ok())
    }

    /// Plain text of the ADF comment, empty when there is none.
    pub fn comment_text(&self) -> String {
        self.comment.as_ref().map(adf::extract_text).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorklogPage {
    #[serde(default)]
    pub start_at: u64,
    #[serde(default)]
    pub max_results: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub worklogs: Vec<WorklogEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorklogCreated {
    pub id: String,
}
