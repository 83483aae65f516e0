//! The remote issue tracker as the reconciler sees it, and its Jira Cloud implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use jira_api::{JiraClient, JiraConfig, JiraError, JIRA_DATETIME_FORMAT};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::clock::local_day_bounds;
use crate::error::RemoteError;
use crate::format::log_safe;
use crate::models::WorklogChanges;

pub type RemoteUser = jira_api::JiraUser;
pub type RemoteIssue = jira_api::Issue;

/// Issues returned by one import search; a day's worklogs rarely span more.
const IMPORT_SEARCH_LIMIT: u32 = 100;

/// A worklog as it exists on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteWorklog {
    pub remote_id: String,
    pub issue_key: String,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub description: String,
}

/// An issue whose worklogs could not be read during an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueFailure {
    pub issue_key: String,
    pub message: String,
}

/// What one day's import found: the worklogs that were read, plus the issues that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteDay {
    pub worklogs: Vec<RemoteWorklog>,
    pub failures: Vec<IssueFailure>,
}

impl From<Vec<RemoteWorklog>> for RemoteDay {
    fn from(worklogs: Vec<RemoteWorklog>) -> Self {
        Self {
            worklogs,
            failures: Vec::new(),
        }
    }
}

/// Remote operations the reconciler depends on. Every failure is reported as a
/// [`RemoteError`] whose message is fit for showing next to the affected entry.
#[async_trait]
pub trait IssueTrackingClient: Send + Sync {
    async fn test_connection(&self) -> Result<RemoteUser, RemoteError>;

    async fn search(&self, query: &str, max_results: u32)
        -> Result<Vec<RemoteIssue>, RemoteError>;

    /// Returns the id the remote side assigned.
    async fn create_remote_worklog(
        &self,
        issue_key: &str,
        started_at: DateTime<Utc>,
        duration_seconds: i64,
        description: &str,
    ) -> Result<String, RemoteError>;

    /// Sends only the fields set in `changes`.
    async fn update_remote_worklog(
        &self,
        issue_key: &str,
        remote_id: &str,
        changes: &WorklogChanges,
    ) -> Result<(), RemoteError>;

    async fn delete_remote_worklog(
        &self,
        issue_key: &str,
        remote_id: &str,
    ) -> Result<(), RemoteError>;

    /// The current user's worklogs started on `date` in the local timezone. An issue whose
    /// worklogs cannot be read is reported in [`RemoteDay::failures`] and the rest go on.
    async fn import_worklogs_for_date(&self, date: NaiveDate) -> Result<RemoteDay, RemoteError>;
}

impl From<JiraError> for RemoteError {
    fn from(err: JiraError) -> Self {
        RemoteError::new(err.to_string())
    }
}

fn jira_timestamp(instant: DateTime<Utc>) -> String {
    instant.format(JIRA_DATETIME_FORMAT).to_string()
}

/// [`IssueTrackingClient`] backed by the Jira Cloud REST API.
pub struct JiraTracker {
    client: JiraClient,
}

impl JiraTracker {
    pub fn new(client: JiraClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: JiraConfig) -> Result<Self, RemoteError> {
        Ok(Self::new(JiraClient::new(config)?))
    }

    pub fn client(&self) -> &JiraClient {
        &self.client
    }
}

#[async_trait]
impl IssueTrackingClient for JiraTracker {
    async fn test_connection(&self) -> Result<RemoteUser, RemoteError> {
        Ok(self.client.get_myself().await?)
    }

    async fn search(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<RemoteIssue>, RemoteError> {
        Ok(self.client.search_issues(query, max_results).await?)
    }

    async fn create_remote_worklog(
        &self,
        issue_key: &str,
        started_at: DateTime<Utc>,
        duration_seconds: i64,
        description: &str,
    ) -> Result<String, RemoteError> {
        let created = self
            .client
            .add_worklog(
                issue_key,
                &jira_timestamp(started_at),
                duration_seconds,
                description,
            )
            .await?;
        Ok(created.id)
    }

    async fn update_remote_worklog(
        &self,
        issue_key: &str,
        remote_id: &str,
        changes: &WorklogChanges,
    ) -> Result<(), RemoteError> {
        let started = changes.started_at.map(jira_timestamp);
        self.client
            .update_worklog(
                issue_key,
                remote_id,
                started.as_deref(),
                changes.duration_seconds,
                changes.description.as_deref(),
            )
            .await?;
        Ok(())
    }

    async fn delete_remote_worklog(
        &self,
        issue_key: &str,
        remote_id: &str,
    ) -> Result<(), RemoteError> {
        Ok(self.client.delete_worklog(issue_key, remote_id).await?)
    }

    async fn import_worklogs_for_date(&self, date: NaiveDate) -> Result<RemoteDay, RemoteError> {
        let me = self.client.get_myself().await?;
        let (day_start, day_end) = local_day_bounds(date);
        let jql = format!(
            "worklogAuthor = currentUser() AND worklogDate = \"{}\"",
            date.format("%Y-%m-%d")
        );
        let issues = self.client.search_issues(&jql, IMPORT_SEARCH_LIMIT).await?;
        debug!("import {date}: {} candidate issues", issues.len());

        let mut found = RemoteDay::default();
        for issue in issues {
            let entries = match self
                .client
                .get_issue_worklogs(&issue.key, Some(day_start.timestamp_millis()))
                .await
            {
                Ok(entries) => entries,
                Err(err) => {
                    let message = err.to_string();
                    warn!(
                        "import {date}: worklogs of {} unavailable: {}",
                        issue.key,
                        log_safe(&message)
                    );
                    found.failures.push(IssueFailure {
                        issue_key: issue.key.clone(),
                        message,
                    });
                    continue;
                }
            };
            for entry in entries {
                if entry.author.account_id != me.account_id {
                    continue;
                }
                let Some(started) = entry.started_at() else {
                    warn!(
                        "skipping worklog {} on {}: unparseable start '{}'",
                        entry.id,
                        issue.key,
                        log_safe(&entry.started)
                    );
                    continue;
                };
                let started_at = started.with_timezone(&Utc);
                if started_at < day_start || started_at >= day_end {
                    continue;
                }
                found.worklogs.push(RemoteWorklog {
                    description: entry.comment_text(),
                    remote_id: entry.id,
                    issue_key: issue.key.clone(),
                    started_at,
                    duration_seconds: entry.time_spent_seconds,
                });
            }
        }
        Ok(found)
    }
}
