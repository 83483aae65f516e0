//! Domain value types shared by the timer, ledger and reconciler.
//!
//! These are also the serialized shapes handed to a UI layer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::clock::local_day_bounds;
use crate::error::{Error, Result};

/// Sync status of a worklog without its associated data; used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
    Error,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "error" => Ok(SyncStatus::Error),
            other => Err(Error::Validation(format!("unknown sync status '{other}'"))),
        }
    }
}

/// Sync state of a worklog together with the data only valid in that state:
/// the remote id exists only once synced, the error message only after a failed push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "sync_status", rename_all = "lowercase")]
pub enum SyncState {
    Pending,
    Synced { remote_worklog_id: String },
    Error { sync_error: String },
}

impl SyncState {
    pub fn status(&self) -> SyncStatus {
        match self {
            SyncState::Pending => SyncStatus::Pending,
            SyncState::Synced { .. } => SyncStatus::Synced,
            SyncState::Error { .. } => SyncStatus::Error,
        }
    }

    pub fn remote_worklog_id(&self) -> Option<&str> {
        match self {
            SyncState::Synced { remote_worklog_id } => Some(remote_worklog_id),
            _ => None,
        }
    }

    pub fn sync_error(&self) -> Option<&str> {
        match self {
            SyncState::Error { sync_error } => Some(sync_error),
            _ => None,
        }
    }

    /// Rebuilds the state from its three storage columns, rejecting combinations that disagree.
    pub(crate) fn from_columns(
        status: &str,
        remote_worklog_id: Option<String>,
        sync_error: Option<String>,
    ) -> Option<Self> {
        match (status, remote_worklog_id, sync_error) {
            ("pending", None, None) => Some(SyncState::Pending),
            ("synced", Some(remote_worklog_id), None) => {
                Some(SyncState::Synced { remote_worklog_id })
            }
            ("error", None, Some(sync_error)) => Some(SyncState::Error { sync_error }),
            _ => None,
        }
    }
}

/// A durable record of time spent on one issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worklog {
    pub id: i64,
    pub issue_key: String,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub description: String,
    #[serde(flatten)]
    pub sync: SyncState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Worklog {
    pub fn status(&self) -> SyncStatus {
        self.sync.status()
    }
}

/// Fields of a worklog that is about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorklog {
    pub issue_key: String,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: i64,
    #[serde(default)]
    pub description: String,
}

impl NewWorklog {
    pub fn new(
        issue_key: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_seconds: i64,
    ) -> Self {
        Self {
            issue_key: issue_key.into(),
            started_at,
            duration_seconds,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_issue_key(&self.issue_key)?;
        validate_duration(self.duration_seconds)
    }
}

/// Partial edit of a worklog; `None` leaves the field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorklogChanges {
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl WorklogChanges {
    pub fn is_empty(&self) -> bool {
        self.duration_seconds.is_none() && self.description.is_none() && self.started_at.is_none()
    }

    pub fn duration(mut self, seconds: i64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn started_at(mut self, instant: DateTime<Utc>) -> Self {
        self.started_at = Some(instant);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self.duration_seconds {
            Some(seconds) => validate_duration(seconds),
            None => Ok(()),
        }
    }
}

/// Conjunctive filter for listing worklogs; unset fields impose no constraint.
/// `date_from` is inclusive and `date_to` exclusive, both compared with `started_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorklogFilter {
    #[serde(default)]
    pub issue_key: Option<String>,
    #[serde(default)]
    pub sync_status: Option<SyncStatus>,
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
}

impl WorklogFilter {
    pub fn issue(mut self, issue_key: impl Into<String>) -> Self {
        self.issue_key = Some(issue_key.into());
        self
    }

    pub fn status(mut self, status: SyncStatus) -> Self {
        self.sync_status = Some(status);
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    /// Restricts to entries started on the given local calendar day.
    pub fn on_local_day(self, date: chrono::NaiveDate) -> Self {
        let (from, to) = local_day_bounds(date);
        self.between(from, to)
    }
}

/// Aggregate outcome of a multi-item push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Outcome of pushing one worklog inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Synced {
        id: i64,
        remote_worklog_id: String,
    },
    Failed { id: i64, message: String },
}

impl FromIterator<PushOutcome> for PushSummary {
    fn from_iter<I: IntoIterator<Item = PushOutcome>>(outcomes: I) -> Self {
        outcomes
            .into_iter()
            .fold(PushSummary::default(), |mut summary, outcome| {
                summary.total += 1;
                match outcome {
                    PushOutcome::Synced { .. } => summary.success += 1,
                    PushOutcome::Failed { message, .. } => {
                        summary.failed += 1;
                        summary.errors.push(message);
                    }
                }
                summary
            })
    }
}

/// Aggregate outcome of importing remote worklogs for one day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub total: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Inserted { id: i64 },
    Skipped { remote_worklog_id: String },
    Failed {
        remote_worklog_id: String,
        message: String,
    },
    /// The worklogs of a whole issue could not be read.
    IssueFailed {
        issue_key: String,
        message: String,
    },
}

impl FromIterator<ImportOutcome> for ImportSummary {
    fn from_iter<I: IntoIterator<Item = ImportOutcome>>(outcomes: I) -> Self {
        outcomes
            .into_iter()
            .fold(ImportSummary::default(), |mut summary, outcome| {
                summary.total += 1;
                match outcome {
                    ImportOutcome::Inserted { .. } => summary.inserted += 1,
                    ImportOutcome::Skipped { .. } => summary.skipped += 1,
                    ImportOutcome::Failed {
                        remote_worklog_id,
                        message,
                    } => {
                        summary.failed += 1;
                        summary.errors.push(format!("{remote_worklog_id}: {message}"));
                    }
                    ImportOutcome::IssueFailed { issue_key, message } => {
                        summary.failed += 1;
                        summary.errors.push(format!("{issue_key}: {message}"));
                    }
                }
                summary
            })
    }
}

/// The single in-progress timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSession {
    pub issue_key: String,
    /// Start of the current running segment; refreshed on resume.
    pub started_at: DateTime<Utc>,
    /// Seconds banked from all earlier segments, frozen while paused.
    pub accumulated_seconds: i64,
    pub is_paused: bool,
    pub description: String,
}

impl TimerSession {
    pub fn begin(issue_key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            issue_key: issue_key.into(),
            started_at: now,
            accumulated_seconds: 0,
            is_paused: false,
            description: String::new(),
        }
    }

    /// Total tracked seconds at `now`, truncated to whole seconds and never negative.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        let banked = self.accumulated_seconds.max(0);
        if self.is_paused {
            banked
        } else {
            banked + (now - self.started_at).num_seconds().max(0)
        }
    }

    pub(crate) fn paused_at(&self, now: DateTime<Utc>) -> Self {
        Self {
            accumulated_seconds: self.elapsed_seconds(now),
            is_paused: true,
            ..self.clone()
        }
    }

    pub(crate) fn resumed_at(&self, now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            is_paused: false,
            ..self.clone()
        }
    }

    /// The worklog this session becomes when stopped at `now`; it ends at `now`.
    pub(crate) fn into_worklog(self, now: DateTime<Utc>) -> NewWorklog {
        let duration_seconds = self.elapsed_seconds(now);
        NewWorklog {
            issue_key: self.issue_key,
            started_at: now - Duration::seconds(duration_seconds),
            duration_seconds,
            description: self.description,
        }
    }
}

/// Identity and duration of the worklog produced by stopping a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoppedWorklog {
    pub id: i64,
    pub issue_key: String,
    pub duration_seconds: i64,
}

impl From<&Worklog> for StoppedWorklog {
    fn from(worklog: &Worklog) -> Self {
        Self {
            id: worklog.id,
            issue_key: worklog.issue_key.clone(),
            duration_seconds: worklog.duration_seconds,
        }
    }
}

fn validate_issue_key(issue_key: &str) -> Result<()> {
    if issue_key.trim().is_empty() {
        return Err(Error::Validation("issue key must not be empty".to_string()));
    }
    Ok(())
}

fn validate_duration(seconds: i64) -> Result<()> {
    if seconds < 0 {
        return Err(Error::Validation(format!(
            "duration must not be negative (got {seconds}s)"
        )));
    }
    Ok(())
}
