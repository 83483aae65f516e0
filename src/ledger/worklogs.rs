//! Worklog rows: create, read, partial update, delete and filtered listing.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::Ledger;
use crate::clock::{parse_storage, to_storage};
use crate::error::{Error, Result};
use crate::models::{NewWorklog, SyncState, Worklog, WorklogChanges, WorklogFilter};

const WORKLOG_COLUMNS: &str = "id, issue_key, started_at, duration_seconds, description, \
     sync_status, remote_worklog_id, sync_error, created_at, updated_at";

/// Columns as stored, before timestamps and sync state are validated.
struct WorklogRow {
    id: i64,
    issue_key: String,
    started_at: String,
    duration_seconds: i64,
    description: String,
    sync_status: String,
    remote_worklog_id: Option<String>,
    sync_error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl WorklogRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            issue_key: row.get(1)?,
            started_at: row.get(2)?,
            duration_seconds: row.get(3)?,
            description: row.get(4)?,
            sync_status: row.get(5)?,
            remote_worklog_id: row.get(6)?,
            sync_error: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl TryFrom<WorklogRow> for Worklog {
    type Error = Error;

    fn try_from(row: WorklogRow) -> Result<Self> {
        let id = row.id;
        let timestamp = |value: &str, column: &str| {
            parse_storage(value).ok_or_else(|| {
                Error::CorruptRow(format!("worklog {id}: invalid {column} '{value}'"))
            })
        };
        let started_at = timestamp(&row.started_at, "started_at")?;
        let created_at = timestamp(&row.created_at, "created_at")?;
        let updated_at = timestamp(&row.updated_at, "updated_at")?;
        let sync = SyncState::from_columns(&row.sync_status, row.remote_worklog_id, row.sync_error)
            .ok_or_else(|| {
                Error::CorruptRow(format!(
                    "worklog {id}: sync columns disagree with status '{}'",
                    row.sync_status
                ))
            })?;

        Ok(Worklog {
            id,
            issue_key: row.issue_key,
            started_at,
            duration_seconds: row.duration_seconds,
            description: row.description,
            sync,
            created_at,
            updated_at,
        })
    }
}

fn now_stamp() -> String {
    to_storage(&Utc::now())
}

/// Inserts a row in the given sync state and returns its id.
pub(super) fn insert(conn: &Connection, entry: &NewWorklog, sync: &SyncState) -> Result<i64> {
    entry.validate()?;
    let stamp = now_stamp();
    conn.execute(
        "INSERT INTO worklogs (issue_key, started_at, duration_seconds, description, \
         sync_status, remote_worklog_id, sync_error, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            entry.issue_key.trim(),
            to_storage(&entry.started_at),
            entry.duration_seconds,
            entry.description,
            sync.status().as_str(),
            sync.remote_worklog_id(),
            sync.sync_error(),
            stamp,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(super) fn fetch(conn: &Connection, id: i64) -> Result<Worklog> {
    let sql = format!("SELECT {WORKLOG_COLUMNS} FROM worklogs WHERE id = ?1");
    conn.query_row(&sql, [id], WorklogRow::read)
        .optional()?
        .ok_or(Error::NotFound { id })?
        .try_into()
}

impl Ledger {
    /// Records a new local entry awaiting push.
    pub fn create(&self, entry: &NewWorklog) -> Result<Worklog> {
        let conn = self.connection();
        let id = insert(&conn, entry, &SyncState::Pending)?;
        fetch(&conn, id)
    }

    /// Records an entry that already exists remotely, e.g. one pulled in by import.
    pub fn insert_synced(&self, entry: &NewWorklog, remote_worklog_id: &str) -> Result<Worklog> {
        let conn = self.connection();
        let sync = SyncState::Synced {
            remote_worklog_id: remote_worklog_id.to_string(),
        };
        let id = insert(&conn, entry, &sync)?;
        fetch(&conn, id)
    }

    pub fn get(&self, id: i64) -> Result<Worklog> {
        fetch(&self.connection(), id)
    }

    pub fn find_by_remote_id(&self, remote_worklog_id: &str) -> Result<Option<Worklog>> {
        let conn = self.connection();
        let sql = format!("SELECT {WORKLOG_COLUMNS} FROM worklogs WHERE remote_worklog_id = ?1");
        conn.query_row(&sql, [remote_worklog_id], WorklogRow::read)
            .optional()?
            .map(Worklog::try_from)
            .transpose()
    }

    /// Entries matching every set field of the filter, in creation order.
    pub fn list(&self, filter: &WorklogFilter) -> Result<Vec<Worklog>> {
        let mut sql = format!("SELECT {WORKLOG_COLUMNS} FROM worklogs WHERE 1=1");
        let mut binds: Vec<Value> = Vec::new();

        if let Some(issue_key) = &filter.issue_key {
            binds.push(Value::Text(issue_key.clone()));
            sql.push_str(&format!(" AND issue_key = ?{}", binds.len()));
        }
        if let Some(status) = filter.sync_status {
            binds.push(Value::Text(status.as_str().to_string()));
            sql.push_str(&format!(" AND sync_status = ?{}", binds.len()));
        }
        if let Some(from) = &filter.date_from {
            binds.push(Value::Text(to_storage(from)));
            sql.push_str(&format!(" AND started_at >= ?{}", binds.len()));
        }
        if let Some(to) = &filter.date_to {
            binds.push(Value::Text(to_storage(to)));
            sql.push_str(&format!(" AND started_at < ?{}", binds.len()));
        }
        sql.push_str(" ORDER BY id ASC");

        let conn = self.connection();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(binds), WorklogRow::read)?;

        let mut worklogs = Vec::new();
        for row in rows {
            worklogs.push(Worklog::try_from(row?)?);
        }
        Ok(worklogs)
    }

    /// Applies a partial edit. A failed entry goes back to pending so the next push retries
    /// the edited version; synced and pending entries keep their sync state.
    pub fn update(&self, id: i64, changes: &WorklogChanges) -> Result<Worklog> {
        changes.validate()?;
        let conn = self.connection();
        let current = fetch(&conn, id)?;
        if changes.is_empty() {
            return Ok(current);
        }

        let duration = changes.duration_seconds.unwrap_or(current.duration_seconds);
        let description = changes
            .description
            .as_deref()
            .unwrap_or(&current.description);
        let started_at: DateTime<Utc> = changes.started_at.unwrap_or(current.started_at);
        let sync = match current.sync {
            SyncState::Error { .. } => SyncState::Pending,
            sync => sync,
        };

        conn.execute(
            "UPDATE worklogs SET duration_seconds = ?1, description = ?2, started_at = ?3, \
             sync_status = ?4, remote_worklog_id = ?5, sync_error = ?6, updated_at = ?7 \
             WHERE id = ?8",
            params![
                duration,
                description,
                to_storage(&started_at),
                sync.status().as_str(),
                sync.remote_worklog_id(),
                sync.sync_error(),
                now_stamp(),
                id
            ],
        )?;
        fetch(&conn, id)
    }

    /// Removes the local row only; the remote copy, if any, is untouched.
    pub fn delete(&self, id: i64) -> Result<()> {
        let changed = self
            .connection()
            .execute("DELETE FROM worklogs WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(Error::NotFound { id });
        }
        Ok(())
    }

    pub fn mark_synced(&self, id: i64, remote_worklog_id: &str) -> Result<Worklog> {
        let conn = self.connection();
        let changed = conn.execute(
            "UPDATE worklogs SET sync_status = 'synced', remote_worklog_id = ?1, \
             sync_error = NULL, updated_at = ?2 WHERE id = ?3",
            params![remote_worklog_id, now_stamp(), id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound { id });
        }
        fetch(&conn, id)
    }

    /// Records a failed push. Duration and description stay as they were.
    pub fn mark_error(&self, id: i64, message: &str) -> Result<Worklog> {
        let conn = self.connection();
        let changed = conn.execute(
            "UPDATE worklogs SET sync_status = 'error', remote_worklog_id = NULL, sync_error = ?1, \
             updated_at = ?2 WHERE id = ?3",
            params![message, now_stamp(), id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound { id });
        }
        fetch(&conn, id)
    }
}
