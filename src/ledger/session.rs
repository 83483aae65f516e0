//! The persisted timer session: at most one row, so a running timer survives a restart.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{worklogs, Ledger};
use crate::clock::{parse_storage, to_storage};
use crate::error::{Error, Result};
use crate::models::{NewWorklog, TimerSession, Worklog};

impl Ledger {
    pub fn load_session(&self) -> Result<Option<TimerSession>> {
        let conn = self.connection();
        let row = conn
            .query_row(
                "SELECT issue_key, started_at, accumulated_seconds, is_paused, description \
                 FROM active_timer WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((issue_key, started_at, accumulated_seconds, is_paused, description)) = row else {
            return Ok(None);
        };
        let started_at = parse_storage(&started_at).ok_or_else(|| {
            Error::CorruptRow(format!("active timer: invalid started_at '{started_at}'"))
        })?;

        Ok(Some(TimerSession {
            issue_key,
            started_at,
            accumulated_seconds,
            is_paused,
            description,
        }))
    }

    /// Replaces whatever session was stored.
    pub fn save_session(&self, session: &TimerSession) -> Result<()> {
        self.connection().execute(
            "INSERT OR REPLACE INTO active_timer \
             (id, issue_key, started_at, accumulated_seconds, is_paused, description) \
             VALUES (1, ?1, ?2, ?3, ?4, ?5)",
            params![
                session.issue_key,
                to_storage(&session.started_at),
                session.accumulated_seconds,
                session.is_paused,
                session.description,
            ],
        )?;
        Ok(())
    }

    /// Writes the time-keeping columns after a pause or resume. The description is left alone
    /// so a pending debounced write is never clobbered.
    pub fn update_session_progress(
        &self,
        started_at: DateTime<Utc>,
        accumulated_seconds: i64,
        is_paused: bool,
    ) -> Result<()> {
        self.connection().execute(
            "UPDATE active_timer SET started_at = ?1, accumulated_seconds = ?2, is_paused = ?3 \
             WHERE id = 1",
            params![to_storage(&started_at), accumulated_seconds, is_paused],
        )?;
        Ok(())
    }

    /// No-op when there is no session.
    pub fn update_session_description(&self, description: &str) -> Result<()> {
        self.connection().execute(
            "UPDATE active_timer SET description = ?1 WHERE id = 1",
            [description],
        )?;
        Ok(())
    }

    /// Turns the session into a pending worklog and drops the session row, atomically:
    /// either both happen or neither does.
    pub fn complete_session(&self, entry: &NewWorklog) -> Result<Worklog> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;
        let id = worklogs::insert(&tx, entry, &crate::models::SyncState::Pending)?;
        tx.execute("DELETE FROM active_timer WHERE id = 1", [])?;
        let worklog = worklogs::fetch(&tx, id)?;
        tx.commit()?;
        Ok(worklog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorklogFilter;
    use chrono::TimeZone;

    fn session() -> TimerSession {
        let start = Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap();
        TimerSession::begin("PROJ-1", start)
    }

    #[test]
    fn save_and_load_round_trip_a_single_row() {
        let ledger = Ledger::open_in_memory().unwrap();
        assert_eq!(ledger.load_session().unwrap(), None);

        ledger.save_session(&session()).unwrap();
        let mut replaced = session();
        replaced.issue_key = "PROJ-2".into();
        ledger.save_session(&replaced).unwrap();

        assert_eq!(ledger.load_session().unwrap(), Some(replaced));
    }

    #[test]
    fn progress_update_keeps_description() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.save_session(&session()).unwrap();
        ledger.update_session_description("notes").unwrap();

        let resumed_at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        ledger.update_session_progress(resumed_at, 70, true).unwrap();

        let loaded = ledger.load_session().unwrap().unwrap();
        assert_eq!(loaded.description, "notes");
        assert_eq!(loaded.accumulated_seconds, 70);
        assert!(loaded.is_paused);
        assert_eq!(loaded.started_at, resumed_at);
    }

    #[test]
    fn complete_session_inserts_worklog_and_clears_row() {
        let ledger = Ledger::open_in_memory().unwrap();
        let active = session();
        ledger.save_session(&active).unwrap();

        let now = active.started_at + chrono::Duration::seconds(60);
        let worklog = ledger.complete_session(&active.into_worklog(now)).unwrap();

        assert_eq!(worklog.duration_seconds, 60);
        assert_eq!(ledger.load_session().unwrap(), None);
        assert_eq!(ledger.list(&WorklogFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn failed_completion_keeps_the_session() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.save_session(&session()).unwrap();

        let invalid = NewWorklog::new(" ", Utc::now(), 10);
        assert!(ledger.complete_session(&invalid).is_err());
        assert!(ledger.load_session().unwrap().is_some());
    }
}
