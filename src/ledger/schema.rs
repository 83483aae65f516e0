use rusqlite::Connection;

const SCHEMA_VERSION: i64 = 1;

/// Brings the database up to the current schema; safe to run on every open.
pub(super) fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS worklogs (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            issue_key         TEXT NOT NULL,
            started_at        TEXT NOT NULL,
            duration_seconds  INTEGER NOT NULL CHECK (duration_seconds >= 0),
            description       TEXT NOT NULL DEFAULT '',
            sync_status       TEXT NOT NULL DEFAULT 'pending'
                              CHECK (sync_status IN ('pending', 'synced', 'error')),
            remote_worklog_id TEXT,
            sync_error        TEXT,
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL,
            CHECK ((sync_status = 'synced') = (remote_worklog_id IS NOT NULL)),
            CHECK ((sync_status = 'error') = (sync_error IS NOT NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_worklogs_sync_status ON worklogs(sync_status);
        CREATE INDEX IF NOT EXISTS idx_worklogs_issue_key ON worklogs(issue_key);
        CREATE INDEX IF NOT EXISTS idx_worklogs_started_at ON worklogs(started_at);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_worklogs_remote_id
            ON worklogs(remote_worklog_id) WHERE remote_worklog_id IS NOT NULL;

        CREATE TABLE IF NOT EXISTS active_timer (
            id                  INTEGER PRIMARY KEY CHECK (id = 1),
            issue_key           TEXT NOT NULL,
            started_at          TEXT NOT NULL,
            accumulated_seconds INTEGER NOT NULL DEFAULT 0,
            is_paused           INTEGER NOT NULL DEFAULT 0,
            description         TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS settings (
            key   TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        );
        "#,
    )?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
