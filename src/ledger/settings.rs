//! Small key/value settings that belong with the data rather than the config file.

use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;

use super::Ledger;
use crate::error::Result;

/// Last JQL query the user searched with.
pub const ACTIVE_JQL_KEY: &str = "active_jql";
pub const JIRA_BASE_URL_KEY: &str = "jira_base_url";
pub const JIRA_EMAIL_KEY: &str = "jira_email";

impl Ledger {
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .connection()
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.connection().execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn all_settings(&self) -> Result<BTreeMap<String, String>> {
        let conn = self.connection();
        let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut settings = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            settings.insert(key, value);
        }
        Ok(settings)
    }
}
