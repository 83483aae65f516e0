//! Local time tracking against Jira issues: a restart-safe timer, a SQLite worklog ledger and
//! a reconciler that pushes, edits, deletes and imports worklogs on the Jira side.

use log::info;
use std::path::Path;
use std::sync::Arc;

pub mod clock;
pub mod config;
pub mod error;
pub mod format;
pub mod ledger;
pub mod models;
pub mod reconciler;
pub mod sink;
pub mod timer;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigManager};
pub use error::{Error, RemoteError, Result};
pub use ledger::Ledger;
pub use models::{
    ImportSummary, NewWorklog, PushSummary, StoppedWorklog, SyncState, SyncStatus, TimerSession,
    Worklog, WorklogChanges, WorklogFilter,
};
pub use reconciler::Reconciler;
pub use sink::{IndicatorState, LogSink, NotificationSink};
pub use timer::{Timer, TimerOptions, TimerStarted, TimerState};
pub use tracker::{
    IssueFailure, IssueTrackingClient, JiraTracker, RemoteDay, RemoteIssue, RemoteUser,
    RemoteWorklog,
};

use jira_api::JiraConfig;

/// Installs `env_logger` with an `info` default filter. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

/// The assembled application: ledger, timer and reconciler sharing one database.
pub struct Runtime {
    config: Config,
    ledger: Arc<Ledger>,
    timer: Timer,
    reconciler: Reconciler,
}

impl Runtime {
    /// Opens the ledger at `database_path` and restores any timer left running.
    pub async fn start(
        config: Config,
        database_path: &Path,
        client: Arc<dyn IssueTrackingClient>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let ledger = Arc::new(Ledger::open(database_path)?);
        Self::assemble(config, ledger, client, sink, Arc::new(SystemClock)).await
    }

    /// Same as [`Runtime::start`] with an already opened ledger and an explicit clock.
    pub async fn assemble(
        config: Config,
        ledger: Arc<Ledger>,
        client: Arc<dyn IssueTrackingClient>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let timer = Timer::restore(ledger.clone(), clock, sink, TimerOptions::from(&config)).await?;
        let reconciler = Reconciler::new(
            ledger.clone(),
            client,
            config.effective_push_concurrency(),
        );
        info!("runtime ready");
        Ok(Self {
            config,
            ledger,
            timer,
            reconciler,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub async fn test_connection(&self) -> Result<RemoteUser> {
        Ok(self.reconciler.client().test_connection().await?)
    }

    /// Runs an issue search and remembers the query as the active one.
    pub async fn search_issues(&self, query: &str) -> Result<Vec<RemoteIssue>> {
        let query = query.trim();
        self.ledger.set_setting(ledger::ACTIVE_JQL_KEY, query)?;
        Ok(self
            .reconciler
            .client()
            .search(query, self.config.search_max_results)
            .await?)
    }

    pub fn active_query(&self) -> Result<Option<String>> {
        self.ledger.get_setting(ledger::ACTIVE_JQL_KEY)
    }

    /// Stores the Jira site and account so the next start can build a client without asking.
    pub fn remember_jira_account(&self, base_url: &str, email: &str) -> Result<()> {
        self.ledger
            .set_setting(ledger::JIRA_BASE_URL_KEY, base_url.trim())?;
        self.ledger.set_setting(ledger::JIRA_EMAIL_KEY, email.trim())
    }

    /// Client settings from the remembered account; the token is supplied by the caller.
    pub fn jira_config(&self, api_token: &str) -> Result<JiraConfig> {
        jira_config_from(&self.ledger, api_token)
    }

    /// Flushes pending writes and stops background ticking. A running session stays
    /// persisted and is restored by the next start.
    pub async fn shutdown(&self) -> Result<()> {
        self.timer.shutdown().await?;
        info!("runtime shut down");
        Ok(())
    }
}

/// Builds a [`JiraConfig`] from the account remembered in the ledger.
pub fn jira_config_from(ledger: &Ledger, api_token: &str) -> Result<JiraConfig> {
    let base_url = ledger
        .get_setting(ledger::JIRA_BASE_URL_KEY)?
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::Config("no Jira site configured".to_string()))?;
    let email = ledger
        .get_setting(ledger::JIRA_EMAIL_KEY)?
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::Config("no Jira account configured".to_string()))?;
    Ok(JiraConfig::new(base_url, email, api_token))
}
