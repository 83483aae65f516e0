//! Moves worklogs between the local ledger and the remote tracker.
//!
//! Single-entry operations return errors to the caller. Batch operations never do for a
//! per-entry failure: each entry ends in its own outcome and the outcomes fold into a summary.

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::format::log_safe;
use crate::ledger::Ledger;
use crate::models::{
    ImportOutcome, ImportSummary, NewWorklog, PushOutcome, PushSummary, SyncStatus, Worklog,
    WorklogChanges, WorklogFilter,
};
use crate::tracker::{IssueTrackingClient, RemoteWorklog};

pub struct Reconciler {
    ledger: Arc<Ledger>,
    client: Arc<dyn IssueTrackingClient>,
    concurrency: usize,
    selection: Mutex<BTreeSet<i64>>,
}

impl Reconciler {
    pub fn new(
        ledger: Arc<Ledger>,
        client: Arc<dyn IssueTrackingClient>,
        concurrency: usize,
    ) -> Self {
        Self {
            ledger,
            client,
            concurrency: concurrency.max(1),
            selection: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn client(&self) -> &Arc<dyn IssueTrackingClient> {
        &self.client
    }

    /// Pushes one entry whatever its current status; a synced entry is pushed again.
    /// A remote failure is stored on the entry and also returned.
    pub async fn push(&self, id: i64) -> Result<Worklog> {
        let worklog = self.ledger.get(id)?;
        if worklog.status() == SyncStatus::Synced {
            debug!("re-pushing already synced worklog {id}");
        }

        let created = self
            .client
            .create_remote_worklog(
                &worklog.issue_key,
                worklog.started_at,
                worklog.duration_seconds,
                &worklog.description,
            )
            .await;

        match created {
            Ok(remote_id) => {
                info!("worklog {id} pushed as {remote_id}");
                self.ledger.mark_synced(id, &remote_id)
            }
            Err(err) => {
                warn!("push of worklog {id} failed: {}", log_safe(err.message()));
                self.ledger.mark_error(id, err.message())?;
                Err(err.into())
            }
        }
    }

    /// Pushes every pending entry started on `date` (local day).
    pub async fn push_all(&self, date: NaiveDate) -> Result<PushSummary> {
        let ids: Vec<i64> = self
            .ledger
            .list(
                &WorklogFilter::default()
                    .status(SyncStatus::Pending)
                    .on_local_day(date),
            )?
            .iter()
            .map(|worklog| worklog.id)
            .collect();
        Ok(self.push_batch(&ids).await)
    }

    /// Pushes the given entries independently, then clears the selection. An id listed
    /// twice is pushed once.
    pub async fn push_selected(&self, ids: &[i64]) -> PushSummary {
        self.push_batch(ids).await
    }

    /// Pushes whatever is currently selected.
    pub async fn push_selection(&self) -> PushSummary {
        let ids = self.selected_ids();
        self.push_batch(&ids).await
    }

    async fn push_batch(&self, ids: &[i64]) -> PushSummary {
        let unique: BTreeSet<i64> = ids.iter().copied().collect();
        let summary: PushSummary = stream::iter(unique)
            .map(|id| self.push_outcome(id))
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect();
        self.clear_selection();

        info!(
            "push batch finished: {} total, {} synced, {} failed",
            summary.total, summary.success, summary.failed
        );
        summary
    }

    async fn push_outcome(&self, id: i64) -> PushOutcome {
        match self.push(id).await {
            Ok(worklog) => PushOutcome::Synced {
                id,
                remote_worklog_id: worklog
                    .sync
                    .remote_worklog_id()
                    .unwrap_or_default()
                    .to_string(),
            },
            Err(Error::Remote(err)) => PushOutcome::Failed {
                id,
                message: err.message().to_string(),
            },
            Err(err) => PushOutcome::Failed {
                id,
                message: err.to_string(),
            },
        }
    }

    /// Edits the remote copy first and mirrors the edit locally only once the remote side
    /// accepted it; on failure the local row is untouched.
    pub async fn update_and_sync(&self, id: i64, changes: &WorklogChanges) -> Result<Worklog> {
        changes.validate()?;
        let worklog = self.ledger.get(id)?;
        let remote_id = worklog
            .sync
            .remote_worklog_id()
            .ok_or(Error::NotSynced { id })?;

        if !changes.is_empty() {
            self.client
                .update_remote_worklog(&worklog.issue_key, remote_id, changes)
                .await?;
        }
        self.ledger.update(id, changes)
    }

    /// Deletes the remote copy, then the local row. An entry that never reached the remote
    /// side is only deleted locally.
    pub async fn remove_from_jira(&self, id: i64) -> Result<()> {
        let worklog = self.ledger.get(id)?;
        if let Some(remote_id) = worklog.sync.remote_worklog_id() {
            self.client
                .delete_remote_worklog(&worklog.issue_key, remote_id)
                .await?;
        }
        self.ledger.delete(id)?;
        lock(&self.selection).remove(&id);
        info!("worklog {id} removed");
        Ok(())
    }

    /// Inserts the remote worklogs of `date` that are not known locally yet, as synced
    /// entries. Safe to repeat: known remote ids are skipped. Issues whose worklogs could not
    /// be read count as failures.
    pub async fn import_worklogs(&self, date: NaiveDate) -> Result<ImportSummary> {
        let remote = self.client.import_worklogs_for_date(date).await?;
        let failures = remote
            .failures
            .into_iter()
            .map(|failure| ImportOutcome::IssueFailed {
                issue_key: failure.issue_key,
                message: failure.message,
            });
        let summary: ImportSummary = remote
            .worklogs
            .into_iter()
            .map(|entry| self.import_one(entry))
            .chain(failures)
            .collect();

        info!(
            "import {date}: {} found, {} inserted, {} skipped, {} failed",
            summary.total, summary.inserted, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    fn import_one(&self, entry: RemoteWorklog) -> ImportOutcome {
        let inserted = self
            .ledger
            .find_by_remote_id(&entry.remote_id)
            .and_then(|existing| match existing {
                Some(_) => Ok(None),
                None => {
                    let new = NewWorklog::new(
                        entry.issue_key.clone(),
                        entry.started_at,
                        entry.duration_seconds,
                    )
                    .with_description(entry.description.clone());
                    self.ledger.insert_synced(&new, &entry.remote_id).map(Some)
                }
            });

        match inserted {
            Ok(Some(worklog)) => ImportOutcome::Inserted { id: worklog.id },
            Ok(None) => ImportOutcome::Skipped {
                remote_worklog_id: entry.remote_id,
            },
            Err(err) => ImportOutcome::Failed {
                remote_worklog_id: entry.remote_id,
                message: err.to_string(),
            },
        }
    }

    /// Adds or removes an id from the working set; returns whether it is now selected.
    pub fn toggle_select(&self, id: i64) -> bool {
        let mut selection = lock(&self.selection);
        if selection.remove(&id) {
            false
        } else {
            selection.insert(id);
            true
        }
    }

    /// Selects every pending entry; returns how many are selected afterwards.
    pub fn select_all_pending(&self) -> Result<usize> {
        let pending = self
            .ledger
            .list(&WorklogFilter::default().status(SyncStatus::Pending))?;
        let mut selection = lock(&self.selection);
        selection.extend(pending.iter().map(|worklog| worklog.id));
        Ok(selection.len())
    }

    pub fn selected_ids(&self) -> Vec<i64> {
        lock(&self.selection).iter().copied().collect()
    }

    pub fn clear_selection(&self) {
        lock(&self.selection).clear();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::tracker::{IssueFailure, RemoteDay, RemoteIssue, RemoteUser};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;

    /// Scripted remote side: pushes fail for issue keys listed in `failing`.
    #[derive(Default)]
    struct FakeTracker {
        failing: Mutex<HashMap<String, String>>,
        created: Mutex<Vec<String>>,
        updated: Mutex<Vec<(String, WorklogChanges)>>,
        deleted: Mutex<Vec<String>>,
        remote_day: Mutex<RemoteDay>,
    }

    impl FakeTracker {
        fn fail_for(&self, issue_key: &str, message: &str) {
            self.failing
                .lock()
                .unwrap()
                .insert(issue_key.to_string(), message.to_string());
        }

        fn failure(&self, issue_key: &str) -> Option<RemoteError> {
            self.failing
                .lock()
                .unwrap()
                .get(issue_key)
                .map(|message| RemoteError::new(message.clone()))
        }
    }

    #[async_trait]
    impl IssueTrackingClient for FakeTracker {
        async fn test_connection(&self) -> std::result::Result<RemoteUser, RemoteError> {
            Err(RemoteError::new("not scripted"))
        }

        async fn search(
            &self,
            _query: &str,
            _max_results: u32,
        ) -> std::result::Result<Vec<RemoteIssue>, RemoteError> {
            Ok(Vec::new())
        }

        async fn create_remote_worklog(
            &self,
            issue_key: &str,
            _started_at: DateTime<Utc>,
            _duration_seconds: i64,
            _description: &str,
        ) -> std::result::Result<String, RemoteError> {
            if let Some(err) = self.failure(issue_key) {
                return Err(err);
            }
            let mut created = self.created.lock().unwrap();
            let remote_id = format!("r-{}", 100 + created.len());
            created.push(remote_id.clone());
            Ok(remote_id)
        }

        async fn update_remote_worklog(
            &self,
            issue_key: &str,
            remote_id: &str,
            changes: &WorklogChanges,
        ) -> std::result::Result<(), RemoteError> {
            if let Some(err) = self.failure(issue_key) {
                return Err(err);
            }
            self.updated
                .lock()
                .unwrap()
                .push((remote_id.to_string(), changes.clone()));
            Ok(())
        }

        async fn delete_remote_worklog(
            &self,
            issue_key: &str,
            remote_id: &str,
        ) -> std::result::Result<(), RemoteError> {
            if let Some(err) = self.failure(issue_key) {
                return Err(err);
            }
            self.deleted.lock().unwrap().push(remote_id.to_string());
            Ok(())
        }

        async fn import_worklogs_for_date(
            &self,
            _date: NaiveDate,
        ) -> std::result::Result<RemoteDay, RemoteError> {
            Ok(self.remote_day.lock().unwrap().clone())
        }
    }

    fn morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
    }

    fn setup() -> (Arc<Ledger>, Arc<FakeTracker>, Reconciler) {
        let ledger = Arc::new(Ledger::open_in_memory().unwrap());
        let tracker = Arc::new(FakeTracker::default());
        let reconciler = Reconciler::new(ledger.clone(), tracker.clone(), 4);
        (ledger, tracker, reconciler)
    }

    fn add(ledger: &Ledger, issue_key: &str) -> i64 {
        ledger
            .create(&NewWorklog::new(issue_key, morning(), 1_800).with_description("work"))
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn push_marks_synced_and_stores_remote_id() {
        let (ledger, _, reconciler) = setup();
        let id = add(&ledger, "PROJ-1");

        let pushed = reconciler.push(id).await.unwrap();

        assert_eq!(pushed.sync.remote_worklog_id(), Some("r-100"));
        assert_eq!(ledger.get(id).unwrap(), pushed);
    }

    #[tokio::test]
    async fn failed_push_records_error_and_retry_recovers() {
        let (ledger, tracker, reconciler) = setup();
        let id = add(&ledger, "PROJ-1");
        tracker.fail_for("PROJ-1", "Issue does not exist");

        let err = reconciler.push(id).await.unwrap_err();
        assert_eq!(err.to_string(), "Issue does not exist");
        let failed = ledger.get(id).unwrap();
        assert_eq!(failed.sync.sync_error(), Some("Issue does not exist"));
        assert_eq!(failed.duration_seconds, 1_800);
        assert_eq!(failed.description, "work");

        tracker.failing.lock().unwrap().clear();
        let retried = reconciler.push(id).await.unwrap();
        assert_eq!(retried.status(), SyncStatus::Synced);
        assert_eq!(retried.sync.sync_error(), None);
    }

    #[tokio::test]
    async fn push_selected_collects_per_entry_failures() {
        let (ledger, tracker, reconciler) = setup();
        for n in 1..=6 {
            add(&ledger, &format!("FILL-{n}"));
        }
        let seven = add(&ledger, "PROJ-7");
        let eight = add(&ledger, "PROJ-8");
        assert_eq!((seven, eight), (7, 8));
        tracker.fail_for("PROJ-8", "403 Forbidden");
        reconciler.toggle_select(seven);
        reconciler.toggle_select(eight);

        let summary = reconciler.push_selected(&[7, 8]).await;

        assert_eq!(
            summary,
            PushSummary {
                total: 2,
                success: 1,
                failed: 1,
                errors: vec!["403 Forbidden".to_string()],
            }
        );
        assert_eq!(ledger.get(7).unwrap().status(), SyncStatus::Synced);
        let failed = ledger.get(8).unwrap();
        assert_eq!(failed.status(), SyncStatus::Error);
        assert_eq!(failed.sync.sync_error(), Some("403 Forbidden"));
        assert!(reconciler.selected_ids().is_empty());
    }

    #[tokio::test]
    async fn unknown_ids_fail_inside_the_batch() {
        let (ledger, _, reconciler) = setup();
        let id = add(&ledger, "PROJ-1");

        let summary = reconciler.push_selected(&[id, 99]).await;

        assert_eq!(summary.total, 2);
        assert_eq!(summary.success + summary.failed, summary.total);
        assert_eq!(summary.errors, vec!["worklog 99 not found".to_string()]);
    }

    #[tokio::test]
    async fn repeated_ids_are_pushed_once() {
        let (ledger, tracker, reconciler) = setup();
        let id = add(&ledger, "PROJ-1");

        let summary = reconciler.push_selected(&[id, id, id]).await;

        assert_eq!((summary.total, summary.success, summary.failed), (1, 1, 0));
        assert_eq!(tracker.created.lock().unwrap().len(), 1);
        assert_eq!(ledger.list(&WorklogFilter::default()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn push_all_only_touches_pending_entries_of_the_day() {
        let (ledger, tracker, reconciler) = setup();
        let pending = add(&ledger, "PROJ-1");
        let already = add(&ledger, "PROJ-2");
        ledger.mark_synced(already, "r-old").unwrap();
        let other_day = ledger
            .create(&NewWorklog::new(
                "PROJ-3",
                morning() - chrono::Duration::days(3),
                60,
            ))
            .unwrap()
            .id;

        let date = morning().with_timezone(&chrono::Local).date_naive();
        let summary = reconciler.push_all(date).await.unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.success, 1);
        assert_eq!(ledger.get(pending).unwrap().status(), SyncStatus::Synced);
        assert_eq!(ledger.get(other_day).unwrap().status(), SyncStatus::Pending);
        assert_eq!(tracker.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_and_sync_leaves_local_row_on_remote_failure() {
        let (ledger, tracker, reconciler) = setup();
        let id = add(&ledger, "PROJ-1");
        reconciler.push(id).await.unwrap();
        let before = ledger.get(id).unwrap();
        tracker.fail_for("PROJ-1", "Worklog is locked");

        let changes = WorklogChanges::default().duration(60).description("edited");
        let err = reconciler.update_and_sync(id, &changes).await.unwrap_err();

        assert!(matches!(err, Error::Remote(_)));
        assert_eq!(ledger.get(id).unwrap(), before);
    }

    #[tokio::test]
    async fn update_and_sync_mirrors_accepted_edits() {
        let (ledger, tracker, reconciler) = setup();
        let id = add(&ledger, "PROJ-1");
        reconciler.push(id).await.unwrap();

        let changes = WorklogChanges::default().description("edited");
        let updated = reconciler.update_and_sync(id, &changes).await.unwrap();

        assert_eq!(updated.description, "edited");
        assert_eq!(updated.duration_seconds, 1_800);
        assert_eq!(updated.status(), SyncStatus::Synced);
        assert_eq!(
            tracker.updated.lock().unwrap().as_slice(),
            &[("r-100".to_string(), changes)]
        );
    }

    #[tokio::test]
    async fn update_and_sync_requires_a_remote_copy() {
        let (ledger, _, reconciler) = setup();
        let id = add(&ledger, "PROJ-1");

        let err = reconciler
            .update_and_sync(id, &WorklogChanges::default().duration(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotSynced { id: got } if got == id));
    }

    #[tokio::test]
    async fn remove_from_jira_deletes_remote_then_local() {
        let (ledger, tracker, reconciler) = setup();
        let id = add(&ledger, "PROJ-1");
        reconciler.push(id).await.unwrap();

        tracker.fail_for("PROJ-1", "503 Service Unavailable");
        assert!(reconciler.remove_from_jira(id).await.is_err());
        assert!(ledger.get(id).is_ok());

        tracker.failing.lock().unwrap().clear();
        reconciler.remove_from_jira(id).await.unwrap();
        assert!(matches!(ledger.get(id), Err(Error::NotFound { .. })));
        assert_eq!(tracker.deleted.lock().unwrap().as_slice(), &["r-100".to_string()]);
    }

    #[tokio::test]
    async fn remove_unsynced_entry_only_deletes_locally() {
        let (ledger, tracker, reconciler) = setup();
        let id = add(&ledger, "PROJ-1");

        reconciler.remove_from_jira(id).await.unwrap();

        assert!(ledger.get(id).is_err());
        assert!(tracker.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn import_is_idempotent() {
        let (ledger, tracker, reconciler) = setup();
        let day = morning().with_timezone(&chrono::Local).date_naive();
        *tracker.remote_day.lock().unwrap() = RemoteDay::from(vec![
            RemoteWorklog {
                remote_id: "5001".into(),
                issue_key: "PROJ-1".into(),
                started_at: morning(),
                duration_seconds: 900,
                description: "standup".into(),
            },
            RemoteWorklog {
                remote_id: "5002".into(),
                issue_key: "PROJ-2".into(),
                started_at: morning(),
                duration_seconds: 1_200,
                description: String::new(),
            },
        ]);

        let first = reconciler.import_worklogs(day).await.unwrap();
        assert_eq!((first.total, first.inserted, first.skipped), (2, 2, 0));
        let imported = ledger.find_by_remote_id("5001").unwrap().unwrap();
        assert_eq!(imported.status(), SyncStatus::Synced);
        assert_eq!(imported.description, "standup");

        let second = reconciler.import_worklogs(day).await.unwrap();
        assert_eq!((second.total, second.inserted, second.skipped), (2, 0, 2));
        assert_eq!(ledger.list(&WorklogFilter::default()).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unreadable_issue_counts_as_failed_import() {
        let (ledger, tracker, reconciler) = setup();
        let day = morning().with_timezone(&chrono::Local).date_naive();
        *tracker.remote_day.lock().unwrap() = RemoteDay {
            worklogs: vec![RemoteWorklog {
                remote_id: "5001".into(),
                issue_key: "PROJ-1".into(),
                started_at: morning(),
                duration_seconds: 900,
                description: "standup".into(),
            }],
            failures: vec![IssueFailure {
                issue_key: "PROJ-2".into(),
                message: "http 500 Internal Server Error: boom".into(),
            }],
        };

        let summary = reconciler.import_worklogs(day).await.unwrap();

        assert_eq!((summary.inserted, summary.failed), (1, 1));
        assert_eq!(
            summary.errors,
            vec!["PROJ-2: http 500 Internal Server Error: boom".to_string()]
        );
        assert!(ledger.find_by_remote_id("5001").unwrap().is_some());
    }

    #[tokio::test]
    async fn selection_toggles_and_collects_pending() {
        let (ledger, _, reconciler) = setup();
        let a = add(&ledger, "PROJ-1");
        let b = add(&ledger, "PROJ-2");
        ledger.mark_synced(b, "r-1").unwrap();
        let c = add(&ledger, "PROJ-3");

        assert!(reconciler.toggle_select(a));
        assert!(!reconciler.toggle_select(a));
        assert_eq!(reconciler.select_all_pending().unwrap(), 2);
        assert_eq!(reconciler.selected_ids(), vec![a, c]);

        let summary = reconciler.push_selection().await;
        assert_eq!(summary.success, 2);
        assert!(reconciler.selected_ids().is_empty());
    }
}
