use chrono::{Duration, NaiveDate, Utc};
use jira_api::rate_limiter::RateLimiter;
use jira_api::{JiraClient, JiraConfig, JIRA_DATETIME_FORMAT};
use jira_timekeeper::clock::local_day_bounds;
use jira_timekeeper::{JiraTracker, Ledger, NewWorklog, Reconciler, SyncStatus, WorklogChanges};
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;

fn reconciler_for(server: &Server, ledger: Arc<Ledger>) -> Reconciler {
    let config = JiraConfig::new(server.url(), "me@example.com", "token");
    let client =
        JiraClient::new_with_limiter(config, RateLimiter::unthrottled()).expect("client builds");
    Reconciler::new(ledger, Arc::new(JiraTracker::new(client)), 2)
}

fn jira_time(instant: chrono::DateTime<Utc>) -> String {
    instant.format(JIRA_DATETIME_FORMAT).to_string()
}

fn worklog_json(
    id: &str,
    author: &str,
    started: chrono::DateTime<Utc>,
    seconds: i64,
    text: &str,
) -> serde_json::Value {
    json!({
        "id": id,
        "started": jira_time(started),
        "timeSpentSeconds": seconds,
        "author": { "accountId": author, "displayName": author },
        "comment": {
            "type": "doc",
            "version": 1,
            "content": [{
                "type": "paragraph",
                "content": [{ "type": "text", "text": text }]
            }]
        }
    })
}

#[tokio::test]
async fn import_keeps_own_worklogs_of_the_local_day() {
    let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
    let (day_start, day_end) = local_day_bounds(date);
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/rest/api/3/myself")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"accountId":"acc-me","displayName":"Me"}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/rest/api/3/search/jql")
        .match_body(Matcher::PartialJson(json!({
            "jql": "worklogAuthor = currentUser() AND worklogDate = \"2026-10-18\""
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"issues": [{"key": "PROJ-1", "fields": {"summary": "Fix login"}}]}).to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/rest/api/3/issue/PROJ-1/worklog")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("startAt".into(), "0".into()),
            Matcher::UrlEncoded("startedAfter".into(), day_start.timestamp_millis().to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "startAt": 0,
                "maxResults": 5000,
                "total": 3,
                "worklogs": [
                    worklog_json("701", "acc-me", day_start + Duration::hours(2), 1_800, "standup"),
                    worklog_json(
                        "702",
                        "acc-other",
                        day_start + Duration::hours(3),
                        600,
                        "not mine"
                    ),
                    worklog_json("703", "acc-me", day_end + Duration::hours(1), 900, "tomorrow"),
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let ledger = Arc::new(Ledger::open_in_memory().unwrap());
    let reconciler = reconciler_for(&server, ledger.clone());

    let first = reconciler.import_worklogs(date).await.unwrap();
    assert_eq!((first.total, first.inserted, first.skipped), (1, 1, 0));

    let imported = ledger.find_by_remote_id("701").unwrap().expect("imported");
    assert_eq!(imported.issue_key, "PROJ-1");
    assert_eq!(imported.duration_seconds, 1_800);
    assert_eq!(imported.description, "standup");
    assert_eq!(imported.started_at, day_start + Duration::hours(2));
    assert_eq!(imported.status(), SyncStatus::Synced);

    let second = reconciler.import_worklogs(date).await.unwrap();
    assert_eq!((second.inserted, second.skipped), (0, 1));
}

#[tokio::test]
async fn push_selected_reports_jira_rejections_per_entry() {
    let mut server = Server::new_async().await;
    let accepted = server
        .mock("POST", "/rest/api/3/issue/PROJ-7/worklog")
        .match_body(Matcher::PartialJson(json!({ "timeSpentSeconds": 1800 })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"10042"}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/rest/api/3/issue/PROJ-8/worklog")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "errorMessages": [
                    "Issue does not exist or you do not have permission to see it."
                ],
                "errors": {}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let ledger = Arc::new(Ledger::open_in_memory().unwrap());
    let started = Utc::now() - Duration::hours(1);
    let ok = ledger
        .create(&NewWorklog::new("PROJ-7", started, 1_800).with_description("review"))
        .unwrap();
    let bad = ledger.create(&NewWorklog::new("PROJ-8", started, 600)).unwrap();
    let reconciler = reconciler_for(&server, ledger.clone());

    let summary = reconciler.push_selected(&[ok.id, bad.id]).await;

    accepted.assert_async().await;
    assert_eq!((summary.total, summary.success, summary.failed), (2, 1, 1));
    assert_eq!(
        ledger.get(ok.id).unwrap().sync.remote_worklog_id(),
        Some("10042")
    );
    let failed = ledger.get(bad.id).unwrap();
    assert_eq!(failed.status(), SyncStatus::Error);
    assert_eq!(
        failed.sync.sync_error(),
        Some("http 400 Bad Request: Issue does not exist or you do not have permission to see it.")
    );
    assert_eq!(summary.errors, vec![failed.sync.sync_error().unwrap().to_string()]);
}

#[tokio::test]
async fn remote_delete_failure_keeps_local_entry() {
    let mut server = Server::new_async().await;
    server
        .mock("DELETE", "/rest/api/3/issue/PROJ-1/worklog/555")
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(r#"{"errorMessages":["Cannot find worklog with id: 555"]}"#)
        .create_async()
        .await;

    let ledger = Arc::new(Ledger::open_in_memory().unwrap());
    let entry = ledger
        .insert_synced(&NewWorklog::new("PROJ-1", Utc::now(), 60), "555")
        .unwrap();
    let reconciler = reconciler_for(&server, ledger.clone());

    let err = reconciler.remove_from_jira(entry.id).await.unwrap_err();

    assert_eq!(err.to_string(), "http 404 Not Found: Cannot find worklog with id: 555");
    assert_eq!(ledger.get(entry.id).unwrap(), entry);
}

#[tokio::test]
async fn import_counts_an_unreadable_issue_as_failed() {
    let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
    let (day_start, _) = local_day_bounds(date);
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/rest/api/3/myself")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"accountId":"acc-me","displayName":"Me"}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/rest/api/3/search/jql")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"issues": [
                {"key": "PROJ-1", "fields": {"summary": "Fix login"}},
                {"key": "PROJ-2", "fields": {"summary": "Archived"}}
            ]})
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/rest/api/3/issue/PROJ-1/worklog")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "startAt": 0,
                "maxResults": 5000,
                "total": 1,
                "worklogs": [
                    worklog_json("801", "acc-me", day_start + Duration::hours(2), 600, "triage"),
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/rest/api/3/issue/PROJ-2/worklog")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(r#"{"errorMessages":["Worklog index unavailable"]}"#)
        .create_async()
        .await;

    let ledger = Arc::new(Ledger::open_in_memory().unwrap());
    let reconciler = reconciler_for(&server, ledger.clone());

    let summary = reconciler.import_worklogs(date).await.unwrap();

    assert_eq!((summary.inserted, summary.failed), (1, 1));
    assert_eq!(
        summary.errors,
        vec!["PROJ-2: http 500 Internal Server Error: Worklog index unavailable".to_string()]
    );
    assert!(ledger.find_by_remote_id("801").unwrap().is_some());
}

#[tokio::test]
async fn clearing_the_description_clears_the_jira_comment() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", "/rest/api/3/issue/PROJ-1/worklog/5001")
        .match_body(Matcher::PartialJson(json!({
            "comment": { "type": "doc", "version": 1, "content": [] }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"5001"}"#)
        .create_async()
        .await;

    let ledger = Arc::new(Ledger::open_in_memory().unwrap());
    let entry = ledger
        .insert_synced(
            &NewWorklog::new("PROJ-1", Utc::now(), 600).with_description("old text"),
            "5001",
        )
        .unwrap();
    let reconciler = reconciler_for(&server, ledger.clone());

    let updated = reconciler
        .update_and_sync(entry.id, &WorklogChanges::default().description(""))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(updated.description, "");
    assert_eq!(updated.sync.remote_worklog_id(), Some("5001"));
}
