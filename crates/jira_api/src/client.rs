use crate::auth::basic_auth_value;
use crate::config::JiraConfig;
use crate::error::{JiraError, Result};
use crate::models::adf;
use crate::models::{Issue, JiraUser, SearchResponse, WorklogCreated, WorklogEntry, WorklogPage};
use crate::rate_limiter::RateLimiter;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client as HttpClient, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

const SEARCH_FIELDS: [&str; 4] = ["summary", "status", "issuetype", "project"];
const MAX_SEARCH_RESULTS: u32 = 100;

#[derive(Clone)]
pub struct JiraClient {
    http: HttpClient,
    config: JiraConfig,
    limiter: RateLimiter,
}

impl JiraClient {
    pub fn new(config: JiraConfig) -> Result<Self> {
        let limiter = RateLimiter::new(config.cooldown);
        Self::new_with_limiter(config, limiter)
    }

    pub fn new_with_limiter(config: JiraConfig, limiter: RateLimiter) -> Result<Self> {
        let http = build_http_client(&config)?;
        Ok(Self {
            http,
            config,
            limiter,
        })
    }

    pub fn config(&self) -> &JiraConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    async fn send<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.execute(method, path, query, body).await?;
        Self::parse_json(response).await
    }

    async fn send_expect_empty<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let response = self.execute(method, path, &[], body).await?;
        Self::ensure_success(response).await
    }

    async fn execute<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        self.limiter.hit().await;
        tracing::debug!(%method, path, "jira request");
        let mut request = self.http.request(method, self.url_for(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(payload) = body {
            request = request.json(payload);
        }
        Ok(request.send().await?)
    }

    fn url_for(&self, path: &str) -> String {
        let mut base = self.config.api_root();
        base.push_str(path.trim_start_matches('/'));
        base
    }

    async fn parse_json<T>(response: Response) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body).map_err(JiraError::from)
        } else {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "jira request failed");
            Err(JiraError::from_response(status, &body))
        }
    }

    async fn ensure_success(response: Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "jira request failed");
            Err(JiraError::from_response(status, &body))
        }
    }

    pub async fn get_myself(&self) -> Result<JiraUser> {
        self.send(Method::GET, "myself", &[], None::<&Value>).await
    }

    pub async fn search_issues(&self, jql: &str, max_results: u32) -> Result<Vec<Issue>> {
        let payload = SearchRequest {
            jql: jql.trim(),
            fields: &SEARCH_FIELDS,
            max_results: max_results.clamp(1, MAX_SEARCH_RESULTS),
        };
        let response: SearchResponse = self
            .send(Method::POST, "search/jql", &[], Some(&payload))
            .await?;
        Ok(response.issues.into_iter().map(Issue::from).collect())
    }

    /// Creates a worklog and returns the id Jira assigned to it.
    pub async fn add_worklog(
        &self,
        issue_key: &str,
        started: &str,
        time_spent_seconds: i64,
        comment: &str,
    ) -> Result<WorklogCreated> {
        let path = format!("issue/{}/worklog", issue_key);
        let payload = WorklogWriteRequest {
            started: Some(started),
            time_spent_seconds: Some(time_spent_seconds),
            comment: new_comment_document(comment),
        };
        self.send(Method::POST, &path, &[], Some(&payload)).await
    }

    /// Updates only the fields that are provided.
    pub async fn update_worklog(
        &self,
        issue_key: &str,
        worklog_id: &str,
        started: Option<&str>,
        time_spent_seconds: Option<i64>,
        comment: Option<&str>,
    ) -> Result<WorklogCreated> {
        let path = format!("issue/{}/worklog/{}", issue_key, worklog_id);
        let payload = WorklogWriteRequest {
            started,
            time_spent_seconds,
            comment: comment.map(replacement_comment_document),
        };
        self.send(Method::PUT, &path, &[], Some(&payload)).await
    }

    pub async fn delete_worklog(&self, issue_key: &str, worklog_id: &str) -> Result<()> {
        let path = format!("issue/{}/worklog/{}", issue_key, worklog_id);
        self.send_expect_empty(Method::DELETE, &path, None::<&Value>).await
    }

    /// Lists every worklog of an issue, following pagination.
    /// `started_after` is in epoch milliseconds.
    pub async fn get_issue_worklogs(
        &self,
        issue_key: &str,
        started_after: Option<i64>,
    ) -> Result<Vec<WorklogEntry>> {
        let path = format!("issue/{}/worklog", issue_key);
        let mut collected = Vec::new();
        let mut start_at = 0u64;

        loop {
            let mut query = vec![("startAt", start_at.to_string())];
            if let Some(epoch_ms) = started_after {
                query.push(("startedAfter", epoch_ms.to_string()));
            }
            let page: WorklogPage = self
                .send(Method::GET, &path, &query, None::<&Value>)
                .await?;

            let received = page.worklogs.len() as u64;
            collected.extend(page.worklogs);
            start_at = page.start_at + received;

            if received == 0 || start_at >= page.total {
                break;
            }
        }

        Ok(collected)
    }
}

fn build_http_client(config: &JiraConfig) -> Result<HttpClient> {
    let mut headers = HeaderMap::new();

    let mut auth_value = header_value(basic_auth_value(&config.email, &config.api_token))?;
    auth_value.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth_value);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, header_value(config.user_agent.clone())?);

    HttpClient::builder()
        .default_headers(headers)
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(|err| JiraError::Other(err.to_string()))
}

fn header_value(value: String) -> Result<HeaderValue> {
    HeaderValue::from_str(&value).map_err(|err| JiraError::Other(err.to_string()))
}

/// A blank comment on a new worklog is simply left out.
fn new_comment_document(comment: &str) -> Option<Value> {
    Some(comment.trim())
        .filter(|text| !text.is_empty())
        .map(adf::plain_text_document)
}

/// On update a blank comment must still be sent, as an empty document, or Jira keeps the old one.
fn replacement_comment_document(comment: &str) -> Value {
    match comment.trim() {
        "" => adf::empty_document(),
        text => adf::plain_text_document(text),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    jql: &'a str,
    fields: &'a [&'a str],
    max_results: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorklogWriteRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    started: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_spent_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<Value>,
}
