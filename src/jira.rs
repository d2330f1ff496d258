//! Native Jira client.
//!
//! Talks to the Jira REST API v2 and implements [`IssueTracker`]. Requests
//! carry HTTP Basic credentials when configured; anonymous access works
//! against instances that allow it.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | session check | `GET /rest/api/2/myself` |
//! | get issue | `GET /rest/api/2/issue/{key}?fields=summary,updated` |
//! | list attachments | `GET /rest/api/2/issue/{key}?fields=attachment` |
//! | search | `GET /rest/api/2/search?jql=…&startAt=…&maxResults=…` |
//! | download | `GET {attachment.content}` |
//!
//! Search uses offset pagination (`startAt` / `total`). Instances that have
//! retired the v2 search endpoint answer with an error, which sends the
//! resolver to [`DirectAccess`](crate::direct::DirectAccess).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::download::{ensure_success, same_origin, write_response};
use crate::error::MirrorError;
use crate::models::{Attachment, Credentials, Issue};
use crate::traits::IssueTracker;

/// Build the shared HTTP client with the configured request timeout.
pub fn http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_secs))
        .user_agent(concat!("jmirror/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

pub struct JiraClient {
    base_url: String,
    credentials: Option<Credentials>,
    client: reqwest::Client,
    page_size: u32,
}

impl JiraClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Option<Credentials>,
        client: reqwest::Client,
        page_size: u32,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            client,
            page_size: page_size.max(1),
        }
    }

    /// Client for the configured service address.
    pub fn from_config(config: &Config, client: reqwest::Client) -> crate::error::Result<Self> {
        let base_url = config.require_base_url()?;
        Ok(Self::new(
            base_url,
            config.credentials(),
            client,
            config.http.page_size,
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.authed(url)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    fn authed(&self, url: &str) -> reqwest::RequestBuilder {
        let req = self.client.get(url);
        match &self.credentials {
            Some(creds) => req.header(reqwest::header::AUTHORIZATION, creds.basic_header()),
            None => req,
        }
    }

    /// Check that the credentials are accepted. Returns the account's
    /// display name. A no-op without credentials.
    pub async fn verify_session(&self) -> Result<Option<String>> {
        if self.credentials.is_none() {
            return Ok(None);
        }
        let url = format!("{}/rest/api/2/myself", self.base_url);
        let resp = self
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base_url))?;
        let resp = ensure_success(resp, "Jira authentication").await?;
        let me: Myself = resp.json().await.context("Malformed /myself response")?;
        Ok(Some(
            me.display_name
                .or(me.name)
                .unwrap_or_else(|| "unknown user".to_string()),
        ))
    }

    async fn fetch_issue(&self, key: &str, fields: &str) -> Result<IssueResponse> {
        let url = format!("{}/rest/api/2/issue/{}", self.base_url, key);
        tracing::debug!(%key, fields, "fetching issue");
        let resp = self
            .get(&url)
            .query(&[("fields", fields)])
            .send()
            .await
            .map_err(|e| anyhow!("GET issue {}: {}", key, e))?;
        let resp = ensure_success(resp, &format!("GET issue {}", key)).await?;
        resp.json::<IssueResponse>()
            .await
            .with_context(|| format!("Malformed issue payload for {}", key))
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn get_issue(&self, key: &str) -> Result<Issue> {
        let raw = self.fetch_issue(key, "summary,updated").await?;
        Ok(Issue {
            key: raw.key,
            summary: raw.fields.summary,
            updated: raw.fields.updated.as_deref().and_then(parse_jira_timestamp),
        })
    }

    async fn search_issues(&self, jql: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        let url = format!("{}/rest/api/2/search", self.base_url);
        let mut keys = Vec::new();
        let mut start_at: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(MirrorError::Cancelled.into());
            }
            tracing::debug!(start_at, "native search page");
            let resp = self
                .get(&url)
                .query(&[
                    ("jql", jql.to_string()),
                    ("startAt", start_at.to_string()),
                    ("maxResults", self.page_size.to_string()),
                    ("fields", "key".to_string()),
                ])
                .send()
                .await
                .map_err(|e| anyhow!("GET search: {}", e))?;
            let resp = ensure_success(resp, "Jira search").await?;
            let page: SearchResponse = resp.json().await.context("Malformed search response")?;

            let count = page.issues.len() as u64;
            keys.extend(page.issues.into_iter().map(|i| i.key));
            start_at += count;

            let total = page.total.unwrap_or(0);
            if count == 0 || start_at >= total {
                break;
            }
        }

        Ok(keys)
    }

    async fn list_attachments(&self, key: &str) -> Result<Vec<Attachment>> {
        let raw = self.fetch_issue(key, "attachment").await?;
        Ok(raw.fields.attachment)
    }

    async fn download_attachment(&self, attachment: &Attachment, dest: &Path) -> Result<u64> {
        let url = attachment
            .content
            .as_deref()
            .ok_or_else(|| anyhow!("attachment {} has no content URL", attachment.id))?;

        let req = if same_origin(url, &self.base_url) {
            self.authed(url)
        } else {
            tracing::debug!(%url, "content URL is on another host, sending no credentials");
            self.client.get(url)
        };
        let resp = req
            .send()
            .await
            .map_err(|e| anyhow!("GET {}: {}", url, e))?;
        let resp = ensure_success(resp, &format!("GET attachment {}", attachment.id)).await?;
        write_response(resp, dest).await
    }
}

/// Jira renders timestamps as `2024-01-15T10:30:00.000+0000`.
fn parse_jira_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
}

// ============ Wire types ============

#[derive(Deserialize)]
struct Myself {
    #[serde(default, rename = "displayName")]
    display_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct IssueResponse {
    key: String,
    #[serde(default)]
    fields: IssueFields,
}

#[derive(Deserialize, Default)]
struct IssueFields {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(default)]
    attachment: Vec<Attachment>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    issues: Vec<IssueRef>,
}

#[derive(Deserialize)]
struct IssueRef {
    key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> JiraClient {
        JiraClient::new(
            server.uri(),
            Some(Credentials::new("alice", "s3cret")),
            reqwest::Client::new(),
            2,
        )
    }

    #[test]
    fn parses_jira_timestamps() {
        assert!(parse_jira_timestamp("2024-01-15T10:30:00.000+0000").is_some());
        assert!(parse_jira_timestamp("2024-01-15T10:30:00+02:00").is_some());
        assert!(parse_jira_timestamp("yesterday").is_none());
    }

    #[tokio::test]
    async fn get_issue_sends_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/issue/ABC-1"))
            .and(header("authorization", "Basic YWxpY2U6czNjcmV0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "key": "ABC-1",
                "fields": {"summary": "Broken login", "updated": "2024-01-15T10:30:00.000+0000"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let issue = client_for(&server).get_issue("ABC-1").await.unwrap();
        assert_eq!(issue.key, "ABC-1");
        assert_eq!(issue.summary.as_deref(), Some("Broken login"));
        assert!(issue.updated.is_some());
    }

    #[tokio::test]
    async fn list_attachments_decodes_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/issue/ABC-1"))
            .and(query_param("fields", "attachment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "key": "ABC-1",
                "fields": {"attachment": [
                    {"id": "1", "filename": "a.pdf", "size": 3, "content": "http://x/a.pdf"},
                    {"id": "2", "filename": "b.png"}
                ]}
            })))
            .mount(&server)
            .await;

        let atts = client_for(&server).list_attachments("ABC-1").await.unwrap();
        assert_eq!(atts.len(), 2);
        assert_eq!(atts[0].filename, "a.pdf");
        assert_eq!(atts[1].size, None);
    }

    #[tokio::test]
    async fn missing_issue_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/issue/ABC-404"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Issue does not exist"))
            .mount(&server)
            .await;

        let err = client_for(&server).get_issue("ABC-404").await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn search_follows_start_at() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("startAt", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "startAt": 0, "maxResults": 2, "total": 3,
                "issues": [{"key": "X-1"}, {"key": "X-2"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("startAt", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "startAt": 2, "maxResults": 2, "total": 3,
                "issues": [{"key": "X-3"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let keys = client_for(&server)
            .search_issues("project = X", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(keys, vec!["X-1", "X-2", "X-3"]);
    }

    #[tokio::test]
    async fn download_requires_content_url() {
        let server = MockServer::start().await;
        let tmp = tempfile::TempDir::new().unwrap();
        let att = Attachment {
            id: "9".to_string(),
            filename: "x.bin".to_string(),
            size: Some(1),
            content: None,
            mime_type: None,
        };
        let err = client_for(&server)
            .download_attachment(&att, &tmp.path().join("x.bin"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no content URL"));
    }

    #[tokio::test]
    async fn download_sends_credentials_only_to_jira_origin() {
        let server = MockServer::start().await;
        let elsewhere = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secure/attachment/1/a.pdf"))
            .and(header("authorization", "Basic YWxpY2U6czNjcmV0"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"local".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"remote".to_vec()))
            .expect(1)
            .mount(&elsewhere)
            .await;

        let tmp = tempfile::TempDir::new().unwrap();
        let client = client_for(&server);
        let local = Attachment {
            id: "1".to_string(),
            filename: "a.pdf".to_string(),
            size: Some(5),
            content: Some(format!("{}/secure/attachment/1/a.pdf", server.uri())),
            mime_type: None,
        };
        let remote = Attachment {
            id: "2".to_string(),
            filename: "b.pdf".to_string(),
            size: Some(6),
            content: Some(format!("{}/b.pdf", elsewhere.uri())),
            mime_type: None,
        };

        assert_eq!(client.download_attachment(&local, &tmp.path().join("a.pdf")).await.unwrap(), 5);
        assert_eq!(client.download_attachment(&remote, &tmp.path().join("b.pdf")).await.unwrap(), 6);

        let requests = elsewhere.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn verify_session_reports_display_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/myself"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"displayName": "Alice"})),
            )
            .mount(&server)
            .await;

        let who = client_for(&server).verify_session().await.unwrap();
        assert_eq!(who.as_deref(), Some("Alice"));
    }
}
