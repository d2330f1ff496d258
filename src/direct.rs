//! Direct REST access, used when the native client fails.
//!
//! Two operations:
//!
//! - **search** against `GET /rest/api/3/search/jql`, following the opaque
//!   `nextPageToken` until the service stops returning one;
//! - **download** from the attachment's own content URL, or from
//!   `GET /rest/api/3/attachment/content/{id}` when it has none.
//!
//! Both require a base URL and HTTP Basic credentials. Whether they are
//! present is checked per call, so a missing credential fails only the step
//! that needed it. Credentials are sent only to the base URL's origin; a
//! content URL on another host is fetched without them.

use serde::Deserialize;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::download::{ensure_success, same_origin, write_response};
use crate::error::{MirrorError, Result};
use crate::models::{Attachment, Credentials};

/// Path of the paginated search endpoint.
pub const SEARCH_ENDPOINT: &str = "rest/api/3/search/jql";
/// Path prefix of the attachment content endpoint.
pub const ATTACHMENT_ENDPOINT: &str = "rest/api/3/attachment/content";

pub struct DirectAccess {
    base_url: Option<String>,
    credentials: Option<Credentials>,
    client: reqwest::Client,
    page_size: u32,
}

impl DirectAccess {
    pub fn new(
        base_url: Option<String>,
        credentials: Option<Credentials>,
        client: reqwest::Client,
        page_size: u32,
    ) -> Self {
        Self {
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            credentials,
            client,
            page_size: page_size.max(1),
        }
    }

    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        Self::new(
            config.base_url().map(str::to_string),
            config.credentials(),
            client,
            config.http.page_size,
        )
    }

    fn base_url(&self) -> Result<&str> {
        self.base_url.as_deref().ok_or_else(|| {
            MirrorError::Configuration("direct access needs a Jira base URL".to_string())
        })
    }

    fn credentials(&self) -> Result<&Credentials> {
        self.credentials.as_ref().ok_or_else(|| {
            MirrorError::Configuration(
                "direct access needs a user and API token for Basic auth".to_string(),
            )
        })
    }

    /// Run `jql` against the raw search endpoint and collect every key,
    /// page by page.
    pub async fn search_keys(&self, jql: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        let base = self.base_url()?;
        let auth = self.credentials()?.basic_header();
        let url = format!("{}/{}", base, SEARCH_ENDPOINT);

        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(MirrorError::Cancelled);
            }

            let mut params = vec![
                ("jql", jql.to_string()),
                ("maxResults", self.page_size.to_string()),
                ("fields", "key".to_string()),
            ];
            if let Some(ref t) = token {
                params.push(("nextPageToken", t.clone()));
            }

            let resp = self
                .client
                .get(&url)
                .header(reqwest::header::AUTHORIZATION, &auth)
                .header(reqwest::header::ACCEPT, "application/json")
                .query(&params)
                .send()
                .await
                .map_err(|e| MirrorError::remote("search", e))?;
            let resp = ensure_success(resp, "raw search")
                .await
                .map_err(|e| MirrorError::remote("search", e))?;
            let page: SearchPage = resp
                .json()
                .await
                .map_err(|e| MirrorError::remote("search", format!("malformed page: {}", e)))?;

            pages += 1;
            keys.extend(page.issues.into_iter().map(|i| i.key));
            tracing::debug!(page = pages, total = keys.len(), "raw search page");

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => {
                    if token.as_deref() == Some(next.as_str()) {
                        return Err(MirrorError::remote(
                            "search",
                            "service returned the same continuation token twice",
                        ));
                    }
                    token = Some(next);
                }
                None => break,
            }
        }

        Ok(keys)
    }

    /// URL to fetch an attachment's bytes from.
    pub fn content_url(&self, attachment: &Attachment) -> Result<String> {
        if let Some(url) = attachment.content.as_deref().filter(|u| !u.is_empty()) {
            return Ok(url.to_string());
        }
        if attachment.id.is_empty() {
            return Err(MirrorError::download(
                &attachment.filename,
                "no content URL and no attachment id",
            ));
        }
        let base = self.base_url()?;
        Ok(format!("{}/{}/{}", base, ATTACHMENT_ENDPOINT, attachment.id))
    }

    /// Fetch an attachment with an explicit Basic auth header.
    pub async fn download(&self, attachment: &Attachment, dest: &Path) -> Result<u64> {
        let fail = |e: &dyn std::fmt::Display| MirrorError::download(&attachment.filename, e);

        let base = self.base_url().map_err(|e| fail(&e))?;
        let auth = self.credentials().map_err(|e| fail(&e))?.basic_header();
        let url = self.content_url(attachment).map_err(|e| fail(&e))?;

        let mut req = self.client.get(&url);
        if same_origin(&url, base) {
            req = req.header(reqwest::header::AUTHORIZATION, auth);
        } else {
            tracing::debug!(%url, "content URL is on another host, sending no credentials");
        }

        let resp = req
            .send()
            .await
            .map_err(|e| fail(&e))?;
        let resp = ensure_success(resp, "direct download")
            .await
            .map_err(|e| fail(&e))?;
        write_response(resp, dest).await.map_err(|e| fail(&e))
    }
}

#[derive(Deserialize)]
struct SearchPage {
    #[serde(default)]
    issues: Vec<IssueRef>,
    #[serde(default, rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct IssueRef {
    key: String,
}
