//! Issue resolution.
//!
//! Merges the three selectors into one sorted, de-duplicated key list:
//!
//! 1. explicit keys,
//! 2. the expanded `--from`/`--to` range,
//! 3. the keys matched by the composed JQL query: native search first, then
//!    the paginated raw search when the native call fails.
//!
//! Keys are ordered lexicographically, so `X-10` sorts before `X-2`.

use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;

use crate::direct::DirectAccess;
use crate::error::{MirrorError, Result};
use crate::models::IssueSelection;
use crate::query::compose_query;
use crate::range::{expand_range, split_key};
use crate::traits::IssueTracker;

/// Keys that need no network access: explicit keys plus the expanded range.
///
/// Explicit keys and the range are validated here, before any request is
/// made.
pub fn local_keys(selection: &IssueSelection) -> Result<BTreeSet<String>> {
    let mut keys = BTreeSet::new();
    for key in selection.issues.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
        split_key(key)?;
        keys.insert(key.to_string());
    }

    match (&selection.from, &selection.to) {
        (Some(from), Some(to)) => keys.extend(expand_range(from, to)?),
        (None, None) => {}
        _ => {
            return Err(MirrorError::Validation(
                "a range needs both a start and an end key".to_string(),
            ))
        }
    }

    Ok(keys)
}

/// The JQL a selection resolves to; empty when no query applies.
pub fn selection_query(selection: &IssueSelection) -> String {
    compose_query(selection.jql.as_deref(), &selection.filters)
}

pub struct Resolver<'a> {
    tracker: &'a dyn IssueTracker,
    direct: &'a DirectAccess,
}

impl<'a> Resolver<'a> {
    pub fn new(tracker: &'a dyn IssueTracker, direct: &'a DirectAccess) -> Self {
        Self { tracker, direct }
    }

    /// Resolve every selector of `selection` to a sorted key list.
    pub async fn resolve(
        &self,
        selection: &IssueSelection,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let mut keys = local_keys(selection)?;

        let query = selection_query(selection);
        if !query.is_empty() {
            keys.extend(self.query_keys(&query, cancel).await?);
        }

        Ok(keys.into_iter().collect())
    }

    /// Keys matching `jql`, native search first and raw search on failure.
    pub async fn query_keys(&self, jql: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        if cancel.is_cancelled() {
            return Err(MirrorError::Cancelled);
        }

        tracing::info!(%jql, "resolving query");
        match self.tracker.search_issues(jql, cancel).await {
            Ok(keys) => {
                tracing::debug!(count = keys.len(), "native search succeeded");
                return Ok(keys);
            }
            Err(_) if cancel.is_cancelled() => return Err(MirrorError::Cancelled),
            Err(e) => {
                tracing::warn!("native search failed, falling back to raw search: {:#}", e);
            }
        }

        let keys = self.direct.search_keys(jql, cancel).await?;
        tracing::debug!(count = keys.len(), "raw search succeeded");
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jira::JiraClient;
    use crate::models::{Attachment, Credentials, DateFilters, Issue};
    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Tracker whose search either returns fixed keys or fails.
    struct SearchOnly {
        keys: Option<Vec<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IssueTracker for SearchOnly {
        async fn get_issue(&self, key: &str) -> anyhow::Result<Issue> {
            bail!("unexpected get_issue({})", key)
        }
        async fn search_issues(
            &self,
            _jql: &str,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.keys {
                Some(k) => Ok(k.clone()),
                None => bail!("HTTP 410 Gone"),
            }
        }
        async fn list_attachments(&self, key: &str) -> anyhow::Result<Vec<Attachment>> {
            bail!("unexpected list_attachments({})", key)
        }
        async fn download_attachment(&self, _a: &Attachment, _d: &Path) -> anyhow::Result<u64> {
            bail!("unexpected download")
        }
    }

    /// Serves search pages of two keys out of six and cancels the run as soon
    /// as the first page is requested.
    struct CancelOnFirstPage {
        cancel: CancellationToken,
        served: AtomicUsize,
    }

    impl wiremock::Respond for CancelOnFirstPage {
        fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
            let page = self.served.fetch_add(1, Ordering::SeqCst);
            self.cancel.cancel();
            ResponseTemplate::new(200).set_body_json(json!({
                "total": 6,
                "issues": [
                    {"key": format!("X-{}", page * 2 + 1)},
                    {"key": format!("X-{}", page * 2 + 2)}
                ]
            }))
        }
    }

    fn offline_direct() -> DirectAccess {
        DirectAccess::new(None, None, reqwest::Client::new(), 100)
    }

    #[test]
    fn explicit_and_range_merge_sorted_without_duplicates() {
        let selection = IssueSelection {
            issues: vec!["X-2".to_string()],
            from: Some("X-1".to_string()),
            to: Some("X-3".to_string()),
            ..Default::default()
        };
        let keys: Vec<String> = local_keys(&selection).unwrap().into_iter().collect();
        assert_eq!(keys, vec!["X-1", "X-2", "X-3"]);
    }

    #[test]
    fn ordering_is_lexicographic() {
        let selection = IssueSelection {
            issues: vec!["X-2".to_string(), "X-10".to_string(), " ".to_string()],
            ..Default::default()
        };
        let keys: Vec<String> = local_keys(&selection).unwrap().into_iter().collect();
        assert_eq!(keys, vec!["X-10", "X-2"]);
    }

    #[test]
    fn malformed_explicit_key_is_validation_error() {
        for bad in ["X-1#x", "X-1?y", "not a key"] {
            let selection = IssueSelection {
                issues: vec!["X-2".to_string(), bad.to_string()],
                ..Default::default()
            };
            assert!(
                matches!(local_keys(&selection), Err(MirrorError::Validation(_))),
                "{} was accepted",
                bad
            );
        }
    }

    #[test]
    fn half_open_range_is_validation_error() {
        let selection = IssueSelection {
            from: Some("X-1".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            local_keys(&selection),
            Err(MirrorError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn no_query_means_no_search() {
        let tracker = SearchOnly {
            keys: Some(vec!["Z-1".to_string()]),
            calls: AtomicUsize::new(0),
        };
        let direct = offline_direct();
        let selection = IssueSelection {
            issues: vec!["A-1".to_string()],
            ..Default::default()
        };
        let keys = Resolver::new(&tracker, &direct)
            .resolve(&selection, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(keys, vec!["A-1"]);
        assert_eq!(tracker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn native_search_results_are_merged() {
        let tracker = SearchOnly {
            keys: Some(vec!["B-1".to_string(), "A-1".to_string()]),
            calls: AtomicUsize::new(0),
        };
        let direct = offline_direct();
        let selection = IssueSelection {
            issues: vec!["A-1".to_string()],
            filters: DateFilters {
                today: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let keys = Resolver::new(&tracker, &direct)
            .resolve(&selection, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(keys, vec!["A-1", "B-1"]);
    }

    #[tokio::test]
    async fn failed_native_search_falls_back_to_raw_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/3/search/jql"))
            .and(wiremock::matchers::query_param_is_missing("nextPageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issues": [{"key": "Q-2"}], "nextPageToken": "t2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/3/search/jql"))
            .and(wiremock::matchers::query_param("nextPageToken", "t2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issues": [{"key": "Q-1"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tracker = SearchOnly {
            keys: None,
            calls: AtomicUsize::new(0),
        };
        let direct = DirectAccess::new(
            Some(server.uri()),
            Some(Credentials::new("u", "p")),
            reqwest::Client::new(),
            100,
        );
        let selection = IssueSelection {
            jql: Some("project = Q".to_string()),
            ..Default::default()
        };
        let keys = Resolver::new(&tracker, &direct)
            .resolve(&selection, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(keys, vec!["Q-1", "Q-2"]);
        assert_eq!(tracker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_native_search_between_pages() {
        let server = MockServer::start().await;
        let cancel = CancellationToken::new();
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .respond_with(CancelOnFirstPage {
                cancel: cancel.clone(),
                served: AtomicUsize::new(0),
            })
            .mount(&server)
            .await;

        let creds = Some(Credentials::new("u", "p"));
        let tracker = JiraClient::new(server.uri(), creds.clone(), reqwest::Client::new(), 2);
        let direct = DirectAccess::new(Some(server.uri()), creds, reqwest::Client::new(), 2);

        let err = Resolver::new(&tracker, &direct)
            .query_keys("project = X", &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, MirrorError::Cancelled));
        // One search page, no further pages and no raw-search fallback.
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fallback_without_credentials_is_configuration_error() {
        let tracker = SearchOnly {
            keys: None,
            calls: AtomicUsize::new(0),
        };
        let direct = DirectAccess::new(
            Some("https://jira.example.com".to_string()),
            None,
            reqwest::Client::new(),
            100,
        );
        let selection = IssueSelection {
            jql: Some("project = Q".to_string()),
            ..Default::default()
        };
        let err = Resolver::new(&tracker, &direct)
            .resolve(&selection, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Configuration(_)));
    }

    #[tokio::test]
    async fn empty_selection_resolves_to_nothing() {
        let tracker = SearchOnly {
            keys: None,
            calls: AtomicUsize::new(0),
        };
        let direct = offline_direct();
        let keys = Resolver::new(&tracker, &direct)
            .resolve(&IssueSelection::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(keys.is_empty());
    }
}
