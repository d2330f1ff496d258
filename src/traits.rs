//! The issue tracker seam.
//!
//! [`IssueTracker`] is the "native" path the resolver and synchronizer try
//! first. [`JiraClient`](crate::jira::JiraClient) implements it over the Jira
//! REST API; tests substitute in-memory trackers.
//!
//! ```text
//! ┌────────────┐   native    ┌──────────────┐
//! │  resolve / │────────────▶│ IssueTracker │
//! │  archive   │             └──────────────┘
//! │            │   on Err    ┌──────────────┐
//! │            │────────────▶│ DirectAccess │
//! └────────────┘             └──────────────┘
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::models::{Attachment, Issue};

#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Fetch issue metadata.
    async fn get_issue(&self, key: &str) -> Result<Issue>;

    /// Run a query and return the matching issue keys.
    ///
    /// `cancel` is checked before each page request; a cancelled search
    /// fails with [`MirrorError::Cancelled`](crate::error::MirrorError::Cancelled).
    async fn search_issues(&self, jql: &str, cancel: &CancellationToken) -> Result<Vec<String>>;

    /// List the attachments of an issue.
    async fn list_attachments(&self, key: &str) -> Result<Vec<Attachment>>;

    /// Download one attachment to `dest`, returning the bytes written.
    ///
    /// Implementations must leave `dest` untouched on failure.
    async fn download_attachment(&self, attachment: &Attachment, dest: &Path) -> Result<u64>;
}
