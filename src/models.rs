//! Core data models used throughout jira-mirror.
//!
//! These types describe the issues and attachments fetched from Jira, the
//! credentials used to talk to it, and the counters a mirror run reports.
//! Nothing here outlives a single invocation except as files on disk.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// An issue as returned by the tracker, reduced to what the mirror needs.
#[derive(Debug, Clone)]
pub struct Issue {
    pub key: String,
    pub summary: Option<String>,
    pub updated: Option<DateTime<FixedOffset>>,
}

/// Remote attachment metadata, decoded once from the Jira JSON payload.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub size: Option<u64>,
    /// Direct content URL. Absent on some payloads; the id is enough to
    /// build one.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, rename = "mimeType")]
    pub mime_type: Option<String>,
}

impl Attachment {
    /// Remote size when it is usable for change detection.
    pub fn known_size(&self) -> Option<u64> {
        self.size.filter(|s| *s > 0)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(u64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

/// Username and API token/password, sent as HTTP Basic auth.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: secret.into(),
        }
    }

    /// Value for the `Authorization` header: `Basic base64(user:secret)`.
    pub fn basic_header(&self) -> String {
        let raw = format!("{}:{}", self.user, self.secret);
        format!("Basic {}", STANDARD.encode(raw.as_bytes()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("secret", &"***")
            .finish()
    }
}

/// Date conditions appended to the issue query. All supplied filters are
/// combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateFilters {
    pub last_days: Option<u32>,
    pub today: bool,
    pub after: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
}

/// Everything that selects issues for a run.
#[derive(Debug, Clone, Default)]
pub struct IssueSelection {
    pub issues: Vec<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub jql: Option<String>,
    pub filters: DateFilters,
}

/// Run-level counters. Atomic so that concurrent issue workers can share one
/// instance.
#[derive(Debug, Default)]
pub struct SyncStats {
    issues_processed: AtomicU64,
    issues_failed: AtomicU64,
    downloaded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    planned: AtomicU64,
    bytes: AtomicU64,
}

/// Outcome of a single attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentOutcome {
    Skipped,
    Downloaded { bytes: u64 },
    Planned,
    Failed,
}

impl SyncStats {
    pub fn issue_started(&self) {
        self.issues_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn issue_failed(&self) {
        self.issues_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self, outcome: AttachmentOutcome) {
        match outcome {
            AttachmentOutcome::Skipped => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            AttachmentOutcome::Downloaded { bytes } => {
                self.downloaded.fetch_add(1, Ordering::Relaxed);
                self.bytes.fetch_add(bytes, Ordering::Relaxed);
            }
            AttachmentOutcome::Planned => {
                self.planned.fetch_add(1, Ordering::Relaxed);
            }
            AttachmentOutcome::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn summary(&self) -> SyncSummary {
        SyncSummary {
            issues_processed: self.issues_processed.load(Ordering::Relaxed),
            issues_failed: self.issues_failed.load(Ordering::Relaxed),
            downloaded: self.downloaded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            planned: self.planned.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Plain snapshot of [`SyncStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub issues_processed: u64,
    pub issues_failed: u64,
    pub downloaded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub planned: u64,
    pub bytes: u64,
}
