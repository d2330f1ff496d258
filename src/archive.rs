//! Archive synchronizer.
//!
//! Mirrors each resolved issue's attachments into `<root>/<KEY>/<filename>`.
//!
//! # Per issue
//!
//! 1. Fetch the issue. Failure: logged, counted, next issue.
//! 2. Create `<root>/<KEY>`. Failure: logged, counted, next issue.
//! 3. List attachments, keep those matching the filename glob. Failure:
//!    logged, counted, next issue.
//! 4. Per attachment: skip when the local file already has the remote size
//!    (and that size is known and positive), otherwise download.
//!
//! # Per attachment
//!
//! ```text
//! Pending ──▶ Skipped
//!    │
//!    └──▶ Downloading ──▶ Downloaded
//!              │
//!              └──▶ Failed   (native and direct download both failed)
//! ```
//!
//! Issues run with at most `concurrency` in flight; attachments of one issue
//! run one at a time. Nothing here aborts the run except failing to create
//! the archive root.

use futures::StreamExt;
use globset::{GlobBuilder, GlobMatcher};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::direct::DirectAccess;
use crate::error::{MirrorError, Result};
use crate::models::{Attachment, AttachmentOutcome, SyncStats, SyncSummary};
use crate::progress::{NoProgress, SyncProgressEvent, SyncProgressReporter};
use crate::traits::IssueTracker;

/// How a run behaves, independent of where issues come from.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub root: PathBuf,
    pub pattern: Option<GlobMatcher>,
    pub concurrency: usize,
    pub dry_run: bool,
}

impl SyncOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pattern: None,
            concurrency: 1,
            dry_run: false,
        }
    }

    pub fn from_config(config: &Config, dry_run: bool) -> Result<Self> {
        let pattern = config
            .archive
            .pattern
            .as_deref()
            .map(build_pattern)
            .transpose()?;
        Ok(Self {
            root: config.archive.root.clone(),
            pattern,
            concurrency: config.archive.concurrency.max(1),
            dry_run,
        })
    }
}

/// Compile a filename wildcard such as `*.pdf`.
pub fn build_pattern(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| MirrorError::Validation(format!("invalid pattern '{}': {}", pattern, e)))
}

/// Destination for `filename` inside `dir`. Names that would escape the
/// issue directory are rejected.
pub fn attachment_path(dir: &Path, filename: &str) -> Result<PathBuf> {
    let candidate = Path::new(filename);
    let mut components = candidate.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(dir.join(candidate)),
        _ => Err(MirrorError::download(
            filename,
            "filename is not a plain file name",
        )),
    }
}

/// Whether `dest` already holds this attachment, judged by size alone.
pub async fn is_up_to_date(dest: &Path, attachment: &Attachment) -> bool {
    let Some(remote) = attachment.known_size() else {
        return false;
    };
    match tokio::fs::metadata(dest).await {
        Ok(meta) => meta.is_file() && meta.len() == remote,
        Err(_) => false,
    }
}

pub struct Synchronizer<'a> {
    tracker: &'a dyn IssueTracker,
    direct: &'a DirectAccess,
    options: SyncOptions,
    progress: &'a dyn SyncProgressReporter,
}

impl<'a> Synchronizer<'a> {
    pub fn new(tracker: &'a dyn IssueTracker, direct: &'a DirectAccess, options: SyncOptions) -> Self {
        Self {
            tracker,
            direct,
            options,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn SyncProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Mirror every issue in `keys`. Only failing to create the archive root
    /// is an error; everything else is counted in the summary.
    pub async fn run(&self, keys: &[String], cancel: &CancellationToken) -> Result<SyncSummary> {
        if !self.options.dry_run {
            tokio::fs::create_dir_all(&self.options.root)
                .await
                .map_err(|e| MirrorError::filesystem(&self.options.root, e))?;
        }

        let stats = SyncStats::default();
        let started = AtomicU64::new(0);
        let total = keys.len() as u64;

        futures::stream::iter(keys)
            .for_each_concurrent(self.options.concurrency.max(1), |key| {
                let stats = &stats;
                let started = &started;
                async move {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let n = started.fetch_add(1, Ordering::Relaxed) + 1;
                    self.progress.report(SyncProgressEvent::Issue {
                        key: key.clone(),
                        n,
                        total,
                    });
                    self.sync_issue(key, stats, cancel).await;
                }
            })
            .await;

        if cancel.is_cancelled() {
            tracing::warn!("run cancelled; remaining issues were not processed");
        }

        Ok(stats.summary())
    }

    async fn sync_issue(&self, key: &str, stats: &SyncStats, cancel: &CancellationToken) {
        stats.issue_started();

        let issue = match self.tracker.get_issue(key).await {
            Ok(issue) => issue,
            Err(e) => {
                tracing::warn!("{}", MirrorError::remote(key, format!("{:#}", e)));
                stats.issue_failed();
                return;
            }
        };
        if issue.key != key {
            tracing::info!(requested = %key, current = %issue.key, "issue was moved");
        }
        if cancel.is_cancelled() {
            return;
        }

        let dir = match attachment_path(&self.options.root, key) {
            Ok(dir) => dir,
            Err(_) => {
                tracing::warn!(%key, "issue key is not usable as a directory name");
                stats.issue_failed();
                return;
            }
        };
        if !self.options.dry_run {
            if let Err(e) = tokio::fs::create_dir_all(&dir).await {
                tracing::warn!("{}", MirrorError::filesystem(&dir, e));
                stats.issue_failed();
                return;
            }
        }

        let attachments = match self.tracker.list_attachments(key).await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(
                    "{}",
                    MirrorError::remote(key, format!("listing attachments: {:#}", e))
                );
                stats.issue_failed();
                return;
            }
        };

        let selected: Vec<&Attachment> = attachments
            .iter()
            .filter(|a| match &self.options.pattern {
                Some(glob) => glob.is_match(&a.filename),
                None => true,
            })
            .collect();

        tracing::info!(
            %key,
            summary = issue.summary.as_deref().unwrap_or(""),
            updated = ?issue.updated,
            attachments = attachments.len(),
            selected = selected.len(),
            "syncing issue"
        );

        for attachment in selected {
            if cancel.is_cancelled() {
                break;
            }
            let outcome = self.sync_attachment(&dir, attachment).await;
            stats.record(outcome);
            self.progress.report(SyncProgressEvent::Attachment {
                key: key.to_string(),
                filename: attachment.filename.clone(),
                outcome: outcome_label(outcome),
            });
        }
    }

    async fn sync_attachment(&self, dir: &Path, attachment: &Attachment) -> AttachmentOutcome {
        let dest = match attachment_path(dir, &attachment.filename) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("{}", e);
                return AttachmentOutcome::Failed;
            }
        };

        if is_up_to_date(&dest, attachment).await {
            tracing::debug!(path = %dest.display(), "up to date");
            return AttachmentOutcome::Skipped;
        }

        if self.options.dry_run {
            tracing::info!(path = %dest.display(), "would download");
            return AttachmentOutcome::Planned;
        }

        match self.fetch(attachment, &dest).await {
            Ok(bytes) => {
                if let Some(expected) = attachment.known_size() {
                    if expected != bytes {
                        tracing::warn!(
                            path = %dest.display(),
                            expected,
                            received = bytes,
                            "downloaded size differs from reported size"
                        );
                    }
                }
                tracing::info!(path = %dest.display(), bytes, "downloaded");
                AttachmentOutcome::Downloaded { bytes }
            }
            Err(e) => {
                tracing::warn!("{}", e);
                AttachmentOutcome::Failed
            }
        }
    }

    /// Native download, then the direct request if that fails.
    async fn fetch(&self, attachment: &Attachment, dest: &Path) -> Result<u64> {
        match self.tracker.download_attachment(attachment, dest).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::debug!(
                    file = %attachment.filename,
                    "native download failed, trying direct request: {:#}",
                    e
                );
                self.direct.download(attachment, dest).await
            }
        }
    }
}

fn outcome_label(outcome: AttachmentOutcome) -> &'static str {
    match outcome {
        AttachmentOutcome::Skipped => "skipped",
        AttachmentOutcome::Downloaded { .. } => "downloaded",
        AttachmentOutcome::Planned => "would download",
        AttachmentOutcome::Failed => "failed",
    }
}
