//! Command drivers for `jmirror sync` and `jmirror resolve`.
//!
//! Orders the setup so that everything that can be checked offline (range
//! endpoints, the filename pattern) is checked before the first request, and
//! the service is only contacted when there is something to ask it.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::archive::{SyncOptions, Synchronizer};
use crate::config::Config;
use crate::direct::DirectAccess;
use crate::jira::{http_client, JiraClient};
use crate::models::{IssueSelection, SyncSummary};
use crate::progress::{ProgressMode, SyncProgressEvent};
use crate::resolve::{local_keys, selection_query, Resolver};

/// Native client and direct fallback sharing one HTTP client.
pub struct Session {
    pub client: JiraClient,
    pub direct: DirectAccess,
}

impl Session {
    /// Build both clients and check the credentials.
    pub async fn connect(config: &Config) -> Result<Self> {
        let http = http_client(config)?;
        let client = JiraClient::from_config(config, http.clone())?;
        let direct = DirectAccess::from_config(config, http);

        match client
            .verify_session()
            .await
            .with_context(|| format!("Failed to authenticate with {}", client.base_url()))?
        {
            Some(who) => tracing::info!(user = %who, "authenticated"),
            None => tracing::info!("no credentials configured, using anonymous access"),
        }

        Ok(Self { client, direct })
    }

    pub async fn resolve(
        &self,
        selection: &IssueSelection,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        Ok(Resolver::new(&self.client, &self.direct)
            .resolve(selection, cancel)
            .await?)
    }
}

/// Resolve the selection, connecting only when a query has to be run.
async fn resolve_selection(
    config: &Config,
    selection: &IssueSelection,
    cancel: &CancellationToken,
) -> Result<(Vec<String>, Option<Session>)> {
    let local = local_keys(selection)?;
    if selection_query(selection).is_empty() {
        return Ok((local.into_iter().collect(), None));
    }

    let session = Session::connect(config).await?;
    let keys = session.resolve(selection, cancel).await?;
    Ok((keys, Some(session)))
}

/// `jmirror resolve`: print the resolved keys, one per line.
pub async fn run_resolve(
    config: &Config,
    selection: &IssueSelection,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    let (keys, _) = resolve_selection(config, selection, cancel).await?;
    for key in &keys {
        println!("{}", key);
    }
    Ok(keys)
}

/// `jmirror sync`: resolve the selection and mirror every issue.
pub async fn run_sync(
    config: &Config,
    selection: &IssueSelection,
    dry_run: bool,
    progress: ProgressMode,
    cancel: &CancellationToken,
) -> Result<SyncSummary> {
    let options = SyncOptions::from_config(config, dry_run)?;
    let reporter = progress.reporter();

    reporter.report(SyncProgressEvent::Resolving);
    let (keys, session) = resolve_selection(config, selection, cancel).await?;

    if keys.is_empty() {
        println!("nothing to do: no issues selected");
        println!("  issues processed: 0");
        println!("ok");
        return Ok(SyncSummary::default());
    }

    let session = match session {
        Some(s) => s,
        None => Session::connect(config).await?,
    };

    tracing::info!(
        issues = keys.len(),
        root = %options.root.display(),
        "starting sync"
    );

    let summary = Synchronizer::new(&session.client, &session.direct, options)
        .with_progress(reporter.as_ref())
        .run(&keys, cancel)
        .await
        .context("Failed to prepare the archive root")?;

    print_summary(&summary, dry_run);
    Ok(summary)
}

fn print_summary(summary: &SyncSummary, dry_run: bool) {
    if dry_run {
        println!("sync (dry-run)");
    } else {
        println!("sync");
    }
    println!("  issues processed: {}", summary.issues_processed);
    println!("  issues failed: {}", summary.issues_failed);
    if dry_run {
        println!("  would download: {}", summary.planned);
    } else {
        println!(
            "  downloaded: {} ({} bytes)",
            summary.downloaded, summary.bytes
        );
    }
    println!("  skipped: {}", summary.skipped);
    println!("  failed: {}", summary.failed);
    println!("ok");
}
