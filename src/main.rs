//! # jira-mirror CLI (`jmirror`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `jmirror sync` | Resolve issues and mirror their attachments |
//! | `jmirror resolve` | Print the issue keys a selection resolves to |
//! | `jmirror completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! # Two explicit issues into ./attachments
//! jmirror sync --issue ABC-1,ABC-7 --dest ./attachments
//!
//! # A key range, PDFs only
//! jmirror sync --from ABC-100 --to ABC-150 --pattern '*.pdf'
//!
//! # Everything updated in project ABC during the last week
//! jmirror sync --jql 'project = ABC' --last-days 7
//! ```

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use jira_mirror::commands;
use jira_mirror::config::{self, Overrides};
use jira_mirror::models::{DateFilters, IssueSelection};
use jira_mirror::progress::ProgressMode;

/// Mirror Jira issue attachments into a local directory tree.
#[derive(Parser)]
#[command(
    name = "jmirror",
    about = "Mirror Jira issue attachments into a local directory tree",
    version,
    long_about = "jmirror resolves a set of Jira issues from explicit keys, key ranges \
    and JQL queries, then downloads each issue's attachments into \
    <dest>/<ISSUE-KEY>/<filename>, skipping files whose size already matches."
)]
struct Cli {
    /// Path to a configuration file (TOML).
    ///
    /// Defaults to `./jmirror.toml` when that file exists.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace). `RUST_LOG` wins.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve issues and mirror their attachments.
    Sync {
        #[command(flatten)]
        selection: SelectionArgs,

        #[command(flatten)]
        connection: ConnectionArgs,

        /// Only mirror attachments whose filename matches this wildcard (e.g. `*.pdf`).
        #[arg(long)]
        pattern: Option<String>,

        /// Archive root. Defaults to the current directory.
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Maximum number of issues processed at once.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Show what would be downloaded without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr.
        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressMode,
    },

    /// Print the issue keys a selection resolves to, one per line.
    Resolve {
        #[command(flatten)]
        selection: SelectionArgs,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Print a shell completion script.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },
}

/// Issue selectors and date filters.
#[derive(Args)]
struct SelectionArgs {
    /// Issue keys, repeatable or comma-separated.
    #[arg(short, long = "issue", value_delimiter = ',')]
    issues: Vec<String>,

    /// First key of a range (requires --to).
    #[arg(long, requires = "to")]
    from: Option<String>,

    /// Last key of a range (requires --from).
    #[arg(long, requires = "from")]
    to: Option<String>,

    /// JQL query fragment.
    #[arg(long)]
    jql: Option<String>,

    /// Only issues updated within the last N days.
    #[arg(long)]
    last_days: Option<u32>,

    /// Only issues updated since the start of today.
    #[arg(long)]
    today: bool,

    /// Only issues updated on or after this date (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    after: Option<NaiveDate>,

    /// Only issues updated on or before this date (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    before: Option<NaiveDate>,
}

impl From<SelectionArgs> for IssueSelection {
    fn from(args: SelectionArgs) -> Self {
        IssueSelection {
            issues: args.issues,
            from: args.from,
            to: args.to,
            jql: args.jql,
            filters: DateFilters {
                last_days: args.last_days,
                today: args.today,
                after: args.after,
                before: args.before,
            },
        }
    }
}

/// Service address and credentials.
#[derive(Args)]
struct ConnectionArgs {
    /// Jira base URL (overrides `JIRA_URL` and the config file).
    #[arg(long)]
    url: Option<String>,

    /// Jira user (overrides `JIRA_USER`).
    #[arg(long)]
    user: Option<String>,

    /// API token or password (overrides `JIRA_API_TOKEN`).
    #[arg(long)]
    token: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{}' (expected YYYY-MM-DD): {}", s, e))
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,jira_mirror={0},jmirror={0}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Cancel `token` on Ctrl-C. In-flight requests finish; no new ones start.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing in-flight requests");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let cancel = CancellationToken::new();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "jmirror", &mut std::io::stdout());
        }
        Commands::Resolve {
            selection,
            connection,
        } => {
            let cfg = config::build_config(
                cli.config.as_deref(),
                Overrides {
                    url: connection.url,
                    user: connection.user,
                    token: connection.token,
                    timeout_secs: connection.timeout_secs,
                    ..Default::default()
                },
            )?;
            cancel_on_ctrl_c(cancel.clone());
            commands::run_resolve(&cfg, &selection.into(), &cancel).await?;
        }
        Commands::Sync {
            selection,
            connection,
            pattern,
            dest,
            concurrency,
            dry_run,
            progress,
        } => {
            let cfg = config::build_config(
                cli.config.as_deref(),
                Overrides {
                    url: connection.url,
                    user: connection.user,
                    token: connection.token,
                    root: dest,
                    concurrency,
                    pattern,
                    timeout_secs: connection.timeout_secs,
                },
            )?;
            cancel_on_ctrl_c(cancel.clone());
            commands::run_sync(&cfg, &selection.into(), dry_run, progress, &cancel).await?;
        }
    }

    Ok(())
}
