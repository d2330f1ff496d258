//! # jira-mirror
//!
//! Mirror Jira issue attachments into a local directory tree, one
//! subdirectory per issue.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   ┌──────────────┐   ┌──────────────────────┐
//! │ keys / range / │──▶│   Resolver   │──▶│     Synchronizer     │
//! │  JQL + dates   │   │ native → raw │   │ size check, download │
//! └────────────────┘   └──────────────┘   └──────────┬───────────┘
//!                                                    ▼
//!                                      <root>/<KEY>/<filename>
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export JIRA_URL=https://example.atlassian.net
//! export JIRA_USER=me@example.com JIRA_API_TOKEN=...
//!
//! jmirror sync --issue ABC-1,ABC-7 --dest ./attachments
//! jmirror sync --from ABC-100 --to ABC-150 --pattern '*.pdf'
//! jmirror sync --jql 'project = ABC' --last-days 7
//! jmirror resolve --jql 'project = ABC' --today
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Layered TOML / environment / flag configuration |
//! | [`models`] | Issues, attachments, credentials, run counters |
//! | [`error`] | Error taxonomy |
//! | [`range`] | Issue key range expansion |
//! | [`query`] | JQL composition with date filters |
//! | [`resolve`] | Merging selectors into one key list |
//! | [`traits`] | The [`traits::IssueTracker`] seam |
//! | [`jira`] | Native Jira REST client |
//! | [`direct`] | Raw search pagination and direct downloads |
//! | [`download`] | Atomic streamed file writes |
//! | [`archive`] | Per-issue attachment mirroring |
//! | [`progress`] | Stderr progress reporting |
//! | [`commands`] | `sync` and `resolve` drivers |

pub mod archive;
pub mod commands;
pub mod config;
pub mod direct;
pub mod download;
pub mod error;
pub mod jira;
pub mod models;
pub mod progress;
pub mod query;
pub mod range;
pub mod resolve;
pub mod traits;
