//! Sync progress reporting.
//!
//! Reports what `jmirror sync` is doing while it runs: which issue is being
//! mirrored, how many are left, and what happened to each attachment.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for sync.
#[derive(Clone, Debug)]
pub enum SyncProgressEvent {
    /// Issue keys are being resolved (no total yet).
    Resolving,
    /// Issue `n` of `total` is starting.
    Issue { key: String, n: u64, total: u64 },
    /// One attachment finished with `outcome` (`downloaded`, `skipped`, ...).
    Attachment {
        key: String,
        filename: String,
        outcome: &'static str,
    },
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the synchronizer.
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync ABC-12  3 / 1,024 issues".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Resolving => "resolving issues...\n".to_string(),
            SyncProgressEvent::Issue { key, n, total } => {
                format!(
                    "sync {}  {} / {} issues\n",
                    key,
                    format_number(*n),
                    format_number(*total)
                )
            }
            SyncProgressEvent::Attachment {
                key,
                filename,
                outcome,
            } => format!("  {}/{}  {}\n", key, filename, outcome),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Resolving => serde_json::json!({
                "event": "progress",
                "phase": "resolving"
            }),
            SyncProgressEvent::Issue { key, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "issue",
                "key": key,
                "n": n,
                "total": total
            }),
            SyncProgressEvent::Attachment {
                key,
                filename,
                outcome,
            } => serde_json::json!({
                "event": "attachment",
                "key": key,
                "filename": filename,
                "outcome": outcome
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Resolve `Auto` against the terminal.
    pub fn resolve(self) -> Self {
        match self {
            ProgressMode::Auto => {
                if atty::is(atty::Stream::Stderr) {
                    ProgressMode::Human
                } else {
                    ProgressMode::Off
                }
            }
            other => other,
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self.resolve() {
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
            _ => Box::new(NoProgress),
        }
    }
}
