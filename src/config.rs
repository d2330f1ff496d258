//! Configuration loading.
//!
//! Settings are layered, later layers winning:
//!
//! 1. built-in defaults,
//! 2. the TOML file (`--config`, or `./jmirror.toml` when present),
//! 3. environment variables (`JIRA_URL`, `JIRA_USER`, `JIRA_API_TOKEN`),
//! 4. command-line flags.
//!
//! The result is one [`Config`] value handed to the resolver and the
//! synchronizer; nothing reads ambient state after that.
//!
//! ```toml
//! [jira]
//! url = "https://example.atlassian.net"
//! user = "me@example.com"
//! # token = "..."            # prefer JIRA_API_TOKEN
//!
//! [archive]
//! root = "./attachments"
//! concurrency = 2
//! pattern = "*.pdf"
//!
//! [http]
//! timeout_secs = 60
//! page_size = 100
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::MirrorError;
use crate::models::Credentials;

/// Config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "jmirror.toml";

pub const ENV_URL: &str = "JIRA_URL";
pub const ENV_USER: &str = "JIRA_USER";
pub const ENV_TOKEN: &str = "JIRA_API_TOKEN";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub jira: JiraConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct JiraConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub pattern: Option<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            concurrency: default_concurrency(),
            pattern: None,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_concurrency() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_page_size() -> u32 {
    100
}

/// Values given on the command line. `None` leaves the lower layer in place.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub user: Option<String>,
    pub token: Option<String>,
    pub root: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub pattern: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Apply `JIRA_*` variables through `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_URL) {
            self.jira.url = Some(url);
        }
        if let Some(user) = non_empty(ENV_USER) {
            self.jira.user = Some(user);
        }
        if let Some(token) = non_empty(ENV_TOKEN) {
            self.jira.token = Some(token);
        }
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if overrides.url.is_some() {
            self.jira.url = overrides.url;
        }
        if overrides.user.is_some() {
            self.jira.user = overrides.user;
        }
        if overrides.token.is_some() {
            self.jira.token = overrides.token;
        }
        if let Some(root) = overrides.root {
            self.archive.root = root;
        }
        if let Some(concurrency) = overrides.concurrency {
            self.archive.concurrency = concurrency;
        }
        if overrides.pattern.is_some() {
            self.archive.pattern = overrides.pattern;
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.http.timeout_secs = timeout;
        }
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.archive.concurrency == 0 {
            return Err(MirrorError::Configuration(
                "archive.concurrency must be >= 1".to_string(),
            ));
        }
        if self.http.page_size == 0 {
            return Err(MirrorError::Configuration(
                "http.page_size must be >= 1".to_string(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(MirrorError::Configuration(
                "http.timeout_secs must be >= 1".to_string(),
            ));
        }
        if let Some(url) = self.base_url() {
            reqwest::Url::parse(url).map_err(|e| {
                MirrorError::Configuration(format!("invalid Jira URL '{}': {}", url, e))
            })?;
        }
        Ok(())
    }

    /// Service base address without a trailing slash.
    pub fn base_url(&self) -> Option<&str> {
        self.jira
            .url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/'))
            .filter(|u| !u.is_empty())
    }

    pub fn require_base_url(&self) -> crate::error::Result<&str> {
        self.base_url().ok_or_else(|| {
            MirrorError::Configuration(format!(
                "no Jira URL configured (use --url, {} or [jira].url)",
                ENV_URL
            ))
        })
    }

    /// Credentials, when both a user and a token are configured.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.jira.user, &self.jira.token) {
            (Some(user), Some(token)) if !user.is_empty() && !token.is_empty() => {
                Some(Credentials::new(user.clone(), token.clone()))
            }
            _ => None,
        }
    }
}

/// Read a config file. An explicit path must exist; without one,
/// `./jmirror.toml` is used if present and defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !default.exists() {
                return Ok(Config::default());
            }
            default
        }
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Build the effective configuration from every layer.
pub fn build_config(path: Option<&Path>, overrides: Overrides) -> Result<Config> {
    let mut config = load_config(path)?;
    config.apply_env(|name| std::env::var(name).ok());
    config.apply_overrides(overrides);
    config.validate()?;
    Ok(config)
}
