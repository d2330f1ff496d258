//! Error taxonomy for a mirror run.
//!
//! Setup errors ([`MirrorError::Validation`], [`MirrorError::Configuration`],
//! and a [`MirrorError::Filesystem`] failure on the archive root) abort the
//! run. The remaining variants are raised per issue or per attachment, logged,
//! counted in [`SyncStats`](crate::models::SyncStats), and never unwind past
//! their own loop iteration.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for library operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

#[derive(Debug, Error)]
pub enum MirrorError {
    /// Malformed or mismatched range endpoints, bad CLI input.
    #[error("validation error: {0}")]
    Validation(String),

    /// No usable service address, or a credential is required but absent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The archive root or an issue subdirectory could not be created.
    #[error("filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Issue retrieval, attachment listing or search failed.
    #[error("failed to fetch {key}: {message}")]
    RemoteFetch { key: String, message: String },

    /// Both the native and the direct download failed for one attachment.
    #[error("failed to download {file}: {message}")]
    Download { file: String, message: String },

    /// The run was interrupted before this step started.
    #[error("cancelled")]
    Cancelled,
}

impl MirrorError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MirrorError::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn remote(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MirrorError::RemoteFetch {
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub fn download(file: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MirrorError::Download {
            file: file.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = MirrorError::remote("ABC-1", "HTTP 404");
        assert_eq!(err.to_string(), "failed to fetch ABC-1: HTTP 404");

        let err = MirrorError::filesystem(
            "/nope/ABC-1",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/nope/ABC-1"));
        assert!(err.to_string().contains("denied"));
    }
}
