//! Streaming HTTP bodies to disk.
//!
//! Bodies are written to a hidden sibling `.<name>.part` file and renamed
//! over the destination once complete. A failed transfer removes the part
//! file, so a truncated body can never satisfy a later size check.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Temporary path used while `dest` is being written.
pub fn part_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.part", name))
}

/// Whether `url` has the same scheme, host and port as `base`. Credentials
/// are only attached to requests for which this holds.
pub fn same_origin(url: &str, base: &str) -> bool {
    match (reqwest::Url::parse(url), reqwest::Url::parse(base)) {
        (Ok(a), Ok(b)) => a.origin() == b.origin(),
        _ => false,
    }
}

/// Fail on a non-2xx response, including the start of the body in the error.
pub async fn ensure_success(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    bail!(
        "{} failed (HTTP {}): {}",
        what,
        status,
        body.chars().take(300).collect::<String>()
    );
}

/// Write a successful response body to `dest` atomically.
pub async fn write_response(resp: reqwest::Response, dest: &Path) -> Result<u64> {
    let part = part_path(dest);

    let written = match stream_to_file(resp, &part).await {
        Ok(n) => n,
        Err(e) => {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }
    };

    if let Err(e) = tokio::fs::rename(&part, dest).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(e).with_context(|| format!("Failed to move download into {}", dest.display()));
    }

    Ok(written)
}

async fn stream_to_file(mut resp: reqwest::Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut written = 0u64;
    while let Some(chunk) = resp.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;

    Ok(written)
}
