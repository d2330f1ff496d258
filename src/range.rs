//! Issue key ranges.
//!
//! `ABC-7 .. ABC-3` expands to every key from `ABC-3` to `ABC-7` inclusive.

use crate::error::{MirrorError, Result};

/// Largest number of keys a single range may expand to.
pub const MAX_RANGE_SPAN: u64 = 100_000;

/// Split an issue key on its first `-` into `(prefix, number)`.
///
/// The prefix is limited to ASCII letters, digits and `_`, and the number to
/// ASCII digits, so a valid key is always safe in a URL path and as a
/// directory name.
pub fn split_key(key: &str) -> Result<(&str, u64)> {
    let (prefix, number) = key
        .trim()
        .split_once('-')
        .ok_or_else(|| MirrorError::Validation(format!("'{}' is not an issue key", key)))?;

    if prefix.is_empty() {
        return Err(MirrorError::Validation(format!(
            "'{}' has an empty project prefix",
            key
        )));
    }
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(MirrorError::Validation(format!(
            "'{}' has an invalid project prefix",
            key
        )));
    }
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MirrorError::Validation(format!(
            "'{}' does not end in an issue number",
            key
        )));
    }

    let number = number.parse::<u64>().map_err(|_| {
        MirrorError::Validation(format!("'{}' does not end in an issue number", key))
    })?;

    Ok((prefix, number))
}

/// Expand a `(start, end)` pair into the closed, ascending list of keys
/// between them. Endpoints may be given in either order but must share a
/// project prefix.
pub fn expand_range(start: &str, end: &str) -> Result<Vec<String>> {
    let (start_prefix, mut lo) = split_key(start)?;
    let (end_prefix, mut hi) = split_key(end)?;

    if start_prefix != end_prefix {
        return Err(MirrorError::Validation(format!(
            "range endpoints have different prefixes: '{}' vs '{}'",
            start_prefix, end_prefix
        )));
    }

    if hi < lo {
        std::mem::swap(&mut lo, &mut hi);
    }

    if hi - lo >= MAX_RANGE_SPAN {
        return Err(MirrorError::Validation(format!(
            "range {}..{} covers {} keys (at most {} allowed)",
            start.trim(),
            end.trim(),
            hi - lo + 1,
            MAX_RANGE_SPAN
        )));
    }
    if hi - lo >= 1_000 {
        tracing::warn!(keys = hi - lo + 1, "expanding a large issue range");
    }

    Ok((lo..=hi)
        .map(|n| format!("{}-{}", start_prefix, n))
        .collect())
}
