//! JQL composition.
//!
//! The base fragment is passed through untouched; date filters are rendered
//! in a fixed order (last N days, today, after, before) and ANDed onto it.

use crate::models::DateFilters;

/// Render the date filters as JQL clauses, in order.
pub fn date_clauses(filters: &DateFilters) -> Vec<String> {
    let mut clauses = Vec::new();
    if let Some(days) = filters.last_days {
        clauses.push(format!("updated >= -{}d", days));
    }
    if filters.today {
        clauses.push("updated >= startOfDay()".to_string());
    }
    if let Some(after) = filters.after {
        clauses.push(format!("updated >= \"{}\"", after.format("%Y-%m-%d")));
    }
    if let Some(before) = filters.before {
        clauses.push(format!("updated <= \"{}\"", before.format("%Y-%m-%d")));
    }
    clauses
}

/// Combine a base fragment with date filters.
///
/// Returns `(base) AND <dates>` when both are present, either side alone
/// when only one is, and an empty string when neither is.
pub fn compose_query(base: Option<&str>, filters: &DateFilters) -> String {
    let base = base.map(str::trim).filter(|b| !b.is_empty());
    let dates = date_clauses(filters).join(" AND ");

    match (base, dates.is_empty()) {
        (Some(b), false) => format!("({}) AND {}", b, dates),
        (Some(b), true) => b.to_string(),
        (None, false) => dates,
        (None, true) => String::new(),
    }
}
