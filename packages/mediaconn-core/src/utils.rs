//! General utilities shared across the crate.

use std::time::{SystemTime, UNIX_EPOCH};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// String Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the trimmed value if it is present and not blank.
///
/// Server responses and stored records use both `null` and `""` to mean
/// "unknown", so every optional string goes through this before use.
#[must_use]
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Copies `incoming` over `target` only when `incoming` carries a value.
///
/// Never clears a previously known value with an empty one.
pub(crate) fn merge_non_blank(target: &mut Option<String>, incoming: Option<&str>) {
    if let Some(value) = non_blank(incoming) {
        *target = Some(value.to_string());
    }
}
