//! JSON serialization for hierarchical inference results.

use serde::Serialize;

/// Serialize a result to a compact JSON string.
///
/// Non-finite numbers (e.g. an unknown evidence) are written as `null`.
///
/// # Errors
///
/// Returns an error if serialization fails (should not happen for the
/// result types of this crate).
pub fn to_json<T: Serialize + ?Sized>(result: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(result)
}

/// Serialize a result to a pretty-printed JSON string.
///
/// # Errors
///
/// Returns an error if serialization fails (should not happen for the
/// result types of this crate).
pub fn to_json_pretty<T: Serialize + ?Sized>(result: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(result)
}
