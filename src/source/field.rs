//! Safe field access.
//!
//! The only sanctioned way to read a source field. A decode failure is
//! logged at debug level and turned into an absent value, so one corrupted
//! field never aborts the message it belongs to.

use tracing::debug;

use crate::error::FieldResult;

/// Read an optional field; decode failures become `None`.
pub fn read_optional<T>(field: &str, read: impl FnOnce() -> FieldResult<T>) -> Option<T> {
    match read() {
        Ok(value) => value,
        Err(e) => {
            debug!(field, error = %e, "Failed to read field");
            None
        }
    }
}

/// Read a field, substituting `default` when it is absent or undecodable.
pub fn read_field<T>(field: &str, read: impl FnOnce() -> FieldResult<T>, default: T) -> T {
    read_optional(field, read).unwrap_or(default)
}

/// Read a text field; absent, undecodable and blank values all become `None`.
pub fn read_text(field: &str, read: impl FnOnce() -> FieldResult<String>) -> Option<String> {
    read_optional(field, read).filter(|s| !s.trim().is_empty())
}
