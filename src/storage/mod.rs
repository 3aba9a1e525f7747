//! Persistence of endpoint documents
//!
//! The engine only relies on [`StubStore`]: at most one document per key, and
//! a `save` followed by a `load` of the same key returns an equivalent
//! document.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde_json::Value;

use crate::{MockError, Result};

/// Maximum key length in bytes
pub const MAX_KEY_LEN: usize = 255;

/// Storage collaborator for endpoint documents
pub trait StubStore: Send + Sync {
    /// Load the document stored under `key`, if any
    ///
    /// # Errors
    ///
    /// Returns error if the key is invalid or the stored document cannot be read
    fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Store `document` under `key`, replacing any previous document
    ///
    /// # Errors
    ///
    /// Returns error if the key is invalid or the write fails
    fn save(&self, key: &str, document: &Value) -> Result<()>;
}

/// Validate a document key
///
/// Keys become file names, so anything that could escape the storage
/// directory is rejected.
///
/// # Errors
///
/// Returns [`MockError::Persistence`] if the key is invalid
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(MockError::persistence(key, "key cannot be empty"));
    }

    if key.len() > MAX_KEY_LEN {
        return Err(MockError::persistence(
            key,
            format!("key too long: {} > {MAX_KEY_LEN}", key.len()),
        ));
    }

    if key.contains('/') || key.contains('\\') {
        return Err(MockError::persistence(key, "key cannot contain path separators"));
    }

    if key.starts_with('.') {
        return Err(MockError::persistence(key, "key cannot start with dot"));
    }

    if key.contains('\0') {
        return Err(MockError::persistence(key, "key cannot contain null bytes"));
    }

    if key.contains("..") {
        return Err(MockError::persistence(key, "key cannot contain '..'"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("EnvelopesList").is_ok());
        assert!(validate_key("Recipients_Response-2").is_ok());

        assert!(validate_key("").is_err());
        assert!(validate_key(".hidden").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("a\\b").is_err());
        assert!(validate_key("a..b").is_err());
        assert!(validate_key("a\0b").is_err());
        assert!(validate_key(&"x".repeat(MAX_KEY_LEN + 1)).is_err());
    }
}
