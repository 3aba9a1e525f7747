//! One pretty-printed JSON file per key

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde_json::Value;
use tracing::debug;

use crate::{MockError, Result};

use super::{validate_key, StubStore};

const EXTENSION: &str = "json";

/// Directory-backed document store
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`; the directory is created on first save
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file holding `key`
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{EXTENSION}"))
    }
}

impl StubStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        let path = self.path_for(key);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MockError::persistence(key, e)),
        };

        let document = serde_json::from_str(&content)
            .map_err(|e| MockError::persistence(key, format!("malformed document: {e}")))?;

        debug!(path = %path.display(), "Loaded document");
        Ok(Some(document))
    }

    fn save(&self, key: &str, document: &Value) -> Result<()> {
        validate_key(key)?;
        fs::create_dir_all(&self.dir).map_err(|e| MockError::persistence(key, e))?;

        let path = self.path_for(key);
        let json = serde_json::to_string_pretty(document)?;

        // Write to a sibling temp file first so readers never see a torn document
        let tmp = self.dir.join(format!(".{key}.{EXTENSION}.tmp"));
        fs::write(&tmp, json).map_err(|e| MockError::persistence(key, e))?;
        fs::rename(&tmp, &path).map_err(|e| MockError::persistence(key, e))?;

        debug!(path = %path.display(), "Saved document");
        Ok(())
    }
}
