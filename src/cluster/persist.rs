//! Atomic JSON file persistence.
//!
//! The cluster directory and the metadata store are each one JSON document
//! replaced wholesale on every write:
//!
//! 1. Serialize the value
//! 2. Write it to a uniquely named temp file next to the target
//! 3. Rename the temp file over the target (the commit point)
//!
//! Readers therefore see either the old or the new document, never a torn
//! one. Callers serialize writers within a process; across processes the
//! last rename wins.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::ClusterResult;

/// A JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document.
    ///
    /// Returns `Ok(None)` if the file does not exist. A file that exists but
    /// does not parse is an error.
    pub async fn load<T: DeserializeOwned>(&self) -> ClusterResult<Option<T>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = serde_json::from_slice(&bytes)?;
        Ok(Some(value))
    }

    /// Atomically replace the document with `value`.
    pub async fn store<T: Serialize>(&self, value: &T) -> ClusterResult<()> {
        let data = serde_json::to_vec_pretty(value)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = self.temp_path();
        if let Err(e) = tokio::fs::write(&temp_path, &data).await {
            warn!(path = %temp_path.display(), error = %e, "Failed to write temp state file");
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            warn!(path = %self.path.display(), error = %e, "Failed to commit state file");
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!(path = %self.path.display(), bytes = data.len(), "State file written");
        Ok(())
    }

    /// Unique per write so concurrent writers never share a temp file.
    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()))
    }
}
