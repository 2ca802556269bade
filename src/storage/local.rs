//! Local filesystem backend.
//!
//! Objects are plain files in `<root>/public/<subdir>`, and upload returns a
//! percent-encoded `/<subdir>/<key>` URL, so a static file server rooted at
//! `public/` serves them directly.

use super::{encode_segment, validate_key, StorageProvider};
use crate::config::LocalConfig;
use crate::error::StorageError;
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_dir: PathBuf,
    public_path: String,
}

impl LocalStorage {
    /// Create the backend, making sure the base directory exists.
    pub fn new(config: &LocalConfig) -> Result<Self, StorageError> {
        let base_dir = config.root.join("public").join(&config.subdir);
        std::fs::create_dir_all(&base_dir).map_err(|source| StorageError::Io {
            path: base_dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            base_dir,
            public_path: format!("/{}", config.subdir.trim_matches('/')),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.base_dir.join(key))
    }
}

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn upload(
        &self,
        bytes: Vec<u8>,
        key: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let path = self.object_path(key)?;
        let len = bytes.len();
        let dir = self.base_dir.clone();
        let target = path.clone();
        // Each upload gets its own dot-prefixed temp file, renamed into place.
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut tmp = tempfile::Builder::new()
                .prefix(".upload-")
                .suffix(".tmp")
                .tempfile_in(&dir)
                .map_err(|e| io_err(&dir, e))?;
            tmp.write_all(&bytes).map_err(|e| io_err(tmp.path(), e))?;
            tmp.persist(&target).map_err(|e| io_err(&target, e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::backend("local", format!("upload task failed: {e}")))??;

        debug!("local: wrote {} ({} bytes)", path.display(), len);
        Ok(format!("{}/{}", self.public_path, encode_segment(key)))
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.base_dir, e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_err(&self.base_dir, e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            // Skip in-flight uploads.
            if !is_file || name.starts_with('.') {
                continue;
            }
            if prefix.is_none_or(|p| name.starts_with(p)) {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
