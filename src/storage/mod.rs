//! Storage abstraction: one capability set, three interchangeable backends.
//!
//! ```text
//!                  ┌──────────────────────┐
//!  Pipeline ──────▶│ dyn StorageProvider  │◀────── Cleanup
//!                  └──────────┬───────────┘
//!           ┌─────────────────┼──────────────────┐
//!       S3Storage      SupabaseStorage      LocalStorage
//!    (object_store)      (reqwest REST)      (tokio::fs)
//! ```
//!
//! The backend is picked once by [`select_provider`] and shared as a
//! [`SharedStorage`] for the rest of the process.
//!
//! ## Object roles
//!
//! Keys carry their role as a prefix: `img-…` for staged source images,
//! `pdf-…` for artifacts. Cleanup relies on that prefix to decide what may be
//! bulk-deleted, so the exact spelling is a compatibility contract. Code
//! never tests prefixes by hand; it goes through [`ObjectKey::parse`].

pub mod local;
pub mod s3;
pub mod supabase;

use crate::config::StorageConfig;
use crate::error::StorageError;
use async_trait::async_trait;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use local::LocalStorage;
pub use s3::S3Storage;
pub use supabase::SupabaseStorage;

/// Uniform put/get/list/delete over a storage backend.
///
/// Implementations are stateless after construction and shared across
/// concurrent tasks.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Short backend name for logs (`s3`, `supabase`, `local`, …).
    fn backend_name(&self) -> &'static str;

    /// Write `bytes` under `key`, replacing any existing object, and return a
    /// URL the caller can resolve.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Read an object. [`StorageError::NotFound`] if it does not exist.
    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Delete an object.
    ///
    /// The filesystem backend treats a missing key as success; remote
    /// backends may report [`StorageError::NotFound`].
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Keys starting with `prefix` (all keys if `None`), sorted.
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError>;

    /// A time-limited URL a client can `PUT` the object to directly, plus
    /// the public URL it will be served from afterwards.
    ///
    /// Only signing backends implement this; the rest return
    /// [`StorageError::Unsupported`].
    async fn presign_upload(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUpload, StorageError> {
        let _ = (key, expires_in);
        Err(StorageError::Unsupported {
            backend: self.backend_name(),
            operation: "presigned uploads",
        })
    }
}

/// Result of [`StorageProvider::presign_upload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUpload {
    pub upload_url: String,
    pub public_url: String,
}

/// Lifetime of presigned upload URLs unless the caller asks otherwise.
pub const DEFAULT_PRESIGN_EXPIRY: Duration = Duration::from_secs(3600);

/// The process-wide provider handle.
pub type SharedStorage = Arc<dyn StorageProvider>;

/// Build the provider described by `config`.
pub fn select_provider(config: &StorageConfig) -> Result<SharedStorage, StorageError> {
    let provider: SharedStorage = match config {
        StorageConfig::S3(c) => Arc::new(S3Storage::new(c)?),
        StorageConfig::Supabase(c) => Arc::new(SupabaseStorage::new(c)?),
        StorageConfig::Local(c) => Arc::new(LocalStorage::new(c)?),
    };
    info!("Storage backend selected: {}", provider.backend_name());
    Ok(provider)
}

// ── Object keys ──────────────────────────────────────────────────────────

/// What an object is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectRole {
    /// A transient staged input image. Safe to bulk-delete.
    Source,
    /// A generated PDF. Retained until explicitly cleaned up.
    Artifact,
}

impl ObjectRole {
    /// The key prefix that marks this role.
    pub const fn prefix(self) -> &'static str {
        match self {
            ObjectRole::Source => "img-",
            ObjectRole::Artifact => "pdf-",
        }
    }

    /// Value written to object metadata where the backend supports it.
    pub const fn as_str(self) -> &'static str {
        match self {
            ObjectRole::Source => "source",
            ObjectRole::Artifact => "artifact",
        }
    }
}

/// A storage key together with its parsed role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    role: ObjectRole,
    key: String,
}

impl ObjectKey {
    /// `img-<timestamp>-<index>-<origname>`.
    pub fn source(timestamp_ms: i64, index: usize, original_name: &str) -> Self {
        let name = sanitize_segment(original_name);
        let name = if name.is_empty() { "image".to_string() } else { name };
        Self {
            role: ObjectRole::Source,
            key: format!("{}{timestamp_ms}-{index}-{name}", ObjectRole::Source.prefix()),
        }
    }

    /// `pdf-<jobId>-<timestamp>.pdf`.
    pub fn artifact(job_id: &str, timestamp_ms: i64) -> Self {
        Self {
            role: ObjectRole::Artifact,
            key: format!(
                "{}{}-{timestamp_ms}.pdf",
                ObjectRole::Artifact.prefix(),
                sanitize_segment(job_id)
            ),
        }
    }

    /// Classify a raw key. `None` for keys that carry no known role prefix.
    pub fn parse(key: &str) -> Option<Self> {
        [ObjectRole::Source, ObjectRole::Artifact]
            .into_iter()
            .find(|role| key.len() > role.prefix().len() && key.starts_with(role.prefix()))
            .map(|role| Self {
                role,
                key: key.to_string(),
            })
    }

    /// Classify the object a public URL points at.
    pub fn from_url(url: &str) -> Option<Self> {
        key_from_url(url).and_then(|k| Self::parse(&k))
    }

    pub fn role(&self) -> ObjectRole {
        self.role
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn into_string(self) -> String {
        self.key
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// The trailing path segment of a URL, without query or fragment,
/// percent-decoded. `None` when the URL ends in `/` or is empty.
pub fn key_from_url(url: &str) -> Option<String> {
    let without_fragment = url.split('#').next().unwrap_or("");
    let path = without_fragment.split('?').next().unwrap_or("");
    let last = path.rsplit('/').next().unwrap_or("");
    if last.is_empty() {
        return None;
    }
    let decoded = percent_decode_str(last).decode_utf8_lossy().into_owned();
    Some(decoded)
}

/// Characters left unescaped in a URL path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a key for use as the last segment of a URL.
pub(crate) fn encode_segment(key: &str) -> String {
    utf8_percent_encode(key, SEGMENT).to_string()
}

/// Keys are single path segments: separators and control characters are
/// replaced so that [`key_from_url`] recovers the key from its URL.
fn sanitize_segment(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '\\' | '?' | '#' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Reject keys that are empty or could escape a directory root.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key == "." || key == ".." || key.contains('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
