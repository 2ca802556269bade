//! Error types for the img2pdf library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`Img2PdfError`] is **fatal**: the job cannot produce an artifact at all
//!   (every image failed, the cover could not be rendered, the upload was
//!   rejected). Returned as `Err(Img2PdfError)` from [`crate::Pipeline::run`].
//!
//! * [`ImageError`] is **non-fatal**: a single input could not be fetched or
//!   decoded. It is recorded in [`crate::output::JobStats`] and the image is
//!   dropped; the job continues as long as one image survives.
//!
//! * [`StorageError`]: a backend operation failed. Fatal when it happens
//!   during the final upload, best-effort (logged and counted) during
//!   cleanup.
//!
//! [`CleanupError`] covers the single-object cleanup call, where the caller
//! needs to know whether the key was refused.

use thiserror::Error;

/// All fatal errors returned by a pipeline run.
///
/// Per-image failures use [`ImageError`] and never surface here directly;
/// when *all* of them fail the first one is carried by
/// [`Img2PdfError::NoImagesProcessed`].
#[derive(Debug, Error)]
pub enum Img2PdfError {
    // ── Ingestion ─────────────────────────────────────────────────────────
    /// The job had no inputs, or every input failed to resolve/decode.
    #[error("No images could be processed for PDF generation ({total} inputs). First error: {first_error}")]
    NoImagesProcessed { total: usize, first_error: String },

    // ── Rendering ─────────────────────────────────────────────────────────
    /// The browser engine did not produce a cover page.
    #[error("Cover rendering failed: {0}")]
    RenderFailed(String),

    /// The content pages could not be written into the cover document.
    #[error("PDF assembly failed: {0}")]
    AssemblyFailed(String),

    // ── Persistence ───────────────────────────────────────────────────────
    /// The final artifact could not be stored.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Writing a local copy of the artifact failed.
    #[error("Failed to write output to '{path}': {source}")]
    OutputWriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Control ───────────────────────────────────────────────────────────
    /// The caller-imposed deadline elapsed before the job finished.
    #[error("Job '{job_id}' abandoned after {elapsed_ms}ms (deadline exceeded)")]
    DeadlineExceeded { job_id: String, elapsed_ms: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, runtime construction).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single input image.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageError {
    /// The bytes are not a decodable raster image.
    #[error("Image {index}: decode failed: {detail}")]
    Decode { index: usize, detail: String },

    /// The image decoded but could not be re-encoded.
    #[error("Image {index}: encode failed: {detail}")]
    Encode { index: usize, detail: String },

    /// HTTP fetch failed or returned a non-success status.
    #[error("Image {index}: fetch of '{url}' failed: {reason}")]
    Fetch {
        index: usize,
        url: String,
        reason: String,
    },

    /// A self-owned source object was referenced but is not in storage.
    #[error("Image {index}: source object '{key}' not found")]
    NotFound { index: usize, key: String },

    /// The reference itself is malformed (bad data URL, empty URL).
    #[error("Image {index}: invalid reference: {detail}")]
    InvalidReference { index: usize, detail: String },
}

impl ImageError {
    /// Input position this error belongs to (0-indexed).
    pub fn index(&self) -> usize {
        match self {
            ImageError::Decode { index, .. }
            | ImageError::Encode { index, .. }
            | ImageError::Fetch { index, .. }
            | ImageError::NotFound { index, .. }
            | ImageError::InvalidReference { index, .. } => *index,
        }
    }
}

/// Failures reported by a [`crate::storage::StorageProvider`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// No object exists under `key`.
    #[error("Object '{key}' not found")]
    NotFound { key: String },

    /// Transport, authentication or backend-side rejection.
    #[error("{backend} backend error: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    /// Local filesystem failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The key is empty or would escape the storage root.
    #[error("Invalid object key '{0}'")]
    InvalidKey(String),

    /// The backend has no way to perform this operation.
    #[error("{backend} backend does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },
}

impl StorageError {
    pub(crate) fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        StorageError::Backend {
            backend,
            message: message.into(),
        }
    }

    /// `true` when the error means the object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Failure of a targeted cleanup request.
#[derive(Debug, Error)]
pub enum CleanupError {
    /// No object key could be derived from the URL.
    #[error("Cannot derive an object key from '{0}'")]
    InvalidUrl(String),

    /// The key exists in the wrong role (e.g. a source image was passed
    /// where an artifact was expected).
    #[error("Refusing to delete '{key}': role is not {expected}")]
    WrongRole { key: String, expected: &'static str },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
