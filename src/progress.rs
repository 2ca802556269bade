//! Progress-callback trait for per-image pipeline events.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline ingests each image.
//!
//! # Example
//!
//! ```rust
//! use img2pdf::{JobProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     ready: Arc<AtomicUsize>,
//! }
//!
//! impl JobProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, index: usize, total: usize, bytes: usize) {
//!         self.ready.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("image {}/{} ready ({} bytes)", index + 1, total, bytes);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     ready: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn JobProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes a job.
///
/// Ingestion is concurrent, so `on_image_*` may be called from several
/// tasks at once and in any order. All methods default to no-ops.
pub trait JobProgressCallback: Send + Sync {
    /// Called once before ingestion starts.
    fn on_job_start(&self, job_id: &str, total_images: usize) {
        let _ = (job_id, total_images);
    }

    /// Called before an input is resolved. `index` is 0-based.
    fn on_image_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when an input has been normalized.
    ///
    /// `bytes` is the size of the normalized JPEG.
    fn on_image_complete(&self, index: usize, total: usize, bytes: usize) {
        let _ = (index, total, bytes);
    }

    /// Called when an input is dropped.
    fn on_image_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after the artifact is stored or the job has failed.
    fn on_job_complete(&self, job_id: &str, processed: usize, success: bool) {
        let _ = (job_id, processed, success);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn JobProgressCallback>;
