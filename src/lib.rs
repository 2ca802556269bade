//! # img2pdf
//!
//! Turn a batch of images into a single photo-report PDF and store it.
//!
//! ## Why hybrid rendering?
//!
//! A browser engine lays out the cover page well but is slow and memory
//! hungry when asked to paginate dozens of photos. This crate prints only the
//! cover with headless Chromium and writes every content page directly as
//! PDF objects with `lopdf`, embedding the normalized JPEGs untouched.
//!
//! ## Pipeline Overview
//!
//! ```text
//! images (inline / URL / data URL / staged img-…)
//!  │
//!  ├─ 1. Resolve    bytes from memory, HTTP, or the storage backend
//!  ├─ 2. Normalize  ≤1024 px, RGB JPEG q75 (CPU-bound, spawn_blocking)
//!  ├─ 3. Cover      headless Chromium --print-to-pdf
//!  ├─ 4. Assemble   two images per A4 page, appended to the cover
//!  └─ 5. Upload     pdf-<jobId>-<ms>.pdf → public URL
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use img2pdf::{select_provider, ImageReference, Job, Pipeline, PipelineConfig, StorageConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = select_provider(&StorageConfig::from_env())?;
//!     let pipeline = Pipeline::new(storage, PipelineConfig::default())?;
//!
//!     let job = Job::new(vec![
//!         ImageReference::url("https://example.com/a.jpg"),
//!         ImageReference::inline(std::fs::read("b.png")?),
//!     ]);
//!     let artifact = pipeline.run(job).await?;
//!     println!("{}", serde_json::to_string(&artifact.to_response())?);
//!     Ok(())
//! }
//! ```
//!
//! ## Storage Backends
//!
//! | Backend    | Selected when                                       |
//! |------------|-----------------------------------------------------|
//! | S3         | `SB_S3_ACCESS_KEY_ID` + `SB_S3_SECRET_ACCESS_KEY`   |
//! | Supabase   | `SUPABASE_URL` + `SUPABASE_SERVICE_ROLE_KEY`        |
//! | Local      | otherwise (`<IMG2PDF_LOCAL_DIR>/public/pdfs`)       |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `img2pdf` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cleanup;
pub mod config;
pub mod error;
pub mod generate;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cleanup::{authorize_trigger, Cleanup, CleanupReport, SweepScope, WipeReport};
pub use config::{
    LocalConfig, PageGeometry, PipelineConfig, PipelineConfigBuilder, S3Config, StorageConfig,
    SupabaseConfig,
};
pub use error::{CleanupError, ImageError, Img2PdfError, StorageError};
pub use generate::{generate_sync, Pipeline};
pub use job::{ImageReference, Job, Upload};
pub use output::{ArtifactResponse, ErrorResponse, JobStats, PdfArtifact};
pub use pipeline::cover::{ChromiumCoverRenderer, CoverMetadata, CoverRenderer};
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback};
pub use storage::{
    select_provider, ObjectKey, ObjectRole, PresignedUpload, SharedStorage, StorageProvider,
    DEFAULT_PRESIGN_EXPIRY,
};
