//! Pipeline orchestrator: job in, stored PDF artifact out.
//!
//! ```text
//! ImageReference × N
//!   │ 1. resolve + normalize    concurrent, failures dropped per image
//!   │ 2. NoImagesProcessed      if nothing survived
//!   │ 3. cover                  headless browser, one page
//!   │ 4. assemble               lopdf, two images per page
//!   │ 5. upload                 pdf-<jobId>-<ms>.pdf
//!   ▼
//! PdfArtifact { public_url, execution_time_ms, stats }
//! ```
//!
//! Only step 1 runs concurrently; steps 3–5 are strictly sequential.

use crate::cleanup::Cleanup;
use crate::config::PipelineConfig;
use crate::error::{ImageError, Img2PdfError};
use crate::job::{ImageReference, Job, Upload};
use crate::output::{JobStats, PdfArtifact};
use crate::pipeline::assemble::{assemble_blocking, content_page_count};
use crate::pipeline::cover::{ChromiumCoverRenderer, CoverMetadata, CoverRenderer};
use crate::pipeline::normalize::{normalize_blocking, NormalizeOptions, NormalizedImage};
use crate::pipeline::resolve::SourceResolver;
use crate::storage::{ObjectKey, SharedStorage};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Runs jobs against one storage backend and one cover renderer.
///
/// Cheap to share behind an `Arc`; holds no per-job state.
pub struct Pipeline {
    storage: SharedStorage,
    renderer: Arc<dyn CoverRenderer>,
    resolver: SourceResolver,
    config: PipelineConfig,
}

/// A finished run before the caller decides what to do with the bytes.
struct RunOutcome {
    artifact: PdfArtifact,
    pdf: Vec<u8>,
}

impl Pipeline {
    /// Pipeline with the headless Chromium cover renderer.
    pub fn new(storage: SharedStorage, config: PipelineConfig) -> Result<Self, Img2PdfError> {
        let renderer = Arc::new(ChromiumCoverRenderer::from_config(&config));
        Self::with_renderer(storage, renderer, config)
    }

    pub fn with_renderer(
        storage: SharedStorage,
        renderer: Arc<dyn CoverRenderer>,
        config: PipelineConfig,
    ) -> Result<Self, Img2PdfError> {
        let resolver = SourceResolver::new(
            storage.clone(),
            Duration::from_secs(config.fetch_timeout_secs),
        )
        .map_err(|e| Img2PdfError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            storage,
            renderer,
            resolver,
            config,
        })
    }

    /// Replace the HTTP client used for remote image fetches.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.resolver = SourceResolver::with_client(self.storage.clone(), client);
        self
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run a job to completion.
    ///
    /// # Errors
    /// Only fatal errors: no usable image, cover rendering, assembly, or the
    /// final upload. Individual bad inputs are reported in
    /// [`JobStats::failed_inputs`] instead.
    pub async fn run(&self, job: Job) -> Result<PdfArtifact, Img2PdfError> {
        self.run_reporting(job).await.map(|o| o.artifact)
    }

    /// Like [`Pipeline::run`], abandoning the job once `deadline` elapses.
    ///
    /// Dropping the job kills its browser subprocess; an upload already in
    /// flight may still complete on the backend.
    pub async fn run_with_deadline(
        &self,
        job: Job,
        deadline: Duration,
    ) -> Result<PdfArtifact, Img2PdfError> {
        let job_id = job.job_id.clone();
        let start = Instant::now();
        match tokio::time::timeout(deadline, self.run(job)).await {
            Ok(result) => result,
            Err(_) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                error!("Job {} abandoned after {}ms", job_id, elapsed_ms);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_job_complete(&job_id, 0, false);
                }
                Err(Img2PdfError::DeadlineExceeded { job_id, elapsed_ms })
            }
        }
    }

    /// Run a job and also write the PDF to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn run_to_file(
        &self,
        job: Job,
        output_path: impl AsRef<Path>,
    ) -> Result<PdfArtifact, Img2PdfError> {
        let outcome = self.run_reporting(job).await?;
        let path = output_path.as_ref();
        let write_err = |source| Img2PdfError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp_path = path.with_extension("pdf.tmp");
        tokio::fs::write(&tmp_path, &outcome.pdf)
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

        info!("Wrote {} ({} bytes)", path.display(), outcome.pdf.len());
        Ok(outcome.artifact)
    }

    /// Upload raw client files as source objects and return their URLs in
    /// input order.
    pub async fn stage_sources(&self, uploads: Vec<Upload>) -> Result<Vec<String>, Img2PdfError> {
        let ts = Utc::now().timestamp_millis();
        let total = uploads.len();

        let mut staged: Vec<(usize, Result<String, Img2PdfError>)> =
            stream::iter(uploads.into_iter().enumerate().map(|(index, upload)| {
                let storage = self.storage.clone();
                async move {
                    let key = ObjectKey::source(ts, index, &upload.file_name);
                    let content_type = if upload.content_type.is_empty() {
                        "application/octet-stream"
                    } else {
                        upload.content_type.as_str()
                    };
                    let result = storage
                        .upload(upload.bytes, key.as_str(), content_type)
                        .await
                        .map_err(Img2PdfError::from);
                    (index, result)
                }
            }))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        staged.sort_by_key(|(index, _)| *index);

        let urls = staged
            .into_iter()
            .map(|(_, r)| r)
            .collect::<Result<Vec<_>, _>>()?;
        info!("Staged {} source image(s)", total);
        Ok(urls)
    }

    /// Stage `uploads`, run a job over the staged URLs, and on success delete
    /// the staged sources in the background.
    ///
    /// On failure the sources stay in place for the scheduled sweep.
    pub async fn run_staged(
        &self,
        uploads: Vec<Upload>,
        job_id: Option<String>,
    ) -> Result<PdfArtifact, Img2PdfError> {
        let urls = self.stage_sources(uploads).await?;
        let inputs = urls.iter().cloned().map(ImageReference::url).collect();
        let mut job = Job::new(inputs);
        if let Some(id) = job_id {
            job = job.with_id(id);
        }

        let artifact = self.run(job).await?;

        let cleanup = Cleanup::new(self.storage.clone());
        tokio::spawn(async move {
            cleanup.cleanup_sources(&urls).await;
        });
        Ok(artifact)
    }

    async fn run_reporting(&self, job: Job) -> Result<RunOutcome, Img2PdfError> {
        let job_id = job.job_id.clone();
        let result = self.run_inner(job).await;
        if let Some(ref cb) = self.config.progress_callback {
            match &result {
                Ok(o) => cb.on_job_complete(&job_id, o.artifact.stats.processed, true),
                Err(_) => cb.on_job_complete(&job_id, 0, false),
            }
        }
        if let Err(ref e) = result {
            error!("Job {} failed: {}", job_id, e);
        }
        result
    }

    async fn run_inner(&self, job: Job) -> Result<RunOutcome, Img2PdfError> {
        let total = job.inputs.len();
        info!("Starting job {} with {} input(s)", job.job_id, total);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_job_start(&job.job_id, total);
        }

        // ── Step 1: Resolve + normalize ──────────────────────────────────
        let ingest_start = Instant::now();
        let mut results = self.ingest(&job.inputs).await;
        results.sort_by_key(|(index, _)| *index);

        let mut images: Vec<NormalizedImage> = Vec::with_capacity(total);
        let mut failures: Vec<ImageError> = Vec::new();
        for (_, result) in results {
            match result {
                Ok(img) => images.push(img),
                Err(e) => {
                    warn!("Dropping input: {}", e);
                    failures.push(e);
                }
            }
        }
        let ingest_ms = ingest_start.elapsed().as_millis() as u64;
        info!(
            "Ingested {}/{} image(s) in {}ms",
            images.len(),
            total,
            ingest_ms
        );

        // ── Step 2: Require at least one image ───────────────────────────
        if images.is_empty() {
            let first_error = failures
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "No inputs were provided".to_string());
            return Err(Img2PdfError::NoImagesProcessed { total, first_error });
        }

        // ── Step 3: Render cover ─────────────────────────────────────────
        let render_start = Instant::now();
        let meta = CoverMetadata {
            job_id: job.job_id.clone(),
            title: self.config.report_title.clone(),
            description: self.config.report_description.clone(),
            generated_at: Utc::now(),
            image_count: images.len(),
        };
        let cover = self.renderer.render_cover(&meta).await?;
        let render_ms = render_start.elapsed().as_millis() as u64;

        // ── Step 4: Assemble content pages ───────────────────────────────
        let assemble_start = Instant::now();
        let processed = images.len();
        let pdf = assemble_blocking(cover, images, self.config.page).await?;
        let assemble_ms = assemble_start.elapsed().as_millis() as u64;
        debug!("Assembled PDF: {} bytes", pdf.len());

        // ── Step 5: Upload ───────────────────────────────────────────────
        let upload_start = Instant::now();
        let key = ObjectKey::artifact(&job.job_id, Utc::now().timestamp_millis());
        let public_url = self
            .storage
            .upload(pdf.clone(), key.as_str(), PDF_CONTENT_TYPE)
            .await?;
        let upload_ms = upload_start.elapsed().as_millis() as u64;

        // ── Step 6: Report ───────────────────────────────────────────────
        let stats = JobStats {
            total_inputs: total,
            processed,
            failed: failures.len(),
            failed_inputs: failures.iter().map(|e| (e.index(), e.to_string())).collect(),
            content_pages: content_page_count(processed),
            pdf_bytes: pdf.len(),
            ingest_ms,
            render_ms,
            assemble_ms,
            upload_ms,
        };
        let elapsed = Utc::now() - job.started_at;
        let execution_time_ms = elapsed.num_milliseconds().max(0) as u64;

        info!(
            "Job {} complete: {}/{} image(s), {} page(s), {}ms → {}",
            job.job_id,
            processed,
            total,
            1 + stats.content_pages,
            execution_time_ms,
            public_url
        );

        Ok(RunOutcome {
            artifact: PdfArtifact {
                public_url,
                key: key.into_string(),
                execution_time_ms,
                stats,
            },
            pdf,
        })
    }

    /// Resolve and normalize every input, at most `concurrency` at a time.
    async fn ingest(
        &self,
        inputs: &[ImageReference],
    ) -> Vec<(usize, Result<NormalizedImage, ImageError>)> {
        let total = inputs.len();
        let opts = NormalizeOptions {
            max_dimension: self.config.max_dimension,
            jpeg_quality: self.config.jpeg_quality,
        };

        stream::iter(inputs.iter().enumerate().map(|(index, reference)| {
            let resolver = self.resolver.clone();
            let cb = self.config.progress_callback.clone();
            async move {
                if let Some(ref cb) = cb {
                    cb.on_image_start(index, total);
                }
                debug!("Image {}: {}", index, reference.describe());
                let result = match resolver.resolve(index, reference).await {
                    Ok(bytes) => normalize_blocking(index, bytes, opts).await,
                    Err(e) => Err(e),
                };
                if let Some(ref cb) = cb {
                    match &result {
                        Ok(img) => cb.on_image_complete(index, total, img.jpeg.len()),
                        Err(e) => cb.on_image_error(index, total, &e.to_string()),
                    }
                }
                (index, result)
            }
        }))
        .buffer_unordered(self.config.concurrency)
        .collect()
        .await
    }
}

/// Synchronous wrapper around [`Pipeline::run`].
///
/// Creates a temporary tokio runtime internally; do not call from inside
/// an async context.
pub fn generate_sync(pipeline: &Pipeline, job: Job) -> Result<PdfArtifact, Img2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Img2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(pipeline.run(job))
}
