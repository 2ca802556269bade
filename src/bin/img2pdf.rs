//! CLI binary for img2pdf.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, picks the storage backend from the environment, and
//! prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use img2pdf::{
    authorize_trigger, select_provider, Cleanup, ErrorResponse, ImageReference, Img2PdfError, Job,
    JobProgressCallback, PdfArtifact, Pipeline, PipelineConfig, ProgressCallback, SharedStorage,
    StorageConfig, SweepScope, Upload,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per image. Images finish out of
/// order, so start times are tracked per index.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Staging images…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Ingesting");
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&index)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_job_start(&self, job_id: &str, total_images: usize) {
        self.activate_bar(total_images);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Job {job_id}: {total_images} image(s)…"))
        ));
    }

    fn on_image_start(&self, index: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(index, Instant::now());
        self.bar.set_message(format!("image {}", index + 1));
    }

    fn on_image_complete(&self, index: usize, total: usize, bytes: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{:>6} KB", bytes / 1024)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
        if self.bar.position() == self.bar.length().unwrap_or(0) {
            self.bar.set_prefix("Rendering");
            self.bar.set_message("cover + pages…");
        }
    }

    fn on_image_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_job_complete(&self, _job_id: &str, processed: usize, success: bool) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if success && failed == 0 {
            eprintln!("{} {} image(s) in report", green("✔"), bold(&processed.to_string()));
        } else if success {
            eprintln!(
                "{} {} image(s) in report  ({} dropped)",
                cyan("⚠"),
                bold(&processed.to_string()),
                red(&failed.to_string())
            );
        } else {
            eprintln!("{} job failed", red("✘"));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Report from local files, uploaded to the configured backend
  img2pdf generate a.jpg b.png c.webp

  # Stage the files as img-… objects first, delete them after success
  img2pdf generate --stage photos/*.jpg

  # Mix remote URLs and keep a local copy
  img2pdf generate https://example.com/x.jpg y.png -o report.pdf

  # Machine-readable result: {"pdfUrl": "...", "executionTime": "…ms"}
  img2pdf generate --json a.jpg

  # Scheduled hygiene: delete every staged source image
  img2pdf sweep --key "$CRON_SECRET"

  # Emergency wipe of the whole bucket
  img2pdf sweep --everything

  # Delete a delivered report
  img2pdf cleanup-artifact https://…/pdf-1700000000000-1700000004211.pdf

  # Let a client PUT a file straight into the bucket (S3 only)
  img2pdf upload-url --json --expires 600 img-1700000000000-0-site.jpg

ENVIRONMENT VARIABLES:
  SB_S3_ENDPOINT            S3-compatible endpoint URL
  SB_S3_REGION              S3 region (default us-east-1)
  SB_S3_ACCESS_KEY_ID       S3 access key (selects the S3 backend)
  SB_S3_SECRET_ACCESS_KEY   S3 secret key
  SUPABASE_URL              Storage API base URL (selects the REST backend)
  SUPABASE_SERVICE_ROLE_KEY Storage API service-role key
  SUPABASE_BUCKET_NAME      Bucket (default pdfs)
  IMG2PDF_LOCAL_DIR         Root for the filesystem backend (default .)
  CHROMIUM_PATH             Browser executable used for the cover page
  CRON_SECRET               Required --key for sweep, when set
"#;

/// Turn batches of images into a photo-report PDF.
#[derive(Parser, Debug)]
#[command(
    name = "img2pdf",
    version,
    about = "Turn batches of images into a photo-report PDF",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output structured JSON instead of human-readable text.
    #[arg(long, global = true, env = "IMG2PDF_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "IMG2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "IMG2PDF_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a report from images and upload it.
    Generate(GenerateArgs),

    /// Delete staged source images (or everything with --everything).
    Sweep {
        /// Delete every object, artifacts included.
        #[arg(long)]
        everything: bool,

        /// Shared secret; must match CRON_SECRET when that is set.
        #[arg(long)]
        key: Option<String>,
    },

    /// Delete staged source images by URL. Non-source URLs are refused.
    CleanupSources {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Delete one delivered report by URL.
    CleanupArtifact { url: String },

    /// Print a presigned PUT URL for a direct upload, and its public URL.
    UploadUrl {
        /// Object key to upload to.
        key: String,

        /// Seconds the upload URL stays valid.
        #[arg(long, default_value_t = 3600)]
        expires: u64,
    },

    /// List stored object keys.
    List {
        /// Only keys starting with this prefix (e.g. img- or pdf-).
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Local image files, http(s) URLs, or data: URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Also write the PDF to this file.
    #[arg(short, long, env = "IMG2PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Job id used in the artifact key. Default: current timestamp.
    #[arg(long)]
    job_id: Option<String>,

    /// Upload local files as img-… objects first and delete them afterwards.
    #[arg(long)]
    stage: bool,

    /// Wipe the whole bucket if the job fails.
    #[arg(long)]
    wipe_on_failure: bool,

    /// Abandon the job after this many seconds.
    #[arg(long, env = "IMG2PDF_DEADLINE")]
    deadline: Option<u64>,

    /// Bounding box edge for normalized images, in pixels.
    #[arg(long, env = "IMG2PDF_MAX_DIMENSION", default_value_t = 1024)]
    max_dimension: u32,

    /// JPEG quality (1–100).
    #[arg(long, env = "IMG2PDF_JPEG_QUALITY", default_value_t = 75,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Number of images ingested at once.
    #[arg(short, long, env = "IMG2PDF_CONCURRENCY", default_value_t = 16)]
    concurrency: usize,

    /// Per-image HTTP fetch timeout in seconds.
    #[arg(long, env = "IMG2PDF_FETCH_TIMEOUT", default_value_t = 30)]
    fetch_timeout: u64,

    /// Cover render timeout in seconds.
    #[arg(long, env = "IMG2PDF_RENDER_TIMEOUT", default_value_t = 60)]
    render_timeout: u64,

    /// Browser executable for the cover page.
    #[arg(long, env = "CHROMIUM_PATH")]
    chromium: Option<PathBuf>,

    /// Cover heading.
    #[arg(long, default_value = "Image Report")]
    title: String,

    /// Disable progress bar.
    #[arg(long, env = "IMG2PDF_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs are noise while the progress bar is active.
    let show_progress = match &cli.command {
        Command::Generate(args) => !cli.quiet && !args.no_progress && !cli.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Storage ──────────────────────────────────────────────────────────
    let storage_config = StorageConfig::from_env();
    let storage = select_provider(&storage_config)
        .with_context(|| format!("Failed to set up {} storage", storage_config.backend_name()))?;

    match cli.command {
        Command::Generate(ref args) => {
            run_generate(&cli, args, storage, show_progress).await
        }
        Command::Sweep { everything, ref key } => {
            let secret = std::env::var("CRON_SECRET").ok();
            if !authorize_trigger(secret.as_deref(), key.as_deref()) {
                return fail(&cli, "Unauthorized");
            }
            let scope = if everything {
                SweepScope::Everything
            } else {
                SweepScope::Sources
            };
            let report = Cleanup::new(storage)
                .sweep(scope)
                .await
                .context("Sweep failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if !cli.quiet {
                eprintln!(
                    "{} {}/{} deleted, {} error(s)",
                    if report.error_count == 0 { green("✔") } else { cyan("⚠") },
                    report.deleted_count,
                    report.listed,
                    report.error_count
                );
            }
            Ok(())
        }
        Command::CleanupSources { ref urls } => {
            let report = Cleanup::new(storage).cleanup_sources(urls).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if !cli.quiet {
                eprintln!(
                    "{} deleted, {} rejected, {} failed",
                    report.deleted, report.rejected, report.failed
                );
            }
            Ok(())
        }
        Command::CleanupArtifact { ref url } => {
            match Cleanup::new(storage).cleanup_artifact(url).await {
                Ok(key) => {
                    if cli.json {
                        println!("{}", serde_json::json!({ "deleted": key }));
                    } else if !cli.quiet {
                        eprintln!("{} deleted {}", green("✔"), key);
                    }
                    Ok(())
                }
                Err(e) => fail(&cli, e),
            }
        }
        Command::UploadUrl { ref key, expires } => {
            match storage
                .presign_upload(key, Duration::from_secs(expires))
                .await
            {
                Ok(presigned) => {
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&presigned)?);
                    } else {
                        println!("{}", presigned.upload_url);
                        if !cli.quiet {
                            eprintln!("{} {}", dim("public:"), presigned.public_url);
                        }
                    }
                    Ok(())
                }
                Err(e) => fail(&cli, e),
            }
        }
        Command::List { ref prefix } => {
            let keys = storage
                .list(prefix.as_deref())
                .await
                .context("Listing failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&keys)?);
            } else {
                for key in keys {
                    println!("{key}");
                }
            }
            Ok(())
        }
    }
}

async fn run_generate(
    cli: &Cli,
    args: &GenerateArgs,
    storage: SharedStorage,
    show_progress: bool,
) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn JobProgressCallback>)
    } else {
        None
    };
    let config = build_config(args, progress_cb)?;
    let pipeline = Pipeline::new(storage.clone(), config).context("Failed to build pipeline")?;

    // The process exits right after, so staged sources are cleaned up inline.
    let (inputs, staged) = if args.stage {
        let uploads = read_uploads(&args.inputs).await?;
        let urls = pipeline
            .stage_sources(uploads)
            .await
            .context("Failed to stage images")?;
        (urls.iter().cloned().map(ImageReference::url).collect(), urls)
    } else {
        (to_references(&args.inputs).await?, Vec::new())
    };

    let mut job = Job::new(inputs);
    if let Some(ref id) = args.job_id {
        job = job.with_id(id.clone());
    }
    let result = match (&args.output, args.deadline) {
        (None, Some(secs)) => {
            pipeline
                .run_with_deadline(job, Duration::from_secs(secs))
                .await
        }
        (Some(path), Some(secs)) => {
            let job_id = job.job_id.clone();
            tokio::time::timeout(Duration::from_secs(secs), pipeline.run_to_file(job, path))
                .await
                .unwrap_or_else(|_| {
                    Err(Img2PdfError::DeadlineExceeded {
                        job_id,
                        elapsed_ms: secs * 1000,
                    })
                })
        }
        (Some(path), None) => pipeline.run_to_file(job, path).await,
        (None, None) => pipeline.run(job).await,
    };

    match result {
        Ok(artifact) => {
            if !staged.is_empty() {
                Cleanup::new(storage).cleanup_sources(&staged).await;
            }
            print_artifact(cli, &artifact)
        }
        Err(e) => {
            if args.wipe_on_failure {
                match Cleanup::new(storage).sweep(SweepScope::Everything).await {
                    Ok(r) => eprintln!(
                        "Emergency wipe: {}/{} deleted, {} error(s)",
                        r.deleted_count, r.listed, r.error_count
                    ),
                    Err(we) => eprintln!("Emergency wipe failed: {we}"),
                }
            }
            fail(cli, e)
        }
    }
}

fn print_artifact(cli: &Cli, artifact: &PdfArtifact) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&artifact.to_response())
                .context("Failed to serialise output")?
        );
        return Ok(());
    }

    println!("{}", artifact.public_url);
    if !cli.quiet {
        let s = &artifact.stats;
        eprintln!(
            "{}  {}/{} images  {} pages  {}ms  →  {}",
            if s.failed == 0 { green("✔") } else { cyan("⚠") },
            s.processed,
            s.total_inputs,
            1 + s.content_pages,
            artifact.execution_time_ms,
            bold(&artifact.key),
        );
        eprintln!(
            "   {}",
            dim(&format!(
                "ingest {}ms  /  cover {}ms  /  assemble {}ms  /  upload {}ms",
                s.ingest_ms, s.render_ms, s.assemble_ms, s.upload_ms
            ))
        );
        for (index, message) in &s.failed_inputs {
            eprintln!("   {} input {}: {}", red("✗"), index + 1, message);
        }
    }
    Ok(())
}

/// Report a failure in the selected output format and exit non-zero.
fn fail(cli: &Cli, error: impl std::fmt::Display) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string(&ErrorResponse::new(&error))?);
        std::process::exit(1);
    }
    anyhow::bail!("{error}")
}

/// Map CLI args to `PipelineConfig`.
fn build_config(args: &GenerateArgs, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .max_dimension(args.max_dimension)
        .jpeg_quality(args.jpeg_quality)
        .concurrency(args.concurrency)
        .fetch_timeout_secs(args.fetch_timeout)
        .render_timeout_secs(args.render_timeout)
        .report_title(args.title.clone());

    if let Some(ref path) = args.chromium {
        builder = builder.chromium_path(path.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// URLs pass through; anything else is read as a local file.
async fn to_references(inputs: &[String]) -> Result<Vec<ImageReference>> {
    let mut refs = Vec::with_capacity(inputs.len());
    for input in inputs {
        if input.starts_with("http://") || input.starts_with("https://") || input.starts_with("data:")
        {
            refs.push(ImageReference::url(input.clone()));
        } else {
            let bytes = tokio::fs::read(input)
                .await
                .with_context(|| format!("Failed to read {input}"))?;
            refs.push(ImageReference::Inline {
                bytes,
                mime_hint: Some(mime_for(Path::new(input)).to_string()),
            });
        }
    }
    Ok(refs)
}

async fn read_uploads(inputs: &[String]) -> Result<Vec<Upload>> {
    let mut uploads = Vec::with_capacity(inputs.len());
    for input in inputs {
        let path = Path::new(input);
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {input} (--stage takes local files)"))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        uploads.push(Upload {
            file_name,
            content_type: mime_for(path).to_string(),
            bytes,
        });
    }
    Ok(uploads)
}

fn mime_for(path: &Path) -> &'static str {
    image::ImageFormat::from_path(path)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream")
}
