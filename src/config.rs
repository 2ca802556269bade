//! Configuration types for the image-to-PDF pipeline.
//!
//! Pipeline behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Storage backend selection is described by
//! [`StorageConfig`], read once at process start (usually from the
//! environment) and turned into a provider by
//! [`crate::storage::select_provider`].

use crate::error::Img2PdfError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Configuration for a pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use img2pdf::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_dimension(1024)
///     .jpeg_quality(75)
///     .concurrency(16)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Bounding box (both edges) images are downsampled into. Default: 1024.
    ///
    /// Images already inside the box are left at their original size.
    pub max_dimension: u32,

    /// JPEG quality factor for normalized images (1–100). Default: 75.
    pub jpeg_quality: u8,

    /// Number of inputs resolved and normalized at once. Default: 16.
    pub concurrency: usize,

    /// Timeout for fetching one remote image, in seconds. Default: 30.
    pub fetch_timeout_secs: u64,

    /// Timeout for the browser subprocess that prints the cover. Default: 60.
    pub render_timeout_secs: u64,

    /// Virtual time the browser may spend loading the cover before printing,
    /// in milliseconds. Acts as the "network idle" wait. Default: 5000.
    pub render_budget_ms: u64,

    /// Explicit browser executable. If None, located by `chromium-auto`.
    pub chromium_path: Option<PathBuf>,

    /// Geometry of the content pages.
    pub page: PageGeometry,

    /// Heading printed on the cover. Default: "Image Report".
    pub report_title: String,

    /// Static descriptive line printed on the cover.
    pub report_description: String,

    /// Optional per-image progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1024,
            jpeg_quality: 75,
            concurrency: 16,
            fetch_timeout_secs: 30,
            render_timeout_secs: 60,
            render_budget_ms: 5000,
            chromium_path: None,
            page: PageGeometry::default(),
            report_title: "Image Report".to_string(),
            report_description: "This report was optimized to reduce storage consumption."
                .to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_dimension", &self.max_dimension)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("concurrency", &self.concurrency)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("render_budget_ms", &self.render_budget_ms)
            .field("chromium_path", &self.chromium_path)
            .field("page", &self.page)
            .field("report_title", &self.report_title)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn JobProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_dimension(mut self, px: u32) -> Self {
        self.config.max_dimension = px.max(16);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs;
        self
    }

    pub fn render_budget_ms(mut self, ms: u64) -> Self {
        self.config.render_budget_ms = ms;
        self
    }

    pub fn chromium_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chromium_path = Some(path.into());
        self
    }

    pub fn page(mut self, page: PageGeometry) -> Self {
        self.config.page = page;
        self
    }

    pub fn report_title(mut self, title: impl Into<String>) -> Self {
        self.config.report_title = title.into();
        self
    }

    pub fn report_description(mut self, text: impl Into<String>) -> Self {
        self.config.report_description = text.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Img2PdfError> {
        let c = &self.config;
        if c.fetch_timeout_secs == 0 || c.render_timeout_secs == 0 {
            return Err(Img2PdfError::InvalidConfig(
                "Timeouts must be at least 1 second".into(),
            ));
        }
        c.page.validate()?;
        Ok(self.config)
    }
}

// ── Page geometry ────────────────────────────────────────────────────────

/// Fixed page layout for content pages, in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    /// Blank border on every side.
    pub margin: f32,
    /// Vertical space between the upper and lower image slots.
    pub gap: f32,
}

impl Default for PageGeometry {
    /// A4 portrait with a 40 pt margin and a 20 pt gap.
    fn default() -> Self {
        Self {
            width: 595.28,
            height: 841.89,
            margin: 40.0,
            gap: 20.0,
        }
    }
}

impl PageGeometry {
    /// Width available to an image.
    pub fn usable_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    /// Height of one of the two image slots.
    pub fn slot_height(&self) -> f32 {
        (self.height - 2.0 * self.margin - self.gap) / 2.0
    }

    pub(crate) fn validate(&self) -> Result<(), Img2PdfError> {
        if self.usable_width() <= 0.0 || self.slot_height() <= 0.0 {
            return Err(Img2PdfError::InvalidConfig(format!(
                "Page {}x{} pt leaves no room for images with margin {} and gap {}",
                self.width, self.height, self.margin, self.gap
            )));
        }
        Ok(())
    }
}

// ── Storage configuration ────────────────────────────────────────────────

/// Which storage backend to use, with its settings.
///
/// Resolved once at startup; see [`StorageConfig::from_env`] for the
/// precedence order.
#[derive(Clone)]
pub enum StorageConfig {
    /// S3-compatible object store.
    S3(S3Config),
    /// Managed storage REST API (Supabase Storage).
    Supabase(SupabaseConfig),
    /// Local filesystem fallback.
    Local(LocalConfig),
}

#[derive(Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
}

#[derive(Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Project root; objects live in `<root>/public/<subdir>`.
    pub root: PathBuf,
    /// Sub-directory name, also used as the URL path prefix. Default: `pdfs`.
    pub subdir: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            subdir: "pdfs".to_string(),
        }
    }
}

const DEFAULT_BUCKET: &str = "pdfs";

impl StorageConfig {
    /// Read the backend selection from process environment variables.
    ///
    /// Precedence:
    /// 1. `SB_S3_ACCESS_KEY_ID` + `SB_S3_SECRET_ACCESS_KEY` → S3-compatible
    ///    (`SB_S3_ENDPOINT`, `SB_S3_REGION`, `SUPABASE_BUCKET_NAME`)
    /// 2. `SUPABASE_URL` + `SUPABASE_SERVICE_ROLE_KEY` → managed storage API
    /// 3. otherwise the local filesystem (`IMG2PDF_LOCAL_DIR`, default `.`)
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`StorageConfig::from_env`] with an injectable lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |k: &str| get(k).filter(|v| !v.is_empty());

        let bucket = non_empty("SUPABASE_BUCKET_NAME").unwrap_or_else(|| DEFAULT_BUCKET.to_string());

        if let (Some(access_key_id), Some(secret_access_key)) = (
            non_empty("SB_S3_ACCESS_KEY_ID"),
            non_empty("SB_S3_SECRET_ACCESS_KEY"),
        ) {
            return StorageConfig::S3(S3Config {
                endpoint: non_empty("SB_S3_ENDPOINT").unwrap_or_default(),
                region: non_empty("SB_S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                access_key_id,
                secret_access_key,
                bucket,
            });
        }

        if let (Some(url), Some(service_role_key)) = (
            non_empty("SUPABASE_URL"),
            non_empty("SUPABASE_SERVICE_ROLE_KEY"),
        ) {
            return StorageConfig::Supabase(SupabaseConfig {
                url,
                service_role_key,
                bucket,
            });
        }

        StorageConfig::Local(LocalConfig {
            root: non_empty("IMG2PDF_LOCAL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            ..LocalConfig::default()
        })
    }

    /// Short backend name for logs.
    pub fn backend_name(&self) -> &'static str {
        match self {
            StorageConfig::S3(_) => "s3",
            StorageConfig::Supabase(_) => "supabase",
            StorageConfig::Local(_) => "local",
        }
    }
}

// Secrets never reach logs.
impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageConfig::S3(c) => f
                .debug_struct("S3")
                .field("endpoint", &c.endpoint)
                .field("region", &c.region)
                .field("bucket", &c.bucket)
                .field("access_key_id", &"<redacted>")
                .finish(),
            StorageConfig::Supabase(c) => f
                .debug_struct("Supabase")
                .field("url", &c.url)
                .field("bucket", &c.bucket)
                .field("service_role_key", &"<redacted>")
                .finish(),
            StorageConfig::Local(c) => f.debug_tuple("Local").field(c).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn s3_credentials_take_precedence() {
        let cfg = StorageConfig::from_lookup(lookup(&[
            ("SB_S3_ACCESS_KEY_ID", "ak"),
            ("SB_S3_SECRET_ACCESS_KEY", "sk"),
            ("SB_S3_ENDPOINT", "https://abc.storage.supabase.co/storage/v1/s3"),
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "role"),
            ("SUPABASE_BUCKET_NAME", "reports"),
        ]));
        match cfg {
            StorageConfig::S3(c) => {
                assert_eq!(c.bucket, "reports");
                assert_eq!(c.region, "us-east-1");
            }
            other => panic!("expected S3, got {other:?}"),
        }
    }

    #[test]
    fn supabase_selected_without_s3_keys() {
        let cfg = StorageConfig::from_lookup(lookup(&[
            ("SB_S3_ACCESS_KEY_ID", "ak"),
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "role"),
        ]));
        assert_eq!(cfg.backend_name(), "supabase");
        if let StorageConfig::Supabase(c) = cfg {
            assert_eq!(c.bucket, "pdfs");
        }
    }

    #[test]
    fn falls_back_to_local() {
        let cfg = StorageConfig::from_lookup(lookup(&[("SUPABASE_URL", "")]));
        assert_eq!(cfg.backend_name(), "local");
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = StorageConfig::from_lookup(lookup(&[
            ("SB_S3_ACCESS_KEY_ID", "AKIA-secret"),
            ("SB_S3_SECRET_ACCESS_KEY", "very-secret"),
        ]));
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("AKIA-secret"));
        assert!(!dbg.contains("very-secret"));
    }

    #[test]
    fn builder_clamps() {
        let c = PipelineConfig::builder()
            .jpeg_quality(0)
            .concurrency(0)
            .max_dimension(1)
            .build()
            .unwrap();
        assert_eq!(c.jpeg_quality, 1);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.max_dimension, 16);
    }

    #[test]
    fn builder_rejects_degenerate_page() {
        let err = PipelineConfig::builder()
            .page(PageGeometry {
                width: 100.0,
                height: 100.0,
                margin: 60.0,
                gap: 0.0,
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, Img2PdfError::InvalidConfig(_)));
    }

    #[test]
    fn default_geometry_is_a4() {
        let g = PageGeometry::default();
        assert!((g.usable_width() - 515.28).abs() < 0.01);
        assert!((g.slot_height() - 370.945).abs() < 0.01);
    }
}
