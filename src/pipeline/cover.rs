//! Cover page rendering through a headless browser.
//!
//! Only the first page of a report is laid out by a browser engine; the
//! content pages are written directly by [`super::assemble`]. The browser is
//! driven as a subprocess (`--headless --print-to-pdf`), one per job, and
//! killed when the job is dropped.
//!
//! Rendering sits behind the [`CoverRenderer`] trait so the orchestrator can
//! be run with any engine that returns PDF bytes.

use crate::config::PipelineConfig;
use crate::error::Img2PdfError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// What the cover page shows.
#[derive(Debug, Clone)]
pub struct CoverMetadata {
    pub job_id: String,
    pub title: String,
    pub description: String,
    pub generated_at: DateTime<Utc>,
    /// Number of images that made it into the report.
    pub image_count: usize,
}

/// Produces a single-page cover PDF.
#[async_trait]
pub trait CoverRenderer: Send + Sync {
    async fn render_cover(&self, meta: &CoverMetadata) -> Result<Vec<u8>, Img2PdfError>;
}

/// The fixed cover template.
pub fn cover_html(meta: &CoverMetadata) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
  @page {{ size: A4; margin: 20px; }}
  body {{ font-family: Helvetica, Arial, sans-serif; color: #222; }}
  .cover {{ padding-top: 180px; text-align: center; }}
  h1 {{ font-size: 36px; margin-bottom: 40px; }}
  .meta p {{ font-size: 16px; margin: 8px 0; }}
  .note {{ margin-top: 60px; font-size: 13px; color: #666; }}
</style>
</head>
<body>
<div class="cover">
  <h1>{title}</h1>
  <div class="meta">
    <p>Generated: {generated}</p>
    <p>Images: {count}</p>
    <p>Job ID: {job_id}</p>
  </div>
  <p class="note">{description}</p>
</div>
</body>
</html>
"#,
        title = escape_html(&meta.title),
        generated = meta.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        count = meta.image_count,
        job_id = escape_html(&meta.job_id),
        description = escape_html(&meta.description),
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

// ── Headless Chromium ────────────────────────────────────────────────────

/// Prints the cover with a headless Chromium/Chrome subprocess.
#[derive(Debug, Clone)]
pub struct ChromiumCoverRenderer {
    /// Explicit executable; located with `chromium-auto` when `None`.
    executable: Option<PathBuf>,
    timeout: Duration,
    virtual_time_budget_ms: u64,
}

impl ChromiumCoverRenderer {
    pub fn new(executable: Option<PathBuf>, timeout: Duration, virtual_time_budget_ms: u64) -> Self {
        Self {
            executable,
            timeout,
            virtual_time_budget_ms,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.chromium_path.clone(),
            Duration::from_secs(config.render_timeout_secs),
            config.render_budget_ms,
        )
    }

    fn executable(&self) -> Result<PathBuf, Img2PdfError> {
        match &self.executable {
            Some(path) => Ok(path.clone()),
            None => chromium_auto::locate_chromium()
                .map_err(|e| Img2PdfError::RenderFailed(e.to_string())),
        }
    }
}

fn render_err(msg: impl Into<String>) -> Img2PdfError {
    Img2PdfError::RenderFailed(msg.into())
}

#[async_trait]
impl CoverRenderer for ChromiumCoverRenderer {
    async fn render_cover(&self, meta: &CoverMetadata) -> Result<Vec<u8>, Img2PdfError> {
        let exe = self.executable()?;

        // Page, output and browser profile all live in a per-job scratch dir.
        let scratch = tempfile::TempDir::new()
            .map_err(|e| render_err(format!("failed to create temp dir: {e}")))?;
        let html_path = scratch.path().join("cover.html");
        let pdf_path = scratch.path().join("cover.pdf");
        let profile_dir = scratch.path().join("profile");

        tokio::fs::write(&html_path, cover_html(meta))
            .await
            .map_err(|e| render_err(format!("failed to write cover HTML: {e}")))?;

        let mut cmd = Command::new(&exe);
        cmd.arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-first-run")
            .arg("--hide-scrollbars")
            .arg("--no-pdf-header-footer")
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .arg(format!("--virtual-time-budget={}", self.virtual_time_budget_ms))
            .arg(format!("--print-to-pdf={}", pdf_path.display()))
            .arg(format!("file://{}", html_path.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Rendering cover for job {} with {}", meta.job_id, exe.display());
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                render_err(format!(
                    "browser did not finish within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| render_err(format!("failed to launch {}: {e}", exe.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Browser stderr: {}", stderr.trim());
            return Err(render_err(format!("browser exited with {}", output.status)));
        }

        let pdf = tokio::fs::read(&pdf_path)
            .await
            .map_err(|e| render_err(format!("browser produced no PDF: {e}")))?;
        if !pdf.starts_with(b"%PDF") {
            return Err(render_err("browser output is not a PDF"));
        }

        info!("Cover rendered ({} bytes)", pdf.len());
        Ok(pdf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meta() -> CoverMetadata {
        CoverMetadata {
            job_id: "1700000000000".into(),
            title: "Image Report".into(),
            description: "Static line".into(),
            generated_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            image_count: 7,
        }
    }

    #[test]
    fn html_contains_metadata() {
        let html = cover_html(&meta());
        assert!(html.contains("<h1>Image Report</h1>"));
        assert!(html.contains("Images: 7"));
        assert!(html.contains("Job ID: 1700000000000"));
        assert!(html.contains("2024-03-01T12:00:00Z"));
        assert!(html.contains("size: A4"));
    }

    #[test]
    fn html_escapes_user_text() {
        let mut m = meta();
        m.job_id = "<script>alert('x')</script>".into();
        let html = cover_html(&m);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[tokio::test]
    async fn missing_executable_is_render_failure() {
        let r = ChromiumCoverRenderer::new(
            Some(PathBuf::from("/nonexistent/chromium-binary")),
            Duration::from_secs(5),
            100,
        );
        let err = r.render_cover(&meta()).await.unwrap_err();
        assert!(matches!(err, Img2PdfError::RenderFailed(_)), "got {err:?}");
    }
}
