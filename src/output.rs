//! Results of a pipeline run and their wire shapes.
//!
//! [`PdfArtifact`] is the library-level result. [`ArtifactResponse`] and
//! [`ErrorResponse`] are the JSON bodies an ingress returns to its caller;
//! their field names are a compatibility contract with existing clients.

use serde::{Deserialize, Serialize};

/// The single externally observable product of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfArtifact {
    /// URL the caller can download the PDF from.
    pub public_url: String,
    /// Storage key of the artifact (`pdf-<jobId>-<ms>.pdf`).
    pub key: String,
    /// Wall-clock time from job start to stored artifact.
    pub execution_time_ms: u64,
    pub stats: JobStats,
}

impl PdfArtifact {
    pub fn to_response(&self) -> ArtifactResponse {
        ArtifactResponse {
            pdf_url: self.public_url.clone(),
            execution_time: format!("{}ms", self.execution_time_ms),
        }
    }
}

/// Per-job statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStats {
    pub total_inputs: usize,
    pub processed: usize,
    pub failed: usize,
    /// `(input index, error message)` for every dropped image, in input order.
    pub failed_inputs: Vec<(usize, String)>,
    /// Number of content pages appended after the cover.
    pub content_pages: usize,
    pub pdf_bytes: usize,
    pub ingest_ms: u64,
    pub render_ms: u64,
    pub assemble_ms: u64,
    pub upload_ms: u64,
}

/// Success body: `{ "pdfUrl": "...", "executionTime": "1234ms" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactResponse {
    pub pdf_url: String,
    pub execution_time: String,
}

/// Failure body: `{ "error": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl std::fmt::Display) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_response_wire_shape() {
        let artifact = PdfArtifact {
            public_url: "https://cdn.example/pdfs/pdf-1-2.pdf".into(),
            key: "pdf-1-2.pdf".into(),
            execution_time_ms: 1234,
            stats: JobStats::default(),
        };
        let json = serde_json::to_value(artifact.to_response()).unwrap();
        assert_eq!(json["pdfUrl"], "https://cdn.example/pdfs/pdf-1-2.pdf");
        assert_eq!(json["executionTime"], "1234ms");
        assert_eq!(json.as_object().unwrap().len(), 2);
    }

    #[test]
    fn error_response_wire_shape() {
        let json = serde_json::to_string(&ErrorResponse::new("boom")).unwrap();
        assert_eq!(json, r#"{"error":"boom"}"#);
    }
}
