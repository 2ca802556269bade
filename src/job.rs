//! Job inputs: what the ingress hands to [`crate::Pipeline::run`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an input image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "kind")]
pub enum ImageReference {
    /// Bytes already in memory (e.g. a multipart upload).
    Inline {
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
        mime_hint: Option<String>,
    },
    /// An `http(s)://` URL, a public URL of an object this system stored, or
    /// a `data:` URL.
    Url { url: String },
}

impl ImageReference {
    pub fn inline(bytes: impl Into<Vec<u8>>) -> Self {
        ImageReference::Inline {
            bytes: bytes.into(),
            mime_hint: None,
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        ImageReference::Url { url: url.into() }
    }

    /// Short description for logs; never dumps inline bytes.
    pub fn describe(&self) -> String {
        match self {
            ImageReference::Inline { bytes, mime_hint } => format!(
                "<inline {} bytes{}>",
                bytes.len(),
                mime_hint
                    .as_deref()
                    .map(|m| format!(", {m}"))
                    .unwrap_or_default()
            ),
            ImageReference::Url { url } if url.starts_with("data:") => {
                format!("<data url {} chars>", url.len())
            }
            ImageReference::Url { url } => url.clone(),
        }
    }
}

/// One pipeline invocation.
///
/// Lives only for the duration of a run; nothing about it is persisted
/// except the artifact it produces.
#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: String,
    pub inputs: Vec<ImageReference>,
    pub started_at: DateTime<Utc>,
}

impl Job {
    /// Create a job; the id defaults to the current millisecond timestamp.
    pub fn new(inputs: Vec<ImageReference>) -> Self {
        let now = Utc::now();
        Self {
            job_id: now.timestamp_millis().to_string(),
            inputs,
            started_at: now,
        }
    }

    pub fn with_id(mut self, job_id: impl Into<String>) -> Self {
        let id = job_id.into();
        if !id.is_empty() {
            self.job_id = id;
        }
        self
    }
}

/// A raw file handed over by the client, before it is staged in storage.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Original file name as sent by the client.
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_defaults_to_timestamp() {
        let job = Job::new(vec![]);
        assert!(job.job_id.parse::<i64>().is_ok(), "got {}", job.job_id);
    }

    #[test]
    fn empty_explicit_id_keeps_default() {
        let job = Job::new(vec![]).with_id("");
        assert!(!job.job_id.is_empty());
        let job = job.with_id("report-42");
        assert_eq!(job.job_id, "report-42");
    }

    #[test]
    fn reference_json_shape() {
        let refs: Vec<ImageReference> = serde_json::from_str(
            r#"[{"kind":"url","url":"https://x/img-1-0-a.png"},
                {"kind":"inline","bytes":"AQID","mimeHint":"image/png"}]"#,
        )
        .unwrap();
        assert_eq!(refs[0], ImageReference::url("https://x/img-1-0-a.png"));
        match &refs[1] {
            ImageReference::Inline { bytes, mime_hint } => {
                assert_eq!(bytes, &vec![1, 2, 3]);
                assert_eq!(mime_hint.as_deref(), Some("image/png"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn describe_hides_payloads() {
        let d = ImageReference::url("data:image/png;base64,AAAA").describe();
        assert!(d.starts_with("<data url"));
        let d = ImageReference::inline(vec![0u8; 12]).describe();
        assert_eq!(d, "<inline 12 bytes>");
    }
}
