//! Source resolution: turn an [`ImageReference`] into raw image bytes.
//!
//! | Reference                         | Resolution                      |
//! |-----------------------------------|---------------------------------|
//! | inline bytes                      | returned as-is                  |
//! | `data:<mime>;base64,<payload>`    | base64-decoded                  |
//! | URL whose last segment is `img-…` | read from storage, no HTTP hop  |
//! | any other `http(s)://` URL        | HTTP GET with timeout           |

use crate::error::ImageError;
use crate::job::ImageReference;
use crate::storage::{key_from_url, ObjectKey, ObjectRole, SharedStorage};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Resolves references for one pipeline. Cheap to clone.
#[derive(Clone)]
pub struct SourceResolver {
    storage: SharedStorage,
    client: Client,
}

impl SourceResolver {
    /// Build a resolver with its own HTTP client.
    pub fn new(storage: SharedStorage, fetch_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self::with_client(storage, client))
    }

    pub fn with_client(storage: SharedStorage, client: Client) -> Self {
        Self { storage, client }
    }

    /// Resolve input `index` to its bytes.
    pub async fn resolve(
        &self,
        index: usize,
        reference: &ImageReference,
    ) -> Result<Vec<u8>, ImageError> {
        match reference {
            ImageReference::Inline { bytes, .. } => Ok(bytes.clone()),
            ImageReference::Url { url } if url.starts_with("data:") => decode_data_url(index, url),
            ImageReference::Url { url } => self.resolve_url(index, url).await,
        }
    }

    async fn resolve_url(&self, index: usize, url: &str) -> Result<Vec<u8>, ImageError> {
        if url.trim().is_empty() {
            return Err(ImageError::InvalidReference {
                index,
                detail: "empty URL".into(),
            });
        }

        let staged = key_from_url(url)
            .and_then(|k| ObjectKey::parse(&k))
            .filter(|k| k.role() == ObjectRole::Source);
        if let Some(key) = staged {
            debug!("Image {}: reading staged object {}", index, key);
            return self.storage.read(key.as_str()).await.map_err(|e| {
                if e.is_not_found() {
                    ImageError::NotFound {
                        index,
                        key: key.into_string(),
                    }
                } else {
                    ImageError::Fetch {
                        index,
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                }
            });
        }

        if !is_http_url(url) {
            return Err(ImageError::InvalidReference {
                index,
                detail: format!("unsupported URL scheme in '{url}'"),
            });
        }
        self.fetch(index, url).await
    }

    async fn fetch(&self, index: usize, url: &str) -> Result<Vec<u8>, ImageError> {
        debug!("Image {}: fetching {}", index, url);
        let fetch_err = |reason: String| ImageError::Fetch {
            index,
            url: url.to_string(),
            reason,
        };

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                fetch_err("timed out".into())
            } else {
                fetch_err(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(fetch_err(format!("HTTP {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

pub fn is_http_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Decode a base64 `data:` URL. Non-base64 data URLs are rejected.
fn decode_data_url(index: usize, url: &str) -> Result<Vec<u8>, ImageError> {
    let invalid = |detail: &str| ImageError::InvalidReference {
        index,
        detail: detail.to_string(),
    };
    let (meta, payload) = url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| invalid("data URL has no payload"))?;
    if !meta.ends_with(";base64") {
        return Err(invalid("only base64 data URLs are supported"));
    }
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| invalid(&format!("bad base64 payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalConfig;
    use crate::storage::{LocalStorage, StorageProvider};
    use std::sync::Arc;

    fn resolver() -> (tempfile::TempDir, Arc<LocalStorage>, SourceResolver) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(
            LocalStorage::new(&LocalConfig {
                root: dir.path().to_path_buf(),
                subdir: "pdfs".into(),
            })
            .unwrap(),
        );
        let r = SourceResolver::new(storage.clone(), Duration::from_secs(5)).unwrap();
        (dir, storage, r)
    }

    #[tokio::test]
    async fn inline_bytes_pass_through() {
        let (_d, _s, r) = resolver();
        let out = r.resolve(0, &ImageReference::inline(vec![1, 2, 3])).await.unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn data_url_is_decoded() {
        let (_d, _s, r) = resolver();
        let out = r
            .resolve(0, &ImageReference::url("data:image/png;base64,AQID"))
            .await
            .unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn bad_data_url_is_invalid_reference() {
        let (_d, _s, r) = resolver();
        let err = r
            .resolve(3, &ImageReference::url("data:image/png,plain"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::InvalidReference { index: 3, .. }));
    }

    #[tokio::test]
    async fn staged_source_reads_from_storage() {
        let (_d, s, r) = resolver();
        let url = s
            .upload(b"pixels".to_vec(), "img-1-0-a.png", "image/png")
            .await
            .unwrap();
        let out = r.resolve(0, &ImageReference::url(url)).await.unwrap();
        assert_eq!(out, b"pixels");
    }

    #[tokio::test]
    async fn missing_staged_source_is_not_found() {
        let (_d, _s, r) = resolver();
        let err = r
            .resolve(1, &ImageReference::url("/pdfs/img-9-9-gone.png"))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, ImageError::NotFound { index: 1, key } if key == "img-9-9-gone.png"),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn non_http_scheme_is_rejected() {
        let (_d, _s, r) = resolver();
        let err = r
            .resolve(0, &ImageReference::url("ftp://host/photo.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::InvalidReference { .. }));
    }

    /// Minimal HTTP/1.1 server on 127.0.0.1. `/missing…` answers 404, every
    /// other path gets `body`.
    async fn serve(body: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let mut read = 0;
                    while read < buf.len() {
                        let n = sock.read(&mut buf[read..]).await.unwrap_or(0);
                        read += n;
                        if n == 0 || buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    let request = String::from_utf8_lossy(&buf[..read]).into_owned();
                    let path = request.split_whitespace().nth(1).unwrap_or("/");
                    let (status, body) = if path.starts_with("/missing") {
                        ("404 Not Found", b"nope".to_vec())
                    } else {
                        ("200 OK", body)
                    };
                    let head = format!(
                        "HTTP/1.1 {status}\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = sock.write_all(head.as_bytes()).await;
                    let _ = sock.write_all(&body).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn direct_resolver() -> (tempfile::TempDir, SourceResolver) {
        let (dir, storage, _) = resolver();
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        (dir, SourceResolver::with_client(storage, client))
    }

    #[tokio::test]
    async fn http_fetch_returns_body() {
        let (_d, r) = direct_resolver();
        let base = serve(b"png-bytes".to_vec()).await;
        let out = r
            .resolve(0, &ImageReference::url(format!("{base}/photos/a.png")))
            .await
            .unwrap();
        assert_eq!(out, b"png-bytes");
    }

    #[tokio::test]
    async fn http_error_status_is_fetch_error() {
        let (_d, r) = direct_resolver();
        let base = serve(Vec::new()).await;
        let err = r
            .resolve(2, &ImageReference::url(format!("{base}/missing.png")))
            .await
            .unwrap_err();
        match err {
            ImageError::Fetch { index, reason, .. } => {
                assert_eq!(index, 2);
                assert!(reason.starts_with("HTTP 404"), "got {reason}");
            }
            other => panic!("expected Fetch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_fetch_error() {
        let (_d, r) = direct_resolver();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = r
            .resolve(0, &ImageReference::url(format!("http://{addr}/a.png")))
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::Fetch { index: 0, .. }), "got {err:?}");
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("https://example.com/a.png"));
        assert!(is_http_url("http://example.com/a.png"));
        assert!(!is_http_url("/pdfs/a.png"));
        assert!(!is_http_url(""));
    }
}
