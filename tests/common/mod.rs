//! Shared fakes for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use img2pdf::{CoverMetadata, CoverRenderer, Img2PdfError, StorageError, StorageProvider};
use lopdf::{dictionary, Document, Object, Stream};
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

// ── Images ───────────────────────────────────────────────────────────────────

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 140, 200])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// A one-page PDF standing in for a browser-rendered cover.
pub fn blank_cover() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, b"BT ET".to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(595),
            Object::Integer(842),
        ],
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// Widths of the image XObjects on each content page, in page order and
/// slot order (upper first).
pub fn content_image_widths(pdf: &[u8]) -> Vec<Vec<i64>> {
    let doc = Document::load_mem(pdf).unwrap();
    doc.get_pages()
        .values()
        .skip(1)
        .map(|page_id| {
            let page = doc.get_dictionary(*page_id).unwrap();
            let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
            let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
            let mut names: Vec<&[u8]> = xobjects.iter().map(|(k, _)| k.as_slice()).collect();
            names.sort();
            names
                .into_iter()
                .map(|name| {
                    let id = xobjects.get(name).unwrap().as_reference().unwrap();
                    let stream = doc.get_object(id).unwrap().as_stream().unwrap();
                    stream.dict.get(b"Width").unwrap().as_i64().unwrap()
                })
                .collect()
        })
        .collect()
}

pub fn page_count(pdf: &[u8]) -> usize {
    Document::load_mem(pdf).unwrap().get_pages().len()
}

// ── HTTP ─────────────────────────────────────────────────────────────────────

/// Serve `routes` (path → PNG bytes) over plain HTTP on 127.0.0.1 and return
/// the base URL. Unknown paths answer 404.
pub async fn serve_images(routes: Vec<(&'static str, Vec<u8>)>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = std::sync::Arc::new(routes);
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            let routes = routes.clone();
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
                let (status, body) = match routes.iter().find(|(p, _)| *p == path) {
                    Some((_, body)) => ("200 OK", body.clone()),
                    None => ("404 Not Found", b"not here".to_vec()),
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

/// HTTP client that ignores proxy settings, for talking to [`serve_images`].
pub fn direct_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

// ── Cover renderers ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeRenderer {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CoverRenderer for FakeRenderer {
    async fn render_cover(&self, _meta: &CoverMetadata) -> Result<Vec<u8>, Img2PdfError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(blank_cover())
    }
}

pub struct FailingRenderer;

#[async_trait]
impl CoverRenderer for FailingRenderer {
    async fn render_cover(&self, _meta: &CoverMetadata) -> Result<Vec<u8>, Img2PdfError> {
        Err(Img2PdfError::RenderFailed("browser crashed".into()))
    }
}

pub struct SlowRenderer(pub Duration);

#[async_trait]
impl CoverRenderer for SlowRenderer {
    async fn render_cover(&self, _meta: &CoverMetadata) -> Result<Vec<u8>, Img2PdfError> {
        tokio::time::sleep(self.0).await;
        Ok(blank_cover())
    }
}

// ── In-memory storage ────────────────────────────────────────────────────────

/// Storage fake with switchable failures.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_deletes: Mutex<HashSet<String>>,
    fail_list: AtomicBool,
    pub uploads: AtomicUsize,
}

impl MemoryStorage {
    pub fn with_objects(keys: &[&str]) -> Self {
        let s = Self::default();
        {
            let mut objects = s.objects.lock().unwrap();
            for k in keys {
                objects.insert(k.to_string(), b"x".to_vec());
            }
        }
        s
    }

    pub fn fail_delete_of(&self, key: &str) {
        self.fail_deletes.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_listing(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn upload(
        &self,
        bytes: Vec<u8>,
        key: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(format!("https://cdn.test/bucket/{key}"))
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.get(key).ok_or_else(|| StorageError::NotFound {
            key: key.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_deletes.lock().unwrap().contains(key) {
            return Err(StorageError::Backend {
                backend: "memory",
                message: format!("delete of {key} rejected"),
            });
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(StorageError::Backend {
                backend: "memory",
                message: "listing unavailable".into(),
            });
        }
        Ok(self
            .keys()
            .into_iter()
            .filter(|k| prefix.is_none_or(|p| k.starts_with(p)))
            .collect())
    }
}
