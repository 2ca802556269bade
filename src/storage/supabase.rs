//! Managed storage REST backend (Supabase Storage API).
//!
//! | Operation | Request                                          |
//! |-----------|--------------------------------------------------|
//! | upload    | `POST   /storage/v1/object/<bucket>/<key>` (`x-upsert: true`) |
//! | read      | `GET    /storage/v1/object/<bucket>/<key>`       |
//! | delete    | `DELETE /storage/v1/object/<bucket>/<key>`       |
//! | list      | `POST   /storage/v1/object/list/<bucket>`        |
//!
//! All requests carry the service-role key as bearer token.

use super::{encode_segment, validate_key, StorageProvider};
use crate::config::SupabaseConfig;
use crate::error::StorageError;
use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const BACKEND: &str = "supabase";
const LIST_PAGE: usize = 1000;

pub struct SupabaseStorage {
    client: Client,
    base_url: String,
    service_role_key: String,
    bucket: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRequest<'a> {
    prefix: &'a str,
    search: &'a str,
    limit: usize,
    offset: usize,
    sort_by: SortBy,
}

#[derive(Serialize)]
struct SortBy {
    column: &'static str,
    order: &'static str,
}

#[derive(Deserialize)]
struct ListEntry {
    name: String,
    /// `null` for folder placeholders.
    id: Option<String>,
}

impl SupabaseStorage {
    pub fn new(config: &SupabaseConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| StorageError::backend(BACKEND, e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            service_role_key: config.service_role_key.clone(),
            bucket: config.bucket.clone(),
        })
    }

    /// `<url>/storage/v1/object/public/<bucket>/<key>`.
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            encode_segment(key)
        )
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            encode_segment(key)
        )
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.service_role_key)
            .header("apikey", &self.service_role_key)
    }
}

fn transport(e: reqwest::Error) -> StorageError {
    StorageError::backend(BACKEND, e.to_string())
}

/// Turn a non-success response into a [`StorageError`].
///
/// The API reports a missing object either as HTTP 404 or as HTTP 400 with
/// a `not_found` body.
async fn check(key: &str, resp: Response) -> Result<Response, StorageError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND
        || body.contains("not_found")
        || body.contains("Object not found")
    {
        return Err(StorageError::NotFound {
            key: key.to_string(),
        });
    }
    Err(StorageError::backend(
        BACKEND,
        format!("HTTP {status} for '{key}': {}", body.trim()),
    ))
}

#[async_trait]
impl StorageProvider for SupabaseStorage {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn upload(
        &self,
        bytes: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        validate_key(key)?;
        let len = bytes.len();
        let resp = self
            .authed(self.client.post(self.object_url(key)))
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(transport)?;
        check(key, resp).await?;
        debug!("supabase: uploaded {}/{} ({} bytes)", self.bucket, key, len);
        Ok(self.public_url(key))
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        let resp = self
            .authed(self.client.get(self.object_url(key)))
            .send()
            .await
            .map_err(transport)?;
        let resp = check(key, resp).await?;
        let bytes = resp.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let resp = self
            .authed(self.client.delete(self.object_url(key)))
            .send()
            .await
            .map_err(transport)?;
        check(key, resp).await?;
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let url = format!("{}/storage/v1/object/list/{}", self.base_url, self.bucket);
        let wanted = prefix.unwrap_or("");
        let mut keys = Vec::new();
        let mut offset = 0;

        loop {
            let body = ListRequest {
                prefix: "",
                search: wanted,
                limit: LIST_PAGE,
                offset,
                sort_by: SortBy {
                    column: "name",
                    order: "asc",
                },
            };
            let resp = self
                .authed(self.client.post(&url))
                .json(&body)
                .send()
                .await
                .map_err(transport)?;
            let resp = check(&self.bucket, resp).await?;
            let page: Vec<ListEntry> = resp.json().await.map_err(transport)?;
            let n = page.len();

            // `search` is a substring match; keep only true prefixes.
            keys.extend(
                page.into_iter()
                    .filter(|e| e.id.is_some() && e.name.starts_with(wanted))
                    .map(|e| e.name),
            );

            if n < LIST_PAGE {
                break;
            }
            offset += n;
        }

        keys.sort();
        Ok(keys)
    }
}
