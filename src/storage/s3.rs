//! S3-compatible backend (path-style requests, custom endpoint).
//!
//! Objects are written with their [`ObjectRole`](super::ObjectRole) as user
//! metadata (`role`) next to the key prefix.

use super::{encode_segment, validate_key, ObjectKey, PresignedUpload, StorageProvider};
use crate::config::S3Config;
use crate::error::StorageError;
use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::Method;
use std::time::Duration;
use tracing::debug;

/// Supabase's S3 gateway: `https://<project-ref>.storage.<host>/…`.
static RE_PROJECT_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https://([^/.]+)\.storage\.").unwrap());

const BACKEND: &str = "s3";

pub struct S3Storage {
    store: AmazonS3,
    endpoint: String,
    bucket: String,
}

impl S3Storage {
    pub fn new(config: &S3Config) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::new()
            .with_region(&config.region)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_virtual_hosted_style_request(false);
        if !config.endpoint.is_empty() {
            builder = builder
                .with_endpoint(&config.endpoint)
                .with_allow_http(config.endpoint.starts_with("http://"));
        }
        let store = builder
            .build()
            .map_err(|e| StorageError::backend(BACKEND, e.to_string()))?;

        Ok(Self {
            store,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
        })
    }

    /// Public URL for `key`.
    pub fn public_url(&self, key: &str) -> String {
        public_url(&self.endpoint, &self.bucket, key)
    }
}

fn public_url(endpoint: &str, bucket: &str, key: &str) -> String {
    let key = encode_segment(key);
    match RE_PROJECT_REF.captures(endpoint) {
        Some(caps) => format!(
            "https://{}.supabase.co/storage/v1/object/public/{bucket}/{key}",
            &caps[1]
        ),
        None => format!("{endpoint}/{bucket}/{key}"),
    }
}

fn map_err(key: &str, e: object_store::Error) -> StorageError {
    match e {
        object_store::Error::NotFound { .. } => StorageError::NotFound {
            key: key.to_string(),
        },
        other => StorageError::backend(BACKEND, other.to_string()),
    }
}

#[async_trait]
impl StorageProvider for S3Storage {
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
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        if let Some(parsed) = ObjectKey::parse(key) {
            attributes.insert(
                Attribute::Metadata("role".into()),
                parsed.role().as_str().into(),
            );
        }
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        let len = bytes.len();
        self.store
            .put_opts(&Path::from(key), PutPayload::from(bytes), opts)
            .await
            .map_err(|e| map_err(key, e))?;
        debug!("s3: put {}/{} ({} bytes)", self.bucket, key, len);
        Ok(self.public_url(key))
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        let result = self
            .store
            .get(&Path::from(key))
            .await
            .map_err(|e| map_err(key, e))?;
        let bytes = result.bytes().await.map_err(|e| map_err(key, e))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.store
            .delete(&Path::from(key))
            .await
            .map_err(|e| map_err(key, e))
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        // object_store prefixes match whole path segments, so filter by
        // string prefix here.
        let metas: Vec<_> = self
            .store
            .list(None)
            .try_collect()
            .await
            .map_err(|e| StorageError::backend(BACKEND, e.to_string()))?;

        let mut keys: Vec<String> = metas
            .into_iter()
            .map(|m| {
                percent_decode_str(m.location.as_ref())
                    .decode_utf8_lossy()
                    .into_owned()
            })
            .filter(|k| prefix.is_none_or(|p| k.starts_with(p)))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn presign_upload(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUpload, StorageError> {
        validate_key(key)?;
        let url = self
            .store
            .signed_url(Method::PUT, &Path::from(key), expires_in)
            .await
            .map_err(|e| map_err(key, e))?;
        debug!(
            "s3: presigned PUT for {}/{} ({}s)",
            self.bucket,
            key,
            expires_in.as_secs()
        );
        Ok(PresignedUpload {
            upload_url: url.to_string(),
            public_url: self.public_url(key),
        })
    }
}
