//! Cleanup coordinator: removes staged sources, delivered artifacts, or
//! everything.
//!
//! All bulk operations are best-effort. A failed delete is logged and
//! counted, never propagated, and never changes the outcome of the job that
//! triggered it. Only a failed listing aborts a wipe, since nothing can be
//! deleted without it.
//!
//! | Operation            | Deletes                        | Typical trigger       |
//! |----------------------|--------------------------------|-----------------------|
//! | [`Cleanup::cleanup_sources`]  | given `img-` URLs     | after a staged job    |
//! | [`Cleanup::cleanup_artifact`] | one `pdf-` URL        | client after download |
//! | [`Cleanup::sweep`] `Sources`  | every `img-` object   | scheduled hygiene     |
//! | [`Cleanup::sweep`] `Everything` | every object        | emergency wipe        |

use crate::error::{CleanupError, StorageError};
use crate::storage::{key_from_url, ObjectKey, ObjectRole, SharedStorage};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const DEFAULT_CONCURRENCY: usize = 16;

/// Result of [`Cleanup::cleanup_sources`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub requested: usize,
    pub deleted: usize,
    /// URLs refused because they do not name a source object.
    pub rejected: usize,
    /// Deletes the backend reported as failed.
    pub failed: usize,
}

/// Result of a bulk wipe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WipeReport {
    pub listed: usize,
    pub deleted_count: usize,
    pub error_count: usize,
}

/// Which objects a [`Cleanup::sweep`] removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepScope {
    /// Staged source images only (`img-` prefix).
    Sources,
    /// Every object in the bucket, artifacts included.
    Everything,
}

impl SweepScope {
    fn prefix(self) -> Option<&'static str> {
        match self {
            SweepScope::Sources => Some(ObjectRole::Source.prefix()),
            SweepScope::Everything => None,
        }
    }
}

/// Deletes objects through a shared storage provider.
#[derive(Clone)]
pub struct Cleanup {
    storage: SharedStorage,
    concurrency: usize,
}

impl Cleanup {
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Delete the staged source objects behind `urls`.
    ///
    /// URLs that do not resolve to an `img-` key are rejected without any
    /// storage call.
    pub async fn cleanup_sources(&self, urls: &[String]) -> CleanupReport {
        let mut report = CleanupReport {
            requested: urls.len(),
            ..Default::default()
        };

        let mut keys = Vec::with_capacity(urls.len());
        for url in urls {
            match ObjectKey::from_url(url) {
                Some(key) if key.role() == ObjectRole::Source => keys.push(key),
                _ => {
                    warn!("Cleanup: refusing non-source URL {}", url);
                    report.rejected += 1;
                }
            }
        }

        let (deleted, failed) = self
            .delete_all(keys.into_iter().map(ObjectKey::into_string).collect())
            .await;
        report.deleted = deleted;
        report.failed = failed;
        info!(
            "Cleanup: {} source object(s) deleted, {} rejected, {} failed",
            report.deleted, report.rejected, report.failed
        );
        report
    }

    /// Delete one artifact. Anything other than a `pdf-` key is refused.
    ///
    /// Returns the deleted key.
    pub async fn cleanup_artifact(&self, url: &str) -> Result<String, CleanupError> {
        let raw = key_from_url(url).ok_or_else(|| CleanupError::InvalidUrl(url.to_string()))?;
        let key = ObjectKey::parse(&raw)
            .filter(|k| k.role() == ObjectRole::Artifact)
            .ok_or(CleanupError::WrongRole {
                key: raw,
                expected: ObjectRole::Artifact.as_str(),
            })?;
        self.storage.delete(key.as_str()).await?;
        info!("Cleanup: artifact {} deleted", key);
        Ok(key.into_string())
    }

    /// List every key under `prefix` (all keys when `None`) and delete them.
    pub async fn wipe_all(&self, prefix: Option<&str>) -> Result<WipeReport, StorageError> {
        let keys = self.storage.list(prefix).await?;
        let listed = keys.len();
        debug!("Wipe: {} object(s) listed under {:?}", listed, prefix);

        let (deleted_count, error_count) = self.delete_all(keys).await;
        info!(
            "Wipe complete: {}/{} deleted, {} error(s)",
            deleted_count, listed, error_count
        );
        Ok(WipeReport {
            listed,
            deleted_count,
            error_count,
        })
    }

    pub async fn sweep(&self, scope: SweepScope) -> Result<WipeReport, StorageError> {
        info!("Sweep started: {:?}", scope);
        self.wipe_all(scope.prefix()).await
    }

    /// Delete concurrently; returns `(deleted, failed)`.
    async fn delete_all(&self, keys: Vec<String>) -> (usize, usize) {
        let results: Vec<bool> = stream::iter(keys.into_iter().map(|key| {
            let storage = self.storage.clone();
            async move {
                match storage.delete(&key).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Failed to delete {}: {}", key, e);
                        false
                    }
                }
            }
        }))
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        let deleted = results.iter().filter(|ok| **ok).count();
        (deleted, results.len() - deleted)
    }
}

/// Gate for externally triggered sweeps.
///
/// With no secret configured every caller is allowed; otherwise `provided`
/// must match exactly.
pub fn authorize_trigger(expected: Option<&str>, provided: Option<&str>) -> bool {
    match expected.filter(|s| !s.is_empty()) {
        None => true,
        Some(secret) => provided == Some(secret),
    }
}
