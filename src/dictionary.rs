//! Shared compression dictionary cache
//!
//! Captures are zstd-compressed against a project-wide dictionary published
//! by the coordinator. This module keeps one verified copy in memory, shared
//! by every in-flight batch, and re-validates it against the coordinator once
//! its validity window expires. The bytes are only re-downloaded when the
//! coordinator reports a new dictionary id.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{BatchError, Result};
use crate::utils::sha256_hex;

/// Leading bytes of a zstd frame. A downloaded blob starting with these is a
/// compressed envelope around the raw dictionary.
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Coordinator-published description of the current dictionary
#[derive(Clone, Debug, Deserialize)]
pub struct DictionaryDescriptor {
    /// Opaque identifier, compared against the cached copy
    pub id: String,
    /// Where the dictionary bytes live
    pub url: String,
    /// Hex SHA-256 of the bytes behind `url`, as downloaded
    pub sha256: String,
}

/// A fetched, verified compression dictionary
#[derive(Clone, Debug)]
pub struct Dictionary {
    /// Coordinator-assigned identifier, embedded in final artifact names
    pub id: String,
    /// Raw dictionary bytes, envelope-decompressed if the download was framed
    pub bytes: Vec<u8>,
}

/// Where dictionary descriptors and blobs come from
///
/// Implemented by the coordinator client. Tests substitute scripted sources.
#[async_trait]
pub trait DictionarySource: Send + Sync {
    /// Current dictionary descriptor for the configured project
    async fn dictionary_descriptor(&self) -> Result<DictionaryDescriptor>;

    /// Raw bytes behind a descriptor's `url`
    async fn fetch_dictionary_blob(&self, url: &str) -> Result<Vec<u8>>;
}

struct CachedEntry {
    dictionary: Arc<Dictionary>,
    fetched_at: Instant,
}

/// Process-wide dictionary cache
///
/// Refreshes are serialized behind an async mutex. Concurrent callers during
/// a refresh wait for the lock and then reuse the winner's entry, so a burst
/// of batches never downloads the dictionary more than once.
#[derive(Clone)]
pub struct DictionaryCache {
    entry: Arc<Mutex<Option<CachedEntry>>>,
    ttl: Duration,
}

impl DictionaryCache {
    /// Create an empty cache whose entries stay fresh for `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entry: Arc::new(Mutex::new(None)),
            ttl,
        }
    }

    /// Return the current dictionary, consulting the coordinator when the
    /// cached copy has aged out
    ///
    /// A stale entry whose id still matches the coordinator's descriptor is
    /// kept as-is with a renewed validity window. A changed id triggers a
    /// download of the new bytes, which must match the descriptor's SHA-256
    /// before they replace the cached entry.
    pub async fn get(&self, source: &dyn DictionarySource) -> Result<Arc<Dictionary>> {
        let mut entry = self.entry.lock().await;

        if let Some(cached) = entry.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&cached.dictionary));
            }
        }

        let descriptor = source.dictionary_descriptor().await?;

        if let Some(cached) = entry.as_mut() {
            if cached.dictionary.id == descriptor.id {
                debug!(id = %descriptor.id, "Cached dictionary still current");
                cached.fetched_at = Instant::now();
                return Ok(Arc::clone(&cached.dictionary));
            }
        }

        info!(id = %descriptor.id, "Downloading latest dictionary");
        let blob = source.fetch_dictionary_blob(&descriptor.url).await?;

        let actual = sha256_hex(&blob);
        if actual != descriptor.sha256 {
            return Err(BatchError::DictionaryMismatch {
                expected: descriptor.sha256,
                actual,
            }
            .into());
        }

        let bytes = if blob.starts_with(&ZSTD_MAGIC) {
            zstd::stream::decode_all(blob.as_slice())?
        } else {
            blob
        };

        let dictionary = Arc::new(Dictionary {
            id: descriptor.id,
            bytes,
        });
        *entry = Some(CachedEntry {
            dictionary: Arc::clone(&dictionary),
            fetched_at: Instant::now(),
        });

        Ok(dictionary)
    }

    /// Drop the cached entry so the next [`get`](Self::get) performs a full
    /// descriptor fetch and download
    pub async fn force_refresh(&self) {
        *self.entry.lock().await = None;
    }
}
