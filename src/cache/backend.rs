//! Cache tier implementations.

use super::expiry::{epoch_secs, Expiry};
use super::key::{hex_digest, CacheKey};
use crate::error::CacheError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

const METADATA_EXTENSION: &str = "metadata";
const TEMP_EXTENSION: &str = "tmp";

/// Encoded payload plus the metadata needed to judge its freshness.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub payload: Bytes,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(payload: impl Into<Bytes>, expiry: Expiry, now: DateTime<Utc>) -> Self {
        Self {
            payload: payload.into(),
            expires_at: expiry.expiration_instant_from(now),
            created_at: now,
        }
    }

    pub fn expiry(&self) -> Expiry {
        if self.expires_at == DateTime::<Utc>::MAX_UTC {
            Expiry::Never
        } else {
            Expiry::At(self.expires_at)
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;
    async fn store(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError>;
    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
    /// Drop every entry that expired before `now`; returns how many went.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CacheError>;
    async fn len(&self) -> Result<usize, CacheError>;
    fn name(&self) -> &'static str;
}

/// In-memory tier, bounded by entry count with least-recently-used eviction.
pub struct MemoryCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<CacheKey, CacheEntry>> {
        // A panic while holding the lock cannot leave the map half-written.
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.lock().get(key).cloned())
    }
    async fn store(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        self.lock().put(key.clone(), entry);
        Ok(())
    }
    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.lock().pop(key).is_some())
    }
    async fn clear(&self) -> Result<(), CacheError> {
        self.lock().clear();
        Ok(())
    }
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CacheError> {
        let mut entries = self.lock();
        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, e)| e.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &expired {
            entries.pop(k);
        }
        Ok(expired.len())
    }
    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.lock().len())
    }
    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Sidecar file describing a persisted payload. Times are epoch seconds.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryMetadata {
    expiry: f64,
    created_at: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
}

impl EntryMetadata {
    fn expires_at(&self) -> DateTime<Utc> {
        match Expiry::from_epoch_secs(self.expiry) {
            Expiry::At(at) => at,
            _ => DateTime::<Utc>::MAX_UTC,
        }
    }

    fn created_at(&self) -> DateTime<Utc> {
        match Expiry::from_epoch_secs(self.created_at) {
            Expiry::At(at) => at,
            _ => DateTime::<Utc>::MIN_UTC,
        }
    }
}

/// On-disk tier: one payload file and one `.metadata` file per key, both
/// named after the key's digest.
pub struct DiskCache {
    directory: PathBuf,
}

impl DiskCache {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub async fn ensure_dir(&self) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        Ok(())
    }

    fn payload_path(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(hex_digest(key.as_str()))
    }

    fn metadata_path(&self, key: &CacheKey) -> PathBuf {
        self.directory
            .join(format!("{}.{}", hex_digest(key.as_str()), METADATA_EXTENSION))
    }

    async fn read_metadata(path: &Path) -> Result<Option<EntryMetadata>, CacheError> {
        match tokio::fs::read(path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write via a temporary file so readers never observe a torn payload.
    async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(".{}.{}", uuid::Uuid::new_v4().simple(), TEMP_EXTENSION));
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn exists(path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    async fn remove_file(path: &Path) -> Result<bool, CacheError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_pair(&self, payload: &Path, metadata: &Path) -> Result<bool, CacheError> {
        let a = Self::remove_file(payload).await?;
        let b = Self::remove_file(metadata).await?;
        Ok(a || b)
    }
}

#[async_trait]
impl CacheBackend for DiskCache {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let Some(meta) = Self::read_metadata(&self.metadata_path(key)).await? else {
            return Ok(None);
        };
        let payload = match tokio::fs::read(self.payload_path(key)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(CacheEntry {
            payload: Bytes::from(payload),
            expires_at: meta.expires_at(),
            created_at: meta.created_at(),
        }))
    }

    async fn store(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        let meta = EntryMetadata {
            expiry: epoch_secs(entry.expires_at),
            created_at: epoch_secs(entry.created_at),
            key: Some(key.as_str().to_string()),
        };
        let meta_raw = serde_json::to_vec(&meta)?;
        Self::write_atomic(&self.payload_path(key), &entry.payload).await?;
        Self::write_atomic(&self.metadata_path(key), &meta_raw).await?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        self.remove_pair(&self.payload_path(key), &self.metadata_path(key))
            .await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut dir = match tokio::fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if item.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await?;
            } else {
                Self::remove_file(&path).await?;
            }
        }
        Ok(())
    }

    /// Also clears leftovers of interrupted writes: temporary files and
    /// payload or metadata files whose partner is missing. Must not run
    /// while a write is in flight.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CacheError> {
        let mut dir = match tokio::fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(TEMP_EXTENSION) => {
                    if Self::remove_file(&path).await? {
                        debug!(file = %path.display(), "removed leftover temp file");
                    }
                }
                Some(METADATA_EXTENSION) => {
                    let payload = path.with_extension("");
                    // Unreadable metadata means freshness is unknown; treat it as expired.
                    let expired = match Self::read_metadata(&path).await {
                        Ok(Some(meta)) => meta.expires_at() < now,
                        Ok(None) => false,
                        Err(_) => true,
                    };
                    if expired {
                        if self.remove_pair(&payload, &path).await? {
                            debug!(file = %payload.display(), "removed expired cache file");
                            removed += 1;
                        }
                    } else if !Self::exists(&payload).await && Self::remove_file(&path).await? {
                        debug!(file = %path.display(), "removed metadata without payload");
                    }
                }
                None => {
                    let metadata = path.with_extension(METADATA_EXTENSION);
                    if !Self::exists(&metadata).await && Self::remove_file(&path).await? {
                        debug!(file = %path.display(), "removed payload without metadata");
                    }
                }
                Some(_) => {}
            }
        }
        Ok(removed)
    }

    async fn len(&self) -> Result<usize, CacheError> {
        let mut dir = match tokio::fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut count = 0;
        while let Some(item) = dir.next_entry().await? {
            if item.path().extension().and_then(|e| e.to_str()) == Some(METADATA_EXTENSION) {
                count += 1;
            }
        }
        Ok(count)
    }

    fn name(&self) -> &'static str {
        "disk"
    }
}
