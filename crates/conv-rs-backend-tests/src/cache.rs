//! Memoization of generated reference data.
//!
//! The harness receives a cache as `Option<Arc<dyn ReferenceCache>>`; there is no process-wide
//! cache. Keys carry everything that determines the data, and the fingerprint used for file
//! names and RNG seeding is derived from the full key.

use std::fs;
use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use conv_rs::hashing::hash_serializable;
use conv_rs::{ConvError, ConvResult, ConvWorkload, DType, Shape, Tensor};
use lru::LruCache;
use serde::{Deserialize, Serialize};

pub const MEMORY_CACHE_CAPACITY: usize = 64;

/// Identity of one reference data set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub test_id: String,
    pub workload: ConvWorkload,
    pub input_shape: Shape,
    pub weight_shape: Shape,
    pub dtype: DType,
}

impl CacheKey {
    pub fn new(test_id: impl Into<String>, workload: ConvWorkload) -> Self {
        Self {
            test_id: test_id.into(),
            workload,
            input_shape: workload.input_shape(),
            weight_shape: workload.weight_shape(),
            dtype: DType::F32,
        }
    }

    pub fn fingerprint(&self) -> ConvResult<u64> {
        hash_serializable(self)
            .map_err(|err| ConvError::cache(format!("failed to fingerprint cache key: {err}")))
    }
}

/// Inputs and expected outputs for one workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub input: Tensor,
    /// Undilated OIHW weight, as bound to compiled kernels.
    pub weight: Tensor,
    pub expected: Tensor,
    pub expected_relu: Tensor,
}

impl ReferenceData {
    fn is_consistent(&self) -> bool {
        [&self.input, &self.weight, &self.expected, &self.expected_relu]
            .iter()
            .all(|t| t.len() == t.shape().num_elements())
    }
}

pub trait ReferenceCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> ConvResult<Option<Arc<ReferenceData>>>;

    fn put(&self, key: &CacheKey, data: Arc<ReferenceData>) -> ConvResult<()>;
}

/// Bounded in-process cache.
pub struct MemoryCache {
    entries: Mutex<LruCache<CacheKey, Arc<ReferenceData>>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<CacheKey, Arc<ReferenceData>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(MEMORY_CACHE_CAPACITY)
    }
}

impl ReferenceCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> ConvResult<Option<Arc<ReferenceData>>> {
        Ok(self.lock().get(key).cloned())
    }

    fn put(&self, key: &CacheKey, data: Arc<ReferenceData>) -> ConvResult<()> {
        self.lock().put(key.clone(), data);
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct DiskEntry {
    key: CacheKey,
    data: ReferenceData,
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One bincode file per key under a directory, surviving across runs.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    /// Creates the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> ConvResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| {
            ConvError::cache(format!("failed to create cache dir {}: {err}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, key: &CacheKey) -> ConvResult<PathBuf> {
        Ok(self.dir.join(format!("{:016x}.bin", key.fingerprint()?)))
    }
}

impl ReferenceCache for DiskCache {
    fn get(&self, key: &CacheKey) -> ConvResult<Option<Arc<ReferenceData>>> {
        let path = self.entry_path(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ConvError::cache(format!(
                    "failed to read {}: {err}",
                    path.display()
                )))
            }
        };
        let entry: DiskEntry = match bincode::deserialize(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable cache entry");
                return Ok(None);
            }
        };
        if entry.key != *key || !entry.data.is_consistent() {
            tracing::warn!(path = %path.display(), "cache entry belongs to a different key");
            return Ok(None);
        }
        Ok(Some(Arc::new(entry.data)))
    }

    fn put(&self, key: &CacheKey, data: Arc<ReferenceData>) -> ConvResult<()> {
        let path = self.entry_path(key)?;
        let entry = DiskEntry {
            key: key.clone(),
            data: ReferenceData::clone(&data),
        };
        let bytes = bincode::serialize(&entry)
            .map_err(|err| ConvError::cache(format!("failed to encode cache entry: {err}")))?;

        let tmp = path.with_extension(format!(
            "tmp-{}-{}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, &bytes)
            .and_then(|()| fs::rename(&tmp, &path))
            .map_err(|err| {
                let _ = fs::remove_file(&tmp);
                ConvError::cache(format!("failed to write {}: {err}", path.display()))
            })
    }
}
