//! Cache of compiled specializations, kept as bitcode.
//!
//! Machine code is never cached: a hit is rebuilt through
//! [`CompiledFunction::deserialize`], so globals are re-linked against the
//! current process.

pub mod key;
pub mod metadata;

pub use key::SpecializationKey;
pub use metadata::CacheMetadata;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};
use tunejit_symbol::SymbolTracker;

use crate::error::JitError;
use crate::function::CompiledFunction;

#[derive(Debug, Clone)]
struct CachedBitcode {
    metadata: CacheMetadata,
    bytes: Arc<[u8]>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub disk_loads: u64,
}

/// In-memory bitcode cache, optionally mirrored to a directory as
/// `<key>.bc` plus a `<key>.json` metadata sidecar.
pub struct BitcodeCache {
    entries: RwLock<AHashMap<SpecializationKey, CachedBitcode>>,
    directory: Option<PathBuf>,
    stats: RwLock<CacheStats>,
}

impl Default for BitcodeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BitcodeCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(AHashMap::new()),
            directory: None,
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// A cache that also persists entries under `directory`, creating it if
    /// needed.
    pub fn with_directory(directory: impl Into<PathBuf>) -> Result<Self, JitError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|source| JitError::Write {
            path: directory.clone(),
            source,
        })?;
        Ok(Self {
            directory: Some(directory),
            ..Self::new()
        })
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Serialize `function` and remember it under `key`.
    pub fn store(
        &self,
        key: SpecializationKey,
        function: &CompiledFunction,
    ) -> Result<CacheMetadata, JitError> {
        let bytes: Arc<[u8]> = function.serialize().into();
        let metadata = CacheMetadata::new(&key, bytes.len());

        if let Some(directory) = &self.directory {
            let stem = key.file_stem();
            write_file(&directory.join(format!("{stem}.bc")), &bytes)?;
            let sidecar = serde_json::to_vec_pretty(&metadata)?;
            write_file(&directory.join(format!("{stem}.json")), &sidecar)?;
        }

        debug!(
            function = %key.function_name,
            key = %key.digest(),
            size = metadata.size,
            "cached specialization"
        );
        self.entries.write().insert(
            key,
            CachedBitcode {
                metadata: metadata.clone(),
                bytes,
            },
        );
        self.stats.write().stores += 1;
        Ok(metadata)
    }

    /// Rebuild the specialization stored under `key`, if any.
    pub fn load(
        &self,
        key: &SpecializationKey,
        tracker: &SymbolTracker,
    ) -> Result<Option<CompiledFunction>, JitError> {
        let Some(bytes) = self.fetch(key)? else {
            return Ok(None);
        };
        let function = CompiledFunction::deserialize(&bytes, tracker)?;
        if function.is_none() {
            warn!(function = %key.function_name, "cached bitcode could not be rebuilt");
        }
        Ok(function)
    }

    /// The bitcode stored under `key`, checking the directory on a memory
    /// miss. Counts towards the hit and miss statistics.
    pub fn fetch(&self, key: &SpecializationKey) -> Result<Option<Arc<[u8]>>, JitError> {
        let bytes = self.lookup(key)?;
        let mut stats = self.stats.write();
        if bytes.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        Ok(bytes)
    }

    pub fn metadata(&self, key: &SpecializationKey) -> Option<CacheMetadata> {
        self.entries
            .read()
            .get(key)
            .map(|entry| entry.metadata.clone())
    }

    pub fn contains(&self, key: &SpecializationKey) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn get_stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    fn lookup(&self, key: &SpecializationKey) -> Result<Option<Arc<[u8]>>, JitError> {
        if let Some(entry) = self.entries.read().get(key) {
            return Ok(Some(Arc::clone(&entry.bytes)));
        }
        let Some(directory) = &self.directory else {
            return Ok(None);
        };

        let stem = key.file_stem();
        let Some(sidecar) = read_file(&directory.join(format!("{stem}.json")))? else {
            return Ok(None);
        };
        let metadata: CacheMetadata = serde_json::from_slice(&sidecar)?;
        if !metadata.is_valid(key) {
            warn!(function = %key.function_name, "stale cache entry ignored");
            return Ok(None);
        }
        let Some(bytes) = read_file(&directory.join(format!("{stem}.bc")))? else {
            return Ok(None);
        };

        let bytes: Arc<[u8]> = bytes.into();
        self.entries.write().insert(
            key.clone(),
            CachedBitcode {
                metadata,
                bytes: Arc::clone(&bytes),
            },
        );
        self.stats.write().disk_loads += 1;
        Ok(Some(bytes))
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), JitError> {
    fs::write(path, bytes).map_err(|source| JitError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn read_file(path: &Path) -> Result<Option<Vec<u8>>, JitError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(JitError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}
