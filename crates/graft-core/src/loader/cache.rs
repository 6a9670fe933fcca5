//! Content-addressed persistence for patched compiler artifacts.
//!
//! Artifacts are keyed by (entry path, unpatched content hash, patch
//! runtime version). Writes go to a sibling temp file and are renamed into
//! place, so a concurrent reader never observes a partial artifact.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::error::CacheError;
use super::hash::hash_bytes;
use super::{CACHE_DIR_NAME, CACHE_VERSION, MANIFEST_FILE_NAME, SKIP_CACHE_ENV};

type Result<T> = std::result::Result<T, CacheError>;

/// Whether the environment requests bypassing cache lookup entirely.
pub fn cache_disabled() -> bool {
    std::env::var_os(SKIP_CACHE_ENV).is_some_and(|v| v != "0")
}

/// Cache key for one patched artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    /// Absolute path of the requested entry file.
    pub entry_path: String,
    /// Blake3 hash of the unpatched source.
    pub source_hash: String,
    /// Patch runtime version the artifact was produced with.
    pub patch_version: String,
}

impl CacheKey {
    /// Stable digest addressing the artifact on disk.
    pub fn digest(&self) -> String {
        let joined = format!(
            "{}\0{}\0{}",
            self.entry_path, self.source_hash, self.patch_version
        );
        hash_bytes(joined.as_bytes())
    }
}

/// Manifest entry for one persisted artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub entry_path: String,
    pub source_hash: String,
    pub patch_version: String,
    /// Hash of the persisted artifact, for integrity checking.
    pub artifact_hash: String,
    /// Timestamp when cached, for diagnostics.
    pub cached_at: u64,
}

/// On-disk cache manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    /// Key digest -> entry.
    pub entries: FxHashMap<String, CacheEntry>,
}

impl CacheManifest {
    pub fn new() -> Self {
        Self {
            version: CACHE_VERSION,
            entries: FxHashMap::default(),
        }
    }

    pub fn is_version_compatible(&self) -> bool {
        self.version == CACHE_VERSION
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(CacheError::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(CacheError::from)
    }
}

impl Default for CacheManifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Persistent store for patched artifacts.
pub struct PatchCache {
    cache_dir: PathBuf,
    artifacts_dir: PathBuf,
    manifest_path: PathBuf,
    manifest: Option<CacheManifest>,
}

impl PatchCache {
    /// Cache rooted at an explicit directory.
    pub fn new(cache_dir: PathBuf) -> Self {
        let artifacts_dir = cache_dir.join("artifacts");
        let manifest_path = cache_dir.join(MANIFEST_FILE_NAME);
        Self {
            cache_dir,
            artifacts_dir,
            manifest_path,
            manifest: None,
        }
    }

    /// Cache under the process temporary directory, namespaced by
    /// subsystem.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir().join(CACHE_DIR_NAME))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn manifest_loaded(&self) -> bool {
        self.manifest.is_some()
    }

    fn ensure_cache_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)?;
        std::fs::create_dir_all(&self.artifacts_dir)?;
        Ok(())
    }

    /// Load the manifest from disk, creating a fresh one when absent.
    ///
    /// Returns an error for a corrupted or incompatible manifest; the
    /// caller handles that by clearing the cache and retrying.
    pub fn load_manifest(&mut self) -> Result<()> {
        self.ensure_cache_dirs()?;

        if !self.manifest_path.exists() {
            self.manifest = Some(CacheManifest::new());
            return Ok(());
        }

        let bytes = std::fs::read(&self.manifest_path)?;
        let manifest = CacheManifest::from_bytes(&bytes)?;
        if !manifest.is_version_compatible() {
            warn!(
                "patch cache version mismatch: expected {}, found {}",
                CACHE_VERSION, manifest.version
            );
            return Err(CacheError::VersionMismatch {
                expected: CACHE_VERSION,
                found: manifest.version,
            });
        }

        self.manifest = Some(manifest);
        Ok(())
    }

    fn artifact_path(&self, digest: &str) -> PathBuf {
        self.artifacts_dir.join(format!("{digest}.js"))
    }

    /// Look up a patched artifact.
    ///
    /// A missing or corrupt artifact is purged and reported as a miss, so
    /// the caller re-patches exactly once before anything becomes fatal.
    pub fn lookup(&mut self, key: &CacheKey) -> Result<Option<String>> {
        let digest = key.digest();
        let manifest = self.manifest.as_mut().ok_or(CacheError::ManifestNotFound)?;

        let Some(entry) = manifest.entries.get(&digest) else {
            return Ok(None);
        };
        let expected_hash = entry.artifact_hash.clone();

        let artifact = self.artifact_path(&digest);
        let source = match std::fs::read_to_string(&artifact) {
            Ok(source) => source,
            Err(e) => {
                warn!("patched artifact unreadable at {:?}: {}", artifact, e);
                self.purge(key)?;
                return Ok(None);
            }
        };

        if hash_bytes(source.as_bytes()) != expected_hash {
            warn!("patched artifact failed integrity check: {:?}", artifact);
            self.purge(key)?;
            return Ok(None);
        }

        Ok(Some(source))
    }

    /// Persist a patched artifact atomically and record it in the manifest.
    pub fn store(&mut self, key: &CacheKey, patched: &str) -> Result<()> {
        self.ensure_cache_dirs()?;

        let digest = key.digest();
        let artifact = self.artifact_path(&digest);
        write_atomic(&artifact, patched.as_bytes())?;

        let entry = CacheEntry {
            entry_path: key.entry_path.clone(),
            source_hash: key.source_hash.clone(),
            patch_version: key.patch_version.clone(),
            artifact_hash: hash_bytes(patched.as_bytes()),
            cached_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };

        let manifest = self.manifest.as_mut().ok_or(CacheError::ManifestNotFound)?;
        manifest.entries.insert(digest, entry);
        self.save_manifest()
    }

    /// Drop one entry and its artifact.
    pub fn purge(&mut self, key: &CacheKey) -> Result<()> {
        let digest = key.digest();
        if let Some(manifest) = self.manifest.as_mut() {
            manifest.entries.remove(&digest);
        }
        let artifact = self.artifact_path(&digest);
        if artifact.exists() {
            std::fs::remove_file(&artifact)?;
        }
        self.save_manifest()
    }

    /// Persist the manifest atomically.
    pub fn save_manifest(&self) -> Result<()> {
        let manifest = self.manifest.as_ref().ok_or(CacheError::ManifestNotFound)?;
        write_atomic(&self.manifest_path, &manifest.to_bytes()?)
    }

    /// Remove the entire cache directory and start fresh.
    pub fn clear(&mut self) -> Result<()> {
        if self.cache_dir.exists() {
            std::fs::remove_dir_all(&self.cache_dir)?;
        }
        self.manifest = Some(CacheManifest::new());
        self.ensure_cache_dirs()?;
        info!("patch cache cleared");
        Ok(())
    }
}

/// Write via a sibling temp file and rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
