//! Production of live, patched compiler modules.
//!
//! The loader binds the patch engine to the compiler actually installed on
//! disk: resolve the package, verify its version, then reuse or produce a
//! patched artifact addressed by content. A live module is rebuilt, never
//! mutated in place, when its cache key changes.

use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::cache::{cache_disabled, CacheKey, PatchCache};
use super::error::Result;
use super::hash::hash_bytes;
use super::resolve::{check_version, resolve_compiler, ResolvedCompiler};
use crate::loader::LoaderError;
use crate::patch::{apply_rules, default_rules, PatchRule, PATCH_VERSION};

/// A patched compiler module loaded for this process.
#[derive(Debug, Clone)]
pub struct LiveModule {
    pub entry_path: PathBuf,
    pub compiler_name: String,
    pub compiler_version: String,
    pub patch_version: String,
    /// The patched source, executed in place of the original file.
    pub source: String,
    /// Digest of the cache key this module was built under.
    pub key_digest: String,
    /// Whether the patched source came from the persistent cache.
    pub from_cache: bool,
}

struct ProbedModule {
    resolved: ResolvedCompiler,
    module_name: String,
    entry_path: PathBuf,
    source: String,
    key: CacheKey,
}

/// Loader producing [`LiveModule`]s from an installed compiler package.
pub struct ModuleLoader {
    cache: PatchCache,
    rules: Vec<PatchRule>,
    skip_cache: bool,
}

impl ModuleLoader {
    /// Production loader: default rules, cache under the temp directory,
    /// cache bypass controlled by the environment.
    pub fn new() -> Self {
        Self {
            cache: PatchCache::in_temp_dir(),
            rules: default_rules(),
            skip_cache: cache_disabled(),
        }
    }

    /// Loader with explicit parts, for tests and embedders.
    pub fn with_parts(cache: PatchCache, rules: Vec<PatchRule>) -> Self {
        Self {
            cache,
            rules,
            skip_cache: false,
        }
    }

    pub fn set_skip_cache(&mut self, skip: bool) {
        self.skip_cache = skip;
    }

    fn probe(&self, compiler_dir: &Path, module_name: &str) -> Result<ProbedModule> {
        let resolved = resolve_compiler(compiler_dir)?;
        check_version(&resolved.version)?;

        let entry_path = resolved.lib_dir.join(module_name);
        let source =
            std::fs::read_to_string(&entry_path).map_err(|_| LoaderError::ModuleMissing {
                path: entry_path.clone(),
            })?;

        let canonical = entry_path
            .canonicalize()
            .unwrap_or_else(|_| entry_path.clone());
        let key = CacheKey {
            entry_path: canonical.to_string_lossy().into_owned(),
            source_hash: hash_bytes(source.as_bytes()),
            patch_version: PATCH_VERSION.to_string(),
        };

        Ok(ProbedModule {
            resolved,
            module_name: module_name.to_string(),
            entry_path,
            source,
            key,
        })
    }

    fn ensure_manifest(&mut self) -> Result<()> {
        if self.cache.manifest_loaded() {
            return Ok(());
        }
        if let Err(e) = self.cache.load_manifest() {
            warn!("patch cache manifest unusable ({e}); clearing cache");
            self.cache.clear()?;
            self.cache.load_manifest()?;
        }
        Ok(())
    }

    fn load_probed(&mut self, probed: ProbedModule) -> Result<LiveModule> {
        let digest = probed.key.digest();

        // An installation patched in place with the current version is
        // usable as-is; a stale in-place patch is not.
        if let Some(version) = crate::patch::is_patched(&probed.source) {
            if version == PATCH_VERSION {
                debug!(module = %probed.module_name, "module already patched in place");
                return Ok(LiveModule {
                    entry_path: probed.entry_path,
                    compiler_name: probed.resolved.name,
                    compiler_version: probed.resolved.version,
                    patch_version: version,
                    source: probed.source,
                    key_digest: digest,
                    from_cache: false,
                });
            }
            return Err(LoaderError::Patch(
                crate::patch::PatchError::AlreadyPatched {
                    file: probed.module_name,
                    version,
                },
            ));
        }

        if !self.skip_cache {
            self.ensure_manifest()?;
            if let Some(source) = self.cache.lookup(&probed.key)? {
                debug!(module = %probed.module_name, "patched artifact cache hit");
                return Ok(LiveModule {
                    entry_path: probed.entry_path,
                    compiler_name: probed.resolved.name,
                    compiler_version: probed.resolved.version,
                    patch_version: PATCH_VERSION.to_string(),
                    source,
                    key_digest: digest,
                    from_cache: true,
                });
            }
        }

        info!(
            module = %probed.module_name,
            compiler = %probed.resolved.version,
            "patching compiler module"
        );
        let patched = apply_rules(&probed.module_name, &probed.source, &self.rules)?;

        if !self.skip_cache {
            self.cache.store(&probed.key, &patched)?;
        }

        Ok(LiveModule {
            entry_path: probed.entry_path,
            compiler_name: probed.resolved.name,
            compiler_version: probed.resolved.version,
            patch_version: PATCH_VERSION.to_string(),
            source: patched,
            key_digest: digest,
            from_cache: false,
        })
    }

    /// Produce a patched module for `module_name` inside the compiler
    /// installation at `compiler_dir`.
    pub fn load(&mut self, compiler_dir: &Path, module_name: &str) -> Result<LiveModule> {
        let probed = self.probe(compiler_dir, module_name)?;
        self.load_probed(probed)
    }
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-process store of live modules, keyed by cache-key digest.
///
/// An identical key reuses the existing module; a changed key (new content
/// hash or patch version) builds a fresh one.
#[derive(Default)]
pub struct LiveModuleStore {
    modules: Mutex<FxHashMap<String, Arc<LiveModule>>>,
}

impl LiveModuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(
        &self,
        loader: &mut ModuleLoader,
        compiler_dir: &Path,
        module_name: &str,
    ) -> Result<Arc<LiveModule>> {
        let probed = loader.probe(compiler_dir, module_name)?;
        let digest = probed.key.digest();

        if let Some(module) = self.modules.lock().unwrap().get(&digest) {
            return Ok(module.clone());
        }

        let module = Arc::new(loader.load_probed(probed)?);
        self.modules
            .lock()
            .unwrap()
            .insert(digest, module.clone());
        Ok(module)
    }

    pub fn len(&self) -> usize {
        self.modules.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
