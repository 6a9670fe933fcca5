//! Plugin module loading.
//!
//! Loading is a seam: embedders register in-process modules with the
//! [`RegistryLoader`], and interop loaders for source-form plugins are
//! pushed scoped onto the [`LoaderStack`] exactly like resolver hooks.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::dispatch::PluginEntry;
use super::error::{PluginError, Result};

/// Export name used when a descriptor does not name one.
pub const DEFAULT_EXPORT: &str = "default";

/// Extensions marking a plugin authored in a source form that needs
/// on-the-fly compilation before it can be loaded.
const TRANSPILE_EXTENSIONS: &[&str] = &["ts", "mts", "cts", "tsx"];

pub fn requires_transpile(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| TRANSPILE_EXTENSIONS.contains(&ext))
}

/// A loaded plugin module: named exports in declaration order.
#[derive(Default)]
pub struct PluginModule {
    exports: IndexMap<String, Arc<PluginEntry>>,
}

impl PluginModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Module with a single default export.
    pub fn with_default(entry: PluginEntry) -> Self {
        let mut module = Self::new();
        module.insert(DEFAULT_EXPORT, entry);
        module
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: PluginEntry) {
        self.exports.insert(name.into(), Arc::new(entry));
    }

    /// Select a named export; `None` selects the default export.
    pub fn export(&self, name: Option<&str>) -> Option<Arc<PluginEntry>> {
        self.exports.get(name.unwrap_or(DEFAULT_EXPORT)).cloned()
    }

    pub fn export_names(&self) -> Vec<&str> {
        self.exports.keys().map(|k| k.as_str()).collect()
    }
}

/// Loads a resolved plugin module file.
pub trait PluginModuleLoader: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this loader can execute the module at `path` directly.
    fn can_load(&self, path: &Path) -> bool;

    fn load(&self, path: &Path) -> Result<Arc<PluginModule>>;
}

/// In-process module registry.
///
/// Embedders register the plugin modules available to this process; the
/// registry then stands in for the host language's module system.
#[derive(Default)]
pub struct RegistryLoader {
    modules: Mutex<FxHashMap<PathBuf, Arc<PluginModule>>>,
}

impl RegistryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: impl Into<PathBuf>, module: PluginModule) {
        self.modules
            .lock()
            .unwrap()
            .insert(path.into(), Arc::new(module));
    }
}

impl PluginModuleLoader for RegistryLoader {
    fn name(&self) -> &str {
        "registry"
    }

    fn can_load(&self, path: &Path) -> bool {
        self.modules.lock().unwrap().contains_key(path)
    }

    fn load(&self, path: &Path) -> Result<Arc<PluginModule>> {
        self.modules
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| PluginError::Load {
                plugin: path.display().to_string(),
                message: "module not registered".to_string(),
            })
    }
}

/// Token restoring the loader stack to its state before a push.
#[derive(Debug)]
#[must_use = "dropping a restore token leaks the pushed loader"]
pub struct LoaderToken(usize);

/// Stack of module loaders; later pushes take precedence.
#[derive(Default)]
pub struct LoaderStack {
    loaders: Vec<Arc<dyn PluginModuleLoader>>,
}

impl LoaderStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, loader: Arc<dyn PluginModuleLoader>) -> LoaderToken {
        let token = LoaderToken(self.loaders.len());
        self.loaders.push(loader);
        token
    }

    pub fn restore(&mut self, token: LoaderToken) {
        self.loaders.truncate(token.0);
    }

    /// Most recently pushed loader accepting `path`.
    pub fn loader_for(&self, path: &Path) -> Option<Arc<dyn PluginModuleLoader>> {
        self.loaders
            .iter()
            .rev()
            .find(|l| l.can_load(path))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}
