//! Module-specifier resolution as an explicit strategy chain.
//!
//! Scoped hooks (path aliases, interop shims) are pushed onto the chain
//! and popped with an explicit restore token; the chain is never mutated
//! in place behind the caller's back, so nested hooks compose and tear
//! down in reverse order.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::error::{PluginError, Result};

/// File extensions probed when a specifier omits one.
const RESOLVE_EXTENSIONS: &[&str] = &[".js", ".mjs", ".cjs", ".ts", ".mts", ".cts"];

/// One pure resolution strategy: `(request, origin) -> resolved path or none`.
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn resolve(&self, request: &str, origin: &Path) -> Option<PathBuf>;
}

/// Token restoring the chain to its state before a push.
#[derive(Debug)]
#[must_use = "dropping a restore token leaks the pushed strategy"]
pub struct RestoreToken(usize);

/// Ordered strategy chain. Later pushes take precedence.
pub struct ResolverChain {
    strategies: Vec<Arc<dyn ResolveStrategy>>,
}

impl ResolverChain {
    /// Chain with the default strategies: relative/absolute paths, then
    /// installed packages.
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Arc::new(PackageStrategy),
                Arc::new(RelativePathStrategy),
            ],
        }
    }

    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Push a strategy; the returned token restores the prior chain.
    pub fn push(&mut self, strategy: Arc<dyn ResolveStrategy>) -> RestoreToken {
        let token = RestoreToken(self.strategies.len());
        debug!(strategy = strategy.name(), "pushing resolver strategy");
        self.strategies.push(strategy);
        token
    }

    /// Restore the chain to the state captured by `token`.
    pub fn restore(&mut self, token: RestoreToken) {
        self.strategies.truncate(token.0);
    }

    /// Resolve `request` against `origin`, trying the most recently pushed
    /// strategy first.
    pub fn resolve(&self, request: &str, origin: &Path) -> Option<PathBuf> {
        self.strategies
            .iter()
            .rev()
            .find_map(|s| s.resolve(request, origin))
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Names of the active strategies, oldest first.
    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name().to_string()).collect()
    }
}

impl Default for ResolverChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Probe `path` as a file, with and without the known extensions.
fn resolve_as_file(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    let raw = path.to_string_lossy();
    for ext in RESOLVE_EXTENSIONS {
        let candidate = PathBuf::from(format!("{raw}{ext}"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Resolves `./`, `../`, and absolute specifiers against the origin
/// directory.
pub struct RelativePathStrategy;

impl ResolveStrategy for RelativePathStrategy {
    fn name(&self) -> &str {
        "relative-path"
    }

    fn resolve(&self, request: &str, origin: &Path) -> Option<PathBuf> {
        let path = Path::new(request);
        if path.is_absolute() {
            return resolve_as_file(path);
        }
        if request.starts_with("./") || request.starts_with("../") {
            return resolve_as_file(&origin.join(request));
        }
        None
    }
}

/// Resolves bare specifiers against `node_modules` directories, walking up
/// from the origin.
pub struct PackageStrategy;

#[derive(Debug, Deserialize)]
struct PackageMain {
    #[serde(default)]
    main: Option<String>,
}

impl ResolveStrategy for PackageStrategy {
    fn name(&self) -> &str {
        "package"
    }

    fn resolve(&self, request: &str, origin: &Path) -> Option<PathBuf> {
        if request.starts_with('.') || Path::new(request).is_absolute() {
            return None;
        }

        for ancestor in origin.ancestors() {
            let package_dir = ancestor.join("node_modules").join(request);
            let manifest = package_dir.join("package.json");

            if manifest.is_file() {
                let main = std::fs::read_to_string(&manifest)
                    .ok()
                    .and_then(|text| serde_json::from_str::<PackageMain>(&text).ok())
                    .and_then(|p| p.main);
                let entry = match main {
                    Some(main) => package_dir.join(main),
                    None => package_dir.join("index.js"),
                };
                if let Some(found) = resolve_as_file(&entry) {
                    return Some(found);
                }
            }

            if let Some(found) = resolve_as_file(&package_dir) {
                return Some(found);
            }
        }
        None
    }
}

/// Alias map sourced from a plugin's own project configuration
/// (`baseUrl` + `paths`).
#[derive(Debug)]
pub struct PathAliasStrategy {
    base: PathBuf,
    aliases: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AliasProjectConfig {
    #[serde(default)]
    compiler_options: AliasCompilerOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AliasCompilerOptions {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    paths: indexmap::IndexMap<String, Vec<String>>,
}

impl PathAliasStrategy {
    pub fn new(base: PathBuf, aliases: Vec<(String, Vec<String>)>) -> Self {
        Self { base, aliases }
    }

    /// Build the strategy from a project configuration file carrying
    /// `compilerOptions.baseUrl` and `compilerOptions.paths`.
    pub fn from_project_config(config_path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(config_path).map_err(|e| PluginError::AliasConfig {
                path: config_path.to_path_buf(),
                message: e.to_string(),
            })?;
        let config: AliasProjectConfig =
            serde_json::from_str(&text).map_err(|e| PluginError::AliasConfig {
                path: config_path.to_path_buf(),
                message: e.to_string(),
            })?;

        let config_dir = config_path.parent().unwrap_or(Path::new("."));
        let base = match &config.compiler_options.base_url {
            Some(base_url) => config_dir.join(base_url),
            None => config_dir.to_path_buf(),
        };

        Ok(Self::new(
            base,
            config.compiler_options.paths.into_iter().collect(),
        ))
    }

    /// Substitute `request` into an alias pattern, `*` matching any
    /// substring.
    fn expand(pattern: &str, target: &str, request: &str) -> Option<String> {
        match pattern.split_once('*') {
            Some((prefix, suffix)) => {
                let star = request
                    .strip_prefix(prefix)
                    .and_then(|rest| rest.strip_suffix(suffix))?;
                Some(target.replacen('*', star, 1))
            }
            None => (pattern == request).then(|| target.to_string()),
        }
    }
}

impl ResolveStrategy for PathAliasStrategy {
    fn name(&self) -> &str {
        "path-alias"
    }

    fn resolve(&self, request: &str, _origin: &Path) -> Option<PathBuf> {
        for (pattern, targets) in &self.aliases {
            for target in targets {
                if let Some(expanded) = Self::expand(pattern, target, request) {
                    if let Some(found) = resolve_as_file(&self.base.join(expanded)) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FixedStrategy {
        name: &'static str,
        target: PathBuf,
    }

    impl ResolveStrategy for FixedStrategy {
        fn name(&self) -> &str {
            self.name
        }

        fn resolve(&self, _request: &str, _origin: &Path) -> Option<PathBuf> {
            Some(self.target.clone())
        }
    }

    fn fixed(name: &'static str) -> Arc<dyn ResolveStrategy> {
        Arc::new(FixedStrategy {
            name,
            target: PathBuf::from(name),
        })
    }

    #[test]
    fn test_push_restore_round_trip() {
        let mut chain = ResolverChain::empty();
        let baseline = chain.push(fixed("a"));

        let token_b = chain.push(fixed("b"));
        let _token_c = chain.push(fixed("c"));
        assert_eq!(chain.strategy_names(), ["a", "b", "c"]);

        // Restoring to b's mark removes both b and c, leaving exactly a.
        chain.restore(token_b);
        assert_eq!(chain.strategy_names(), ["a"]);

        chain.restore(baseline);
        assert!(chain.is_empty());
    }

    #[test]
    fn test_pushed_strategy_takes_precedence() {
        let mut chain = ResolverChain::empty();
        let _a = chain.push(fixed("a"));
        let _b = chain.push(fixed("b"));

        let resolved = chain.resolve("anything", Path::new("/")).unwrap();
        assert_eq!(resolved, PathBuf::from("b"));
    }

    #[test]
    fn test_relative_path_strategy() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("transformer.ts"), "export default 1").unwrap();

        let strategy = RelativePathStrategy;
        let resolved = strategy.resolve("./transformer", dir.path()).unwrap();
        assert_eq!(resolved, dir.path().join("transformer.ts"));

        assert!(strategy.resolve("./absent", dir.path()).is_none());
        assert!(strategy.resolve("bare-package", dir.path()).is_none());
    }

    #[test]
    fn test_package_strategy_reads_main() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("node_modules/my-transformer");
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(
            pkg.join("package.json"),
            r#"{ "name": "my-transformer", "main": "dist/plugin.js" }"#,
        )
        .unwrap();
        std::fs::create_dir_all(pkg.join("dist")).unwrap();
        std::fs::write(pkg.join("dist/plugin.js"), "module.exports = 1;").unwrap();

        let nested_origin = dir.path().join("src/deep");
        std::fs::create_dir_all(&nested_origin).unwrap();

        let strategy = PackageStrategy;
        let resolved = strategy.resolve("my-transformer", &nested_origin).unwrap();
        assert_eq!(resolved, pkg.join("dist/plugin.js"));
    }

    #[test]
    fn test_alias_strategy_expands_star() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/lib")).unwrap();
        std::fs::write(dir.path().join("src/lib/util.ts"), "export {}").unwrap();

        let strategy = PathAliasStrategy::new(
            dir.path().to_path_buf(),
            vec![("@lib/*".to_string(), vec!["src/lib/*".to_string()])],
        );

        let resolved = strategy.resolve("@lib/util", dir.path()).unwrap();
        assert_eq!(resolved, dir.path().join("src/lib/util.ts"));
        assert!(strategy.resolve("@other/util", dir.path()).is_none());
    }

    #[test]
    fn test_alias_strategy_from_project_config() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/helper.ts"), "export {}").unwrap();
        std::fs::write(
            dir.path().join("tsconfig.json"),
            r#"{ "compilerOptions": { "baseUrl": ".", "paths": { "@helper": ["src/helper"] } } }"#,
        )
        .unwrap();

        let strategy =
            PathAliasStrategy::from_project_config(&dir.path().join("tsconfig.json")).unwrap();
        let resolved = strategy.resolve("@helper", dir.path()).unwrap();
        assert_eq!(resolved, dir.path().join("src/helper.ts"));
    }

    #[test]
    fn test_alias_config_errors_name_the_file() {
        let dir = TempDir::new().unwrap();
        let err =
            PathAliasStrategy::from_project_config(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, PluginError::AliasConfig { .. }));
    }
}
