//! Resolution, dispatch, and composition of the plugin descriptor list.
//!
//! Descriptors are processed strictly in declared order: later descriptors'
//! alias and interop hooks are stack-scoped relative to earlier ones, and
//! the whole-program chain has a hard data dependency between links. Every
//! failure aborts the compilation naming the offending descriptor; there is
//! no partial plugin application.

use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::dispatch::{
    dispatch, Dispatched, DispatchContext, PluginExtras, ProgramTransformerFn,
};
use super::error::{PluginError, Result};
use super::loader::{
    requires_transpile, LoaderStack, LoaderToken, PluginModuleLoader, DEFAULT_EXPORT,
};
use super::resolver::{
    PathAliasStrategy, ResolveStrategy, ResolverChain, RestoreToken,
};
use crate::config::PluginConfig;
use crate::diagnostics::{DiagnosticsAccessor, DiagnosticsTable};
use crate::program::{
    CompilerHost, NodeTransformer, Program, TransformContext, TransformerResult, TransformerSet,
};

/// One link of the whole-program transform chain.
pub struct ProgramChainLink {
    pub plugin: String,
    pub transformer: Arc<ProgramTransformerFn>,
    pub options: Value,
}

/// Output of resolving a descriptor list: the composed transformer buckets
/// and the ordered whole-program chain.
pub struct ResolvedPlugins {
    pub transformers: TransformerSet,
    pub program_chain: Vec<ProgramChainLink>,
}

impl std::fmt::Debug for ResolvedPlugins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedPlugins")
            .field("before", &self.transformers.before.len())
            .field("after", &self.transformers.after.len())
            .field(
                "after_declarations",
                &self.transformers.after_declarations.len(),
            )
            .field("program_chain", &self.program_chain.len())
            .finish()
    }
}

/// Optional capability producing an alias-resolution strategy from a
/// plugin's own project configuration.
pub trait AliasCapability: Send + Sync {
    fn strategy(&self, config_path: &Path) -> Result<Arc<dyn ResolveStrategy>>;
}

/// Default alias capability reading `compilerOptions.baseUrl`/`paths`.
pub struct ProjectAliasCapability;

impl AliasCapability for ProjectAliasCapability {
    fn strategy(&self, config_path: &Path) -> Result<Arc<dyn ResolveStrategy>> {
        Ok(Arc::new(PathAliasStrategy::from_project_config(
            config_path,
        )?))
    }
}

/// The runtime resolver/dispatcher/composer for user plugins.
pub struct Orchestrator {
    resolver: ResolverChain,
    loaders: LoaderStack,
    transpile_loader: Option<Arc<dyn PluginModuleLoader>>,
    alias: Option<Arc<dyn AliasCapability>>,
    diagnostics: Arc<DiagnosticsTable>,
    compiler_version: String,
}

impl Orchestrator {
    pub fn new(compiler_version: impl Into<String>) -> Self {
        Self {
            resolver: ResolverChain::new(),
            loaders: LoaderStack::new(),
            transpile_loader: None,
            alias: Some(Arc::new(ProjectAliasCapability)),
            diagnostics: Arc::new(DiagnosticsTable::new()),
            compiler_version: compiler_version.into(),
        }
    }

    /// Install a base module loader.
    pub fn with_loader(mut self, loader: Arc<dyn PluginModuleLoader>) -> Self {
        let _ = self.loaders.push(loader);
        self
    }

    /// Install the on-the-fly compilation capability for source-form
    /// plugins.
    pub fn with_transpiler(mut self, loader: Arc<dyn PluginModuleLoader>) -> Self {
        self.transpile_loader = Some(loader);
        self
    }

    pub fn with_alias_capability(mut self, capability: Arc<dyn AliasCapability>) -> Self {
        self.alias = Some(capability);
        self
    }

    /// Drop the alias capability; descriptors requesting alias resolution
    /// then fail with a configuration error naming it.
    pub fn without_alias_capability(mut self) -> Self {
        self.alias = None;
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverChain) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn diagnostics(&self) -> &Arc<DiagnosticsTable> {
        &self.diagnostics
    }

    /// Extras handed to plugins for `program`: active compiler instance
    /// plus diagnostics accessors bound to that program.
    pub fn extras_for(&self, program: &Program) -> PluginExtras {
        PluginExtras::new(
            self.compiler_version.clone(),
            DiagnosticsAccessor::new(self.diagnostics.clone(), program.id()),
        )
    }

    /// Resolve an ordered descriptor list into transformer buckets and the
    /// whole-program chain.
    pub fn resolve_plugins(
        &mut self,
        configs: &[PluginConfig],
        project_dir: &Path,
        program: &Program,
    ) -> Result<ResolvedPlugins> {
        let transform_context = TransformContext::new(program.options().clone());
        let extras = self.extras_for(program);

        let mut set = TransformerSet::default();
        let mut chain = Vec::new();
        let mut resolver_tokens: Vec<RestoreToken> = Vec::new();
        let mut loader_tokens: Vec<LoaderToken> = Vec::new();

        let mut outcome = Ok(());
        for config in configs {
            if let Err(e) = self.resolve_one(
                config,
                project_dir,
                program,
                &transform_context,
                &extras,
                &mut set,
                &mut chain,
                &mut resolver_tokens,
                &mut loader_tokens,
            ) {
                outcome = Err(e);
                break;
            }
        }

        // Hooks tear down in reverse push order, error or not.
        for token in loader_tokens.into_iter().rev() {
            self.loaders.restore(token);
        }
        for token in resolver_tokens.into_iter().rev() {
            self.resolver.restore(token);
        }

        outcome?;
        Ok(ResolvedPlugins {
            transformers: set,
            program_chain: chain,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_one(
        &mut self,
        config: &PluginConfig,
        project_dir: &Path,
        program: &Program,
        transform_context: &TransformContext,
        extras: &PluginExtras,
        set: &mut TransformerSet,
        chain: &mut Vec<ProgramChainLink>,
        resolver_tokens: &mut Vec<RestoreToken>,
        loader_tokens: &mut Vec<LoaderToken>,
    ) -> Result<()> {
        let plugin = config.display_name().to_string();
        let specifier = config
            .transform
            .as_deref()
            .ok_or_else(|| PluginError::MissingSpecifier {
                plugin: plugin.clone(),
            })?;

        let path = self
            .resolver
            .resolve(specifier, project_dir)
            .ok_or_else(|| PluginError::Unresolvable {
                plugin: plugin.clone(),
                specifier: specifier.to_string(),
            })?;
        debug!(plugin = %plugin, path = %path.display(), "resolved plugin module");

        let loader = match self.loaders.loader_for(&path) {
            Some(loader) => loader,
            None if requires_transpile(&path) => {
                let transpiler =
                    self.transpile_loader
                        .clone()
                        .ok_or_else(|| PluginError::MissingCapability {
                            plugin: plugin.clone(),
                            capability: "transpile".to_string(),
                        })?;
                loader_tokens.push(self.loaders.push(transpiler.clone()));
                transpiler
            }
            None => {
                return Err(PluginError::Unloadable { plugin, path });
            }
        };

        if config.resolve_path_aliases {
            let capability =
                self.alias
                    .clone()
                    .ok_or_else(|| PluginError::MissingCapability {
                        plugin: plugin.clone(),
                        capability: "path-alias-resolution".to_string(),
                    })?;
            let config_path = match &config.ts_config {
                Some(ts_config) => project_dir.join(ts_config),
                None => path.parent().unwrap_or(project_dir).join("tsconfig.json"),
            };
            resolver_tokens.push(self.resolver.push(capability.strategy(&config_path)?));
        }

        let module = loader.load(&path)?;
        let entry = module
            .export(config.import.as_deref())
            .ok_or_else(|| PluginError::UnknownExport {
                plugin: plugin.clone(),
                export: config
                    .import
                    .as_deref()
                    .unwrap_or(DEFAULT_EXPORT)
                    .to_string(),
            })?;

        let ctx = DispatchContext {
            program,
            transform_context,
            extras,
        };

        match dispatch(config, &entry, &ctx)? {
            Dispatched::ProgramLink(transformer) => chain.push(ProgramChainLink {
                plugin,
                transformer,
                options: config.options_value(),
            }),
            Dispatched::Node(transformer) => route_primary(set, config, transformer),
            Dispatched::Result(TransformerResult::Factory(factory)) => {
                route_primary(set, config, factory(transform_context));
            }
            Dispatched::Result(TransformerResult::Plugin(plugin_result))
            | Dispatched::Plugin(plugin_result) => {
                // Placement flags route the primary factory only; the
                // object's own `after`/`afterDeclarations` members are
                // always additive.
                if let Some(before) = plugin_result.before {
                    route_primary(set, config, before(transform_context));
                }
                if let Some(after) = plugin_result.after {
                    set.after.push(after(transform_context));
                }
                if let Some(after_declarations) = plugin_result.after_declarations {
                    set.after_declarations.push(after_declarations(transform_context));
                }
            }
        }

        Ok(())
    }

    /// Run the whole-program chain: link *n* receives the program produced
    /// by link *n-1*, and the final output becomes the program for every
    /// later pipeline stage.
    pub fn apply_program_chain(
        &self,
        chain: &[ProgramChainLink],
        program: Program,
        host: Option<&dyn CompilerHost>,
    ) -> Result<Program> {
        let mut current = program;
        for link in chain {
            let extras = self.extras_for(&current);
            current = (link.transformer)(current, host, &link.options, &extras).map_err(
                |source| PluginError::Factory {
                    plugin: link.plugin.clone(),
                    source,
                },
            )?;
        }
        Ok(current)
    }
}

/// Route a produced transformer into the bucket the descriptor's placement
/// flags select.
fn route_primary(set: &mut TransformerSet, config: &PluginConfig, transformer: NodeTransformer) {
    if config.after_declarations {
        set.after_declarations.push(transformer);
    } else if config.after {
        set.after.push(transformer);
    } else {
        set.before.push(transformer);
    }
}
