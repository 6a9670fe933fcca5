//! Graft extends a host compiler that ships as JavaScript source with
//! user-supplied transformer plugins, without forking the compiler's
//! distribution.
//!
//! The patch engine rewrites the compiler's own modules once to expose
//! extension points; the loader caches and serves the patched artifacts;
//! the plugin orchestrator resolves, dispatches, and composes the user's
//! descriptor list at each compilation; the diagnostics side-table and
//! rootDirs merger feed plugin output back into the emit pipeline.

pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod loader;
pub mod patch;
pub mod plugins;
pub mod program;
pub mod rootdirs;

pub use config::{CompilerOptions, PluginConfig, PluginType, ProjectConfig};
pub use diagnostics::{
    DiagnosticCategory, DiagnosticEntry, DiagnosticsAccessor, DiagnosticsTable,
};
pub use errors::{GraftError, Result};
pub use loader::{LiveModule, LiveModuleStore, ModuleLoader, PatchCache, ResolvedCompiler};
pub use patch::{
    apply_rules, default_rules, is_patched, PatchError, PatchRule, Rewrite, DEFAULT_MODULES,
    PATCH_VERSION,
};
pub use plugins::{
    Orchestrator, PluginEntry, PluginError, PluginExtras, PluginModule, RegistryLoader,
    ResolvedPlugins,
};
pub use program::{
    CompilerHost, Program, ProgramId, RealCompilerHost, SourceUnit, TransformContext,
    TransformerPlugin, TransformerResult, TransformerSet,
};
pub use rootdirs::RootDirsMapping;
