//! Plugin orchestration: resolving, loading, dispatching, and composing
//! user plugin descriptors into the transformer set and whole-program
//! chain the patched compiler runs.

mod dispatch;
mod error;
mod loader;
mod orchestrator;
mod resolver;

pub use dispatch::{
    dispatch, CheckerFactoryFn, CompilerOptionsFactoryFn, ConfigFactoryFn, Dispatched,
    DispatchContext, LsFactoryFn, PluginEntry, PluginExtras, ProgramFactoryFn,
    ProgramTransformerFn, RawFactoryFn,
};
pub use error::{BoxError, PluginError, Result};
pub use loader::{
    requires_transpile, LoaderStack, LoaderToken, PluginModule, PluginModuleLoader,
    RegistryLoader, DEFAULT_EXPORT,
};
pub use orchestrator::{
    AliasCapability, Orchestrator, ProgramChainLink, ProjectAliasCapability, ResolvedPlugins,
};
pub use resolver::{
    PackageStrategy, PathAliasStrategy, RelativePathStrategy, ResolveStrategy, ResolverChain,
    RestoreToken,
};
