use std::path::PathBuf;
use thiserror::Error;

/// Boxed error a plugin factory may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Plugin resolution and invocation failures.
///
/// All of these abort the compilation and name the offending descriptor;
/// there is no partial or best-effort plugin application.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin `{plugin}`: no transform module specified")]
    MissingSpecifier { plugin: String },

    #[error("plugin `{plugin}`: cannot resolve module `{specifier}`")]
    Unresolvable { plugin: String, specifier: String },

    #[error("plugin `{plugin}`: no loader accepts module {path}")]
    Unloadable { plugin: String, path: PathBuf },

    #[error("plugin `{plugin}`: failed to load module: {message}")]
    Load { plugin: String, message: String },

    #[error("plugin `{plugin}`: unknown export `{export}`")]
    UnknownExport { plugin: String, export: String },

    #[error("plugin `{plugin}`: missing optional capability `{capability}`")]
    MissingCapability { plugin: String, capability: String },

    #[error(
        "plugin `{plugin}`: declared dispatch pattern `{declared}` but export provides `{found}`"
    )]
    DispatchMismatch {
        plugin: String,
        declared: String,
        found: String,
    },

    #[error("plugin `{plugin}` failed: {source}")]
    Factory {
        plugin: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid alias configuration at {path}: {message}")]
    AliasConfig { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, PluginError>;
