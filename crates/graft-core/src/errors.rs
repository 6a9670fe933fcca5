use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::loader::{CacheError, LoaderError};
pub use crate::patch::PatchError;
pub use crate::plugins::PluginError;

/// Top-level error for graft operations.
///
/// Every subsystem failure either aborts the compilation with one of these
/// or is not a failure at all; nothing degrades silently.
#[derive(Debug, Error)]
pub enum GraftError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GraftError>;
