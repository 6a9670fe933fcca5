use std::path::PathBuf;
use thiserror::Error;

use crate::patch::PatchError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Cache manifest not found")]
    ManifestNotFound,

    #[error("Cache version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Corrupted cache artifact: {path}")]
    CorruptedArtifact { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("compiler package not found at {path}")]
    CompilerNotFound { path: PathBuf },

    #[error("invalid compiler package manifest at {path}: {message}")]
    InvalidPackage { path: PathBuf, message: String },

    #[error("compiler module not found: {path}")]
    ModuleMissing { path: PathBuf },

    #[error("unsupported compiler version `{found}` (supported majors: {supported})")]
    UnsupportedVersion { found: String, supported: String },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LoaderError>;
