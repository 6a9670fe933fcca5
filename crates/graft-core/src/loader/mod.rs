//! Live module loading and the patched-artifact cache.
//!
//! At process start this subsystem resolves the installed host compiler,
//! applies (or reuses) the patch engine's output, and hands back a live,
//! patched module bound to the installation on disk.

mod cache;
mod error;
mod hash;
mod module;
mod resolve;

pub use cache::{cache_disabled, CacheEntry, CacheKey, CacheManifest, PatchCache};
pub use error::{CacheError, LoaderError, Result};
pub use hash::{hash_bytes, hash_file};
pub use module::{LiveModule, LiveModuleStore, ModuleLoader};
pub use resolve::{check_version, resolve_compiler, ResolvedCompiler, SUPPORTED_MAJORS};

/// Cache format version - increment when cache structure changes.
pub const CACHE_VERSION: u32 = 1;

/// Cache directory name under the process temporary directory.
pub const CACHE_DIR_NAME: &str = "graft-patch-cache";

/// Cache manifest file name.
pub const MANIFEST_FILE_NAME: &str = "manifest.bin";

/// Environment flag forcing the loader to bypass cache lookup.
pub const SKIP_CACHE_ENV: &str = "GRAFT_SKIP_CACHE";
