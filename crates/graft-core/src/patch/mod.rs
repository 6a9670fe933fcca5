//! Build-time structural rewriter for the host compiler's own source.
//!
//! This is a one-time, offline operation: rules run when a compiler
//! installation is patched (or when the loader materializes a patched
//! artifact), never per compilation. Every rule anchors on structure and
//! fails fast when the anchor is gone.

mod engine;
mod rules;
mod scanner;

pub use engine::{
    apply_rewrite, apply_rules, is_patched, PatchError, Result, HEADER_PREFIX, PATCH_VERSION,
};
pub use rules::{default_rules, rules_for_module, PatchRule, Rewrite, DEFAULT_MODULES, RUNTIME_SHIM};
pub use scanner::{CallSite, DeclKind, FunctionDecl, Scanner, TopLevelDecl};
