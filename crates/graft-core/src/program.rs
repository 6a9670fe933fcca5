use crate::config::CompilerOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identifier assigned to a program at creation.
///
/// Identifiers are process-unique and never reused, which is what keying
/// the diagnostics side-table requires in long-lived processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramId(u64);

impl ProgramId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ProgramId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// One source file of the in-progress compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    pub file_name: String,
    pub text: String,
}

impl SourceUnit {
    pub fn new(file_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            text: text.into(),
        }
    }
}

/// The in-progress compilation unit handed to plugins.
///
/// A whole-program transformer produces a replacement `Program`; the
/// replacement carries a fresh identity and the old one is discarded.
#[derive(Debug, Clone)]
pub struct Program {
    id: ProgramId,
    source_units: Vec<SourceUnit>,
    options: CompilerOptions,
}

impl Program {
    pub fn new(source_units: Vec<SourceUnit>, options: CompilerOptions) -> Self {
        Self {
            id: ProgramId::next(),
            source_units,
            options,
        }
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn source_units(&self) -> &[SourceUnit] {
        &self.source_units
    }

    pub fn source_unit(&self, file_name: &str) -> Option<&SourceUnit> {
        self.source_units.iter().find(|u| u.file_name == file_name)
    }

    /// Handle to the host compiler's type checker for this program.
    pub fn type_checker(&self) -> TypeChecker {
        TypeChecker { program: self.id }
    }

    /// Handle to the host compiler's language service for this program.
    pub fn language_service(&self) -> LanguageService {
        LanguageService { program: self.id }
    }
}

/// Opaque handle to the host compiler's type checker.
#[derive(Debug, Clone, Copy)]
pub struct TypeChecker {
    program: ProgramId,
}

impl TypeChecker {
    pub fn program_id(&self) -> ProgramId {
        self.program
    }
}

/// Opaque handle to the host compiler's language service.
#[derive(Debug, Clone, Copy)]
pub struct LanguageService {
    program: ProgramId,
}

impl LanguageService {
    pub fn program_id(&self) -> ProgramId {
        self.program
    }
}

/// Host environment the compiler runs against.
///
/// This is a seam for dependency injection: the real host touches the
/// filesystem, tests substitute their own.
pub trait CompilerHost: Send + Sync {
    fn current_directory(&self) -> PathBuf;
    fn read_file(&self, path: &Path) -> std::io::Result<String>;
    fn write_file(&self, path: &Path, contents: &str) -> std::io::Result<()>;
    fn file_exists(&self, path: &Path) -> bool;
}

/// Production host backed by the real filesystem.
#[derive(Debug, Default)]
pub struct RealCompilerHost;

impl RealCompilerHost {
    pub fn new() -> Self {
        Self
    }
}

impl CompilerHost for RealCompilerHost {
    fn current_directory(&self) -> PathBuf {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    fn read_file(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write_file(&self, path: &Path, contents: &str) -> std::io::Result<()> {
        std::fs::write(path, contents)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Context handed to node-transformer factories when they are instantiated
/// for one compilation.
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub options: CompilerOptions,
}

impl TransformContext {
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }
}

/// A node-level transformer over one source unit.
pub type NodeTransformer = Box<dyn FnMut(SourceUnit) -> SourceUnit + Send>;

/// Factory producing a node transformer for one compilation. Factories are
/// created fresh per compilation by the plugin and instantiated exactly once.
pub type TransformerFactory = Box<dyn FnOnce(&TransformContext) -> NodeTransformer + Send>;

/// Result of invoking a plugin: up to three named transformer factories,
/// one per emit phase.
#[derive(Default)]
pub struct TransformerPlugin {
    pub before: Option<TransformerFactory>,
    pub after: Option<TransformerFactory>,
    pub after_declarations: Option<TransformerFactory>,
}

impl TransformerPlugin {
    pub fn before(factory: TransformerFactory) -> Self {
        Self {
            before: Some(factory),
            ..Default::default()
        }
    }
}

/// What a `program`-pattern plugin returns: either a bare factory (treated
/// as `before`) or a grouped [`TransformerPlugin`].
pub enum TransformerResult {
    Factory(TransformerFactory),
    Plugin(TransformerPlugin),
}

/// Composed transformer buckets for one compilation, ordered by descriptor
/// declaration order within each bucket.
#[derive(Default)]
pub struct TransformerSet {
    pub before: Vec<NodeTransformer>,
    pub after: Vec<NodeTransformer>,
    pub after_declarations: Vec<NodeTransformer>,
}

impl TransformerSet {
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty() && self.after_declarations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_ids_are_unique() {
        let a = Program::new(vec![], CompilerOptions::default());
        let b = Program::new(vec![], CompilerOptions::default());

        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_replacement_program_has_fresh_identity() {
        let original = Program::new(
            vec![SourceUnit::new("a.ts", "let x = 1")],
            CompilerOptions::default(),
        );
        let replacement = Program::new(
            original.source_units().to_vec(),
            original.options().clone(),
        );

        assert_ne!(original.id(), replacement.id());
    }

    #[test]
    fn test_source_unit_lookup() {
        let program = Program::new(
            vec![
                SourceUnit::new("a.ts", "let x = 1"),
                SourceUnit::new("b.ts", "let y = 2"),
            ],
            CompilerOptions::default(),
        );

        assert!(program.source_unit("b.ts").is_some());
        assert!(program.source_unit("c.ts").is_none());
    }

    #[test]
    fn test_checker_handle_tracks_program() {
        let program = Program::new(vec![], CompilerOptions::default());
        assert_eq!(program.type_checker().program_id(), program.id());
        assert_eq!(program.language_service().program_id(), program.id());
    }
}
