//! Side-table associating plugin-contributed diagnostics with in-flight
//! programs.
//!
//! The host compiler's own diagnostic collection never learns about plugin
//! diagnostics; they live here, keyed by program identity, and are merged
//! into the final list at emit completion.

use crate::program::ProgramId;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};

/// Diagnostic severity category, mirroring the host compiler's taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCategory {
    Error,
    Warning,
    Suggestion,
    Message,
}

/// A single diagnostic contributed by a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub code: u32,
    pub message: String,
    pub category: DiagnosticCategory,
    /// Source file the diagnostic refers to, if any.
    pub file: Option<String>,
    pub start: Option<usize>,
    pub length: Option<usize>,
}

impl DiagnosticEntry {
    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            category: DiagnosticCategory::Error,
            file: None,
            start: None,
            length: None,
        }
    }

    pub fn warning(code: u32, message: impl Into<String>) -> Self {
        Self {
            category: DiagnosticCategory::Warning,
            ..Self::error(code, message)
        }
    }

    pub fn with_location(mut self, file: impl Into<String>, start: usize, length: usize) -> Self {
        self.file = Some(file.into());
        self.start = Some(start);
        self.length = Some(length);
        self
    }
}

/// Process-wide registry of plugin diagnostics, keyed by program identity.
///
/// Sequences are created lazily on first append. Removal is by current
/// index with splice semantics: removing index `i` shifts later entries
/// down by one. Entries for a program persist until [`evict`] is called;
/// short-lived single-shot compilations may simply drop the table, but
/// long-lived watch processes must evict per program or grow without bound.
///
/// [`evict`]: DiagnosticsTable::evict
#[derive(Debug, Default)]
pub struct DiagnosticsTable {
    entries: Mutex<FxHashMap<ProgramId, Vec<DiagnosticEntry>>>,
}

impl DiagnosticsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a diagnostic for `program` and return the new count.
    pub fn append(&self, program: ProgramId, entry: DiagnosticEntry) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let list = entries.entry(program).or_default();
        list.push(entry);
        list.len()
    }

    /// Remove the diagnostic at `index` for `program`, shifting subsequent
    /// indices down by one. Returns the removed entry, or `None` if the
    /// index is out of range.
    pub fn remove(&self, program: ProgramId, index: usize) -> Option<DiagnosticEntry> {
        let mut entries = self.entries.lock().unwrap();
        let list = entries.get_mut(&program)?;
        if index < list.len() {
            Some(list.remove(index))
        } else {
            None
        }
    }

    /// Ordered snapshot of the diagnostics currently recorded for `program`.
    pub fn snapshot(&self, program: ProgramId) -> Vec<DiagnosticEntry> {
        self.entries
            .lock()
            .unwrap()
            .get(&program)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self, program: ProgramId) -> usize {
        self.entries
            .lock()
            .unwrap()
            .get(&program)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, program: ProgramId) -> bool {
        self.len(program) == 0
    }

    /// Merge the compiler's own finalized diagnostics with this program's
    /// side-table contents: compiler diagnostics first, then plugin
    /// diagnostics in append order, after all requested removals.
    pub fn merge(
        &self,
        program: ProgramId,
        compiler_diagnostics: Vec<DiagnosticEntry>,
    ) -> Vec<DiagnosticEntry> {
        let mut merged = compiler_diagnostics;
        merged.extend(self.snapshot(program));
        merged
    }

    /// Drop all diagnostics for `program`. Long-lived processes call this
    /// when the program is discarded.
    pub fn evict(&self, program: ProgramId) {
        self.entries.lock().unwrap().remove(&program);
    }
}

/// Accessor bound to one program, handed to plugins via their extras.
#[derive(Clone)]
pub struct DiagnosticsAccessor {
    table: Arc<DiagnosticsTable>,
    program: ProgramId,
}

impl DiagnosticsAccessor {
    pub fn new(table: Arc<DiagnosticsTable>, program: ProgramId) -> Self {
        Self { table, program }
    }

    pub fn program_id(&self) -> ProgramId {
        self.program
    }

    /// Append a diagnostic; returns the new count.
    pub fn add_diagnostic(&self, entry: DiagnosticEntry) -> usize {
        self.table.append(self.program, entry)
    }

    /// Remove a diagnostic by its current index.
    pub fn remove_diagnostic(&self, index: usize) -> Option<DiagnosticEntry> {
        self.table.remove(self.program, index)
    }

    /// Read-only ordered snapshot of this program's plugin diagnostics.
    pub fn diagnostics(&self) -> Vec<DiagnosticEntry> {
        self.table.snapshot(self.program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerOptions;
    use crate::program::Program;

    fn fresh_program_id() -> ProgramId {
        Program::new(vec![], CompilerOptions::default()).id()
    }

    #[test]
    fn test_append_returns_new_count() {
        let table = DiagnosticsTable::new();
        let id = fresh_program_id();

        assert_eq!(table.append(id, DiagnosticEntry::error(1, "first")), 1);
        assert_eq!(table.append(id, DiagnosticEntry::error(2, "second")), 2);
    }

    #[test]
    fn test_remove_shifts_indices() {
        let table = DiagnosticsTable::new();
        let id = fresh_program_id();

        table.append(id, DiagnosticEntry::error(1, "d1"));
        table.append(id, DiagnosticEntry::error(2, "d2"));
        table.append(id, DiagnosticEntry::error(3, "d3"));

        let removed = table.remove(id, 0).unwrap();
        assert_eq!(removed.code, 1);

        // d2 moved down to index 0.
        let removed = table.remove(id, 0).unwrap();
        assert_eq!(removed.code, 2);

        let snapshot = table.snapshot(id);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].code, 3);
    }

    #[test]
    fn test_remove_out_of_range() {
        let table = DiagnosticsTable::new();
        let id = fresh_program_id();

        table.append(id, DiagnosticEntry::error(1, "d1"));
        assert!(table.remove(id, 5).is_none());
        assert_eq!(table.len(id), 1);
    }

    #[test]
    fn test_merge_compiler_first() {
        let table = DiagnosticsTable::new();
        let id = fresh_program_id();

        table.append(id, DiagnosticEntry::error(10, "D1"));
        table.append(id, DiagnosticEntry::error(11, "D2"));
        table.remove(id, 0);

        let compiler = vec![DiagnosticEntry::error(1, "C1")];
        let merged = table.merge(id, compiler);

        let codes: Vec<_> = merged.iter().map(|d| d.code).collect();
        assert_eq!(codes, [1, 11]);
    }

    #[test]
    fn test_programs_do_not_collide() {
        let table = DiagnosticsTable::new();
        let a = fresh_program_id();
        let b = fresh_program_id();

        table.append(a, DiagnosticEntry::error(1, "for a"));

        assert_eq!(table.len(a), 1);
        assert_eq!(table.len(b), 0);
    }

    #[test]
    fn test_evict() {
        let table = DiagnosticsTable::new();
        let id = fresh_program_id();

        table.append(id, DiagnosticEntry::error(1, "d1"));
        table.evict(id);

        assert!(table.is_empty(id));
    }

    #[test]
    fn test_accessor_round_trip() {
        let table = Arc::new(DiagnosticsTable::new());
        let id = fresh_program_id();
        let accessor = DiagnosticsAccessor::new(table.clone(), id);

        assert_eq!(accessor.add_diagnostic(DiagnosticEntry::error(1, "d1")), 1);
        assert_eq!(accessor.add_diagnostic(DiagnosticEntry::error(2, "d2")), 2);
        accessor.remove_diagnostic(0);

        let snapshot = accessor.diagnostics();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].code, 2);
        assert_eq!(table.len(id), 1);
    }
}
