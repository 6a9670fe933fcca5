//! Generic structural rewriter.
//!
//! Applies [`PatchRule`]s to host compiler source. Rules are applied
//! sequentially; each rewrite re-scans the current text, collects byte-span
//! edits, and splices them back-to-front. A rule whose anchor is absent is
//! a fatal error naming the anchor — a moved anchor means the rule is
//! stale, and a silent no-op would be worse than a build failure.

use std::ops::Range;
use thiserror::Error;
use tracing::debug;

use super::rules::{PatchRule, Rewrite};
use super::scanner::{FunctionDecl, Scanner};

/// Version stamped into every patched artifact.
pub const PATCH_VERSION: &str = env!("CARGO_PKG_VERSION");

/// First line of every patched artifact, followed by the patch version.
pub const HEADER_PREFIX: &str = "// graft-patched ";

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("missing anchor `{anchor}` in {file}")]
    MissingAnchor { file: String, anchor: String },

    #[error("{file} is already patched (version {version})")]
    AlreadyPatched { file: String, version: String },

    #[error("conflicting edits while rewriting {file}")]
    ConflictingEdits { file: String },
}

pub type Result<T> = std::result::Result<T, PatchError>;

/// Patch version a source file was stamped with, if any.
pub fn is_patched(source: &str) -> Option<String> {
    let first_line = source.lines().next()?;
    first_line
        .strip_prefix(HEADER_PREFIX)
        .map(|v| v.trim().to_string())
}

/// Apply every rule scoped to `file` and stamp the result.
///
/// The input must be unpatched source; patching twice is an error, not a
/// no-op.
pub fn apply_rules(file: &str, source: &str, rules: &[PatchRule]) -> Result<String> {
    if let Some(version) = is_patched(source) {
        return Err(PatchError::AlreadyPatched {
            file: file.to_string(),
            version,
        });
    }

    let mut text = source.to_string();
    for rule in rules.iter().filter(|r| r.file == file) {
        debug!(file, rule = rule.rewrite.describe(), "applying patch rule");
        text = apply_rewrite(file, &text, &rule.rewrite)?;
    }

    Ok(format!("{HEADER_PREFIX}{PATCH_VERSION}\n{text}"))
}

/// Apply one rewrite to `source`.
pub fn apply_rewrite(file: &str, source: &str, rewrite: &Rewrite) -> Result<String> {
    let scanner = Scanner::new(source);
    let mut edits = EditSet::new();

    match rewrite {
        Rewrite::InterceptProgramFactory {
            function,
            original_alias,
            entry_point,
        } => {
            let decl = find_function(&scanner, file, function)?;
            edits.replace(decl.name_span.clone(), original_alias.clone());
            edits.insert(
                decl.span.end,
                format!(
                    "\nfunction {function}() {{ return {entry_point}.apply(this, arguments); }}"
                ),
            );
        }

        Rewrite::CaptureEmitDiagnostics {
            function,
            anchor_prefix,
            insert,
        } => {
            let decl = find_function(&scanner, file, function)?;
            let anchor = scanner
                .statements_in(&decl)
                .into_iter()
                .find(|span| scanner.text(span).trim_start().starts_with(anchor_prefix))
                .ok_or_else(|| PatchError::MissingAnchor {
                    file: file.to_string(),
                    anchor: anchor_prefix.clone(),
                })?;
            let indent = line_indent(source, anchor.start);
            edits.insert(anchor.start, format!("{insert}\n{indent}"));
        }

        Rewrite::ThreadOptionsIntoParse {
            functions,
            parameter,
            argument,
            parse_function,
            original_alias,
            global_binding,
            entry_point,
        } => {
            for name in functions {
                let decl = find_function(&scanner, file, name)?;
                edits.insert(
                    decl.params.end,
                    append_list_item(scanner.text(&decl.params), parameter),
                );
                for site in scanner.call_sites(name) {
                    edits.insert(
                        site.args.end,
                        append_list_item(scanner.text(&site.args), argument),
                    );
                }
            }

            let decl = find_function(&scanner, file, parse_function)?;
            edits.replace(decl.name_span.clone(), original_alias.clone());
            edits.insert(
                decl.span.end,
                format!(
                    "\n{global_binding} = {original_alias};\n\
                     function {parse_function}() {{ return {entry_point}.apply(this, arguments); }}"
                ),
            );
        }

        Rewrite::ReturnToBinding { function, binding } => {
            let decl = find_function(&scanner, file, function)?;
            let ret = scanner
                .return_statements(&decl)
                .into_iter()
                .next_back()
                .ok_or_else(|| PatchError::MissingAnchor {
                    file: file.to_string(),
                    anchor: format!("return statement of {function}"),
                })?;
            let keyword_start = ret.start + leading_whitespace(&source[ret.clone()]);
            edits.replace(
                keyword_start..keyword_start + "return".len(),
                format!("var {binding} ="),
            );
            let indent = line_indent(source, ret.start);
            let stmt_end = end_of_statement(source, ret.end);
            edits.insert(stmt_end, format!("\n{indent}return {binding};"));
        }

        Rewrite::Overlay { overlay } => {
            let overlay_scanner = Scanner::new(overlay);
            let base_decls = scanner.top_level_decls();
            let mut appended = String::new();

            for decl in overlay_scanner.top_level_decls() {
                let text = overlay_scanner.text(&decl.span);
                match base_decls.iter().find(|b| b.name == decl.name) {
                    Some(base) => edits.replace(base.span.clone(), text.to_string()),
                    None => {
                        appended.push('\n');
                        appended.push_str(text);
                    }
                }
            }
            if !appended.is_empty() {
                edits.insert(source.len(), appended);
            }
        }
    }

    edits.apply(source).ok_or_else(|| PatchError::ConflictingEdits {
        file: file.to_string(),
    })
}

fn find_function(scanner: &Scanner<'_>, file: &str, name: &str) -> Result<FunctionDecl> {
    scanner
        .find_function(name)
        .ok_or_else(|| PatchError::MissingAnchor {
            file: file.to_string(),
            anchor: name.to_string(),
        })
}

/// Text to append one item to a parameter or argument list.
fn append_list_item(existing: &str, item: &str) -> String {
    if existing.trim().is_empty() {
        item.to_string()
    } else {
        format!(", {item}")
    }
}

fn leading_whitespace(text: &str) -> usize {
    text.len() - text.trim_start().len()
}

/// Whitespace prefix of the line containing `pos`.
fn line_indent(source: &str, pos: usize) -> String {
    let line_start = source[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    source[line_start..pos]
        .chars()
        .take_while(|c| c.is_whitespace())
        .collect()
}

/// Position just past the semicolon terminating the statement ending at
/// `end`, when one directly follows.
fn end_of_statement(source: &str, end: usize) -> usize {
    let rest = &source[end..];
    let skipped = rest.len() - rest.trim_start().len();
    if rest[skipped..].starts_with(';') {
        end + skipped + 1
    } else {
        end
    }
}

/// Byte-span edits applied back-to-front; inserts are zero-length ranges.
struct EditSet {
    edits: Vec<(Range<usize>, String)>,
}

impl EditSet {
    fn new() -> Self {
        Self { edits: Vec::new() }
    }

    fn insert(&mut self, pos: usize, text: String) {
        self.edits.push((pos..pos, text));
    }

    fn replace(&mut self, range: Range<usize>, text: String) {
        self.edits.push((range, text));
    }

    /// Returns `None` when two edits overlap.
    fn apply(mut self, source: &str) -> Option<String> {
        self.edits.sort_by_key(|(range, _)| range.start);
        for pair in self.edits.windows(2) {
            if pair[0].0.end > pair[1].0.start {
                return None;
            }
        }

        let mut text = source.to_string();
        for (range, replacement) in self.edits.into_iter().rev() {
            text.replace_range(range, &replacement);
        }
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_intercept_program_factory() {
        let src = indoc! {r#"
            function createProgram(rootNames, options, host) {
                var program = { rootNames: rootNames, options: options };
                return program;
            }
        "#};
        let rewrite = Rewrite::InterceptProgramFactory {
            function: "createProgram".to_string(),
            original_alias: "graftOriginalCreateProgram".to_string(),
            entry_point: "graftRuntime.createProgram".to_string(),
        };

        let patched = apply_rewrite("typescript.js", src, &rewrite).unwrap();

        assert!(patched.contains("function graftOriginalCreateProgram(rootNames, options, host)"));
        assert!(patched.contains(
            "function createProgram() { return graftRuntime.createProgram.apply(this, arguments); }"
        ));
    }

    #[test]
    fn test_intercept_missing_function_names_anchor() {
        let err = apply_rewrite(
            "typescript.js",
            "var nothing = 1;",
            &Rewrite::InterceptProgramFactory {
                function: "createProgram".to_string(),
                original_alias: "x".to_string(),
                entry_point: "y".to_string(),
            },
        )
        .unwrap_err();

        match err {
            PatchError::MissingAnchor { file, anchor } => {
                assert_eq!(file, "typescript.js");
                assert_eq!(anchor, "createProgram");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_capture_emit_diagnostics_inserts_before_anchor() {
        let src = indoc! {r#"
            function emitFilesAndReportErrors(program) {
                var emitResult = program.emit();
                var diagnostics = program.getSyntacticDiagnostics();
                return diagnostics;
            }
        "#};
        let rewrite = Rewrite::CaptureEmitDiagnostics {
            function: "emitFilesAndReportErrors".to_string(),
            anchor_prefix: "var diagnostics".to_string(),
            insert: "graftRuntime.recordEmitDiagnostics(program, emitResult.diagnostics);"
                .to_string(),
        };

        let patched = apply_rewrite("typescript.js", src, &rewrite).unwrap();
        let capture_at = patched.find("graftRuntime.recordEmitDiagnostics").unwrap();
        let anchor_at = patched.find("var diagnostics").unwrap();

        assert!(capture_at < anchor_at);
    }

    #[test]
    fn test_capture_missing_statement_names_anchor() {
        let src = "function emitFilesAndReportErrors(program) { return 1; }";
        let err = apply_rewrite(
            "tsc.js",
            src,
            &Rewrite::CaptureEmitDiagnostics {
                function: "emitFilesAndReportErrors".to_string(),
                anchor_prefix: "var diagnostics".to_string(),
                insert: "x();".to_string(),
            },
        )
        .unwrap_err();

        match err {
            PatchError::MissingAnchor { anchor, .. } => assert_eq!(anchor, "var diagnostics"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_thread_options_into_parse() {
        let src = indoc! {r#"
            var ts = {};
            function parseSourceFile(fileName, sourceText) {
                return { fileName: fileName, text: sourceText };
            }
            function createSourceFile(fileName, sourceText, languageVersion) {
                return parseSourceFile(fileName, sourceText);
            }
            function updateSourceFile(sourceFile, newText) {
                return parseSourceFile(sourceFile.fileName, newText);
            }
            function createProgram(rootNames, options) {
                var file = createSourceFile("lib.d.ts", "", options.target);
                var updated = updateSourceFile(file, "");
                return { file: file, updated: updated };
            }
        "#};
        let rewrite = Rewrite::ThreadOptionsIntoParse {
            functions: vec![
                "createSourceFile".to_string(),
                "updateSourceFile".to_string(),
            ],
            parameter: "graftCompilerOptions".to_string(),
            argument: "graftRuntime.getCompilerOptions".to_string(),
            parse_function: "parseSourceFile".to_string(),
            original_alias: "graftOriginalParseSourceFile".to_string(),
            global_binding: "ts.graftOriginalParseSourceFile".to_string(),
            entry_point: "graftRuntime.parseSourceFile".to_string(),
        };

        let patched = apply_rewrite("typescript.js", src, &rewrite).unwrap();

        assert!(patched
            .contains("createSourceFile(fileName, sourceText, languageVersion, graftCompilerOptions)"));
        assert!(patched.contains("updateSourceFile(sourceFile, newText, graftCompilerOptions)"));
        assert!(patched
            .contains(r#"createSourceFile("lib.d.ts", "", options.target, graftRuntime.getCompilerOptions)"#));
        assert!(patched.contains(r#"updateSourceFile(file, "", graftRuntime.getCompilerOptions)"#));
        assert!(patched.contains("function graftOriginalParseSourceFile(fileName, sourceText)"));
        assert!(patched.contains("ts.graftOriginalParseSourceFile = graftOriginalParseSourceFile;"));
        assert!(patched.contains(
            "function parseSourceFile() { return graftRuntime.parseSourceFile.apply(this, arguments); }"
        ));
    }

    #[test]
    fn test_return_to_binding() {
        let src = indoc! {r#"
            function emitFilesAndReportErrors(program) {
                var emitResult = program.emit();
                return { emitResult: emitResult };
            }
        "#};
        let rewrite = Rewrite::ReturnToBinding {
            function: "emitFilesAndReportErrors".to_string(),
            binding: "emitReturn".to_string(),
        };

        let patched = apply_rewrite("typescript.js", src, &rewrite).unwrap();

        assert!(patched.contains("var emitReturn = { emitResult: emitResult };"));
        assert!(patched.contains("return emitReturn;"));
        let decl_at = patched.find("var emitReturn").unwrap();
        let ret_at = patched.find("return emitReturn").unwrap();
        assert!(decl_at < ret_at);
    }

    #[test]
    fn test_return_to_binding_requires_return() {
        let src = "function emitFilesAndReportErrors(program) { program.emit(); }";
        let err = apply_rewrite(
            "typescript.js",
            src,
            &Rewrite::ReturnToBinding {
                function: "emitFilesAndReportErrors".to_string(),
                binding: "emitReturn".to_string(),
            },
        )
        .unwrap_err();

        assert!(matches!(err, PatchError::MissingAnchor { .. }));
    }

    #[test]
    fn test_overlay_replaces_and_appends() {
        let base = indoc! {r#"
            var graftState = null;
            function helper() { return 1; }
        "#};
        let overlay = indoc! {r#"
            var graftState = { options: undefined };
            function graftExtra() { return 2; }
        "#};

        let patched = apply_rewrite(
            "typescript.js",
            base,
            &Rewrite::Overlay {
                overlay: overlay.to_string(),
            },
        )
        .unwrap();

        assert!(patched.contains("var graftState = { options: undefined };"));
        assert!(!patched.contains("var graftState = null;"));
        assert!(patched.contains("function helper() { return 1; }"));
        assert!(patched.contains("function graftExtra() { return 2; }"));
        // Appended declarations land at the end.
        assert!(patched.find("graftExtra").unwrap() > patched.find("helper").unwrap());
    }

    #[test]
    fn test_apply_rules_stamps_header() {
        let src = "function createProgram(a) { return a; }";
        let rules = vec![super::super::rules::PatchRule::new(
            "typescript.js",
            Rewrite::InterceptProgramFactory {
                function: "createProgram".to_string(),
                original_alias: "graftOriginalCreateProgram".to_string(),
                entry_point: "graftRuntime.createProgram".to_string(),
            },
        )];

        let patched = apply_rules("typescript.js", src, &rules).unwrap();

        assert!(patched.starts_with(HEADER_PREFIX));
        assert_eq!(is_patched(&patched).as_deref(), Some(PATCH_VERSION));
    }

    #[test]
    fn test_apply_rules_rejects_patched_input() {
        let src = format!("{HEADER_PREFIX}{PATCH_VERSION}\nvar x = 1;");
        let err = apply_rules("typescript.js", &src, &[]).unwrap_err();

        assert!(matches!(err, PatchError::AlreadyPatched { .. }));
    }

    #[test]
    fn test_rules_are_scoped_to_their_file() {
        let rules = super::super::rules::rules_for_module("typescript.js");
        // Rules scoped to typescript.js must not fire for tsc.js.
        let patched = apply_rules("tsc.js", "var x = 1;", &rules).unwrap();
        assert!(patched.contains("var x = 1;"));
    }
}
