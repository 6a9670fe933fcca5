//! Declarative patch rules for the host compiler's distributed modules.
//!
//! Each rule targets exactly one file and one structural rewrite. The
//! default set below inserts the extension points the plugin runtime
//! needs; the engine in `engine.rs` interprets them generically, so a
//! rule is data, not code.

/// A single file-scoped rewrite of host compiler source.
#[derive(Debug, Clone)]
pub struct PatchRule {
    /// File name the rule applies to, e.g. `typescript.js`.
    pub file: String,
    pub rewrite: Rewrite,
}

impl PatchRule {
    pub fn new(file: impl Into<String>, rewrite: Rewrite) -> Self {
        Self {
            file: file.into(),
            rewrite,
        }
    }
}

/// The structural rewrite kinds the engine knows how to apply.
#[derive(Debug, Clone)]
pub enum Rewrite {
    /// Rename `function` to `original_alias` and install a forwarder of the
    /// original name that delegates to `entry_point`.
    InterceptProgramFactory {
        function: String,
        original_alias: String,
        entry_point: String,
    },

    /// Inside `function`, insert `insert` immediately before the first
    /// statement whose text starts with `anchor_prefix`.
    CaptureEmitDiagnostics {
        function: String,
        anchor_prefix: String,
        insert: String,
    },

    /// Append a trailing `parameter` to each of `functions`, pass
    /// `argument` at every in-file call site of those functions, rename
    /// `parse_function` to `original_alias`, expose it on `global_binding`,
    /// and install a forwarder of the original name delegating to
    /// `entry_point`.
    ThreadOptionsIntoParse {
        functions: Vec<String>,
        parameter: String,
        argument: String,
        parse_function: String,
        original_alias: String,
        global_binding: String,
        entry_point: String,
    },

    /// Inside `function`, rewrite the final `return <expr>;` into
    /// `var <binding> = <expr>;` followed by `return <binding>;`, so later
    /// rules can insert statements after what used to be a hard exit.
    ReturnToBinding { function: String, binding: String },

    /// Replace top-level declarations in the target whose names collide
    /// with declarations in `overlay`; append the rest at the end.
    Overlay { overlay: String },
}

impl Rewrite {
    pub fn describe(&self) -> &'static str {
        match self {
            Rewrite::InterceptProgramFactory { .. } => "intercept-program-factory",
            Rewrite::CaptureEmitDiagnostics { .. } => "capture-emit-diagnostics",
            Rewrite::ThreadOptionsIntoParse { .. } => "thread-options-into-parse",
            Rewrite::ReturnToBinding { .. } => "return-to-binding",
            Rewrite::Overlay { .. } => "overlay",
        }
    }
}

/// Host compiler modules patched by default.
pub const DEFAULT_MODULES: &[&str] = &["typescript.js", "tsc.js"];

/// Runtime shim injected into each patched module via the overlay rule.
/// The shim owns the bridge state the other rewrites call into.
pub const RUNTIME_SHIM: &str = r#"var graftState = { options: undefined, emitDiagnostics: new Map() };
var graftRuntime = {
    createProgram: function () { return graftOriginalCreateProgram.apply(this, arguments); },
    parseSourceFile: function () { return ts.graftOriginalParseSourceFile.apply(this, arguments); },
    getCompilerOptions: function () { return graftState.options; },
    recordEmitDiagnostics: function (program, diagnostics) { graftState.emitDiagnostics.set(program, diagnostics); }
};"#;

/// The default rule set for one host compiler module.
pub fn rules_for_module(module: &str) -> Vec<PatchRule> {
    vec![
        PatchRule::new(
            module,
            Rewrite::Overlay {
                overlay: RUNTIME_SHIM.to_string(),
            },
        ),
        PatchRule::new(
            module,
            Rewrite::InterceptProgramFactory {
                function: "createProgram".to_string(),
                original_alias: "graftOriginalCreateProgram".to_string(),
                entry_point: "graftRuntime.createProgram".to_string(),
            },
        ),
        PatchRule::new(
            module,
            Rewrite::CaptureEmitDiagnostics {
                function: "emitFilesAndReportErrors".to_string(),
                anchor_prefix: "var diagnostics".to_string(),
                insert: "graftRuntime.recordEmitDiagnostics(program, emitResult.diagnostics);"
                    .to_string(),
            },
        ),
        PatchRule::new(
            module,
            Rewrite::ThreadOptionsIntoParse {
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
            },
        ),
        PatchRule::new(
            module,
            Rewrite::ReturnToBinding {
                function: "emitFilesAndReportErrors".to_string(),
                binding: "emitReturn".to_string(),
            },
        ),
    ]
}

/// The default rule set across all default modules.
pub fn default_rules() -> Vec<PatchRule> {
    DEFAULT_MODULES
        .iter()
        .flat_map(|m| rules_for_module(m))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_cover_all_modules() {
        let rules = default_rules();

        for module in DEFAULT_MODULES {
            let count = rules.iter().filter(|r| r.file == *module).count();
            assert_eq!(count, 5, "expected five rules for {module}");
        }
    }

    #[test]
    fn test_rules_are_file_scoped() {
        let rules = rules_for_module("typescript.js");
        assert!(rules.iter().all(|r| r.file == "typescript.js"));
    }
}
