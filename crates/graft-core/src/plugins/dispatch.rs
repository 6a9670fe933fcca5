//! Dispatch of plugin exports by their declared pattern.
//!
//! A plugin export is a closed set of calling conventions. The descriptor's
//! explicit `type` discriminant selects the convention; the shape of the
//! export is never inspected to guess one. A mismatch between the two is a
//! configuration error, not a fallback.

use serde_json::Value;
use std::sync::Arc;

use super::error::{BoxError, PluginError, Result};
use crate::config::{CompilerOptions, PluginConfig, PluginType};
use crate::diagnostics::DiagnosticsAccessor;
use crate::program::{
    CompilerHost, LanguageService, NodeTransformer, Program, TransformContext, TransformerPlugin,
    TransformerResult, TypeChecker,
};

pub type RawFactoryFn =
    dyn Fn(&TransformContext, &Program, &Value) -> std::result::Result<NodeTransformer, BoxError>
        + Send
        + Sync;

pub type ProgramFactoryFn =
    dyn Fn(&Program, &Value, &PluginExtras) -> std::result::Result<TransformerResult, BoxError>
        + Send
        + Sync;

pub type ConfigFactoryFn =
    dyn Fn(&Value) -> std::result::Result<TransformerPlugin, BoxError> + Send + Sync;

pub type CompilerOptionsFactoryFn =
    dyn Fn(&CompilerOptions, &Value) -> std::result::Result<TransformerPlugin, BoxError>
        + Send
        + Sync;

pub type CheckerFactoryFn =
    dyn Fn(&TypeChecker, &Value) -> std::result::Result<TransformerPlugin, BoxError> + Send + Sync;

pub type LsFactoryFn = dyn Fn(&LanguageService, &Value) -> std::result::Result<TransformerPlugin, BoxError>
    + Send
    + Sync;

pub type ProgramTransformerFn = dyn Fn(
        Program,
        Option<&dyn CompilerHost>,
        &Value,
        &PluginExtras,
    ) -> std::result::Result<Program, BoxError>
    + Send
    + Sync;

/// Extras handed to `program`-pattern plugins and program transformers:
/// which compiler instance is active plus diagnostics accessors bound to
/// the current program.
#[derive(Clone)]
pub struct PluginExtras {
    pub compiler_version: String,
    pub diagnostics: DiagnosticsAccessor,
}

impl PluginExtras {
    pub fn new(compiler_version: impl Into<String>, diagnostics: DiagnosticsAccessor) -> Self {
        Self {
            compiler_version: compiler_version.into(),
            diagnostics,
        }
    }
}

/// A plugin module export, tagged by the calling convention it implements.
pub enum PluginEntry {
    Raw(Box<RawFactoryFn>),
    Program(Box<ProgramFactoryFn>),
    Config(Box<ConfigFactoryFn>),
    CompilerOptions(Box<CompilerOptionsFactoryFn>),
    Checker(Box<CheckerFactoryFn>),
    LanguageService(Box<LsFactoryFn>),
    ProgramTransformer(Arc<ProgramTransformerFn>),
}

impl PluginEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            PluginEntry::Raw(_) => "raw",
            PluginEntry::Program(_) => "program",
            PluginEntry::Config(_) => "config",
            PluginEntry::CompilerOptions(_) => "compilerOptions",
            PluginEntry::Checker(_) => "checker",
            PluginEntry::LanguageService(_) => "ls",
            PluginEntry::ProgramTransformer(_) => "transformProgram",
        }
    }
}

/// Everything an invocation may need, borrowed from the orchestrator.
pub struct DispatchContext<'a> {
    pub program: &'a Program,
    pub transform_context: &'a TransformContext,
    pub extras: &'a PluginExtras,
}

/// Normalized outcome of invoking one descriptor's export.
pub enum Dispatched {
    /// A node transformer to route directly (raw pattern).
    Node(NodeTransformer),
    /// A bare factory or grouped plugin (program pattern).
    Result(TransformerResult),
    /// A grouped plugin (config, compilerOptions, checker, ls patterns).
    Plugin(TransformerPlugin),
    /// A whole-program chain link; invoked later, in chain order.
    ProgramLink(Arc<ProgramTransformerFn>),
}

impl std::fmt::Debug for Dispatched {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dispatched::Node(_) => "Node",
            Dispatched::Result(_) => "Result",
            Dispatched::Plugin(_) => "Plugin",
            Dispatched::ProgramLink(_) => "ProgramLink",
        };
        f.debug_tuple(name).finish()
    }
}

/// Invoke `entry` with exactly the argument tuple the descriptor's
/// discriminant selects.
pub fn dispatch(
    config: &PluginConfig,
    entry: &PluginEntry,
    ctx: &DispatchContext<'_>,
) -> Result<Dispatched> {
    let plugin = config.display_name().to_string();
    let options = config.options_value();

    let mismatch = |declared: &str| PluginError::DispatchMismatch {
        plugin: plugin.clone(),
        declared: declared.to_string(),
        found: entry.kind().to_string(),
    };
    let factory_err = |source: BoxError| PluginError::Factory {
        plugin: plugin.clone(),
        source,
    };

    if config.transform_program {
        return match entry {
            PluginEntry::ProgramTransformer(f) => Ok(Dispatched::ProgramLink(f.clone())),
            _ => Err(mismatch("transformProgram")),
        };
    }

    match config.dispatch_type() {
        PluginType::Raw => match entry {
            PluginEntry::Raw(f) => f(ctx.transform_context, ctx.program, &options)
                .map(Dispatched::Node)
                .map_err(factory_err),
            _ => Err(mismatch("raw")),
        },
        PluginType::Program => match entry {
            PluginEntry::Program(f) => f(ctx.program, &options, ctx.extras)
                .map(Dispatched::Result)
                .map_err(factory_err),
            _ => Err(mismatch("program")),
        },
        PluginType::Config => match entry {
            PluginEntry::Config(f) => f(&options).map(Dispatched::Plugin).map_err(factory_err),
            _ => Err(mismatch("config")),
        },
        PluginType::CompilerOptions => match entry {
            PluginEntry::CompilerOptions(f) => f(ctx.program.options(), &options)
                .map(Dispatched::Plugin)
                .map_err(factory_err),
            _ => Err(mismatch("compilerOptions")),
        },
        PluginType::Checker => match entry {
            PluginEntry::Checker(f) => f(&ctx.program.type_checker(), &options)
                .map(Dispatched::Plugin)
                .map_err(factory_err),
            _ => Err(mismatch("checker")),
        },
        PluginType::Ls => match entry {
            PluginEntry::LanguageService(f) => f(&ctx.program.language_service(), &options)
                .map(Dispatched::Plugin)
                .map_err(factory_err),
            _ => Err(mismatch("ls")),
        },
    }
}
