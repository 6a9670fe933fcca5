use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use graft_core::loader::{check_version, resolve_compiler, PatchCache};
use graft_core::patch::{apply_rules, is_patched, rules_for_module, DEFAULT_MODULES, PATCH_VERSION};

/// Graft - patch an installed compiler with transformer plugin support
#[derive(Parser, Debug)]
#[command(name = "graft")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Patch the installed compiler in place (idempotent)
    Install {
        /// Compiler package directory
        #[arg(long, value_name = "DIR", default_value = "node_modules/typescript")]
        dir: PathBuf,

        /// Modules to patch (comma-separated)
        #[arg(long, value_name = "MODULES", value_delimiter = ',')]
        modules: Vec<String>,
    },

    /// Restore the original compiler modules from their backups
    Uninstall {
        #[arg(long, value_name = "DIR", default_value = "node_modules/typescript")]
        dir: PathBuf,

        #[arg(long, value_name = "MODULES", value_delimiter = ',')]
        modules: Vec<String>,
    },

    /// Report patch status per module
    Check {
        #[arg(long, value_name = "DIR", default_value = "node_modules/typescript")]
        dir: PathBuf,

        /// Modules to check (defaults to the standard set)
        #[arg(value_name = "MODULE")]
        modules: Vec<String>,
    },

    /// Purge the patched-artifact cache
    ClearCache,
}

fn main() -> Result<()> {
    // Set RUST_LOG=debug for detailed logs.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Install { dir, modules } => install(&dir, &module_list(modules)),
        Commands::Uninstall { dir, modules } => uninstall(&dir, &module_list(modules)),
        Commands::Check { dir, modules } => check(&dir, &module_list(modules)),
        Commands::ClearCache => clear_cache(),
    }
}

fn module_list(modules: Vec<String>) -> Vec<String> {
    if modules.is_empty() {
        DEFAULT_MODULES.iter().map(|m| m.to_string()).collect()
    } else {
        modules
    }
}

fn backup_path(module_path: &Path) -> PathBuf {
    let file_name = module_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    module_path.with_file_name(format!("{file_name}.orig"))
}

fn install(dir: &Path, modules: &[String]) -> Result<()> {
    let resolved = resolve_compiler(dir)?;
    check_version(&resolved.version)?;
    info!(
        "patching {} {} in {}",
        resolved.name,
        resolved.version,
        resolved.root.display()
    );

    for module in modules {
        let path = resolved.lib_dir.join(module);
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read module {}", path.display()))?;

        match is_patched(&source) {
            Some(version) if version == PATCH_VERSION => {
                println!("{module}: already patched ({version})");
            }
            Some(version) => {
                // Out of date: re-patch from the pristine backup.
                let backup = backup_path(&path);
                let original = std::fs::read_to_string(&backup).with_context(|| {
                    format!("{module} is patched with {version} but its backup is missing")
                })?;
                patch_in_place(module, &path, &original)?;
                println!("{module}: re-patched ({version} -> {PATCH_VERSION})");
            }
            None => {
                let backup = backup_path(&path);
                std::fs::write(&backup, &source)
                    .with_context(|| format!("cannot write backup {}", backup.display()))?;
                patch_in_place(module, &path, &source)?;
                println!("{module}: patched ({PATCH_VERSION})");
            }
        }
    }
    Ok(())
}

fn patch_in_place(module: &str, path: &Path, source: &str) -> Result<()> {
    let rules = rules_for_module(module);
    let patched = apply_rules(module, source, &rules)
        .with_context(|| format!("failed to patch {module}"))?;
    std::fs::write(path, patched)
        .with_context(|| format!("cannot write patched module {}", path.display()))?;
    Ok(())
}

fn uninstall(dir: &Path, modules: &[String]) -> Result<()> {
    let resolved = resolve_compiler(dir)?;

    for module in modules {
        let path = resolved.lib_dir.join(module);
        let backup = backup_path(&path);

        if backup.is_file() {
            let original = std::fs::read_to_string(&backup)
                .with_context(|| format!("cannot read backup {}", backup.display()))?;
            std::fs::write(&path, original)
                .with_context(|| format!("cannot restore module {}", path.display()))?;
            std::fs::remove_file(&backup)?;
            println!("{module}: restored");
            continue;
        }

        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read module {}", path.display()))?;
        if is_patched(&source).is_some() {
            bail!("{module} is patched but its backup is missing; reinstall the compiler package");
        }
        println!("{module}: not patched");
    }
    Ok(())
}

fn check(dir: &Path, modules: &[String]) -> Result<()> {
    let resolved = resolve_compiler(dir)?;

    for module in modules {
        let path = resolved.lib_dir.join(module);
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read module {}", path.display()))?;

        match is_patched(&source) {
            Some(version) if version == PATCH_VERSION => {
                println!("{module}: patched ({version})");
            }
            Some(version) => {
                println!("{module}: out of date ({version}, current {PATCH_VERSION})");
            }
            None => println!("{module}: unpatched"),
        }
    }
    Ok(())
}

fn clear_cache() -> Result<()> {
    let mut cache = PatchCache::in_temp_dir();
    cache
        .clear()
        .with_context(|| format!("cannot clear cache at {}", cache.cache_dir().display()))?;
    println!("cache cleared: {}", cache.cache_dir().display());
    Ok(())
}
