//! Resolution of the installed host compiler package.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::error::{LoaderError, Result};

/// Major versions of the host compiler the patch rules are known to fit.
pub const SUPPORTED_MAJORS: std::ops::RangeInclusive<u32> = 4..=5;

/// The installed compiler package on disk.
#[derive(Debug, Clone)]
pub struct ResolvedCompiler {
    /// Package root (the directory containing `package.json`).
    pub root: PathBuf,
    /// Directory the distributed modules live in.
    pub lib_dir: PathBuf,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    name: String,
    version: String,
}

/// Resolve a compiler package rooted at `dir`.
pub fn resolve_compiler(dir: &Path) -> Result<ResolvedCompiler> {
    let manifest_path = dir.join("package.json");
    if !manifest_path.exists() {
        return Err(LoaderError::CompilerNotFound {
            path: dir.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(&manifest_path)?;
    let manifest: PackageManifest =
        serde_json::from_str(&content).map_err(|e| LoaderError::InvalidPackage {
            path: manifest_path,
            message: e.to_string(),
        })?;

    let lib_dir = dir.join("lib");
    let lib_dir = if lib_dir.is_dir() {
        lib_dir
    } else {
        dir.to_path_buf()
    };

    Ok(ResolvedCompiler {
        root: dir.to_path_buf(),
        lib_dir,
        name: manifest.name,
        version: manifest.version,
    })
}

/// Verify the compiler version is one the patch rules support.
///
/// This runs before any patching is attempted: an unsupported installation
/// must fail descriptively, not structurally.
pub fn check_version(version: &str) -> Result<()> {
    let major = version
        .split('.')
        .next()
        .and_then(|m| m.parse::<u32>().ok());

    match major {
        Some(major) if SUPPORTED_MAJORS.contains(&major) => Ok(()),
        _ => Err(LoaderError::UnsupportedVersion {
            found: version.to_string(),
            supported: format!(
                "{}-{}",
                SUPPORTED_MAJORS.start(),
                SUPPORTED_MAJORS.end()
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_package(dir: &Path, name: &str, version: &str) {
        std::fs::write(
            dir.join("package.json"),
            format!(r#"{{ "name": "{name}", "version": "{version}" }}"#),
        )
        .unwrap();
    }

    #[test]
    fn test_resolve_compiler_reads_manifest() {
        let dir = TempDir::new().unwrap();
        write_package(dir.path(), "typescript", "5.4.2");
        std::fs::create_dir(dir.path().join("lib")).unwrap();

        let resolved = resolve_compiler(dir.path()).unwrap();

        assert_eq!(resolved.name, "typescript");
        assert_eq!(resolved.version, "5.4.2");
        assert_eq!(resolved.lib_dir, dir.path().join("lib"));
    }

    #[test]
    fn test_resolve_compiler_without_lib_dir() {
        let dir = TempDir::new().unwrap();
        write_package(dir.path(), "typescript", "4.9.5");

        let resolved = resolve_compiler(dir.path()).unwrap();
        assert_eq!(resolved.lib_dir, dir.path());
    }

    #[test]
    fn test_missing_package_is_surfaced() {
        let dir = TempDir::new().unwrap();
        let err = resolve_compiler(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, LoaderError::CompilerNotFound { .. }));
    }

    #[test]
    fn test_version_check() {
        assert!(check_version("4.0.0").is_ok());
        assert!(check_version("5.4.2").is_ok());

        let err = check_version("3.9.10").unwrap_err();
        match err {
            LoaderError::UnsupportedVersion { found, .. } => assert_eq!(found, "3.9.10"),
            other => panic!("unexpected error: {other}"),
        }

        assert!(check_version("6.0.0").is_err());
        assert!(check_version("not-a-version").is_err());
    }
}
