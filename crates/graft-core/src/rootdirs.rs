//! Output-path rewriting for merged logical source roots.
//!
//! When several declared root directories should appear merged in one
//! output tree, each emitted file's physical path is inverted back to its
//! logical source path and re-emitted as if the first matching root were
//! the sole source root.

use std::path::{Path, PathBuf};

use crate::config::CompilerOptions;

/// Declared root directories plus the common source and output
/// directories. Root order is declaration order; the first matching root
/// wins.
#[derive(Debug, Clone)]
pub struct RootDirsMapping {
    root_dirs: Vec<PathBuf>,
    common_source_dir: PathBuf,
    out_dir: PathBuf,
}

impl RootDirsMapping {
    pub fn new(
        root_dirs: Vec<PathBuf>,
        common_source_dir: PathBuf,
        out_dir: PathBuf,
    ) -> Self {
        // Relative roots are declared relative to the common source dir.
        let root_dirs = root_dirs
            .into_iter()
            .map(|r| {
                if r.is_absolute() {
                    r
                } else {
                    common_source_dir.join(r)
                }
            })
            .collect();
        Self {
            root_dirs,
            common_source_dir,
            out_dir,
        }
    }

    /// Build a mapping from compiler options, when they declare one.
    pub fn from_options(options: &CompilerOptions) -> Option<Self> {
        let root_dirs = options.root_dirs.as_ref()?;
        let common = options.root_dir.as_deref()?;
        let out_dir = options.out_dir.as_deref()?;

        Some(Self::new(
            root_dirs.iter().map(PathBuf::from).collect(),
            PathBuf::from(common),
            PathBuf::from(out_dir),
        ))
    }

    /// Rewrite one emitted file's physical output path.
    ///
    /// Inverts the source-to-output mapping to recover the logical source
    /// path, then, for the first declared root the file descends from,
    /// recomputes the output path as if that root were the sole source
    /// root. Returns `None` when the file lies under no declared root; the
    /// original path is then used unchanged.
    pub fn merged_output_path(&self, output_path: &Path) -> Option<PathBuf> {
        let relative = output_path.strip_prefix(&self.out_dir).ok()?;
        let logical = self.common_source_dir.join(relative);

        for root in &self.root_dirs {
            if let Ok(within_root) = logical.strip_prefix(root) {
                return Some(self.out_dir.join(within_root));
            }
        }
        None
    }
}
