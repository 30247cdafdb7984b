//! Destination path resolution.
//!
//! A job derives the destination of every source file in one of two ways:
//! - prefix substitution: `source_root` is replaced by `destination_root`
//!   (or, without a source root, the file's base name is placed directly
//!   under `destination_root`)
//! - a caller-supplied generator, whose output is taken as-is

use std::fmt;
use std::path::{Path, PathBuf};
use crate::error::EngineError;

/// Caller-supplied mapping from source path to destination path.
pub type PathGenerator = Box<dyn Fn(&Path) -> PathBuf + Send>;

/// How a job maps source files to destination paths.
pub enum Destination {
    Roots {
        destination_root: PathBuf,
        source_root: Option<PathBuf>,
    },
    Generator(PathGenerator),
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Roots { destination_root, source_root } => f
                .debug_struct("Roots")
                .field("destination_root", destination_root)
                .field("source_root", source_root)
                .finish(),
            Destination::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

impl Destination {
    /// Build a prefix-substitution strategy.
    ///
    /// # Errors
    /// `InvalidPath` if either root is empty, `SameRoot` if both roots
    /// point at the same directory.
    pub fn roots(destination_root: &Path, source_root: Option<&Path>) -> Result<Self, EngineError> {
        if destination_root.as_os_str().is_empty() {
            return Err(EngineError::InvalidPath {
                path: destination_root.to_path_buf(),
                reason: "Destination root is empty".to_string(),
            });
        }
        let destination_root = absolute(destination_root);

        let source_root = match source_root {
            Some(root) if root.as_os_str().is_empty() => {
                return Err(EngineError::InvalidPath {
                    path: root.to_path_buf(),
                    reason: "Source root is empty".to_string(),
                });
            }
            Some(root) => {
                let root = absolute(root);
                if root == destination_root {
                    return Err(EngineError::SameRoot { path: root });
                }
                Some(root)
            }
            None => None,
        };

        Ok(Destination::Roots {
            destination_root,
            source_root,
        })
    }

    /// Wrap a generator function.
    pub fn generator<F>(generator: F) -> Self
    where
        F: Fn(&Path) -> PathBuf + Send + 'static,
    {
        Destination::Generator(Box::new(generator))
    }

    /// Check that every file can be resolved under this strategy.
    ///
    /// Files are expected in absolute form. Missing files are accepted here;
    /// they surface later as per-file errors.
    pub fn validate(&self, files: &[PathBuf]) -> Result<(), EngineError> {
        let Destination::Roots { source_root, .. } = self else {
            return Ok(());
        };

        for file in files {
            match source_root {
                Some(root) => {
                    if !file.starts_with(root) {
                        return Err(EngineError::OutsideSourceRoot {
                            path: file.clone(),
                            root: root.clone(),
                        });
                    }
                }
                None => {
                    if file.is_dir() {
                        return Err(EngineError::DirectoryWithoutRoot { path: file.clone() });
                    }
                }
            }
        }
        Ok(())
    }

    /// Destination path for `source`.
    pub fn resolve(&self, source: &Path) -> PathBuf {
        match self {
            Destination::Roots {
                destination_root,
                source_root: Some(root),
            } => match source.strip_prefix(root) {
                Ok(relative) => destination_root.join(relative),
                Err(_) => base_name_under(destination_root, source),
            },
            Destination::Roots {
                destination_root,
                source_root: None,
            } => base_name_under(destination_root, source),
            Destination::Generator(generator) => generator(source),
        }
    }
}

fn base_name_under(destination_root: &Path, source: &Path) -> PathBuf {
    match source.file_name() {
        Some(name) => destination_root.join(name),
        None => destination_root.to_path_buf(),
    }
}

/// Absolute form of `path` without touching the filesystem.
pub(crate) fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
