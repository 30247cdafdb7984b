//! Conflict classification.
//!
//! Decides, before any byte is written, whether a file should be copied,
//! skipped as identical, or parked for an overwrite decision. The first
//! pass over a batch never replaces an existing destination; only a forced
//! attempt (a resolution retry) does.

use std::fs::{self, Metadata};
use std::io;
use std::path::Path;
use crate::error::FileError;

/// What to do with a file whose destination has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Destination missing, or overwrite forced
    Copy,
    /// Destination is a directory or has the same length and mtime
    Skip,
    /// Destination exists and differs
    Conflict,
}

/// Classify `destination` against the source metadata.
///
/// # Errors
/// `FileError::Inspect` if the destination exists but its metadata cannot be read.
pub fn classify(source: &Metadata, destination: &Path, overwrite: bool) -> Result<Classification, FileError> {
    if overwrite {
        return Ok(Classification::Copy);
    }

    match fs::metadata(destination) {
        Ok(existing) => {
            if existing.is_dir() || is_identical(source, &existing) {
                Ok(Classification::Skip)
            } else {
                Ok(Classification::Conflict)
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Classification::Copy),
        // A file sits where an ancestor directory should be; the transfer reports it
        Err(_) if blocked_by_file(destination) => Ok(Classification::Copy),
        Err(e) => Err(FileError::Inspect {
            path: destination.to_path_buf(),
            source: e,
        }),
    }
}

fn blocked_by_file(path: &Path) -> bool {
    path.ancestors()
        .skip(1)
        .any(|ancestor| fs::metadata(ancestor).is_ok_and(|m| !m.is_dir()))
}

/// Same length and same modification time. Unknown mtimes never match.
pub fn is_identical(source: &Metadata, destination: &Metadata) -> bool {
    if source.len() != destination.len() {
        return false;
    }
    match (source.modified(), destination.modified()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
