//! Error types for the copy engine.
//!
//! Two levels exist:
//! - `EngineError`: argument violations detected when a job is constructed.
//!   These prevent the job from running at all.
//! - `FileError`: the cause recorded against a single file in the
//!   error-pending queue. A `FileError` never aborts the batch.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that prevent a copy job from being created.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Path is empty or otherwise unusable
    #[error("Invalid path: {} ({reason})", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// Destination root and source root are the same directory
    #[error("Destination root is the same as source root: {}", path.display())]
    SameRoot { path: PathBuf },

    /// A file in the batch is not located under the declared source root
    #[error("{} is not under source root {}", path.display(), root.display())]
    OutsideSourceRoot { path: PathBuf, root: PathBuf },

    /// Directories need a source root to derive their destination
    #[error("Directory given without a source root: {}", path.display())]
    DirectoryWithoutRoot { path: PathBuf },

    /// Failed to enumerate a directory tree
    #[error("Failed to enumerate directory: {}", path.display())]
    Enumeration {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The cause stored for a file that landed in the error-pending queue.
#[derive(Debug, Error)]
pub enum FileError {
    /// Source vanished between enumeration and the copy attempt
    #[error("Source file not found: {}", path.display())]
    SourceMissing { path: PathBuf },

    /// Could not create the destination directory or its parents
    #[error("Failed to create directory: {}", path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read from the source file
    #[error("Failed to read file: {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write to the destination file
    #[error("Failed to write file: {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Metadata of the source or destination could not be read
    #[error("Failed to inspect: {}", path.display())]
    Inspect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FileError {
    /// Path the failure refers to (source or destination side).
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::SourceMissing { path }
            | Self::DirectoryCreation { path, .. }
            | Self::Read { path, .. }
            | Self::Write { path, .. }
            | Self::Inspect { path, .. } => path,
        }
    }

    /// Underlying I/O error kind, if any.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::SourceMissing { .. } => io::ErrorKind::NotFound,
            Self::DirectoryCreation { source, .. }
            | Self::Read { source, .. }
            | Self::Write { source, .. }
            | Self::Inspect { source, .. } => source.kind(),
        }
    }

    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::SourceMissing { .. } => None,
            Self::DirectoryCreation { source, .. }
            | Self::Read { source, .. }
            | Self::Write { source, .. }
            | Self::Inspect { source, .. } => source.raw_os_error(),
        }
    }

    /// Classify an error from opening or reading the source.
    pub(crate) fn from_source(path: PathBuf, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::SourceMissing { path }
        } else {
            Self::Read { path, source: err }
        }
    }
}
