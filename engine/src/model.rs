//! Core data model for copy jobs.
//!
//! This module defines the value types shared by the engine and its listeners:
//! - CopyResult: outcome of a single file attempt
//! - CopyError: a file parked in the error-pending queue with its cause
//! - CopyOptions, SimulationMode: per-job configuration
//! - BatchSummary: counters reported at the end of a run

use std::path::{Path, PathBuf};
use serde::Serialize;
use crate::error::FileError;

/// Default transfer granularity: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Default simulation speed factor.
pub const DEFAULT_SPEED_FACTOR: f64 = 1.0;

/// Outcome of a single file attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyResult {
    /// Bytes transferred, or destination directory created
    Copied,
    /// Destination already identical (length and modification time)
    Skipped,
    /// Destination exists and differs; waiting in the overwrite queue
    AlreadyExists,
    /// I/O failure; waiting in the error queue
    Error,
}

impl CopyResult {
    /// Returns true if the file now waits for a caller decision.
    pub fn needs_resolution(&self) -> bool {
        matches!(self, CopyResult::AlreadyExists | CopyResult::Error)
    }
}

impl std::fmt::Display for CopyResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CopyResult::Copied => write!(f, "Copied"),
            CopyResult::Skipped => write!(f, "Skipped"),
            CopyResult::AlreadyExists => write!(f, "AlreadyExists"),
            CopyResult::Error => write!(f, "Error"),
        }
    }
}

/// A source file that failed to copy, together with the cause.
#[derive(Debug)]
pub struct CopyError {
    /// Source file, as submitted to the job
    pub file: PathBuf,
    /// What went wrong
    pub cause: FileError,
}

impl CopyError {
    pub fn new(file: PathBuf, cause: FileError) -> Self {
        CopyError { file, cause }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn cause(&self) -> &FileError {
        &self.cause
    }
}

/// Whether bytes are really transferred or only simulated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimulationMode {
    /// Real filesystem I/O
    Off,
    /// Timer-based fabrication; `speed_factor` scales the simulated duration
    On { speed_factor: f64 },
}

impl SimulationMode {
    pub fn is_enabled(&self) -> bool {
        matches!(self, SimulationMode::On { .. })
    }
}

/// Mutable configuration of a copy job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CopyOptions {
    /// Maximum bytes moved per chunk
    pub chunk_size: usize,
    /// Real or simulated transfer
    pub simulation: SimulationMode,
}

impl Default for CopyOptions {
    fn default() -> Self {
        CopyOptions {
            chunk_size: DEFAULT_CHUNK_SIZE,
            simulation: SimulationMode::Off,
        }
    }
}

/// Counters describing the state of a job after a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Regular files copied
    pub files_copied: usize,
    /// Directories created (also counted in `copied`)
    pub dirs_created: usize,
    /// Entries in the copied list (files and directories)
    pub copied: usize,
    pub skipped: usize,
    pub overwrite_pending: usize,
    pub error_pending: usize,
    /// Files never attempted because the run was cancelled
    pub not_attempted: usize,
    pub bytes_copied: u64,
    pub cancelled: bool,
}

impl BatchSummary {
    /// Returns true if any file still waits in a resolution queue.
    pub fn needs_resolution(&self) -> bool {
        self.overwrite_pending > 0 || self.error_pending > 0
    }
}
