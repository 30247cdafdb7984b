//! # fcopy Engine - Batch File Copy Library
//!
//! A headless batch copy engine with interactive conflict resolution.
//! Designed as the foundation for multiple front ends (CLI, GUI, automation).
//!
//! ## Overview
//!
//! A job takes an ordered list of source files and copies each into a
//! destination. Files that cannot be completed automatically are parked in
//! one of two queues for the caller to decide:
//! - overwrite-pending: the destination exists and differs
//! - error-pending: the copy failed (missing source, I/O error)
//!
//! Features:
//! - Destination paths by prefix substitution or a caller-supplied generator
//! - Length/mtime skip heuristic; the first pass never overwrites
//! - Chunked transfer with byte-level progress
//! - Cooperative cancellation from another thread
//! - Simulation mode for exercising front ends without disk I/O
//!
//! ## Basic Usage
//!
//! ```no_run
//! use fcopy_engine::CopyJob;
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let files = vec![PathBuf::from("/data/src/a.txt"), PathBuf::from("/data/src/b.txt")];
//! let mut job = CopyJob::with_roots(files, "/backup", Some(Path::new("/data/src")))?;
//!
//! // Blocking; run it on a worker thread in interactive programs
//! job.copy();
//!
//! // Decide what could not be copied outright
//! for file in job.overwrite_pending().to_vec() {
//!     job.resolve_overwrite(&file, true);
//! }
//! for file in job.error_pending().iter().map(|e| e.file.clone()).collect::<Vec<_>>() {
//!     job.resolve_error(&file, false);
//! }
//!
//! println!("{:?}", job.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Value types (CopyResult, CopyError, options, summary)
//! - **error**: Construction and per-file error types
//! - **destination**: Destination path resolution
//! - **classify**: Pre-copy conflict classification
//! - **fs_ops**: Chunked transfer and filesystem helpers
//! - **simulation**: Timed stand-in for the transfer
//! - **progress**: Listener traits and the channel adapter
//! - **job**: The copy job itself

pub mod model;
pub mod error;
pub mod destination;
pub mod classify;
pub mod fs_ops;
pub mod simulation;
pub mod progress;
pub mod job;

// Re-export main types and functions
pub use model::{BatchSummary, CopyError, CopyOptions, CopyResult, SimulationMode, DEFAULT_CHUNK_SIZE};
pub use error::{EngineError, FileError};
pub use destination::{Destination, PathGenerator};
pub use fs_ops::{copy_file_chunked, enumerate_tree, Transfer};
pub use progress::{ChannelListener, CopyEvent, CopyListener, ProgressListener};
pub use job::{CancelHandle, CopyJob};
