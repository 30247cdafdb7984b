//! Filesystem operations module.
//!
//! This module provides the low-level operations used by a copy job:
//! - Chunked file transfer with progress and cancellation
//! - Creating destination directories
//! - Preserving modification times
//! - Enumerating directory trees into batch input

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use filetime::FileTime;
use tracing::warn;
use crate::error::{EngineError, FileError};

/// How a single transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// All bytes landed
    Completed { bytes: u64 },
    /// Cancel flag observed; the partial destination has been removed
    Cancelled { bytes: u64 },
}

/// Copy `src` to `dst` in chunks of at most `chunk_size` bytes.
///
/// Missing parent directories of `dst` are created first. After every chunk
/// `on_chunk(bytes_so_far, is_last_chunk)` is invoked and then `cancelled`
/// is checked; once set, both handles are closed and `dst` is deleted, even
/// if the final chunk already landed. The end of the transfer is decided by
/// EOF, not by the length reported in metadata. A zero-length source
/// produces exactly one `on_chunk(0, true)`.
///
/// # Errors
/// `DirectoryCreation` if the parent cannot be created, `SourceMissing` or
/// `Read` for source-side failures, `Write` for destination-side failures.
/// Bytes already written are left in place on error.
pub fn copy_file_chunked(
    src: &Path,
    dst: &Path,
    chunk_size: usize,
    cancelled: &AtomicBool,
    on_chunk: &mut dyn FnMut(u64, bool),
) -> Result<Transfer, FileError> {
    ensure_parent_dir_exists(dst)?;

    let mut src_file = File::open(src).map_err(|e| FileError::from_source(src.to_path_buf(), e))?;
    let mut dst_file = File::create(dst).map_err(|e| FileError::Write {
        path: dst.to_path_buf(),
        source: e,
    })?;
    let read_error = |e: io::Error| FileError::Read {
        path: src.to_path_buf(),
        source: e,
    };

    let mut buffer = vec![0u8; chunk_size.max(1)];
    // Byte read past a full chunk to confirm EOF; it leads the next chunk
    let mut lookahead: Option<u8> = None;
    let mut total: u64 = 0;

    loop {
        let mut filled = 0;
        if let Some(byte) = lookahead.take() {
            buffer[0] = byte;
            filled = 1;
        }
        filled += read_chunk(&mut src_file, &mut buffer[filled..]).map_err(read_error)?;
        dst_file.write_all(&buffer[..filled]).map_err(|e| FileError::Write {
            path: dst.to_path_buf(),
            source: e,
        })?;
        total += filled as u64;

        let is_last = if filled < buffer.len() {
            true
        } else {
            let mut next = [0u8; 1];
            match read_chunk(&mut src_file, &mut next).map_err(read_error)? {
                0 => true,
                _ => {
                    lookahead = Some(next[0]);
                    false
                }
            }
        };

        on_chunk(total, is_last);

        if cancelled.load(Ordering::SeqCst) {
            drop(src_file);
            drop(dst_file);
            remove_partial(dst);
            return Ok(Transfer::Cancelled { bytes: total });
        }
        if is_last {
            break;
        }
    }

    Ok(Transfer::Completed { bytes: total })
}

/// Fill `buffer` from `reader`; returns less than its length only at EOF.
fn read_chunk(reader: &mut impl Read, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Delete a partially written destination. Already-missing files are fine.
pub fn remove_partial(dst: &Path) {
    match fs::remove_file(dst) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dst.display(), error = %e, "failed to remove partial file"),
    }
}

/// Set the modification time of `dst`.
pub fn preserve_mtime(dst: &Path, mtime: SystemTime) -> io::Result<()> {
    filetime::set_file_mtime(dst, FileTime::from_system_time(mtime))
}

/// Create `dir` and any missing parents.
pub fn create_directory(dir: &Path) -> Result<(), FileError> {
    fs::create_dir_all(dir).map_err(|e| FileError::DirectoryCreation {
        path: dir.to_path_buf(),
        source: e,
    })
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// `DirectoryCreation` if the parent exists as a non-directory or cannot be created.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), FileError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    // Relative root
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(FileError::DirectoryCreation {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => create_directory(parent),
        Err(e) => Err(FileError::DirectoryCreation {
            path: parent.to_path_buf(),
            source: e,
        }),
    }
}

/// Enumerate a directory tree for submission as a batch.
///
/// Returns `root` followed by every entry below it in pre-order: each
/// directory precedes its contents, siblings are sorted by name. A file
/// `root` yields just itself. Unreadable subdirectories are listed but not
/// descended into.
///
/// # Errors
/// `EngineError::Enumeration` if `root` itself cannot be read.
pub fn enumerate_tree(root: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let metadata = fs::metadata(root).map_err(|e| EngineError::Enumeration {
        path: root.to_path_buf(),
        source: e,
    })?;

    let mut items = vec![root.to_path_buf()];
    if !metadata.is_dir() {
        return Ok(items);
    }

    fn recurse(dir: &Path, items: &mut Vec<PathBuf>) -> io::Result<()> {
        let mut entries = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();

        for entry in entries {
            let is_dir = fs::symlink_metadata(&entry)
                .map(|m| m.is_dir())
                .unwrap_or(false);
            items.push(entry.clone());
            if is_dir {
                if let Err(e) = recurse(&entry, items) {
                    warn!(path = %entry.display(), error = %e, "skipping unreadable directory");
                }
            }
        }
        Ok(())
    }

    recurse(root, &mut items).map_err(|e| EngineError::Enumeration {
        path: root.to_path_buf(),
        source: e,
    })?;
    Ok(items)
}
