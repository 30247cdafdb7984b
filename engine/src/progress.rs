//! Event notification.
//!
//! Two independent subscription points decouple the engine from whatever
//! presents its progress:
//! - `CopyListener`: coarse-grained (file starting, file finished, batch complete)
//! - `ProgressListener`: fine-grained byte progress within a file
//!
//! A consumer registers only the kinds it cares about. `ChannelListener`
//! implements both and forwards typed `CopyEvent`s over a channel, for
//! consumers living on another thread.
//!
//! All methods are called synchronously on the thread running the job.

use std::path::{Path, PathBuf};
use crossbeam_channel::Sender;
use crate::model::CopyResult;

/// Coarse-grained notifications, one per file plus one per run.
pub trait CopyListener: Send + Sync {
    /// Called before a file is classified and copied.
    fn on_file_starting(&self, source: &Path, destination: &Path);

    /// Called once the file has an outcome. Not called when a file is
    /// interrupted by cancellation.
    fn on_file_finished(&self, source: &Path, destination: &Path, result: CopyResult);

    /// Called at the end of `copy()` and of every resolution call.
    fn on_batch_complete(&self, needs_resolution: bool, was_cancelled: bool);
}

/// Fine-grained notifications, once per transferred chunk.
pub trait ProgressListener: Send + Sync {
    /// `bytes_transferred` is cumulative for the current file.
    fn on_progress(&self, source: &Path, destination: &Path, bytes_transferred: u64, is_complete: bool);
}

/// Owned form of every notification, for channel delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum CopyEvent {
    FileStarting {
        source: PathBuf,
        destination: PathBuf,
    },
    FileFinished {
        source: PathBuf,
        destination: PathBuf,
        result: CopyResult,
    },
    Progress {
        source: PathBuf,
        destination: PathBuf,
        bytes_transferred: u64,
        is_complete: bool,
    },
    BatchComplete {
        needs_resolution: bool,
        was_cancelled: bool,
    },
}

/// Forwards notifications to a channel. Send errors (receiver dropped) are ignored.
pub struct ChannelListener {
    sender: Sender<CopyEvent>,
}

impl ChannelListener {
    pub fn new(sender: Sender<CopyEvent>) -> Self {
        ChannelListener { sender }
    }
}

impl CopyListener for ChannelListener {
    fn on_file_starting(&self, source: &Path, destination: &Path) {
        let _ = self.sender.send(CopyEvent::FileStarting {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
        });
    }

    fn on_file_finished(&self, source: &Path, destination: &Path, result: CopyResult) {
        let _ = self.sender.send(CopyEvent::FileFinished {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            result,
        });
    }

    fn on_batch_complete(&self, needs_resolution: bool, was_cancelled: bool) {
        let _ = self.sender.send(CopyEvent::BatchComplete {
            needs_resolution,
            was_cancelled,
        });
    }
}

impl ProgressListener for ChannelListener {
    fn on_progress(&self, source: &Path, destination: &Path, bytes_transferred: u64, is_complete: bool) {
        let _ = self.sender.send(CopyEvent::Progress {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            bytes_transferred,
            is_complete,
        });
    }
}
