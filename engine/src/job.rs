//! Job orchestration module.
//!
//! A `CopyJob` owns one batch of source files and everything that happens to
//! them:
//! - the first pass (`copy`), which copies, skips, or parks every file
//! - the resolution calls that take files out of the two queues again
//! - cancellation, shared with other threads through `CancelHandle`
//!
//! The job is single-threaded. `copy` blocks until the batch is done or the
//! cancel flag is observed, and is meant to run on a worker thread while
//! another thread holds a `CancelHandle`.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;
use crate::classify::{classify, Classification};
use crate::destination::{absolute, Destination};
use crate::error::{EngineError, FileError};
use crate::fs_ops::{self, Transfer};
use crate::model::{BatchSummary, CopyError, CopyOptions, CopyResult, SimulationMode};
use crate::progress::{CopyListener, ProgressListener};
use crate::simulation;

/// Cloneable, thread-safe trigger for a job's cancel flag.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Request cancellation. Idempotent; safe after the job finished.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Queues and result lists of one batch.
#[derive(Debug, Default)]
struct BatchState {
    pending: VecDeque<PathBuf>,
    overwrite_pending: Vec<PathBuf>,
    error_pending: Vec<CopyError>,
    skipped: Vec<PathBuf>,
    copied: Vec<PathBuf>,
    dirs_created: usize,
    bytes_copied: u64,
}

impl BatchState {
    fn new(files: Vec<PathBuf>) -> Self {
        BatchState {
            pending: files.into(),
            ..Default::default()
        }
    }
}

/// What happened to a single attempt. Every variant except `Cancelled`
/// maps to exactly one list.
#[derive(Debug)]
enum Outcome {
    Copied { bytes: u64, is_dir: bool },
    Skipped,
    AlreadyExists,
    Failed(FileError),
    Cancelled,
}

/// A batch of files to copy, with its resolution queues.
pub struct CopyJob {
    id: Uuid,
    destination: Destination,
    options: CopyOptions,
    state: BatchState,
    cancelled: Arc<AtomicBool>,
    copy_listeners: Vec<Arc<dyn CopyListener>>,
    progress_listeners: Vec<Arc<dyn ProgressListener>>,
}

impl CopyJob {
    /// Create a job that places files under `destination_root`.
    ///
    /// With a `source_root`, every file must live under it and keeps its
    /// relative path. Without one, only plain files are accepted and each
    /// lands as `destination_root/<base name>`.
    ///
    /// # Errors
    /// Returns EngineError if the roots are invalid, a file lies outside the
    /// source root, or a directory is given without a source root.
    pub fn with_roots(
        files: Vec<PathBuf>,
        destination_root: impl AsRef<Path>,
        source_root: Option<&Path>,
    ) -> Result<Self, EngineError> {
        let destination = Destination::roots(destination_root.as_ref(), source_root)?;
        Self::new(files, destination)
    }

    /// Create a job whose destinations come from `generator`.
    pub fn with_generator<F>(files: Vec<PathBuf>, generator: F) -> Result<Self, EngineError>
    where
        F: Fn(&Path) -> PathBuf + Send + 'static,
    {
        Self::new(files, Destination::generator(generator))
    }

    fn new(files: Vec<PathBuf>, destination: Destination) -> Result<Self, EngineError> {
        let files = normalize(files);
        destination.validate(&files)?;

        Ok(CopyJob {
            id: Uuid::new_v4(),
            destination,
            options: CopyOptions::default(),
            state: BatchState::new(files),
            cancelled: Arc::new(AtomicBool::new(false)),
            copy_listeners: Vec::new(),
            progress_listeners: Vec::new(),
        })
    }

    /// Start over with a new batch. Clears every list and the cancel flag;
    /// keeps listeners, destination strategy and options.
    ///
    /// # Errors
    /// Same validation as construction; on error the job is left unchanged.
    pub fn reset(&mut self, files: Vec<PathBuf>) -> Result<(), EngineError> {
        let files = normalize(files);
        self.destination.validate(&files)?;
        self.state = BatchState::new(files);
        self.cancelled.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn options(&self) -> &CopyOptions {
        &self.options
    }

    /// Set the transfer granularity. Zero is treated as one byte.
    pub fn set_chunk_size(&mut self, bytes: usize) {
        self.options.chunk_size = bytes.max(1);
    }

    /// Replace real transfers with timed fabrication.
    pub fn enable_simulation(&mut self, speed_factor: Option<f64>) {
        self.options.simulation = SimulationMode::On {
            speed_factor: simulation::sanitize_speed_factor(speed_factor),
        };
    }

    pub fn disable_simulation(&mut self) {
        self.options.simulation = SimulationMode::Off;
    }

    pub fn add_copy_listener(&mut self, listener: Arc<dyn CopyListener>) {
        self.copy_listeners.push(listener);
    }

    pub fn add_progress_listener(&mut self, listener: Arc<dyn ProgressListener>) {
        self.progress_listeners.push(listener);
    }

    /// Handle for cancelling this job from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancelled),
        }
    }

    /// Request cancellation of the running pass.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run the first pass over every pending file.
    ///
    /// Per-file failures never stop the loop. Returns once the pending list
    /// is empty or the cancel flag is observed; files not reached stay in
    /// `pending()`.
    pub fn copy(&mut self) {
        let span = info_span!("copy", job = %self.id);
        let _enter = span.enter();
        info!(files = self.state.pending.len(), "batch started");

        while !self.is_cancelled() {
            let Some(file) = self.state.pending.pop_front() else {
                break;
            };
            self.copy_file(file, false);
        }

        self.finish_run();
    }

    /// Decide a file in the overwrite queue.
    ///
    /// Returns false (and does nothing) if `file` is not queued. Otherwise
    /// removes it; with `overwrite` the file is copied once more, replacing
    /// the destination, without it the file is dropped.
    pub fn resolve_overwrite(&mut self, file: &Path, overwrite: bool) -> bool {
        let file = absolute(file);
        let Some(index) = self.state.overwrite_pending.iter().position(|f| *f == file) else {
            debug!(file = %file.display(), "not in overwrite queue");
            return false;
        };
        let file = self.state.overwrite_pending.remove(index);

        let span = info_span!("resolve_overwrite", job = %self.id);
        let _enter = span.enter();
        self.cancelled.store(false, Ordering::SeqCst);

        if overwrite {
            self.copy_file(file, true);
        } else {
            debug!(file = %file.display(), "overwrite declined");
        }
        self.finish_run();
        true
    }

    /// Decide a file in the error queue.
    ///
    /// Returns false (and does nothing) if `file` is not queued. Otherwise
    /// removes it; with `retry` the copy is attempted once more, replacing
    /// any partial destination, without it the file is dropped.
    pub fn resolve_error(&mut self, file: &Path, retry: bool) -> bool {
        let file = absolute(file);
        let Some(index) = self.state.error_pending.iter().position(|e| e.file == file) else {
            debug!(file = %file.display(), "not in error queue");
            return false;
        };
        let error = self.state.error_pending.remove(index);

        let span = info_span!("resolve_error", job = %self.id);
        let _enter = span.enter();
        self.cancelled.store(false, Ordering::SeqCst);

        if retry {
            self.copy_file(error.file, true);
        } else {
            debug!(file = %error.file.display(), "error discarded");
        }
        self.finish_run();
        true
    }

    /// Files not yet attempted.
    pub fn pending(&self) -> &VecDeque<PathBuf> {
        &self.state.pending
    }

    /// Files and directories copied, in completion order.
    pub fn copied(&self) -> &[PathBuf] {
        &self.state.copied
    }

    pub fn skipped(&self) -> &[PathBuf] {
        &self.state.skipped
    }

    pub fn overwrite_pending(&self) -> &[PathBuf] {
        &self.state.overwrite_pending
    }

    pub fn error_pending(&self) -> &[CopyError] {
        &self.state.error_pending
    }

    /// Cause stored for `file`, if it is in the error queue.
    pub fn error_cause(&self, file: &Path) -> Option<&FileError> {
        let file = absolute(file);
        self.state
            .error_pending
            .iter()
            .find(|e| e.file == file)
            .map(|e| &e.cause)
    }

    /// Destination the job would use for `file`.
    pub fn destination_of(&self, file: &Path) -> PathBuf {
        self.destination.resolve(&absolute(file))
    }

    /// Returns true if either queue still holds files.
    pub fn needs_resolution(&self) -> bool {
        !self.state.overwrite_pending.is_empty() || !self.state.error_pending.is_empty()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            files_copied: self.state.copied.len().saturating_sub(self.state.dirs_created),
            dirs_created: self.state.dirs_created,
            copied: self.state.copied.len(),
            skipped: self.state.skipped.len(),
            overwrite_pending: self.state.overwrite_pending.len(),
            error_pending: self.state.error_pending.len(),
            not_attempted: self.state.pending.len(),
            bytes_copied: self.state.bytes_copied,
            cancelled: self.is_cancelled(),
        }
    }

    /// Attempt one file and file the outcome.
    fn copy_file(&mut self, file: PathBuf, overwrite: bool) {
        let destination = self.destination.resolve(&file);
        for listener in &self.copy_listeners {
            listener.on_file_starting(&file, &destination);
        }

        let outcome = self.attempt(&file, &destination, overwrite);
        self.record(file, destination, outcome);
    }

    fn attempt(&self, source: &Path, destination: &Path, overwrite: bool) -> Outcome {
        let source_meta = match fs::metadata(source) {
            Ok(meta) => meta,
            Err(e) => return Outcome::Failed(FileError::from_source(source.to_path_buf(), e)),
        };

        match classify(&source_meta, destination, overwrite) {
            Ok(Classification::Copy) => {}
            Ok(Classification::Skip) => return Outcome::Skipped,
            Ok(Classification::Conflict) => return Outcome::AlreadyExists,
            Err(e) => return Outcome::Failed(e),
        }

        let simulated = self.options.simulation.is_enabled();

        if source_meta.is_dir() {
            if !simulated {
                if let Err(e) = fs_ops::create_directory(destination) {
                    return Outcome::Failed(e);
                }
            }
            return Outcome::Copied { bytes: 0, is_dir: true };
        }

        let mut on_chunk = |bytes: u64, is_last: bool| {
            for listener in &self.progress_listeners {
                listener.on_progress(source, destination, bytes, is_last);
            }
        };

        let transfer = match self.options.simulation {
            SimulationMode::On { speed_factor } => Ok(simulation::simulate_transfer(
                source_meta.len(),
                speed_factor,
                &self.cancelled,
                &mut on_chunk,
            )),
            SimulationMode::Off => fs_ops::copy_file_chunked(
                source,
                destination,
                self.options.chunk_size,
                &self.cancelled,
                &mut on_chunk,
            ),
        };

        match transfer {
            Ok(Transfer::Completed { bytes }) => {
                if !simulated {
                    if let Ok(mtime) = source_meta.modified() {
                        if let Err(e) = fs_ops::preserve_mtime(destination, mtime) {
                            warn!(path = %destination.display(), error = %e, "failed to preserve modification time");
                        }
                    }
                }
                Outcome::Copied { bytes, is_dir: false }
            }
            Ok(Transfer::Cancelled { bytes }) => {
                debug!(file = %source.display(), bytes, "transfer cancelled");
                Outcome::Cancelled
            }
            Err(e) => Outcome::Failed(e),
        }
    }

    fn record(&mut self, file: PathBuf, destination: PathBuf, outcome: Outcome) {
        let result = match outcome {
            Outcome::Copied { bytes, is_dir } => {
                if is_dir {
                    self.state.dirs_created += 1;
                }
                self.state.bytes_copied += bytes;
                self.state.copied.push(file.clone());
                CopyResult::Copied
            }
            Outcome::Skipped => {
                self.state.skipped.push(file.clone());
                CopyResult::Skipped
            }
            Outcome::AlreadyExists => {
                self.state.overwrite_pending.push(file.clone());
                CopyResult::AlreadyExists
            }
            Outcome::Failed(cause) => {
                debug!(file = %file.display(), error = %cause, "copy failed");
                self.state.error_pending.push(CopyError::new(file.clone(), cause));
                CopyResult::Error
            }
            Outcome::Cancelled => return,
        };

        debug!(file = %file.display(), %result, "file finished");
        for listener in &self.copy_listeners {
            listener.on_file_finished(&file, &destination, result);
        }
    }

    fn finish_run(&self) {
        let needs_resolution = self.needs_resolution();
        let was_cancelled = self.is_cancelled();
        info!(
            copied = self.state.copied.len(),
            skipped = self.state.skipped.len(),
            overwrite_pending = self.state.overwrite_pending.len(),
            error_pending = self.state.error_pending.len(),
            cancelled = was_cancelled,
            "batch complete"
        );
        for listener in &self.copy_listeners {
            listener.on_batch_complete(needs_resolution, was_cancelled);
        }
    }
}

fn normalize(files: Vec<PathBuf>) -> Vec<PathBuf> {
    files.into_iter().map(|f| absolute(&f)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::sync::Mutex;

    // Test helper: records every notification as a string
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Recorder {
                calls: Mutex::new(Vec::new()),
            })
        }

        fn get_calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.get_calls().iter().filter(|c| c.starts_with(prefix)).count()
        }
    }

    impl CopyListener for Recorder {
        fn on_file_starting(&self, source: &Path, _destination: &Path) {
            let name = source.file_name().unwrap_or_default().to_string_lossy().into_owned();
            self.calls.lock().unwrap().push(format!("starting({})", name));
        }

        fn on_file_finished(&self, source: &Path, _destination: &Path, result: CopyResult) {
            let name = source.file_name().unwrap_or_default().to_string_lossy().into_owned();
            self.calls.lock().unwrap().push(format!("finished({}, {})", name, result));
        }

        fn on_batch_complete(&self, needs_resolution: bool, was_cancelled: bool) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("complete({}, {})", needs_resolution, was_cancelled));
        }
    }

    impl ProgressListener for Recorder {
        fn on_progress(&self, _source: &Path, _destination: &Path, bytes: u64, is_complete: bool) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("progress({}, {})", bytes, is_complete));
        }
    }

    // Trips the cancel flag on the first progress event of one file
    struct CancelDuring {
        handle: CancelHandle,
        file_name: &'static str,
    }

    impl ProgressListener for CancelDuring {
        fn on_progress(&self, source: &Path, _destination: &Path, _bytes: u64, _is_complete: bool) {
            if source.file_name().is_some_and(|n| n == self.file_name) {
                self.handle.cancel();
            }
        }
    }

    fn write_file(path: &Path, contents: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(path, contents).expect("Failed to write file");
    }

    fn pin_mtime(path: &Path, secs: i64) {
        set_file_mtime(path, FileTime::from_unix_time(secs, 0)).expect("Failed to set mtime");
    }

    #[test]
    fn test_batch_of_new_identical_and_conflicting_files() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");

        let a = src.join("a.txt");
        let b = src.join("b.txt");
        let c = src.join("c.txt");
        write_file(&a, b"new file");
        write_file(&b, b"same");
        write_file(&c, b"source version");
        write_file(&dst.join("b.txt"), b"same");
        write_file(&dst.join("c.txt"), b"old");
        pin_mtime(&b, 1_600_000_000);
        pin_mtime(&dst.join("b.txt"), 1_600_000_000);

        let mut job = CopyJob::with_roots(vec![a.clone(), b.clone(), c.clone()], &dst, Some(src.as_path()))
            .expect("Failed to create job");
        job.copy();

        assert_eq!(job.copied(), &[a.clone()]);
        assert_eq!(job.skipped(), &[b.clone()]);
        assert_eq!(job.overwrite_pending(), &[c.clone()]);
        assert!(job.error_pending().is_empty());
        assert!(job.needs_resolution());
        assert_eq!(fs::read(dst.join("a.txt")).unwrap(), b"new file");
        assert_eq!(fs::read(dst.join("c.txt")).unwrap(), b"old");

        assert!(job.resolve_overwrite(&c, true));
        assert_eq!(job.copied(), &[a, c]);
        assert!(job.overwrite_pending().is_empty());
        assert!(!job.needs_resolution());
        assert_eq!(fs::read(dst.join("c.txt")).unwrap(), b"source version");
    }

    #[test]
    fn test_every_attempted_file_lands_in_one_list() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");

        let files: Vec<PathBuf> = (0..5).map(|i| src.join(format!("f{}.txt", i))).collect();
        for (i, f) in files.iter().enumerate().take(4) {
            write_file(f, format!("content {}", i).as_bytes());
        }
        write_file(&dst.join("f1.txt"), b"conflict");

        let mut job = CopyJob::with_roots(files.clone(), &dst, Some(src.as_path())).expect("Failed to create job");
        job.copy();

        let summary = job.summary();
        assert_eq!(
            summary.copied + summary.skipped + summary.overwrite_pending + summary.error_pending,
            files.len()
        );
        assert_eq!(summary.copied, 3);
        assert_eq!(summary.overwrite_pending, 1);
        assert_eq!(summary.error_pending, 1);
        assert_eq!(summary.not_attempted, 0);
    }

    #[test]
    fn test_new_destination_matches_source_length_and_mtime() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src").join("data.bin");
        let dst = temp_dir.path().join("dst");
        write_file(&src, &[7u8; 1000]);
        pin_mtime(&src, 1_500_000_000);

        let mut job = CopyJob::with_roots(vec![src.clone()], &dst, None).expect("Failed to create job");
        job.set_chunk_size(64);
        job.copy();

        let copied = dst.join("data.bin");
        assert_eq!(job.copied(), &[src.clone()]);
        assert_eq!(fs::metadata(&copied).unwrap().len(), 1000);
        assert_eq!(
            fs::metadata(&copied).unwrap().modified().unwrap(),
            fs::metadata(&src).unwrap().modified().unwrap()
        );
        assert_eq!(job.summary().bytes_copied, 1000);
        assert_eq!(job.summary().files_copied, 1);

        // A second pass sees an identical destination
        job.reset(vec![src.clone()]).expect("Failed to reset");
        job.copy();
        assert_eq!(job.skipped(), &[src]);
        assert!(job.copied().is_empty());
    }

    #[test]
    fn test_skipped_file_transfers_nothing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src").join("same.txt");
        let dst = temp_dir.path().join("dst");
        write_file(&src, b"identical");
        write_file(&dst.join("same.txt"), b"identical");
        pin_mtime(&src, 1_600_000_000);
        pin_mtime(&dst.join("same.txt"), 1_600_000_000);

        let recorder = Recorder::new();
        let mut job = CopyJob::with_roots(vec![src.clone()], &dst, None).expect("Failed to create job");
        job.add_progress_listener(recorder.clone());
        job.add_copy_listener(recorder.clone());
        job.copy();

        assert_eq!(job.skipped(), &[src]);
        assert_eq!(recorder.count("progress"), 0);
        assert_eq!(job.summary().bytes_copied, 0);
        assert!(recorder.get_calls().contains(&"finished(same.txt, Skipped)".to_string()));
    }

    #[test]
    fn test_declining_overwrite_leaves_destination() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src").join("doc.txt");
        let dst = temp_dir.path().join("dst");
        write_file(&src, b"new contents");
        write_file(&dst.join("doc.txt"), b"old");

        let recorder = Recorder::new();
        let mut job = CopyJob::with_roots(vec![src.clone()], &dst, None).expect("Failed to create job");
        job.add_progress_listener(recorder.clone());
        job.copy();
        assert_eq!(job.overwrite_pending(), &[src.clone()]);

        assert!(job.resolve_overwrite(&src, false));
        assert!(job.overwrite_pending().is_empty());
        assert!(job.copied().is_empty());
        assert!(job.skipped().is_empty());
        assert_eq!(recorder.count("progress"), 0);
        assert_eq!(fs::read(dst.join("doc.txt")).unwrap(), b"old");

        // Already resolved
        assert!(!job.resolve_overwrite(&src, true));
    }

    #[test]
    fn test_resolving_unknown_files_fails() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src").join("x.txt");
        write_file(&src, b"x");

        let mut job = CopyJob::with_roots(vec![src.clone()], temp_dir.path().join("dst"), None)
            .expect("Failed to create job");
        job.copy();

        assert!(!job.resolve_overwrite(&src, true));
        assert!(!job.resolve_error(&src, true));
        assert!(!job.resolve_error(Path::new("/not/queued"), false));
    }

    #[test]
    fn test_missing_source_goes_to_error_queue_and_retry_copies() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src").join("late.txt");
        let dst = temp_dir.path().join("dst");

        let mut job = CopyJob::with_roots(vec![src.clone()], &dst, None).expect("Failed to create job");
        job.copy();

        assert_eq!(job.error_pending().len(), 1);
        assert_eq!(job.error_pending()[0].file(), src.as_path());
        assert!(matches!(job.error_cause(&src), Some(FileError::SourceMissing { .. })));

        write_file(&src, b"arrived");
        assert!(job.resolve_error(&src, true));
        assert!(job.error_pending().is_empty());
        assert!(job.error_cause(&src).is_none());
        assert_eq!(job.copied(), &[src]);
        assert_eq!(fs::read(dst.join("late.txt")).unwrap(), b"arrived");
    }

    #[test]
    fn test_retry_can_fail_again() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src").join("ghost.txt");

        let mut job = CopyJob::with_roots(vec![src.clone()], temp_dir.path().join("dst"), None)
            .expect("Failed to create job");
        job.copy();

        assert!(job.resolve_error(&src, true));
        assert_eq!(job.error_pending().len(), 1);

        assert!(job.resolve_error(&src, false));
        assert!(job.error_pending().is_empty());
        assert!(job.copied().is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_read_failure_keeps_partial_until_retry() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_dir = temp_dir.path().join("src");
        fs::create_dir_all(&src_dir).expect("Failed to create src");
        let src = src_dir.join("data.bin");
        // Opens fine; reading offset zero of our own address space fails
        std::os::unix::fs::symlink("/proc/self/mem", &src).expect("Failed to create symlink");
        let dst = temp_dir.path().join("dst");

        let recorder = Recorder::new();
        let mut job = CopyJob::with_roots(vec![src.clone()], &dst, Some(src_dir.as_path()))
            .expect("Failed to create job");
        job.add_copy_listener(recorder.clone());
        job.copy();

        assert!(matches!(job.error_cause(&src), Some(FileError::Read { .. })));
        assert!(job.copied().is_empty());
        assert_eq!(recorder.count("finished(data.bin, Error)"), 1);
        // Unlike a cancellation, the partial destination stays
        assert!(dst.join("data.bin").exists());

        fs::remove_file(&src).expect("Failed to remove symlink");
        write_file(&src, b"recovered");
        assert!(job.resolve_error(&src, true));

        assert!(job.error_pending().is_empty());
        assert_eq!(job.copied(), &[src]);
        assert_eq!(fs::read(dst.join("data.bin")).unwrap(), b"recovered");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_failure_after_forced_overwrite() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src").join("full.txt");
        write_file(&src, b"no room");

        let mut job = CopyJob::with_generator(vec![src.clone()], |_: &Path| PathBuf::from("/dev/full"))
            .expect("Failed to create job");
        job.copy();
        assert_eq!(job.overwrite_pending(), &[src.clone()]);

        assert!(job.resolve_overwrite(&src, true));
        assert!(job.overwrite_pending().is_empty());
        assert!(matches!(job.error_cause(&src), Some(FileError::Write { .. })));
        assert!(job.copied().is_empty());
    }

    #[test]
    fn test_uninspectable_destination_goes_to_error_queue() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src").join("a.txt");
        let fine = temp_dir.path().join("src").join("b.txt");
        write_file(&src, b"a");
        write_file(&fine, b"b");
        let out = temp_dir.path().join("out");
        fs::create_dir_all(&out).expect("Failed to create out");

        let out_clone = out.clone();
        let mut job = CopyJob::with_generator(vec![src.clone(), fine.clone()], move |p: &Path| {
            if p.ends_with("a.txt") {
                // Longer than any filesystem allows for one component
                out_clone.join("x".repeat(300))
            } else {
                out_clone.join("b.txt")
            }
        })
        .expect("Failed to create job");
        job.copy();

        assert!(matches!(job.error_cause(&src), Some(FileError::Inspect { .. })));
        assert_eq!(job.copied(), &[fine]);
        assert!(job.needs_resolution());
    }

    #[test]
    fn test_directory_creation_failure_is_per_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let blocked = src.join("blocked").join("inner.txt");
        let fine = src.join("fine.txt");
        write_file(&blocked, b"inner");
        write_file(&fine, b"fine");

        let dst = temp_dir.path().join("dst");
        // A file where a directory is needed
        write_file(&dst.join("blocked"), b"not a directory");

        let mut job = CopyJob::with_roots(vec![blocked.clone(), fine.clone()], &dst, Some(src.as_path()))
            .expect("Failed to create job");
        job.copy();

        assert!(matches!(
            job.error_cause(&blocked),
            Some(FileError::DirectoryCreation { .. })
        ));
        assert_eq!(job.copied(), &[fine]);
    }

    #[test]
    fn test_directories_are_created_and_counted() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let sub = src.join("sub");
        let file = sub.join("f.txt");
        write_file(&file, b"f");
        let dst = temp_dir.path().join("dst");

        let files = fs_ops::enumerate_tree(&sub).expect("Failed to enumerate");
        let mut job = CopyJob::with_roots(files, &dst, Some(src.as_path())).expect("Failed to create job");
        job.copy();

        assert!(dst.join("sub").is_dir());
        assert_eq!(fs::read(dst.join("sub").join("f.txt")).unwrap(), b"f");
        let summary = job.summary();
        assert_eq!(summary.dirs_created, 1);
        assert_eq!(summary.files_copied, 1);
        assert_eq!(summary.copied, 2);

        // Existing destination directories are skipped
        job.reset(vec![sub.clone()]).expect("Failed to reset");
        job.copy();
        assert_eq!(job.skipped(), &[sub]);
    }

    #[test]
    fn test_generator_chooses_destination() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("in").join("report.txt");
        write_file(&src, b"report");
        let out = temp_dir.path().join("out");

        let out_clone = out.clone();
        let mut job = CopyJob::with_generator(vec![src.clone()], move |p: &Path| {
            let name = p.file_name().unwrap_or_default().to_string_lossy();
            out_clone.join("archive").join(format!("{}.bak", name))
        })
        .expect("Failed to create job");

        assert_eq!(job.destination_of(&src), out.join("archive").join("report.txt.bak"));
        job.copy();

        assert_eq!(job.copied(), &[src]);
        assert_eq!(fs::read(out.join("archive").join("report.txt.bak")).unwrap(), b"report");
    }

    #[test]
    fn test_construction_rejects_bad_arguments() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let other = temp_dir.path().join("other").join("x.txt");
        let dir = temp_dir.path().join("dir");
        fs::create_dir_all(&dir).unwrap();

        let outside = CopyJob::with_roots(vec![other], temp_dir.path().join("dst"), Some(src.as_path()));
        assert!(matches!(outside, Err(EngineError::OutsideSourceRoot { .. })));

        let no_root = CopyJob::with_roots(vec![dir], temp_dir.path().join("dst"), None);
        assert!(matches!(no_root, Err(EngineError::DirectoryWithoutRoot { .. })));

        let same = CopyJob::with_roots(Vec::new(), &src, Some(src.as_path()));
        assert!(matches!(same, Err(EngineError::SameRoot { .. })));
    }

    #[test]
    fn test_cancel_mid_file_removes_destination_and_stops_batch() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        let big = src.join("big.bin");
        let later = src.join("later.txt");
        write_file(&big, &[1u8; 64]);
        write_file(&later, b"later");

        let recorder = Recorder::new();
        let mut job = CopyJob::with_roots(vec![big.clone(), later.clone()], &dst, Some(src.as_path()))
            .expect("Failed to create job");
        job.set_chunk_size(16);
        job.add_copy_listener(recorder.clone());
        job.add_progress_listener(Arc::new(CancelDuring {
            handle: job.cancel_handle(),
            file_name: "big.bin",
        }));
        job.copy();

        assert!(job.is_cancelled());
        assert!(!dst.join("big.bin").exists());
        assert!(!dst.join("later.txt").exists());
        assert!(job.copied().is_empty());
        assert!(job.skipped().is_empty());
        assert!(job.overwrite_pending().is_empty());
        assert!(job.error_pending().is_empty());
        assert_eq!(job.pending().len(), 1);
        assert_eq!(job.pending()[0], later);

        let calls = recorder.get_calls();
        assert_eq!(recorder.count("finished"), 0);
        assert_eq!(calls.last().map(String::as_str), Some("complete(false, true)"));
        assert!(job.summary().cancelled);
        assert_eq!(job.summary().not_attempted, 1);
    }

    #[test]
    fn test_cancel_before_copy_attempts_nothing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src").join("a.txt");
        write_file(&src, b"a");

        let mut job = CopyJob::with_roots(vec![src], temp_dir.path().join("dst"), None)
            .expect("Failed to create job");
        let handle = job.cancel_handle();
        handle.cancel();
        handle.cancel();
        job.copy();

        assert_eq!(job.pending().len(), 1);
        assert!(job.copied().is_empty());
    }

    #[test]
    fn test_queues_survive_cancellation() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        let conflict = src.join("conflict.txt");
        let big = src.join("big.bin");
        write_file(&conflict, b"new version");
        write_file(&dst.join("conflict.txt"), b"old");
        write_file(&big, &[0u8; 32]);

        let recorder = Recorder::new();
        let mut job = CopyJob::with_roots(vec![conflict.clone(), big], &dst, Some(src.as_path()))
            .expect("Failed to create job");
        job.set_chunk_size(8);
        job.add_copy_listener(recorder.clone());
        job.add_progress_listener(Arc::new(CancelDuring {
            handle: job.cancel_handle(),
            file_name: "big.bin",
        }));
        job.copy();

        assert!(recorder.get_calls().contains(&"complete(true, true)".to_string()));
        assert_eq!(job.overwrite_pending(), &[conflict.clone()]);

        // A resolution is a new run; the stale flag does not interrupt it
        assert!(job.resolve_overwrite(&conflict, true));
        assert!(!job.is_cancelled());
        assert_eq!(job.copied(), &[conflict]);
        assert!(job.overwrite_pending().is_empty());
        assert_eq!(fs::read(dst.join("conflict.txt")).unwrap(), b"new version");
        assert_eq!(recorder.get_calls().last().map(String::as_str), Some("complete(false, false)"));
    }

    #[test]
    fn test_callbacks_fire_in_order() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src").join("file1.txt");
        write_file(&src, b"0123456789");

        let recorder = Recorder::new();
        let mut job = CopyJob::with_roots(vec![src], temp_dir.path().join("dst"), None)
            .expect("Failed to create job");
        job.set_chunk_size(4);
        job.add_copy_listener(recorder.clone());
        job.add_progress_listener(recorder.clone());
        job.copy();

        assert_eq!(
            recorder.get_calls(),
            vec![
                "starting(file1.txt)",
                "progress(4, false)",
                "progress(8, false)",
                "progress(10, true)",
                "finished(file1.txt, Copied)",
                "complete(false, false)",
            ]
        );
    }

    #[test]
    fn test_simulation_performs_no_io() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        let empty = src.join("empty.txt");
        let dir = src.join("folder");
        write_file(&empty, b"");
        fs::create_dir_all(&dir).unwrap();

        let recorder = Recorder::new();
        let mut job = CopyJob::with_roots(vec![dir.clone(), empty.clone()], &dst, Some(src.as_path()))
            .expect("Failed to create job");
        job.enable_simulation(Some(1000.0));
        job.add_progress_listener(recorder.clone());
        job.copy();

        assert_eq!(job.copied(), &[dir, empty]);
        assert_eq!(recorder.get_calls(), vec!["progress(0, true)"]);
        assert!(!dst.exists());
    }

    #[test]
    fn test_simulation_honours_cancellation() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let first = src.join("first.bin");
        let second = src.join("second.bin");
        write_file(&first, &[0u8; 100]);
        write_file(&second, &[0u8; 100]);

        let mut job = CopyJob::with_roots(vec![first, second], temp_dir.path().join("dst"), Some(src.as_path()))
            .expect("Failed to create job");
        job.enable_simulation(Some(1_000_000.0));
        job.add_progress_listener(Arc::new(CancelDuring {
            handle: job.cancel_handle(),
            file_name: "first.bin",
        }));
        job.copy();

        assert!(job.copied().is_empty());
        assert!(job.error_pending().is_empty());
        assert_eq!(job.pending().len(), 1);
    }

    #[test]
    fn test_options_clamp_and_sanitize() {
        let mut job = CopyJob::with_generator(Vec::new(), |p: &Path| p.to_path_buf())
            .expect("Failed to create job");
        job.set_chunk_size(0);
        assert_eq!(job.options().chunk_size, 1);

        job.enable_simulation(Some(-3.0));
        assert_eq!(
            job.options().simulation,
            SimulationMode::On { speed_factor: crate::model::DEFAULT_SPEED_FACTOR }
        );
        job.disable_simulation();
        assert_eq!(job.options().simulation, SimulationMode::Off);
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let files: Vec<PathBuf> = (0..3).map(|i| src.join(format!("{}.bin", i))).collect();
        for f in &files {
            write_file(f, &[0u8; 2000]);
        }

        let mut job = CopyJob::with_roots(files, temp_dir.path().join("dst"), Some(src.as_path()))
            .expect("Failed to create job");
        // Roughly three seconds of simulated work
        job.enable_simulation(Some(1.0));
        let handle = job.cancel_handle();

        let worker = std::thread::spawn(move || {
            job.copy();
            job
        });
        std::thread::sleep(std::time::Duration::from_millis(200));
        handle.cancel();
        let job = worker.join().expect("Worker panicked");

        assert!(job.is_cancelled());
        assert!(job.copied().is_empty());
        assert_eq!(job.pending().len(), 2);
    }
}
