//! fcopy - Command-line front end for the batch copy engine.
//!
//! Runs the first pass on a worker thread while rendering progress from a
//! channel, then walks the overwrite and error queues, either by asking on
//! the terminal or by applying a bulk policy.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use chrono::{DateTime, Local};
use clap::Parser;
use crossbeam_channel::{unbounded, Receiver};
use dialoguer::Select;
use fcopy_engine::{
    BatchSummary, CancelHandle, ChannelListener, CopyEvent, CopyJob, CopyResult, DEFAULT_CHUNK_SIZE,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// fcopy - Copy a batch of files, then settle conflicts and errors
#[derive(Parser, Debug)]
#[command(name = "fcopy")]
#[command(version = "0.1.0")]
#[command(about = "Copy files in a batch with conflict and error resolution")]
struct Args {
    /// Files (or, with --recursive, directories) to copy
    #[arg(required = true, value_name = "PATH")]
    sources: Vec<PathBuf>,

    /// Destination directory
    #[arg(long, value_name = "PATH")]
    dst: PathBuf,

    /// Source root; sources keep their path relative to it
    #[arg(long, value_name = "PATH")]
    root: Option<PathBuf>,

    /// Expand directories into their contents
    #[arg(short, long)]
    recursive: bool,

    /// Transfer chunk size in bytes
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Simulate transfers without touching the destination
    #[arg(long)]
    simulate: bool,

    /// Simulation speed factor
    #[arg(long, value_name = "FACTOR", requires = "simulate")]
    speed: Option<f64>,

    /// Existing, differing destinations: ask, skip, or overwrite
    #[arg(long, value_name = "POLICY", default_value = "ask")]
    on_conflict: String,

    /// Failed files: ask, retry, or discard
    #[arg(long, value_name = "POLICY", default_value = "ask")]
    on_error: String,

    /// Print the final summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConflictPolicy {
    Ask,
    Skip,
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorPolicy {
    Ask,
    Retry,
    Discard,
}

/// Answer to one prompt; the `All` variants switch the rest of the queue
/// to a bulk policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Yes,
    No,
    YesToAll,
    NoToAll,
}

/// Ctrl-C state shared between the signal handler and the running job.
#[derive(Default)]
struct Interrupt {
    triggered: AtomicBool,
    handle: Mutex<Option<CancelHandle>>,
}

impl Interrupt {
    fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        if let Ok(slot) = self.handle.lock() {
            if let Some(handle) = slot.as_ref() {
                handle.cancel();
            }
        }
    }

    /// Route future Ctrl-C presses to `handle`. A press that came earlier
    /// cancels it right away.
    fn attach(&self, handle: CancelHandle) {
        if let Ok(mut slot) = self.handle.lock() {
            if self.is_triggered() {
                handle.cancel();
            }
            *slot = Some(handle);
        }
    }

    fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

/// Renders engine events on stderr.
struct CliProgress {
    verbose: bool,
    start_time: Instant,
    last_progress_update: Instant,
    current_size: u64,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        let now = Instant::now();
        CliProgress {
            verbose,
            start_time: now,
            last_progress_update: now,
            current_size: 0,
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn progress_bar(percent: u32) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }

    fn file_name(path: &Path) -> &str {
        path.file_name().and_then(|n| n.to_str()).unwrap_or("(unknown)")
    }

    fn handle(&mut self, event: &CopyEvent) {
        match event {
            CopyEvent::FileStarting { source, .. } => {
                self.current_size = fs::metadata(source).map(|m| m.len()).unwrap_or(0);
                if self.verbose {
                    eprintln!("Starting: {}", Self::file_name(source));
                }
            }
            CopyEvent::Progress {
                source,
                bytes_transferred,
                is_complete,
                ..
            } => {
                // Throttle to one redraw per 200ms, but always draw the last chunk
                if !is_complete && self.last_progress_update.elapsed().as_millis() < 200 {
                    return;
                }
                self.last_progress_update = Instant::now();

                let total = self.current_size.max(1);
                let percent = if *is_complete {
                    100
                } else {
                    ((*bytes_transferred as f64 / total as f64 * 100.0) as u32).min(99)
                };
                eprint!(
                    "\r{} {} {}",
                    Self::progress_bar(percent),
                    Self::format_bytes(*bytes_transferred),
                    Self::file_name(source)
                );
                let _ = std::io::Write::flush(&mut std::io::stderr());
                if *is_complete {
                    eprintln!();
                }
            }
            CopyEvent::FileFinished { source, result, .. } => {
                if self.verbose || *result == CopyResult::Error {
                    eprintln!("{}: {}", result, Self::file_name(source));
                }
            }
            CopyEvent::BatchComplete {
                needs_resolution,
                was_cancelled,
            } => {
                if *was_cancelled {
                    eprintln!();
                    eprintln!("Cancelled.");
                } else if *needs_resolution && self.verbose {
                    eprintln!("Some files need a decision.");
                }
            }
        }
    }

    fn print_summary(&self, job: &CopyJob) {
        let summary = job.summary();
        eprintln!();
        eprintln!(
            "Summary: {} files copied, {} directories created, {} skipped",
            summary.files_copied, summary.dirs_created, summary.skipped
        );
        eprintln!("Bytes copied: {}", Self::format_bytes(summary.bytes_copied));
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));

        if summary.not_attempted > 0 {
            eprintln!("Not attempted: {}", summary.not_attempted);
        }
        if !job.overwrite_pending().is_empty() {
            eprintln!();
            eprintln!("Unresolved conflicts:");
            for file in job.overwrite_pending() {
                eprintln!("  {}", file.display());
            }
        }
        if !job.error_pending().is_empty() {
            eprintln!();
            eprintln!("Failed files:");
            for error in job.error_pending() {
                eprintln!("  {}: {}", error.file.display(), error.cause);
            }
        }
    }
}

/// Parse and validate command-line arguments, then run the batch
fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let interrupt = Arc::new(Interrupt::default());
    let handler_interrupt = Arc::clone(&interrupt);
    if let Err(e) = ctrlc::set_handler(move || handler_interrupt.trigger()) {
        warn!(error = %e, "could not install Ctrl-C handler");
    }

    let exit_code = match run_cli(&args, &interrupt) {
        Ok(summary) if summary.cancelled || summary.needs_resolution() => 1,
        Ok(_) => 0,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "fcopy_engine=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args, interrupt: &Interrupt) -> Result<BatchSummary, String> {
    let conflict_policy = parse_conflict_policy(&args.on_conflict)?;
    let error_policy = parse_error_policy(&args.on_error)?;

    let files = collect_files(args)?;
    let root = match &args.root {
        Some(root) => Some(root.clone()),
        None if args.recursive => shared_parent(&args.sources),
        None => None,
    };

    let mut job = CopyJob::with_roots(files, &args.dst, root.as_deref())
        .map_err(|e| format!("Job creation failed: {}", e))?;
    job.set_chunk_size(args.chunk_size);
    if args.simulate {
        job.enable_simulation(args.speed);
    }

    let (tx, rx) = unbounded::<CopyEvent>();
    let listener = Arc::new(ChannelListener::new(tx));
    job.add_copy_listener(listener.clone());
    job.add_progress_listener(listener);
    interrupt.attach(job.cancel_handle());

    let mut progress = CliProgress::new(args.verbose);
    let worker = thread::spawn(move || {
        job.copy();
        job
    });
    for event in rx.iter() {
        progress.handle(&event);
        if matches!(event, CopyEvent::BatchComplete { .. }) {
            break;
        }
    }
    let mut job = worker.join().map_err(|_| "Copy worker panicked".to_string())?;

    if !interrupt.is_triggered() {
        let mut ask_conflict = |job: &CopyJob, file: &Path| ask_overwrite(file, &job.destination_of(file));
        let mut ask_error = |job: &CopyJob, file: &Path| {
            let cause = job.error_cause(file).map(|c| c.to_string()).unwrap_or_default();
            ask_retry(file, &cause)
        };
        let finished = resolve_conflicts(
            &mut job,
            conflict_policy,
            interrupt,
            &rx,
            &mut progress,
            &mut ask_conflict,
        );
        if finished {
            resolve_errors(&mut job, error_policy, interrupt, &rx, &mut progress, &mut ask_error);
        }
    }

    progress.print_summary(&job);
    let summary = job.summary();
    if args.json {
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| format!("Failed to encode summary: {}", e))?;
        println!("{}", json);
    }
    Ok(summary)
}

fn parse_conflict_policy(value: &str) -> Result<ConflictPolicy, String> {
    match value.to_lowercase().as_str() {
        "ask" => Ok(ConflictPolicy::Ask),
        "skip" => Ok(ConflictPolicy::Skip),
        "overwrite" => Ok(ConflictPolicy::Overwrite),
        _ => Err(format!(
            "Invalid conflict policy '{}'. Must be 'ask', 'skip', or 'overwrite'",
            value
        )),
    }
}

fn parse_error_policy(value: &str) -> Result<ErrorPolicy, String> {
    match value.to_lowercase().as_str() {
        "ask" => Ok(ErrorPolicy::Ask),
        "retry" => Ok(ErrorPolicy::Retry),
        "discard" => Ok(ErrorPolicy::Discard),
        _ => Err(format!(
            "Invalid error policy '{}'. Must be 'ask', 'retry', or 'discard'",
            value
        )),
    }
}

/// Sources as given, or with directories expanded when `--recursive` is set.
fn collect_files(args: &Args) -> Result<Vec<PathBuf>, String> {
    if !args.recursive {
        return Ok(args.sources.clone());
    }
    let mut files = Vec::new();
    for source in &args.sources {
        let tree = fcopy_engine::enumerate_tree(source).map_err(|e| e.to_string())?;
        files.extend(tree);
    }
    Ok(files)
}

/// Common parent of all sources, if there is exactly one.
fn shared_parent(sources: &[PathBuf]) -> Option<PathBuf> {
    let absolute: Vec<PathBuf> = sources
        .iter()
        .map(|s| std::path::absolute(s).unwrap_or_else(|_| s.clone()))
        .collect();
    let first = absolute.first()?.parent()?.to_path_buf();
    absolute
        .iter()
        .all(|s| s.parent() == Some(first.as_path()))
        .then_some(first)
}

/// Render events produced by a resolution call.
fn drain_events(rx: &Receiver<CopyEvent>, progress: &mut CliProgress) {
    for event in rx.try_iter() {
        progress.handle(&event);
    }
}

/// Asks about one queued file.
type Prompt<'a> = &'a mut dyn FnMut(&CopyJob, &Path) -> Result<Decision, String>;

/// Report a prompt that cannot be shown; the rest of the queue stays put.
fn prompt_unavailable(reason: &str) {
    warn!(reason, "prompt unavailable");
    eprintln!("Cannot prompt ({}); leaving the remaining files queued.", reason);
}

/// Walk the overwrite queue. Returns false if prompting failed and
/// resolution stopped early.
fn resolve_conflicts(
    job: &mut CopyJob,
    mut policy: ConflictPolicy,
    interrupt: &Interrupt,
    rx: &Receiver<CopyEvent>,
    progress: &mut CliProgress,
    prompt: Prompt<'_>,
) -> bool {
    for file in job.overwrite_pending().to_vec() {
        if interrupt.is_triggered() {
            break;
        }
        let overwrite = match policy {
            ConflictPolicy::Overwrite => true,
            ConflictPolicy::Skip => false,
            ConflictPolicy::Ask => match prompt(job, &file) {
                Err(reason) => {
                    prompt_unavailable(&reason);
                    return false;
                }
                Ok(Decision::Yes) => true,
                Ok(Decision::No) => false,
                Ok(Decision::YesToAll) => {
                    policy = ConflictPolicy::Overwrite;
                    true
                }
                Ok(Decision::NoToAll) => {
                    policy = ConflictPolicy::Skip;
                    false
                }
            },
        };
        debug!(file = %file.display(), overwrite, "resolving conflict");
        job.resolve_overwrite(&file, overwrite);
        drain_events(rx, progress);
    }
    true
}

/// Walk the error queue. Returns false if prompting failed and resolution
/// stopped early.
fn resolve_errors(
    job: &mut CopyJob,
    mut policy: ErrorPolicy,
    interrupt: &Interrupt,
    rx: &Receiver<CopyEvent>,
    progress: &mut CliProgress,
    prompt: Prompt<'_>,
) -> bool {
    let failed: Vec<PathBuf> = job.error_pending().iter().map(|e| e.file.clone()).collect();
    for file in failed {
        if interrupt.is_triggered() {
            break;
        }
        let retry = match policy {
            ErrorPolicy::Retry => true,
            ErrorPolicy::Discard => false,
            ErrorPolicy::Ask => match prompt(job, &file) {
                Err(reason) => {
                    prompt_unavailable(&reason);
                    return false;
                }
                Ok(Decision::Yes) => true,
                Ok(Decision::No) => false,
                Ok(Decision::YesToAll) => {
                    policy = ErrorPolicy::Retry;
                    true
                }
                Ok(Decision::NoToAll) => {
                    policy = ErrorPolicy::Discard;
                    false
                }
            },
        };
        debug!(file = %file.display(), retry, "resolving error");
        job.resolve_error(&file, retry);
        drain_events(rx, progress);
    }
    true
}

fn describe(path: &Path) -> String {
    match fs::metadata(path) {
        Ok(meta) => {
            let modified = meta
                .modified()
                .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            format!("{}, modified {}", CliProgress::format_bytes(meta.len()), modified)
        }
        Err(_) => "unavailable".to_string(),
    }
}

fn ask(prompt: &str, items: &[&str]) -> Result<Decision, String> {
    let choice = Select::new()
        .with_prompt(prompt)
        .items(items)
        .default(1)
        .interact()
        .map_err(|e| format!("Prompt failed: {}", e))?;
    Ok(match choice {
        0 => Decision::Yes,
        1 => Decision::No,
        2 => Decision::YesToAll,
        _ => Decision::NoToAll,
    })
}

fn ask_overwrite(source: &Path, destination: &Path) -> Result<Decision, String> {
    eprintln!();
    eprintln!("Destination exists and differs:");
    eprintln!("  source:      {} ({})", source.display(), describe(source));
    eprintln!("  destination: {} ({})", destination.display(), describe(destination));
    ask(
        "Overwrite?",
        &["Overwrite", "Keep existing", "Overwrite all", "Keep all"],
    )
}

fn ask_retry(source: &Path, cause: &str) -> Result<Decision, String> {
    eprintln!();
    eprintln!("Copy failed: {}", source.display());
    eprintln!("  {}", cause);
    ask("Retry?", &["Retry", "Discard", "Retry all", "Discard all"])
}
