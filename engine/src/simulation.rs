//! Simulated transfers.
//!
//! Stands in for `fs_ops::copy_file_chunked` when a job runs in simulation
//! mode: no bytes move, but the progress sequence and cancellation checks
//! follow the same contract, with waits proportional to the file length.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::warn;
use crate::fs_ops::Transfer;
use crate::model::DEFAULT_SPEED_FACTOR;

/// Longest wait for either simulated half of a file.
pub const MAX_SIMULATED_WAIT: Duration = Duration::from_secs(3);

/// Wait before each simulated half: `length / (2 * speed_factor)` milliseconds,
/// capped at three seconds.
pub fn simulated_wait(length: u64, speed_factor: f64) -> Duration {
    let millis = length as f64 / (2.0 * speed_factor);
    if !millis.is_finite() || millis <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(millis / 1000.0).min(MAX_SIMULATED_WAIT)
}

/// Accept positive, finite speed factors; anything else falls back to the default.
pub fn sanitize_speed_factor(speed_factor: Option<f64>) -> f64 {
    match speed_factor {
        None => DEFAULT_SPEED_FACTOR,
        Some(f) if f.is_finite() && f > 0.0 => f,
        Some(f) => {
            warn!(speed_factor = f, "invalid simulation speed factor, using default");
            DEFAULT_SPEED_FACTOR
        }
    }
}

/// Fabricate the transfer of a `length`-byte file.
///
/// Emits `(length / 2, false)` after the first wait, checks `cancelled`,
/// waits again, checks `cancelled` once more and emits `(length, true)`.
/// A zero-length file emits only `(0, true)`.
pub fn simulate_transfer(
    length: u64,
    speed_factor: f64,
    cancelled: &AtomicBool,
    on_chunk: &mut dyn FnMut(u64, bool),
) -> Transfer {
    if length == 0 {
        on_chunk(0, true);
        return Transfer::Completed { bytes: 0 };
    }

    let wait = simulated_wait(length, speed_factor);
    let half = length / 2;

    thread::sleep(wait);
    on_chunk(half, false);
    if cancelled.load(Ordering::SeqCst) {
        return Transfer::Cancelled { bytes: half };
    }

    thread::sleep(wait);
    if cancelled.load(Ordering::SeqCst) {
        return Transfer::Cancelled { bytes: half };
    }
    on_chunk(length, true);

    Transfer::Completed { bytes: length }
}
