//! The wall clock the reactor feeds into [`proxy_core::engine::Engine`].
//!
//! `pool::Server::next_retry`/`next_probe` and the timeout wheel compare
//! absolute deadlines in wall-clock microseconds, so `now` is read in
//! microseconds here and used unconverted everywhere except the rate
//! limiter's `elapsed_ms` tick argument, which wants milliseconds.

use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since the Unix epoch, saturating rather than panicking
/// on a clock set before 1970 (not a real deployment concern, but cheap
/// to make infallible).
#[must_use]
pub fn now_usec() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
