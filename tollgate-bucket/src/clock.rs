//! Wall-clock abstraction for refill computations.

use std::time::{SystemTime, UNIX_EPOCH};

/// A source of time used by the admission logic.
///
/// Bucket timestamps travel between processes through the bucket store,
/// so implementations must report **wall-clock** seconds since
/// [`UNIX_EPOCH`] rather than a process-local monotonic reading.
///
/// This abstraction decouples the algorithm from the system clock,
/// enabling deterministic and fast unit tests.
pub trait Clock: Send + Sync {
    /// Returns the number of seconds elapsed since [`UNIX_EPOCH`]
    /// (`1970-01-01 00:00:00 UTC`).
    fn now_secs(&self) -> u64;
}

/// System clock backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
    }
}
