//! Concurrent in-process bucket table.

use dashmap::DashMap;
use std::{
    sync::atomic::{AtomicI64, AtomicU64, Ordering::*},
    time::Duration,
};

const DEFAULT_EVICTION_SECS: u64 = 60;

/// Per-key counters for the token bucket algorithm.
///
/// Each entry tracks:
/// - `tokens`: available admission units,
/// - `last_refill`: unix seconds of the last refill (`0` = never set),
/// - `last_seen`: unix seconds of the last access (for eviction).
#[derive(Debug)]
struct Entry {
    tokens: AtomicI64,
    last_refill: AtomicU64,
    last_seen: AtomicU64,
}

impl Entry {
    fn new(now: u64) -> Self {
        Self {
            tokens: AtomicI64::new(0),
            last_refill: AtomicU64::new(0),
            last_seen: AtomicU64::new(now),
        }
    }
}

/// A concurrent table of per-key bucket state.
///
/// Keys that have never been seen behave as an implicit zero state:
/// incrementing an unknown key creates it with zero tokens and an unset
/// refill timestamp.
///
/// ## Atomicity
///
/// - Token increments use `fetch_add`, so concurrent callers on the same
///   key observe a serializable sequence of increments with no lost
///   updates.
/// - Timestamp initialization uses compare-exchange, so exactly one of
///   several racing first observers wins.
/// - Timestamp writes use `fetch_max`, keeping `last_refill`
///   monotonically non-decreasing per key.
///
/// ## Eviction
///
/// Entries not touched for longer than the eviction grace period are
/// removed lazily on the next access of their key. No background jobs
/// are required. An evicted key reports an unset refill timestamp and
/// reinitializes on next use.
#[derive(Debug)]
pub struct BucketTable {
    entries: DashMap<String, Entry>,
    eviction_grace_secs: u64,
}

impl Default for BucketTable {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl BucketTable {
    /// Creates an empty bucket table with the default eviction grace
    /// period of one minute.
    #[inline]
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_capacity(1024),
            eviction_grace_secs: DEFAULT_EVICTION_SECS,
        }
    }

    /// Sets the period of inactivity after which an entry is eligible
    /// for eviction.
    #[inline]
    pub fn with_eviction(mut self, grace: Duration) -> Self {
        self.eviction_grace_secs = grace.as_secs();
        self
    }

    /// Number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Atomically adds `delta` (possibly negative) to the key's token
    /// counter and returns the post-increment value, creating the entry
    /// on first use.
    pub fn increment_tokens(&self, key: &str, delta: i64, now: u64) -> i64 {
        self.with_entry(key, now, |entry| {
            entry.tokens.fetch_add(delta, AcqRel) + delta
        })
    }

    /// Returns the key's last refill timestamp, or `None` when the key
    /// is unknown, evicted, or not yet initialized.
    pub fn last_refill(&self, key: &str, now: u64) -> Option<u64> {
        self.evict_stale(key, now);

        let entry = self.entries.get(key)?;
        entry.last_seen.store(now, Release);

        match entry.last_refill.load(Acquire) {
            0 => None,
            timestamp => Some(timestamp),
        }
    }

    /// Initializes the key's refill timestamp if it has not been set
    /// yet. Returns `true` when this call performed the initialization.
    pub fn init_last_refill(&self, key: &str, timestamp: u64, now: u64) -> bool {
        self.with_entry(key, now, |entry| {
            entry.last_refill
                .compare_exchange(0, timestamp, AcqRel, Acquire)
                .is_ok()
        })
    }

    /// Advances the key's refill timestamp. Writes are monotonic: an
    /// older timestamp never overwrites a newer one.
    pub fn set_last_refill(&self, key: &str, timestamp: u64, now: u64) {
        self.with_entry(key, now, |entry| {
            entry.last_refill.fetch_max(timestamp, AcqRel);
        })
    }

    fn with_entry<T>(&self, key: &str, now: u64, f: impl FnOnce(&Entry) -> T) -> T {
        self.evict_stale(key, now);

        // Fast path avoids allocating the key for entries that exist.
        if let Some(entry) = self.entries.get(key) {
            entry.last_seen.store(now, Release);
            return f(entry.value());
        }

        let entry = self.entries
            .entry(key.to_owned())
            .or_insert_with(|| Entry::new(now));
        f(entry.value())
    }

    // Lazy eviction based on last_seen, not last_refill.
    fn evict_stale(&self, key: &str, now: u64) {
        if let Some(entry) = self.entries.get(key) {
            let last_seen = entry.last_seen.load(Acquire);
            if now.saturating_sub(last_seen) > self.eviction_grace_secs {
                drop(entry); // release the shard read lock
                self.entries.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn increment_creates_entry_with_zero_state() {
        let table = BucketTable::new();

        assert_eq!(table.increment_tokens("10.0.0.1", 5, 100), 5);
        assert_eq!(table.last_refill("10.0.0.1", 100), None);
    }

    #[test]
    fn increments_accumulate() {
        let table = BucketTable::new();

        table.increment_tokens("k", 3, 100);
        assert_eq!(table.increment_tokens("k", -1, 100), 2);
        assert_eq!(table.increment_tokens("k", -4, 100), -2);
    }

    #[test]
    fn keys_are_independent() {
        let table = BucketTable::new();

        table.increment_tokens("a", 2, 100);
        assert_eq!(table.increment_tokens("b", 1, 100), 1);
    }

    #[test]
    fn init_sets_timestamp_exactly_once() {
        let table = BucketTable::new();

        assert!(table.init_last_refill("k", 100, 100));
        assert!(!table.init_last_refill("k", 200, 200));
        assert_eq!(table.last_refill("k", 200), Some(100));
    }

    #[test]
    fn set_last_refill_is_monotonic() {
        let table = BucketTable::new();

        table.set_last_refill("k", 150, 150);
        table.set_last_refill("k", 120, 150);
        assert_eq!(table.last_refill("k", 150), Some(150));

        table.set_last_refill("k", 180, 180);
        assert_eq!(table.last_refill("k", 180), Some(180));
    }

    #[test]
    fn stale_entries_are_evicted_on_access() {
        let table = BucketTable::new().with_eviction(Duration::from_secs(10));

        table.increment_tokens("k", 3, 100);
        table.set_last_refill("k", 100, 100);

        // Within the grace period the entry survives.
        assert_eq!(table.last_refill("k", 110), Some(100));

        // Past the grace period the entry is dropped and the key reads
        // as never seen.
        assert_eq!(table.last_refill("k", 121), None);
        assert_eq!(table.increment_tokens("k", 1, 121), 1);
    }

    #[test]
    fn concurrent_increments_lose_no_updates() {
        let table = Arc::new(BucketTable::new());
        let threads = 8_i64;
        let per_thread = 1_000_i64;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let table = table.clone();
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        table.increment_tokens("shared", 1, 100);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            table.increment_tokens("shared", 0, 100),
            threads * per_thread
        );
    }

    #[test]
    fn concurrent_init_has_a_single_winner() {
        let table = Arc::new(BucketTable::new());

        let handles: Vec<_> = (0..8_u64)
            .map(|i| {
                let table = table.clone();
                thread::spawn(move || table.init_last_refill("k", 100 + i, 100))
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(wins, 1);
    }
}
