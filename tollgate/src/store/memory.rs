//! In-process bucket store.

use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
    time::Duration,
};
use futures_util::future::BoxFuture;
use tollgate_bucket::{BucketTable, Clock, SystemClock};
use super::BucketStore;
use crate::error::Error;

/// A [`BucketStore`] backed by a concurrent in-process table.
///
/// State lives in process memory and is never shared across process
/// boundaries, so limits enforced through this store are per instance.
/// It serves as the store for single-instance deployments and as the
/// degraded-mode fallback while a remote store is unreachable.
///
/// Entries idle for longer than the eviction grace period are dropped
/// lazily and reinitialize as full buckets on next use — the same
/// behavior a remote key's idle expiry produces.
///
/// ## Example
/// ```
/// use std::time::Duration;
/// use tollgate::InMemoryStore;
///
/// let store = InMemoryStore::new()
///     .with_eviction(Duration::from_secs(300));
/// # let _ = store;
/// ```
pub struct InMemoryStore {
    table: BucketTable,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryStore {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a new store using the system clock.
    #[inline]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Creates a new store with a custom [`Clock`], primarily useful
    /// for deterministic tests.
    #[inline]
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            table: BucketTable::new(),
            clock: Arc::new(clock),
        }
    }

    /// Sets the period of inactivity after which an entry is eligible
    /// for eviction.
    ///
    /// Default: 60 seconds.
    #[inline]
    pub fn with_eviction(mut self, grace: Duration) -> Self {
        self.table = std::mem::take(&mut self.table).with_eviction(grace);
        self
    }
}

impl Debug for InMemoryStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("entries", &self.table.len())
            .finish()
    }
}

impl BucketStore for InMemoryStore {
    fn increment_tokens<'a>(&'a self, key: &'a str, delta: i64) -> BoxFuture<'a, Result<i64, Error>> {
        Box::pin(async move {
            let now = self.clock.now_secs();
            Ok(self.table.increment_tokens(key, delta, now))
        })
    }

    fn last_refill<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<u64>, Error>> {
        Box::pin(async move {
            let now = self.clock.now_secs();
            Ok(self.table.last_refill(key, now))
        })
    }

    fn set_last_refill<'a>(&'a self, key: &'a str, timestamp: u64) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let now = self.clock.now_secs();
            self.table.set_last_refill(key, timestamp, now);
            Ok(())
        })
    }

    fn init_last_refill<'a>(&'a self, key: &'a str, timestamp: u64) -> BoxFuture<'a, Result<bool, Error>> {
        Box::pin(async move {
            let now = self.clock.now_secs();
            Ok(self.table.init_last_refill(key, timestamp, now))
        })
    }
}
