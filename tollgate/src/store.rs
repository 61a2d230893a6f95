//! Bucket store abstractions and backends.
//!
//! A [`BucketStore`] holds per-client bucket state and exposes the
//! primitives the admission controller composes into a check: an atomic
//! token increment and read/write access to the per-key refill
//! timestamp. Two backends are provided:
//!
//! - [`InMemoryStore`] — a concurrent in-process map; the single-instance
//!   operating mode and the degraded-mode fallback.
//! - [`RedisStore`] — a shared Redis instance (feature `redis`); the
//!   backend that makes several service instances enforce one coherent
//!   limit.

use std::sync::Arc;
use futures_util::future::BoxFuture;
use crate::error::Error;

pub use memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

mod memory;
#[cfg(feature = "redis")]
mod redis;

/// A per-client-key bucket state store.
///
/// Keys that have never been seen behave as an implicit zero state:
/// incrementing an unknown key creates it with zero tokens and an unset
/// refill timestamp. The controller treats an unset timestamp as
/// "full bucket, now" on first use.
///
/// Implementations must be safe for arbitrary concurrent invocation;
/// per-key atomicity of [`increment_tokens`] is the contract that rules
/// out double admission under contention.
///
/// [`increment_tokens`]: BucketStore::increment_tokens
pub trait BucketStore: Send + Sync {
    /// Atomically adds `delta` (possibly negative) to the key's token
    /// counter and returns the post-increment value.
    ///
    /// Concurrent callers on the same key must observe a serializable
    /// sequence of increments with no lost updates.
    fn increment_tokens<'a>(&'a self, key: &'a str, delta: i64) -> BoxFuture<'a, Result<i64, Error>>;

    /// Returns the key's last refill timestamp in unix seconds, or
    /// `None` when the key has never been initialized (or has expired).
    fn last_refill<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<u64>, Error>>;

    /// Writes the key's last refill timestamp.
    ///
    /// Best-effort consistent: a race between two concurrent refills of
    /// the same key may double-count one period, which the admission
    /// algorithm tolerates.
    fn set_last_refill<'a>(&'a self, key: &'a str, timestamp: u64) -> BoxFuture<'a, Result<(), Error>>;

    /// Initializes the key's refill timestamp if it is not set yet.
    /// Returns `true` when this call performed the initialization, so
    /// exactly one of several racing first observers seeds the bucket.
    fn init_last_refill<'a>(&'a self, key: &'a str, timestamp: u64) -> BoxFuture<'a, Result<bool, Error>>;
}

impl<S: BucketStore + ?Sized> BucketStore for Arc<S> {
    #[inline]
    fn increment_tokens<'a>(&'a self, key: &'a str, delta: i64) -> BoxFuture<'a, Result<i64, Error>> {
        (**self).increment_tokens(key, delta)
    }

    #[inline]
    fn last_refill<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<u64>, Error>> {
        (**self).last_refill(key)
    }

    #[inline]
    fn set_last_refill<'a>(&'a self, key: &'a str, timestamp: u64) -> BoxFuture<'a, Result<(), Error>> {
        (**self).set_last_refill(key, timestamp)
    }

    #[inline]
    fn init_last_refill<'a>(&'a self, key: &'a str, timestamp: u64) -> BoxFuture<'a, Result<bool, Error>> {
        (**self).init_last_refill(key, timestamp)
    }
}
