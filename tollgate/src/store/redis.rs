//! Redis-backed bucket store.

use std::{
    fmt::{Debug, Formatter},
    time::Duration,
};
use futures_util::future::BoxFuture;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use super::BucketStore;
use crate::error::Error;

const DEFAULT_KEY_PREFIX: &str = "ratelimit:";
const DEFAULT_TTL: Duration = Duration::from_secs(60);

const TOKENS_FIELD: &str = "tokens";
const LAST_REFILL_FIELD: &str = "lastRefill";

/// A [`BucketStore`] backed by a shared Redis instance.
///
/// Each client key maps to a Redis hash at `ratelimit:<key>` holding the
/// integer fields `tokens` and `lastRefill` (unix seconds). Token
/// increments use `HINCRBY`, which Redis executes atomically even under
/// concurrent multi-process access — the mechanism that makes the
/// limiter *distributed* rather than merely concurrent. Timestamp
/// initialization uses `HSETNX`, so racing first observers seed a
/// bucket exactly once.
///
/// Bucket keys carry a TTL refreshed on every increment; an expired key
/// reinitializes as a full bucket on next use.
///
/// Network and server errors propagate to the admission controller,
/// which applies its fallback policy instead of failing the request.
///
/// ## Example
/// ```no_run
/// use tollgate::RedisStore;
///
/// # async fn connect() -> Result<(), tollgate::Error> {
/// let store = RedisStore::connect("redis://127.0.0.1:6379").await?;
/// # let _ = store;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    key_prefix: String,
    ttl: Duration,
}

impl RedisStore {
    /// Connects to the Redis instance at `url`.
    ///
    /// An unparsable URL is a configuration error; a failed connection
    /// attempt is a store error.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = Client::open(url).map_err(Error::config)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    /// Wraps an existing connection handle.
    #[inline]
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            key_prefix: DEFAULT_KEY_PREFIX.into(),
            ttl: DEFAULT_TTL,
        }
    }

    /// Overrides the key prefix.
    ///
    /// Default: `ratelimit:`
    #[inline]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Overrides the idle expiry applied to bucket keys.
    ///
    /// Default: 60 seconds.
    #[inline]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[inline]
    fn bucket_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

impl Debug for RedisStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("key_prefix", &self.key_prefix)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl BucketStore for RedisStore {
    fn increment_tokens<'a>(&'a self, key: &'a str, delta: i64) -> BoxFuture<'a, Result<i64, Error>> {
        Box::pin(async move {
            let bucket = self.bucket_key(key);
            let mut conn = self.conn.clone();

            let (total,): (i64,) = redis::pipe()
                .atomic()
                .hincr(&bucket, TOKENS_FIELD, delta)
                .expire(&bucket, self.ttl.as_secs() as i64)
                .ignore()
                .query_async(&mut conn)
                .await?;

            Ok(total)
        })
    }

    fn last_refill<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<u64>, Error>> {
        Box::pin(async move {
            let bucket = self.bucket_key(key);
            let mut conn = self.conn.clone();

            let timestamp: Option<u64> = conn.hget(&bucket, LAST_REFILL_FIELD).await?;
            Ok(timestamp)
        })
    }

    fn set_last_refill<'a>(&'a self, key: &'a str, timestamp: u64) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let bucket = self.bucket_key(key);
            let mut conn = self.conn.clone();

            let _: () = conn.hset(&bucket, LAST_REFILL_FIELD, timestamp).await?;
            Ok(())
        })
    }

    fn init_last_refill<'a>(&'a self, key: &'a str, timestamp: u64) -> BoxFuture<'a, Result<bool, Error>> {
        Box::pin(async move {
            let bucket = self.bucket_key(key);
            let mut conn = self.conn.clone();

            let initialized: bool = conn.hset_nx(&bucket, LAST_REFILL_FIELD, timestamp).await?;
            Ok(initialized)
        })
    }
}
