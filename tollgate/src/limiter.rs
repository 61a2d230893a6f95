//! The admission controller orchestrating clock, stores, and bucket math.

use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
    time::Duration,
};
use tokio::time::timeout;
use tollgate_bucket::{Clock, RateLimitConfig, SystemClock};
use crate::{
    error::Error,
    store::{BucketStore, InMemoryStore},
};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionDecision {
    /// Whether the unit of work may proceed.
    pub admitted: bool,
}

/// A distributed, per-client admission controller.
///
/// For every client key the limiter maintains a token bucket in a
/// [`BucketStore`] and decides on each [`check`] whether to admit or
/// reject one unit of work. Refill happens lazily from elapsed
/// wall-clock time on access — there is no background task, and the
/// behavior is identical no matter how many processes share the bucket
/// store or how long the limiter has been idle.
///
/// ## Stores and degraded mode
///
/// When a remote store is configured it is consulted first, so every
/// instance sharing it enforces one coherent limit. Any remote error or
/// timeout falls back to the in-process store **for that call only**:
/// the limiter stays available at the cost of per-instance rather than
/// global enforcement while the outage lasts. With only an in-process
/// store configured, the limiter operates in single-instance mode.
///
/// ## Concurrency
///
/// [`check`] may be called concurrently from any number of tasks for
/// the same or different keys. Per-key atomicity is delegated to the
/// store; the limiter holds no lock across keys.
///
/// ## Cancellation
///
/// [`check`] may block on store I/O. The configured store timeout bounds
/// the remote attempt; dropping the returned future aborts any in-flight
/// store call, so callers may additionally wrap [`check`] in their own
/// timeout.
///
/// ## Example
/// ```no_run
/// use std::time::Duration;
/// use tollgate::{InMemoryStore, RateLimitConfig, RateLimiter};
///
/// # async fn example() -> Result<(), tollgate::Error> {
/// let limiter = RateLimiter::builder(RateLimitConfig::new(100, Duration::from_secs(1)))
///     .with_local_store(InMemoryStore::new())
///     .build()?;
///
/// let decision = limiter.check("203.0.113.7").await;
/// if decision.admitted {
///     // handle the request
/// }
/// # Ok(())
/// # }
/// ```
///
/// [`check`]: RateLimiter::check
pub struct RateLimiter {
    config: RateLimitConfig,
    remote: Option<Arc<dyn BucketStore>>,
    local: Arc<dyn BucketStore>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl Debug for RateLimiter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("remote", &self.remote.is_some())
            .field("store_timeout", &self.store_timeout)
            .finish()
    }
}

impl RateLimiter {
    /// Starts building a limiter with the given rate limiting
    /// parameters.
    #[inline]
    pub fn builder(config: RateLimitConfig) -> RateLimiterBuilder {
        RateLimiterBuilder {
            config,
            remote: None,
            local: None,
            clock: None,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// The rate limiting parameters this limiter enforces.
    #[inline(always)]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Decides whether one unit of work for `key` may proceed,
    /// persisting the updated bucket state as a side effect.
    ///
    /// Running over the limit is an expected outcome reported through
    /// [`AdmissionDecision::admitted`], never an error. Store failures
    /// are recovered internally: remote errors fall back to the
    /// in-process store, and if every configured store fails the check
    /// fails open and admits.
    pub async fn check(&self, key: &str) -> AdmissionDecision {
        let now = self.clock.now_secs();

        if let Some(remote) = &self.remote {
            match timeout(self.store_timeout, self.check_store(remote.as_ref(), key, now)).await {
                Ok(Ok(admitted)) => return AdmissionDecision { admitted },
                Ok(Err(_err)) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("remote bucket store failed, using in-process fallback: {_err}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        "remote bucket store timed out after {:?}, using in-process fallback",
                        self.store_timeout
                    );
                }
            }
        }

        match self.check_store(self.local.as_ref(), key, now).await {
            Ok(admitted) => AdmissionDecision { admitted },
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::error!("in-process bucket store failed, admitting: {_err}");
                AdmissionDecision { admitted: true }
            }
        }
    }

    /// Runs the refill-and-consume sequence against one store.
    ///
    /// A key without a refill timestamp is a fresh bucket: the winner of
    /// the initialization race seeds it at full capacity. Otherwise any
    /// owed whole-period refill is applied, clamping overshoot from
    /// concurrent refills back down to capacity. Finally one token is
    /// consumed; a result below zero means the bucket was already empty
    /// and the token is restored.
    async fn check_store(&self, store: &dyn BucketStore, key: &str, now: u64) -> Result<bool, Error> {
        match store.last_refill(key).await? {
            None => {
                if store.init_last_refill(key, now).await? {
                    let total = store.increment_tokens(key, self.config.capacity()).await?;
                    self.clamp_overflow(store, key, total).await?;
                }
            }
            Some(last_refill) => {
                if let Some(refill) = self.config.refill_after(last_refill, now) {
                    store.set_last_refill(key, refill.last_refill).await?;
                    let total = store.increment_tokens(key, refill.tokens).await?;
                    self.clamp_overflow(store, key, total).await?;
                }
            }
        }

        let remaining = store.increment_tokens(key, -1).await?;
        if remaining < 0 {
            store.increment_tokens(key, 1).await?;
            return Ok(false);
        }

        Ok(true)
    }

    async fn clamp_overflow(&self, store: &dyn BucketStore, key: &str, total: i64) -> Result<(), Error> {
        let capacity = self.config.capacity();
        if total > capacity {
            store.increment_tokens(key, capacity - total).await?;
        }
        Ok(())
    }
}

/// Builds a [`RateLimiter`].
///
/// At least one store must be supplied; configuring neither is an
/// [`Error::Config`] at build time. When only a remote store is given,
/// an [`InMemoryStore`] is provisioned automatically so degraded mode
/// always has a fallback.
pub struct RateLimiterBuilder {
    config: RateLimitConfig,
    remote: Option<Arc<dyn BucketStore>>,
    local: Option<Arc<dyn BucketStore>>,
    clock: Option<Arc<dyn Clock>>,
    store_timeout: Duration,
}

impl RateLimiterBuilder {
    /// Sets the shared remote store consulted first on every check.
    #[inline]
    pub fn with_remote_store(mut self, store: impl BucketStore + 'static) -> Self {
        self.remote = Some(Arc::new(store));
        self
    }

    /// Sets the in-process store, used directly in single-instance mode
    /// or as the degraded-mode fallback.
    #[inline]
    pub fn with_local_store(mut self, store: impl BucketStore + 'static) -> Self {
        self.local = Some(Arc::new(store));
        self
    }

    /// Overrides the clock, primarily useful for deterministic tests.
    #[inline]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Sets the deadline applied to the remote store attempt of each
    /// check. A timeout is treated as a store failure and triggers the
    /// fallback policy.
    ///
    /// Default: 1 second.
    #[inline]
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Validates the configuration and builds the limiter.
    pub fn build(self) -> Result<RateLimiter, Error> {
        self.config.validate()?;

        let local: Arc<dyn BucketStore> = match (self.local, self.remote.is_some()) {
            (Some(local), _) => local,
            (None, true) => Arc::new(InMemoryStore::new()),
            (None, false) => return Err(Error::config("at least one bucket store is required")),
        };

        Ok(RateLimiter {
            config: self.config,
            remote: self.remote,
            local,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            store_timeout: self.store_timeout,
        })
    }
}
