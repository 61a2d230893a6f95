//! Pure token-bucket refill and admission logic.
//!
//! Everything in this module is side-effect free: callers supply the
//! observed bucket state and the current wall-clock time, and receive the
//! recomputed state plus the admission verdict. Persisting the result is
//! the caller's concern, which keeps the algorithm identical no matter
//! how many processes share a bucket.

use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Process-wide rate limiting parameters, immutable after construction.
///
/// A bucket holds at most `capacity` tokens and gains `refill_amount`
/// tokens per elapsed `refill_interval`. Each admitted request consumes
/// one token.
///
/// ## Example
/// ```
/// use std::time::Duration;
/// use tollgate_bucket::RateLimitConfig;
///
/// // 10 requests per second, bursts of up to 30
/// let config = RateLimitConfig::new(10, Duration::from_secs(1))
///     .with_capacity(30);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    refill_amount: i64,
    refill_interval: Duration,
    capacity: i64,
}

/// Per-key bucket state as observed in a bucket store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketState {
    /// Currently available admission units.
    pub tokens: i64,

    /// Unix seconds of the last applied refill.
    pub last_refill: u64,
}

/// A refill owed to a bucket: tokens to add and the advanced timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refill {
    /// Tokens to add, already capped at the bucket capacity.
    pub tokens: i64,

    /// New `last_refill` value, advanced by whole refill periods rather
    /// than set to `now`, so rounding never accumulates drift.
    pub last_refill: u64,
}

/// Invalid rate limiting parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidRateLimit {
    /// The refill amount must be a positive number of tokens.
    NonPositiveRefill(i64),

    /// The capacity must be a positive number of tokens.
    NonPositiveCapacity(i64),

    /// The refill interval must be a whole, non-zero number of seconds;
    /// bucket timestamps are exchanged as integer unix seconds.
    FractionalInterval(Duration),
}

impl Display for InvalidRateLimit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidRateLimit::NonPositiveRefill(amount) =>
                write!(f, "Rate Limit Error: refill amount must be positive, got {amount}"),
            InvalidRateLimit::NonPositiveCapacity(capacity) =>
                write!(f, "Rate Limit Error: capacity must be positive, got {capacity}"),
            InvalidRateLimit::FractionalInterval(interval) =>
                write!(f, "Rate Limit Error: refill interval must be a whole number of seconds, got {interval:?}"),
        }
    }
}

impl std::error::Error for InvalidRateLimit {}

impl RateLimitConfig {
    /// Creates a new configuration with the given refill amount and
    /// interval. The capacity defaults to the refill amount.
    #[inline]
    pub fn new(refill_amount: i64, refill_interval: Duration) -> Self {
        Self {
            refill_amount,
            refill_interval,
            capacity: refill_amount,
        }
    }

    /// Overrides the maximum number of tokens the bucket can hold.
    ///
    /// Default: the refill amount.
    #[inline]
    pub fn with_capacity(mut self, capacity: i64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Checks the parameters, rejecting non-positive token counts and
    /// zero or fractional-second intervals.
    pub fn validate(&self) -> Result<(), InvalidRateLimit> {
        if self.refill_amount <= 0 {
            return Err(InvalidRateLimit::NonPositiveRefill(self.refill_amount));
        }
        if self.capacity <= 0 {
            return Err(InvalidRateLimit::NonPositiveCapacity(self.capacity));
        }
        if self.refill_interval.as_secs() == 0 || self.refill_interval.subsec_nanos() != 0 {
            return Err(InvalidRateLimit::FractionalInterval(self.refill_interval));
        }
        Ok(())
    }

    /// Tokens added per refill interval.
    #[inline(always)]
    pub fn refill_amount(&self) -> i64 {
        self.refill_amount
    }

    /// Maximum number of tokens the bucket can hold.
    #[inline(always)]
    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    /// The refill interval.
    #[inline(always)]
    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// The refill interval in whole seconds.
    #[inline(always)]
    pub fn interval_secs(&self) -> u64 {
        self.refill_interval.as_secs().max(1)
    }

    /// Computes the refill owed to a bucket last refilled at
    /// `last_refill`, or `None` when less than one full interval has
    /// elapsed.
    ///
    /// Elapsed time is clamped at zero, so a stale or skewed timestamp
    /// never produces a negative refill. An elapsed time that lands
    /// exactly on a period boundary refills exactly that many periods.
    pub fn refill_after(&self, last_refill: u64, now: u64) -> Option<Refill> {
        let interval = self.interval_secs();
        let elapsed = now.saturating_sub(last_refill);
        let periods = elapsed / interval;
        if periods == 0 {
            return None;
        }

        let tokens = periods
            .saturating_mul(self.refill_amount as u64)
            .min(self.capacity as u64) as i64;

        Some(Refill {
            tokens,
            last_refill: last_refill.saturating_add(periods.saturating_mul(interval)),
        })
    }

    /// Applies any owed refill to `state` and attempts to consume one
    /// token.
    ///
    /// Returns the recomputed state and whether the unit was admitted.
    /// When the bucket is empty the state is returned unchanged apart
    /// from the refill — running dry is an expected outcome, not an
    /// error.
    pub fn admit(&self, state: BucketState, now: u64) -> (BucketState, bool) {
        let mut state = state;
        if let Some(refill) = self.refill_after(state.last_refill, now) {
            state.tokens = state.tokens
                .saturating_add(refill.tokens)
                .min(self.capacity);
            state.last_refill = refill.last_refill;
        }

        if state.tokens >= 1 {
            state.tokens -= 1;
            (state, true)
        } else {
            (state, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(config: &RateLimitConfig, now: u64) -> BucketState {
        BucketState { tokens: config.capacity(), last_refill: now }
    }

    #[test]
    fn bucket_allows_burst_up_to_capacity() {
        let config = RateLimitConfig::new(1, Duration::from_secs(1)).with_capacity(3);
        let mut state = full(&config, 100);

        for _ in 0..3 {
            let (next, admitted) = config.admit(state, 100);
            assert!(admitted);
            state = next;
        }

        let (state, admitted) = config.admit(state, 100);
        assert!(!admitted);
        assert_eq!(state.tokens, 0);
    }

    #[test]
    fn bucket_refills_after_interval() {
        let config = RateLimitConfig::new(2, Duration::from_secs(1));
        let state = BucketState { tokens: 0, last_refill: 100 };

        let (state, admitted) = config.admit(state, 101);
        assert!(admitted);
        assert_eq!(state.tokens, 1);
        assert_eq!(state.last_refill, 101);
    }

    #[test]
    fn refill_is_capped_at_capacity() {
        let config = RateLimitConfig::new(2, Duration::from_secs(1)).with_capacity(3);
        let refill = config.refill_after(100, 200).unwrap();

        assert_eq!(refill.tokens, 3);
    }

    #[test]
    fn refill_advances_by_whole_periods_only() {
        let config = RateLimitConfig::new(1, Duration::from_secs(2));

        // 3 seconds elapsed = one whole period; the timestamp advances by
        // 2 seconds, keeping the leftover second for the next refill.
        let refill = config.refill_after(100, 103).unwrap();
        assert_eq!(refill.tokens, 1);
        assert_eq!(refill.last_refill, 102);
    }

    #[test]
    fn refill_on_exact_period_boundary_counts_every_period() {
        let config = RateLimitConfig::new(1, Duration::from_secs(5)).with_capacity(10);
        let refill = config.refill_after(100, 115).unwrap();

        assert_eq!(refill.tokens, 3);
        assert_eq!(refill.last_refill, 115);
    }

    #[test]
    fn no_refill_before_one_full_interval() {
        let config = RateLimitConfig::new(1, Duration::from_secs(10));
        assert!(config.refill_after(100, 109).is_none());
    }

    #[test]
    fn clock_skew_is_clamped_to_zero_elapsed() {
        let config = RateLimitConfig::new(1, Duration::from_secs(1));
        assert!(config.refill_after(100, 50).is_none());

        let state = BucketState { tokens: 1, last_refill: 100 };
        let (state, admitted) = config.admit(state, 50);
        assert!(admitted);
        assert_eq!(state.last_refill, 100);
    }

    #[test]
    fn capacity_defaults_to_refill_amount() {
        let config = RateLimitConfig::new(7, Duration::from_secs(1));
        assert_eq!(config.capacity(), 7);
    }

    #[test]
    fn validate_rejects_non_positive_refill() {
        let config = RateLimitConfig::new(0, Duration::from_secs(1));
        assert_eq!(config.validate(), Err(InvalidRateLimit::NonPositiveRefill(0)));
    }

    #[test]
    fn validate_rejects_non_positive_capacity() {
        let config = RateLimitConfig::new(1, Duration::from_secs(1)).with_capacity(-2);
        assert_eq!(config.validate(), Err(InvalidRateLimit::NonPositiveCapacity(-2)));
    }

    #[test]
    fn validate_rejects_fractional_interval() {
        let interval = Duration::from_millis(500);
        let config = RateLimitConfig::new(1, interval);
        assert_eq!(config.validate(), Err(InvalidRateLimit::FractionalInterval(interval)));
    }

    #[test]
    fn empty_bucket_state_is_unchanged_on_rejection() {
        let config = RateLimitConfig::new(1, Duration::from_secs(60));
        let state = BucketState { tokens: 0, last_refill: 100 };

        let (next, admitted) = config.admit(state, 110);
        assert!(!admitted);
        assert_eq!(next, state);
    }
}
