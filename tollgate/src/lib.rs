//! # Tollgate
//!
//! > Distributed, per-client admission control for HTTP services: a
//! > token-bucket rate limiter whose state lives in-process or in a
//! > shared Redis instance, so any number of service instances enforce
//! > one coherent limit.
//!
//! ## Features
//! * Lazy, elapsed-time token refill — no background tasks
//! * No double admission under contention: per-key atomicity is
//!   delegated to the bucket store
//! * Shared limits across instances through a Redis-backed store
//! * Degraded-mode fallback to in-process enforcement during store
//!   outages — a store failure never fails the request
//! * Pluggable client-key sources (IP, header, custom)
//! * Runs on stable Rust 1.80+
//!
//! ## Example
//! ```no_run
//! use std::time::Duration;
//! use tollgate::{InMemoryStore, RateLimitConfig, RateLimiter};
//!
//! # async fn example() -> Result<(), tollgate::Error> {
//! // 100 requests per second per client, bursts of up to 200
//! let limiter = RateLimiter::builder(RateLimitConfig::new(100, Duration::from_secs(1)).with_capacity(200))
//!     .with_local_store(InMemoryStore::new())
//!     .build()?;
//!
//! if limiter.check("203.0.113.7").await.admitted {
//!     // handle the request
//! } else {
//!     // respond with 429
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(unreachable_pub)]

pub mod error;
pub mod limiter;
pub mod store;
#[cfg(feature = "middleware")]
pub mod middleware;

pub use crate::error::Error;
pub use crate::limiter::{
    AdmissionDecision,
    RateLimiter,
    RateLimiterBuilder,
};
pub use crate::store::{BucketStore, InMemoryStore};

#[cfg(feature = "redis")]
pub use crate::store::RedisStore;

#[cfg(feature = "middleware")]
pub use crate::middleware::{by, PeerAddr, RateLimitMiddleware};

pub use tollgate_bucket::{
    BucketState,
    Clock,
    RateLimitConfig,
    SystemClock,
};
