//! Tollgate Bucket
//!
//! Core token-bucket primitives for the Tollgate admission controller:
//! the pure refill/admission algorithm, a pluggable wall-clock source,
//! and a concurrent in-process bucket table.

mod bucket;
mod clock;
mod table;

pub use bucket::{
    BucketState,
    InvalidRateLimit,
    RateLimitConfig,
    Refill,
};
pub use clock::{Clock, SystemClock};
pub use table::BucketTable;
