//! Error handling tools

use std::{
    error::Error as StdError,
    fmt,
};

/// Type-erased error produced by a bucket store backend.
pub type BoxError = Box<
    dyn StdError
    + Send
    + Sync
>;

/// Represents an admission controller error.
///
/// Over-limit is deliberately **not** represented here: running out of
/// tokens is an expected, frequent decision outcome surfaced through
/// [`AdmissionDecision`], never through this type.
///
/// [`AdmissionDecision`]: crate::limiter::AdmissionDecision
#[derive(Debug)]
pub enum Error {
    /// Invalid rate limiting parameters or an unusable store topology.
    /// Fatal at construction time; never produced while serving requests.
    Config(BoxError),

    /// A bucket store could not serve a request-time operation. The
    /// controller recovers by falling back to the in-process store.
    Store(BoxError),

    /// A bucket store operation exceeded the configured deadline. The
    /// fallback policy treats this the same as [`Error::Store`].
    Timeout,
}

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(err: impl Into<BoxError>) -> Self {
        Error::Config(err.into())
    }

    /// Creates a store error.
    #[inline]
    pub fn store(err: impl Into<BoxError>) -> Self {
        Error::Store(err.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(err) => write!(f, "configuration error: {err}"),
            Error::Store(err) => write!(f, "bucket store error: {err}"),
            Error::Timeout => f.write_str("bucket store operation timed out"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Config(err) | Error::Store(err) => Some(err.as_ref()),
            Error::Timeout => None,
        }
    }
}

impl From<tollgate_bucket::InvalidRateLimit> for Error {
    #[inline]
    fn from(err: tollgate_bucket::InvalidRateLimit) -> Self {
        Error::Config(err.into())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    #[inline]
    fn from(err: redis::RedisError) -> Self {
        Error::Store(err.into())
    }
}
