//! Helpers for building rate limiting client keys.
//!
//! A client key is the identity under which requests are grouped for
//! limiting. This module provides the common sources — client IP
//! address, an HTTP header, or a custom function — as cheap, cloneable
//! [`KeySource`] values.
//!
//! # Examples
//!
//! ```no_run
//! use tollgate::by;
//!
//! // Rate limit by client IP
//! by::ip();
//!
//! // Rate limit by X-Api-Key HTTP header
//! by::header("x-api-key");
//! ```

use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use hyper::{
    header::{HeaderName, FORWARDED},
    http::request::Parts,
};
use super::PeerAddr;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// A function that derives a client key from request parts, or `None`
/// when the request cannot be attributed to a client.
///
/// Type-erased and stored behind an `Arc` to allow cheap cloning and
/// thread-safe sharing.
type KeyExtractor = Arc<
    dyn Fn(&Parts) -> Option<String>
    + Send
    + Sync
    + 'static
>;

/// Represents a source from which a rate-limiting client key is derived.
///
/// A client key determines *which requests share the same bucket*:
/// grouping by client IP address, by an API key header, or by any
/// custom request-derived value. Keys are case-sensitive strings and
/// are used verbatim — no normalization or hashing is applied beyond
/// what the source itself performs.
///
/// Users construct `KeySource` values via the helper functions in this
/// module, such as [`ip`] or [`header`].
#[derive(Clone)]
pub struct KeySource {
    inner: ClientKey,
}

/// Represents a source from which a client key is derived.
///
/// This enum is an internal implementation detail and is exposed to
/// users through helper functions such as [`ip`] and [`header`].
#[derive(Clone)]
enum ClientKey {
    /// Derives the key from the client IP address.
    ///
    /// The IP address is resolved in the following order:
    /// 1. The standardized `Forwarded` header (RFC 7239)
    /// 2. The legacy `X-Forwarded-For` header
    /// 3. The [`PeerAddr`] request extension as a fallback
    Ip,

    /// Derives the key using a user-defined function.
    Custom(KeyExtractor),
}

impl Debug for KeySource {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.inner {
            ClientKey::Ip => f.debug_tuple("KeySource::Ip").finish(),
            ClientKey::Custom(_) => f.debug_tuple("KeySource::Custom").finish(),
        }
    }
}

impl KeySource {
    /// Extracts the client key from the given request parts.
    pub(crate) fn extract(&self, parts: &Parts) -> Option<String> {
        match &self.inner {
            ClientKey::Ip => client_ip(parts),
            ClientKey::Custom(extractor) => extractor(parts),
        }
    }
}

/// Uses the client IP address as the rate limiting client key.
///
/// The IP address is resolved in the following order:
/// 1. The `Forwarded` header (RFC 7239)
/// 2. The `X-Forwarded-For` header
/// 3. The [`PeerAddr`] request extension as a fallback
///
/// This is the most common strategy for global or unauthenticated rate
/// limiting. A request carrying none of the three sources is admitted
/// without rate limiting.
#[inline]
pub fn ip() -> KeySource {
    KeySource {
        inner: ClientKey::Ip,
    }
}

/// Uses the value of an HTTP header as the rate limiting client key.
///
/// # Notes
/// - Header names are case-insensitive; values are used verbatim.
/// - Requests without the header are admitted without rate limiting.
///
/// # Example
/// ```no_run
/// use tollgate::by;
///
/// by::header("x-api-key");
/// ```
#[inline]
pub fn header(name: &'static str) -> KeySource {
    let header = HeaderName::from_static(name);

    let key = ClientKey::Custom(Arc::new(move |parts| {
        parts.headers
            .get(&header)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    }));

    KeySource { inner: key }
}

/// Uses a user-defined function as the rate limiting client key source.
///
/// Returning `None` admits the request without rate limiting.
///
/// # Example
/// ```no_run
/// use tollgate::by;
///
/// // Group all requests of one URI path together
/// by::custom(|parts| Some(parts.uri.path().to_owned()));
/// ```
#[inline]
pub fn custom<F>(f: F) -> KeySource
where
    F: Fn(&Parts) -> Option<String> + Send + Sync + 'static,
{
    KeySource {
        inner: ClientKey::Custom(Arc::new(f)),
    }
}

fn client_ip(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(FORWARDED) {
        if let Some(client) = value.to_str().ok().and_then(forwarded_for) {
            return Some(client);
        }
    }

    if let Some(value) = parts.headers.get(&X_FORWARDED_FOR) {
        if let Some(client) = value.to_str().ok().and_then(first_forwarded_entry) {
            return Some(client);
        }
    }

    parts.extensions
        .get::<PeerAddr>()
        .map(|PeerAddr(addr)| addr.ip().to_string())
}

// The `for=` directive of the first element of a `Forwarded` list,
// unquoted. See RFC 7239 §4.
fn forwarded_for(value: &str) -> Option<String> {
    value.split(',')
        .next()?
        .split(';')
        .find_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            if name.trim().eq_ignore_ascii_case("for") {
                let value = value.trim().trim_matches('"');
                (!value.is_empty()).then(|| value.to_owned())
            } else {
                None
            }
        })
}

fn first_forwarded_entry(value: &str) -> Option<String> {
    let entry = value.split(',').next()?.trim();
    (!entry.is_empty()).then(|| entry.to_owned())
}
