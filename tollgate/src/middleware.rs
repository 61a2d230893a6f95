//! Middleware tools for admitting or rejecting HTTP requests.
//!
//! This is the only layer that touches request/response framing; it is
//! intentionally thin and replaceable per host framework. The adapter
//! extracts a client key from the request, consults the
//! [`RateLimiter`], and either delegates to the downstream handler
//! unmodified or produces a `429 Too Many Requests` response without
//! invoking it.

use std::{
    future::Future,
    net::SocketAddr,
    sync::Arc,
};
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::{
    header::{HeaderValue, CONTENT_TYPE},
    http::{Request, Response, StatusCode},
};
use crate::{
    error::{BoxError, Error},
    limiter::RateLimiter,
    middleware::by::KeySource,
};

pub mod by;

const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded";
const TEXT_PLAIN: HeaderValue = HeaderValue::from_static("text/plain; charset=utf-8");

/// Unified boxed HTTP response body.
pub type HttpBody = BoxBody<Bytes, BoxError>;

/// An HTTP response with a boxed body.
pub type HttpResponse = Response<HttpBody>;

/// Result of handling an HTTP request.
pub type HttpResult = Result<HttpResponse, Error>;

/// Wraps a complete in-memory payload into an [`HttpBody`].
#[inline]
pub fn full(body: impl Into<Bytes>) -> HttpBody {
    Full::new(body.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Peer socket address of the connection a request arrived on.
///
/// Server glue is expected to insert this into the request extensions;
/// [`by::ip`] falls back to it when no forwarding header names the
/// client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

/// HTTP adapter applying a [`RateLimiter`] in front of a request
/// handler.
///
/// By default requests are grouped by client IP address ([`by::ip`]);
/// any other [`KeySource`] can be plugged in. Rejected requests receive
/// a `429` with the fixed plain-text body `Rate limit exceeded`.
///
/// ## Example
/// ```no_run
/// use std::time::Duration;
/// use tollgate::{by, InMemoryStore, RateLimitConfig, RateLimiter, RateLimitMiddleware};
/// use tollgate::middleware::{full, HttpResult};
/// use hyper::http::{Request, Response};
///
/// # async fn example(req: Request<()>) -> HttpResult {
/// let limiter = RateLimiter::builder(RateLimitConfig::new(100, Duration::from_secs(1)))
///     .with_local_store(InMemoryStore::new())
///     .build()?;
///
/// let middleware = RateLimitMiddleware::new(limiter)
///     .with_key(by::header("x-api-key"));
///
/// middleware.handle(req, |req| async move {
///     let _ = req;
///     Ok(Response::new(full("Hello, World!")))
/// }).await
/// # }
/// ```
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
    key: KeySource,
}

impl RateLimitMiddleware {
    /// Creates a middleware that groups requests by client IP address.
    #[inline]
    pub fn new(limiter: RateLimiter) -> Self {
        Self::shared(Arc::new(limiter))
    }

    /// Creates a middleware over a shared limiter handle.
    #[inline]
    pub fn shared(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            key: by::ip(),
        }
    }

    /// Overrides how the client key is derived from a request.
    ///
    /// Default: [`by::ip`]
    #[inline]
    pub fn with_key(mut self, key: KeySource) -> Self {
        self.key = key;
        self
    }

    /// The limiter this middleware consults.
    #[inline(always)]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Admits or rejects `req`.
    ///
    /// On admission the request is passed to `next` unmodified; on
    /// rejection a `429` response is produced and `next` is never
    /// invoked. A request the key source cannot attribute to a client
    /// is admitted without consulting the limiter.
    pub async fn handle<B, F, Fut>(&self, req: Request<B>, next: F) -> HttpResult
    where
        F: FnOnce(Request<B>) -> Fut,
        Fut: Future<Output = HttpResult>,
    {
        let (parts, body) = req.into_parts();
        let key = self.key.extract(&parts);
        let req = Request::from_parts(parts, body);

        let Some(key) = key else {
            #[cfg(feature = "tracing")]
            tracing::debug!("request has no client key, admitting without rate limiting");
            return next(req).await;
        };

        if self.limiter.check(&key).await.admitted {
            next(req).await
        } else {
            Ok(too_many_requests())
        }
    }
}

fn too_many_requests() -> HttpResponse {
    let mut response = Response::new(full(RATE_LIMIT_MESSAGE));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    response.headers_mut().insert(CONTENT_TYPE, TEXT_PLAIN);
    response
}
