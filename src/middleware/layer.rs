//! Rate limit middleware layer.

use axum::body::Body;
use axum::http::{Request, Response};
use futures::future::{self, BoxFuture};
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tower::{Layer, Service};

use super::hook::{LogRejections, Rejection, RejectionHook};
use super::response::{add_rate_limit_headers, identity_failure, too_many_requests};
use crate::config::{IdentityPolicy, LimiterConfig, RateLimitingConfig, DEFAULT_REJECTION_MESSAGE};
use crate::error::Result;
use crate::identity::extract_client_key;
use crate::ratelimit::{Decision, WindowTracker};

/// Rate limit layer.
///
/// Every service produced by one layer shares the same [`WindowTracker`], so
/// a client's quota spans all routes the layer is applied to.
#[derive(Clone)]
pub struct RateLimitLayer {
    tracker: Arc<WindowTracker>,
    policy: IdentityPolicy,
    rejection_message: Arc<str>,
    hook: Arc<dyn RejectionHook>,
}

impl RateLimitLayer {
    /// Create a layer enforcing `config` with default identity policy, message and hook.
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            tracker: Arc::new(WindowTracker::new(config)),
            policy: IdentityPolicy::default(),
            rejection_message: Arc::from(DEFAULT_REJECTION_MESSAGE),
            hook: Arc::new(LogRejections),
        }
    }

    /// Build a layer from the service configuration.
    pub fn from_config(config: &RateLimitingConfig) -> Result<Self> {
        Ok(Self::new(config.limiter_config()?)
            .with_identity_policy(config.identity_policy())
            .with_rejection_message(config.rejection_message.as_str()))
    }

    /// Select which request attributes identify a client.
    pub fn with_identity_policy(mut self, policy: IdentityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the body sent with 429 responses.
    pub fn with_rejection_message(mut self, message: impl Into<String>) -> Self {
        self.rejection_message = Arc::from(message.into());
        self
    }

    /// Replace the observer notified of every rejected request.
    pub fn with_rejection_hook(mut self, hook: impl RejectionHook + 'static) -> Self {
        self.hook = Arc::new(hook);
        self
    }

    /// The tracker shared by every service this layer produces.
    pub fn tracker(&self) -> Arc<WindowTracker> {
        self.tracker.clone()
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = Limiter<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Limiter {
            inner,
            tracker: self.tracker.clone(),
            policy: self.policy,
            rejection_message: self.rejection_message.clone(),
            hook: self.hook.clone(),
        }
    }
}

/// Service that admits at most `limit` requests per client per window and
/// answers the rest itself.
#[derive(Clone)]
pub struct Limiter<S> {
    inner: S,
    tracker: Arc<WindowTracker>,
    policy: IdentityPolicy,
    rejection_message: Arc<str>,
    hook: Arc<dyn RejectionHook>,
}

impl<S> Limiter<S> {
    /// Wrap `inner`, allowing `limit` requests per client per `window`.
    ///
    /// Fails if either value is zero.
    pub fn new(inner: S, limit: u64, window: Duration) -> Result<Self> {
        Ok(RateLimitLayer::new(LimiterConfig::new(limit, window)?).layer(inner))
    }

    /// The tracker holding this limiter's per-client state.
    pub fn tracker(&self) -> &Arc<WindowTracker> {
        &self.tracker
    }
}

impl<S, B> Service<Request<B>> for Limiter<S>
where
    S: Service<Request<B>, Response = Response<Body>, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let key = match extract_client_key(&req, self.policy) {
            Ok(key) => key,
            Err(err) => {
                self.hook.on_rejection(&Rejection::IdentityExtraction(&err));
                return Box::pin(future::ready(Ok(identity_failure(&err))));
            }
        };

        let remaining = match self.tracker.check(&key, Instant::now()) {
            Decision::Allow { remaining } => remaining,
            Decision::Deny { retry_after } => {
                self.hook.on_rejection(&Rejection::QuotaExceeded {
                    key: &key,
                    retry_after,
                });
                let response = too_many_requests(&self.rejection_message, retry_after);
                return Box::pin(future::ready(Ok(response)));
            }
        };

        // Use the instance that was polled ready, leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let limit = self.tracker.config().limit();

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            add_rate_limit_headers(response.headers_mut(), limit, remaining);
            Ok(response)
        })
    }
}
