//! Request-plane middleware stack
//!
//! Composition, outer to inner: Logging -> RateLimit -> Auth -> endpoint.
//! The stack operates on the crate's request/response types; the HTTP
//! binding adapts to and from them at the edge.

mod auth;
mod logging;
mod rate_limit;

pub use auth::{Authenticator, PUBLIC_PATHS};
pub use logging::RequestLogger;
pub use rate_limit::{EndpointRateLimiter, RateLimitDecision, RateLimiter};

use crate::api::{ApiRequest, ApiResponse};
use crate::config::{AuthConfig, RateLimitConfig};

/// The composed middleware chain
pub struct MiddlewareStack {
    logger: RequestLogger,
    limiter: RateLimiter,
    authenticator: Authenticator,
}

impl MiddlewareStack {
    pub fn new(logger: RequestLogger, limiter: RateLimiter, authenticator: Authenticator) -> Self {
        Self {
            logger,
            limiter,
            authenticator,
        }
    }

    /// Build the stack from configuration
    pub fn from_config(rate_limit: &RateLimitConfig, auth: &AuthConfig) -> Self {
        Self {
            logger: RequestLogger::new(Some(rate_limit.slow_threshold_ms)),
            limiter: RateLimiter::new(rate_limit.requests_per_minute),
            authenticator: Authenticator::from_config(auth),
        }
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Run a request through the full chain into the endpoint
    pub async fn handle<F, Fut>(&self, request: ApiRequest, endpoint: F) -> ApiResponse
    where
        F: FnOnce(ApiRequest) -> Fut,
        Fut: Future<Output = ApiResponse>,
    {
        self.logger
            .handle(request, |request| async move {
                self.limiter
                    .handle(request, |request| async move {
                        self.authenticator.handle(request, endpoint).await
                    })
                    .await
            })
            .await
    }
}
