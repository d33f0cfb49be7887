//! Request logging middleware
//!
//! Stamps a UUID request id on every request, logs start/completion with
//! method, path, and client, and always sets the `X-Request-ID` response
//! header. Requests slower than the configured threshold are reported at
//! warning level with an `X-Response-Time-Ms` header.

use std::time::Instant;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api::{ApiRequest, ApiResponse};

/// Logging middleware state
pub struct RequestLogger {
    /// Warn when a request exceeds this many milliseconds; None disables
    pub slow_threshold_ms: Option<u64>,
}

impl RequestLogger {
    pub fn new(slow_threshold_ms: Option<u64>) -> Self {
        Self { slow_threshold_ms }
    }

    /// Wrap an inner handler with request logging
    pub async fn handle<F, Fut>(&self, mut request: ApiRequest, next: F) -> ApiResponse
    where
        F: FnOnce(ApiRequest) -> Fut,
        Fut: Future<Output = ApiResponse>,
    {
        let request_id = Uuid::now_v7().to_string();
        request.request_id = Some(request_id.clone());

        let user_agent = request.header("User-Agent").unwrap_or("-").to_string();
        info!(
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
            client = %request.client_ip,
            user_agent = %user_agent,
            "request started"
        );

        let started = Instant::now();
        let path = request.path.clone();
        let method = request.method.clone();
        let mut response = next(request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        if response.status >= 500 {
            error!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status = response.status,
                duration_ms,
                "request failed"
            );
        } else {
            info!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status = response.status,
                duration_ms,
                "request completed"
            );
        }

        if let Some(threshold) = self.slow_threshold_ms
            && duration_ms > threshold
        {
            warn!(
                request_id = %request_id,
                path = %path,
                duration_ms,
                threshold_ms = threshold,
                "slow request"
            );
            response.set_header("X-Response-Time-Ms", duration_ms.to_string());
        }

        response.set_header("X-Request-ID", request_id);
        response
    }
}
