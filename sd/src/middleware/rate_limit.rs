//! Sliding-window rate limiting middleware
//!
//! Per-client request budgets over a 60-second window. Denials carry the
//! retry hint headers; admitted requests get live limit headers. A sweep
//! discards idle clients once the tracked-client count passes a threshold.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::{ApiRequest, ApiResponse};

/// Window width
const WINDOW: Duration = Duration::from_secs(60);

/// Tracked-client count that triggers the idle sweep
const SWEEP_THRESHOLD: usize = 10_000;

/// Outcome of a rate-limit check
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp when the window resets
    pub reset_at: u64,
    /// Seconds to wait when denied
    pub retry_after: u64,
}

/// Per-client sliding-window limiter
pub struct RateLimiter {
    requests_per_minute: u32,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Check and record a request for the given client id
    pub async fn check(&self, client_id: &str) -> RateLimitDecision {
        let mut clients = self.clients.lock().await;
        let now = Instant::now();

        let timestamps = clients.entry(client_id.to_string()).or_default();
        while timestamps.front().map(|t| now.duration_since(*t) >= WINDOW).unwrap_or(false) {
            timestamps.pop_front();
        }

        let count = timestamps.len() as u32;
        let reset_at = unix_now() + WINDOW.as_secs();

        let decision = if count < self.requests_per_minute {
            timestamps.push_back(now);
            RateLimitDecision {
                allowed: true,
                limit: self.requests_per_minute,
                remaining: self.requests_per_minute.saturating_sub(count + 1),
                reset_at,
                retry_after: 0,
            }
        } else {
            let retry_after = timestamps
                .front()
                .map(|oldest| WINDOW.saturating_sub(now.duration_since(*oldest)).as_secs())
                .unwrap_or(WINDOW.as_secs());
            RateLimitDecision {
                allowed: false,
                limit: self.requests_per_minute,
                remaining: 0,
                reset_at,
                retry_after,
            }
        };

        if clients.len() > SWEEP_THRESHOLD {
            sweep_idle(&mut clients, now);
        }

        decision
    }

    /// Apply the limiter in front of an inner handler
    pub async fn handle<F, Fut>(&self, request: ApiRequest, next: F) -> ApiResponse
    where
        F: FnOnce(ApiRequest) -> Fut,
        Fut: Future<Output = ApiResponse>,
    {
        let client_id = request.client_id();
        let decision = self.check(&client_id).await;

        if !decision.allowed {
            warn!(
                client_id = %client_id,
                path = %request.path,
                retry_after = decision.retry_after,
                "rate limit exceeded"
            );
            return rejection_response(&decision, self.requests_per_minute);
        }

        let mut response = next(request).await;
        apply_headers(&mut response, &decision);
        response
    }

    /// Clients currently tracked (observability)
    pub async fn tracked_clients(&self) -> usize {
        self.clients.lock().await.len()
    }
}

/// Per-endpoint limiter: same window keyed by (client, path)
pub struct EndpointRateLimiter {
    endpoint_limits: HashMap<String, u32>,
    default_limit: u32,
    clients: Mutex<HashMap<(String, String), VecDeque<Instant>>>,
}

impl EndpointRateLimiter {
    pub fn new(endpoint_limits: HashMap<String, u32>, default_limit: u32) -> Self {
        Self {
            endpoint_limits,
            default_limit,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit_for(&self, path: &str) -> u32 {
        self.endpoint_limits.get(path).copied().unwrap_or(self.default_limit)
    }

    /// Check and record a request against the endpoint's budget
    pub async fn check(&self, client_id: &str, path: &str) -> RateLimitDecision {
        let limit = self.limit_for(path);
        let mut clients = self.clients.lock().await;
        let now = Instant::now();

        let timestamps = clients.entry((client_id.to_string(), path.to_string())).or_default();
        while timestamps.front().map(|t| now.duration_since(*t) >= WINDOW).unwrap_or(false) {
            timestamps.pop_front();
        }

        let count = timestamps.len() as u32;
        let reset_at = unix_now() + WINDOW.as_secs();

        if count < limit {
            timestamps.push_back(now);
            RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit.saturating_sub(count + 1),
                reset_at,
                retry_after: 0,
            }
        } else {
            let retry_after = timestamps
                .front()
                .map(|oldest| WINDOW.saturating_sub(now.duration_since(*oldest)).as_secs())
                .unwrap_or(WINDOW.as_secs());
            RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at,
                retry_after,
            }
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn sweep_idle(clients: &mut HashMap<String, VecDeque<Instant>>, now: Instant) {
    let before = clients.len();
    clients.retain(|_, timestamps| {
        while timestamps.front().map(|t| now.duration_since(*t) >= WINDOW).unwrap_or(false) {
            timestamps.pop_front();
        }
        !timestamps.is_empty()
    });
    debug!(removed = before - clients.len(), active = clients.len(), "rate limit sweep");
}

/// 429 with retry hints
fn rejection_response(decision: &RateLimitDecision, limit: u32) -> ApiResponse {
    let mut response = ApiResponse::with_status(
        429,
        json!({
            "error": "Too Many Requests",
            "detail": format!("Rate limit of {limit} requests/minute exceeded"),
            "retry_after": decision.retry_after,
            "limit": decision.limit,
            "remaining": 0,
        }),
    );
    response.set_header("Retry-After", decision.retry_after.to_string());
    apply_headers(&mut response, decision);
    response
}

fn apply_headers(response: &mut ApiResponse, decision: &RateLimitDecision) {
    response.set_header("X-RateLimit-Limit", decision.limit.to_string());
    response.set_header("X-RateLimit-Remaining", decision.remaining.to_string());
    response.set_header("X-RateLimit-Reset", decision.reset_at.to_string());
}
