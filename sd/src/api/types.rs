//! Request-plane primitives
//!
//! The HTTP binding lives outside this crate; these types carry the
//! contract: method/path/headers/client identity in, status/headers/body
//! out, and the canonical error shape.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

/// Authentication method that admitted a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Jwt,
    ApiKey,
}

/// Authenticated principal attached to a request
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub user_id: String,
    /// Raw claims (JWT) or key metadata
    pub claims: Value,
}

/// An incoming request as the middleware stack sees it
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub client_ip: String,
    pub body: Value,
    /// Stamped by the logging middleware
    pub request_id: Option<String>,
    /// Set by the auth middleware on success
    pub user: Option<AuthUser>,
    pub auth_method: Option<AuthMethod>,
}

impl ApiRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            client_ip: "unknown".to_string(),
            body: Value::Null,
            request_id: None,
            user: None,
            auth_method: None,
        }
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = ip.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Rate-limit identity: client ip, extended with the user id once
    /// authenticated
    pub fn client_id(&self) -> String {
        match &self.user {
            Some(user) => format!("{}:{}", self.client_ip, user.user_id),
            None => self.client_ip.clone(),
        }
    }
}

/// An outgoing response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body,
        }
    }

    pub fn with_status(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body,
        }
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }
}

/// Canonical error payload: `{error, detail, path, request_id?}`
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: u16,
    pub error: String,
    pub detail: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn new(status: u16, error: impl Into<String>, detail: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            detail: detail.into(),
            path: path.into(),
            request_id: None,
        }
    }

    pub fn bad_request(detail: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(400, "Bad Request", detail, path)
    }

    pub fn unauthorized(detail: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(401, "Unauthorized", detail, path)
    }

    pub fn not_found(detail: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(404, "Not Found", detail, path)
    }

    pub fn internal(detail: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(500, "Internal Server Error", detail, path)
    }

    pub fn unavailable(detail: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(503, "Service Unavailable", detail, path)
    }

    pub fn into_response(self) -> ApiResponse {
        let status = self.status;
        let body = serde_json::to_value(&self).unwrap_or(Value::Null);
        ApiResponse::with_status(status, body)
    }
}
