//! Authentication middleware
//!
//! Public paths pass through; everything else needs a Bearer JWT (verified
//! signature, unexpired) or an API key in the configured header. Successful
//! authentication attaches the principal to the request.

use std::collections::HashSet;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::api::{ApiError, ApiRequest, ApiResponse, AuthMethod, AuthUser};
use crate::config::AuthConfig;

/// Paths that never require authentication (exact match; non-root entries
/// also match as prefixes)
pub const PUBLIC_PATHS: &[&str] = &["/", "/docs", "/redoc", "/openapi.json", "/api/v1/health", "/metrics"];

/// User id attached to API-key principals
const API_KEY_USER: &str = "api_key_user";

/// Authenticator state
pub struct Authenticator {
    jwt_secret: Option<String>,
    algorithm: Algorithm,
    api_key_header: String,
    api_keys: HashSet<String>,
    default_expiry_hours: i64,
}

impl Authenticator {
    /// Build from configuration, reading secrets from the environment
    pub fn from_config(config: &AuthConfig) -> Self {
        let jwt_secret = std::env::var(&config.jwt_secret_env).ok();
        if jwt_secret.is_none() {
            warn!(var = %config.jwt_secret_env, "JWT secret not set; bearer tokens will be rejected");
        }

        let api_keys: HashSet<String> = std::env::var(&config.api_keys_env)
            .map(|raw| raw.split(',').map(|k| k.trim().to_string()).filter(|k| !k.is_empty()).collect())
            .unwrap_or_default();

        let algorithm = match config.jwt_algorithm.as_str() {
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            _ => Algorithm::HS256,
        };

        Self {
            jwt_secret,
            algorithm,
            api_key_header: config.api_key_header.clone(),
            api_keys,
            default_expiry_hours: config.jwt_expiry_hours,
        }
    }

    /// Constructor for tests and embedded use
    pub fn with_secret(secret: impl Into<String>, api_keys: HashSet<String>) -> Self {
        Self {
            jwt_secret: Some(secret.into()),
            algorithm: Algorithm::HS256,
            api_key_header: "X-API-Key".to_string(),
            api_keys,
            default_expiry_hours: 24,
        }
    }

    /// Exact public paths, plus prefix matches for non-root entries
    pub fn is_public(path: &str) -> bool {
        if PUBLIC_PATHS.contains(&path) {
            return true;
        }
        PUBLIC_PATHS
            .iter()
            .filter(|p| **p != "/")
            .any(|p| path.starts_with(p))
    }

    /// Authenticate a request; Err carries the 401 detail
    pub fn authenticate(&self, request: &ApiRequest) -> Result<(AuthUser, AuthMethod), String> {
        // Bearer JWT first
        if let Some(auth_header) = request.header("Authorization")
            && let Some(token) = auth_header.strip_prefix("Bearer ")
        {
            match self.validate_jwt(token) {
                Ok(user) => return Ok((user, AuthMethod::Jwt)),
                Err(detail) => debug!(%detail, "JWT validation failed"),
            }
        }

        // Then the API key header
        if let Some(key) = request.header(&self.api_key_header) {
            if self.api_keys.contains(key) {
                return Ok((
                    AuthUser {
                        user_id: API_KEY_USER.to_string(),
                        claims: json!({ "auth_method": "api_key" }),
                    },
                    AuthMethod::ApiKey,
                ));
            }
            debug!("API key not in configured store");
        }

        Err("No valid authentication credentials provided".to_string())
    }

    fn validate_jwt(&self, token: &str) -> Result<AuthUser, String> {
        let secret = self.jwt_secret.as_ref().ok_or_else(|| "JWT secret not configured".to_string())?;

        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;

        let data = decode::<Value>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .map_err(|e| format!("Invalid token: {e}"))?;

        let user_id = data.claims["user_id"]
            .as_str()
            .ok_or_else(|| "Token missing user_id claim".to_string())?
            .to_string();

        Ok(AuthUser {
            user_id,
            claims: data.claims,
        })
    }

    /// Apply authentication in front of an inner handler
    pub async fn handle<F, Fut>(&self, mut request: ApiRequest, next: F) -> ApiResponse
    where
        F: FnOnce(ApiRequest) -> Fut,
        Fut: Future<Output = ApiResponse>,
    {
        if Self::is_public(&request.path) {
            return next(request).await;
        }

        match self.authenticate(&request) {
            Ok((user, method)) => {
                debug!(user_id = %user.user_id, method = ?method, path = %request.path, "request authenticated");
                request.user = Some(user);
                request.auth_method = Some(method);
                next(request).await
            }
            Err(detail) => ApiError::unauthorized(detail, request.path.clone()).into_response(),
        }
    }

    /// Sign a JWT with `{user_id, exp, iat}` plus extra claims
    pub fn issue_token(
        &self,
        user_id: &str,
        extra_claims: Option<Value>,
        expires_hours: Option<i64>,
    ) -> Result<String, String> {
        let secret = self.jwt_secret.as_ref().ok_or_else(|| "JWT secret not configured".to_string())?;
        let hours = expires_hours.unwrap_or(self.default_expiry_hours);
        let now = chrono::Utc::now();

        let mut claims = json!({
            "user_id": user_id,
            "iat": now.timestamp(),
            "exp": (now + chrono::Duration::hours(hours)).timestamp(),
        });
        if let Some(Value::Object(extra)) = extra_claims {
            let merged = claims.as_object_mut().expect("claims are an object");
            for (key, value) in extra {
                merged.entry(key).or_insert(value);
            }
        }

        encode(
            &Header::new(self.algorithm),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| format!("Failed to sign token: {e}"))
    }
}
