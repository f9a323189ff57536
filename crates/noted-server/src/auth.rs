//! Bearer-token authentication
//!
//! Every sync record is scoped to the authenticated user; the token's
//! subject claim is the only user identity the server trusts.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use noted_core::UserId;

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String,
    exp: i64,
}

/// The identity a verified token resolves to
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// HS256 verifier over the shared secret
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("JwtVerifier").finish_non_exhaustive()
    }
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let decoded = decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|error| AppError::unauthorized(format!("Invalid access token: {error}")))?;
        let user_id = decoded
            .claims
            .sub
            .parse()
            .map_err(|_| AppError::unauthorized("Token subject is not a valid user id"))?;
        Ok(AuthenticatedUser { user_id })
    }
}

/// Mint an access token for the given user; used by tests and by
/// operators provisioning devices
pub fn issue_access_token(
    secret: &str,
    user_id: UserId,
    ttl: Duration,
) -> Result<String, AppError> {
    let claims = AccessClaims {
        sub: user_id.to_string(),
        exp: (Utc::now() + ttl).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|error| AppError::internal(format!("failed to sign token: {error}")))
}

/// Pull the bearer token out of the Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?;
    let value = header
        .to_str()
        .map_err(|_| AppError::unauthorized("Malformed Authorization header"))?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::unauthorized("Authorization header must be a bearer token"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret-test-secret";

    #[test]
    fn test_issue_then_verify_round_trip() {
        let user = UserId::new();
        let token = issue_access_token(SECRET, user, Duration::minutes(5)).unwrap();
        let verified = JwtVerifier::new(SECRET)
            .verify_access_token(&token)
            .unwrap();
        assert_eq!(verified.user_id, user);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_access_token(SECRET, UserId::new(), Duration::minutes(5)).unwrap();
        let result = JwtVerifier::new("another-secret-entirely").verify_access_token(&token);
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = issue_access_token(SECRET, UserId::new(), Duration::minutes(-5)).unwrap();
        let result = JwtVerifier::new(SECRET).verify_access_token(&token);
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_extract_bearer_token_variants() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc123");
    }
}
