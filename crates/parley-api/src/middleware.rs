use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use jsonwebtoken::{DecodingKey, Validation, decode};
use sha2::Sha256;

use parley_types::api::Claims;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Header the bridge and the payment provider authenticate with.
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Decode and validate a session token (signature and expiry).
pub fn verify_token(secret: &str, token: &str) -> ApiResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized("invalid token"))
}

/// The token of an `Authorization: Bearer <token>` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Extract and validate JWT from Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = bearer_token(req.headers()).ok_or(ApiError::Unauthorized("missing token"))?;
    let claims = verify_token(&state.jwt_secret, token)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Gate for endpoints called by the bridge and the payment provider.
pub fn check_webhook_secret(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let expected = state
        .webhook_secret
        .as_deref()
        .ok_or(ApiError::Configuration("webhook secret"))?;

    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized("missing webhook secret"))?;

    if !secrets_match(expected, provided) {
        return Err(ApiError::Unauthorized("invalid webhook secret"));
    }
    Ok(())
}

/// Constant-time equality: both sides are MACed under `expected` and the
/// tags compared with `verify_slice`, so neither length nor content leaks
/// through timing.
fn secrets_match(expected: &str, provided: &str) -> bool {
    let tag = |value: &str| {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(expected.as_bytes()).ok()?;
        mac.update(value.as_bytes());
        Some(mac)
    };

    match (tag(expected), tag(provided)) {
        (Some(expected_mac), Some(provided_mac)) => provided_mac
            .verify_slice(&expected_mac.finalize().into_bytes())
            .is_ok(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_requires_prefix() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Token abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }

    #[test]
    fn webhook_secrets_compare_exactly() {
        assert!(secrets_match("hook-secret", "hook-secret"));
        assert!(!secrets_match("hook-secret", "hook-secreT"));
        assert!(!secrets_match("hook-secret", "hook-secret-and-more"));
        assert!(!secrets_match("hook-secret", ""));
    }

    #[test]
    fn garbage_token_is_invalid() {
        let err = verify_token("secret", "not-a-jwt").unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized("invalid token")));
    }
}
