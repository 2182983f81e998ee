//! Rate limiting middleware for axum.
//!
//! Runs after `auth_middleware`, so an authenticated caller is limited by
//! user id; anyone else by client address. Denials are 429 with a
//! `Retry-After` header and a JSON body carrying `retryAfter`.
//!
//! Headers on every limited response:
//! - `X-RateLimit-Limit`: requests allowed in the window
//! - `X-RateLimit-Remaining`: requests left in the current window
//! - `Retry-After`: seconds to wait (only on 429)

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::domain::foundation::UserId;
use crate::ports::{RateLimitDenied, RateLimitKey, RateLimitResult, RateLimiter};

/// Rate limiter middleware state.
pub type RateLimiterState = Arc<dyn RateLimiter>;

static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Counts the request against the caller's window.
///
/// The limiter failing is logged and the request let through.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiterState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let key = match request.extensions().get::<UserId>() {
        Some(user_id) => RateLimitKey::user(user_id),
        None => RateLimitKey::ip(
            &client_ip(request.headers(), connect_info.as_ref())
                .unwrap_or_else(|| "anonymous".to_string()),
        ),
    };

    match limiter.check(key).await {
        Ok(RateLimitResult::Allowed(status)) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(X_RATELIMIT_LIMIT.clone(), HeaderValue::from(status.limit));
            headers.insert(
                X_RATELIMIT_REMAINING.clone(),
                HeaderValue::from(status.remaining),
            );
            response
        }
        Ok(RateLimitResult::Denied(denied)) => {
            tracing::info!(
                scope = %denied.scope,
                retry_after_secs = denied.retry_after_secs,
                "Rate limit exceeded"
            );
            too_many_requests(&denied)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Rate limiter unavailable");
            next.run(request).await
        }
    }
}

/// Client address, preferring proxy headers over the socket peer.
fn client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> Option<String> {
    if let Some(first) = headers
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return Some(first.to_string());
    }

    if let Some(real_ip) = headers.get("X-Real-IP").and_then(|h| h.to_str().ok()) {
        return Some(real_ip.trim().to_string());
    }

    connect_info.map(|ci| ci.0.ip().to_string())
}

fn too_many_requests(denied: &RateLimitDenied) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "error": "Too many requests",
            "message": denied.message(),
            "retryAfter": denied.retry_after_secs,
        })),
    )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT.clone(), HeaderValue::from(denied.limit));
    headers.insert(X_RATELIMIT_REMAINING.clone(), HeaderValue::from(0u32));
    headers.insert(header::RETRY_AFTER, HeaderValue::from(denied.retry_after_secs));
    response
}
