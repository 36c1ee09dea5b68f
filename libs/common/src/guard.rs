//! Request authentication shared by both services
//!
//! A token is looked up in the `Authorization: Bearer` header first, then in
//! the signed `session` cookie, then in the signed `token` cookie.

use axum::http::{HeaderMap, header::AUTHORIZATION};
use axum_extra::extract::cookie::SignedCookieJar;
use tracing::{error, warn};

use crate::{
    cache::RedisPool,
    error::{ApiError, ApiResult},
    jwt::{Claims, JwtService},
    models::User,
    repositories::UserRepository,
};

pub const SESSION_COOKIE: &str = "session";
pub const TOKEN_COOKIE: &str = "token";

/// The token a request was authenticated with, kept for logout
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub token: String,
    pub exp: u64,
}

/// Pull the raw token from the request, if any
pub fn extract_token(headers: &HeaderMap, jar: &SignedCookieJar) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    [SESSION_COOKIE, TOKEN_COOKIE]
        .iter()
        .filter_map(|name| jar.get(name))
        .map(|cookie| cookie.value().to_string())
        .find(|value| !value.is_empty())
}

/// A missing user is 401, a deactivated one 403
pub fn require_active(user: Option<User>) -> ApiResult<User> {
    let user = user.ok_or_else(|| ApiError::Unauthorized("User doesn't exist".to_string()))?;

    if !user.is_active {
        return Err(ApiError::Forbidden("User has been deactivated".to_string()));
    }

    Ok(user)
}

/// Resolve the user behind a request
pub async fn authenticate(
    jwt: &JwtService,
    redis: &RedisPool,
    users: &UserRepository,
    headers: &HeaderMap,
    jar: &SignedCookieJar,
) -> ApiResult<(User, SessionToken)> {
    let token = extract_token(headers, jar).ok_or_else(ApiError::unauthorized)?;

    let claims: Claims = jwt.validate_session_token(&token).map_err(|e| {
        warn!("Rejected token: {}", e);
        ApiError::unauthorized()
    })?;

    let blacklisted = jwt.is_token_blacklisted(redis, &token).await.map_err(|e| {
        error!("Failed to check if token is blacklisted: {}", e);
        ApiError::InternalServerError
    })?;

    if blacklisted {
        warn!("Blacklisted token presented for user {}", claims.sub);
        return Err(ApiError::unauthorized());
    }

    let user = require_active(users.find_by_id(claims.sub).await?)?;

    Ok((
        user,
        SessionToken {
            token,
            exp: claims.exp,
        },
    ))
}
