//! Admin-only user management

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use common::{
    error::{ApiError, ApiResult},
    models::User,
};
use serde_json::json;
use tracing::{info, warn};

use crate::{middleware::require_admin, state::AppState};

/// Seconds admin lookups stay cached
const USER_CACHE_TTL: u64 = 5;

fn user_cache_key(username: &str) -> String {
    format!("user:{}", username)
}

/// Usernames that start like a number are rejected as route parameters
fn looks_numeric(username: &str) -> bool {
    username
        .trim_start()
        .trim_start_matches(['+', '-'])
        .starts_with(|c: char| c.is_ascii_digit())
}

fn check_username(username: &str) -> ApiResult<String> {
    if looks_numeric(username) {
        return Err(ApiError::Conflict(
            "Parameter username must be a string".to_string(),
        ));
    }

    Ok(username.trim().to_lowercase())
}

async fn find_user(state: &AppState, username: &str) -> ApiResult<User> {
    let key = user_cache_key(username);

    let user = match state.redis_pool.get_json::<User>(&key).await {
        Some(cached) => cached,
        None => {
            let user = state
                .user_repository
                .find_by_username(username)
                .await?
                .ok_or_else(|| ApiError::NotFound("User doesn't exist".to_string()))?;
            state.redis_pool.set_json(&key, &user, USER_CACHE_TTL).await;
            user
        }
    };

    if !user.is_active {
        return Err(ApiError::Forbidden("User has been deactivated".to_string()));
    }

    Ok(user)
}

/// Search users by name or email
pub async fn list_users(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&admin)?;

    let q = query
        .get("q")
        .map(|q| q.trim())
        .filter(|q| !q.is_empty());
    let key = format!("users:{}", q.unwrap_or_default().to_lowercase());

    let users = match state.redis_pool.get_json::<Vec<User>>(&key).await {
        Some(cached) => cached,
        None => {
            let users = state.user_repository.search(q).await?;
            state.redis_pool.set_json(&key, &users, USER_CACHE_TTL).await;
            users
        }
    };

    Ok(Json(json!({
        "count": users.len(),
        "users": users
    })))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    Path(username): Path<String>,
) -> ApiResult<Json<User>> {
    require_admin(&admin)?;
    let username = check_username(&username)?;

    Ok(Json(find_user(&state, &username).await?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    Path(username): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&admin)?;
    let username = check_username(&username)?;

    let user = find_user(&state, &username).await?;

    if user.id == admin.id {
        return Err(ApiError::Forbidden(
            "You can't delete yourself, please inform someone with a Admin role".to_string(),
        ));
    }

    if !state.user_repository.delete(user.id).await? {
        return Err(ApiError::NotFound("User doesn't exist".to_string()));
    }

    if let Err(e) = state.redis_pool.delete(&user_cache_key(&username)).await {
        warn!("Failed to evict cached user {}: {}", username, e);
    }

    info!("Admin {} deleted user {}", admin.id, user.id);
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_numeric() {
        assert!(looks_numeric("42"));
        assert!(looks_numeric("7up"));
        assert!(looks_numeric(" -3"));
        assert!(!looks_numeric("ada"));
        assert!(!looks_numeric("ada42"));
        assert!(!looks_numeric(""));
    }

    #[test]
    fn test_check_username() {
        assert_eq!(check_username(" Ada ").unwrap(), "ada");
        assert!(matches!(
            check_username("123"),
            Err(ApiError::Conflict(message)) if message == "Parameter username must be a string"
        ));
    }
}
