//! Authentication service routes

use std::collections::HashMap;

use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::SignedCookieJar;
use common::{
    client_ip::ClientIp,
    error::{ApiError, ApiResult},
    guard::{SessionToken, require_active},
    jwt::ResetTokenError,
    models::User,
    secret::{hash_secret, verify_secret},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    accounts::{self, GoogleSignIn, Signup},
    middleware::auth_middleware,
    models::{EditMeDto, EmailDto, EmailVerificationDto, LoginDto, RegisterDto, ResetPasswordDto},
    otp,
    session::{Issuance, clear_cookies, issue},
    state::AppState,
};

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/logout", get(logout))
        .route("/me", get(get_me).patch(edit_me))
        .route("/email-verification", post(email_verification))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/google", get(google_redirect))
        .route("/google/callback", get(google_callback))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/password/forgot", post(forgot_password))
        .route("/password/reset", post(reset_password))
        .route("/others/email-otp", post(otp::send_email_otp))
        .route("/others/email-otp/check", post(otp::check_email_otp))
        .route("/others/email-otp/status", post(otp::check_status))
        .merge(protected_routes)
        .with_state(state)
}

/// `?authuser=...` asks for a redirect instead of a JSON body
pub(crate) fn wants_redirect(query: &HashMap<String, String>) -> bool {
    query.contains_key("authuser")
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

/// Start Google sign-in
pub async fn google_redirect(State(state): State<AppState>) -> ApiResult<Redirect> {
    let google = state.google.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("Google sign-in is not configured".to_string())
    })?;

    let url = google.authorize_url().await.map_err(|e| {
        error!("Failed to start Google sign-in: {}", e);
        ApiError::ServiceUnavailable("Google sign-in is unavailable".to_string())
    })?;

    Ok(Redirect::to(&url))
}

#[derive(Debug, Deserialize)]
pub struct GoogleCallback {
    code: Option<String>,
    state: Option<String>,
    authuser: Option<String>,
}

/// Finish Google sign-in
pub async fn google_callback(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(callback): Query<GoogleCallback>,
) -> ApiResult<Response> {
    let google = state.google.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("Google sign-in is not configured".to_string())
    })?;

    let (Some(code), Some(csrf_state)) = (callback.code.as_deref(), callback.state.as_deref())
    else {
        return Err(ApiError::unauthorized());
    };

    let profile = google
        .complete(code, csrf_state)
        .await
        .map_err(|e| {
            error!("Google sign-in failed: {}", e);
            ApiError::unauthorized()
        })?
        .ok_or_else(ApiError::unauthorized)?;

    match accounts::google_sign_in(&state, profile).await? {
        GoogleSignIn::Deactivated => Ok(Redirect::to(&format!(
            "{}/deactivated",
            state.settings.auth_app_url
        ))
        .into_response()),
        GoogleSignIn::Active(user) => issue(
            &state,
            jar,
            user.id,
            Issuance::Session,
            callback.authuser.is_some(),
            StatusCode::OK,
        ),
    }
}

/// Create an account and sign it in
pub async fn register(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<HashMap<String, String>>,
    Json(payload): Json<RegisterDto>,
) -> ApiResult<Response> {
    payload.validate()?;
    info!("Registration attempt for {}", payload.email);

    let user = accounts::create_user(
        &state,
        Signup {
            first_name: payload.first_name,
            last_name: payload.last_name,
            email: payload.email,
            password: payload.password,
            photo: None,
        },
    )
    .await?;

    accounts::send_verification_code(&state, &user);

    issue(
        &state,
        jar,
        user.id,
        Issuance::Session,
        wants_redirect(&query),
        StatusCode::CREATED,
    )
}

/// Sign in with email or username and password
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    jar: SignedCookieJar,
    Query(query): Query<HashMap<String, String>>,
    Json(payload): Json<LoginDto>,
) -> ApiResult<Response> {
    state
        .rate_limiter
        .check_attempt("login", &ip, &payload.email_or_username)
        .await?;
    payload.validate()?;

    info!("Login attempt for {}", payload.email_or_username);

    let user = require_active(
        state
            .user_repository
            .find_by_email_or_username(payload.email_or_username.trim())
            .await?,
    )?;

    if !verify_secret(&payload.password, &user.password) {
        warn!("Invalid password for user {}", user.id);
        return Err(ApiError::Unauthorized("Invalid password".to_string()));
    }

    if accounts::needs_verification_code(&user) {
        accounts::send_verification_code(&state, &user);
    }

    issue(
        &state,
        jar,
        user.id,
        Issuance::Session,
        wants_redirect(&query),
        StatusCode::OK,
    )
}

/// Revoke the presented token and clear cookies
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Extension(session): Extension<SessionToken>,
    jar: SignedCookieJar,
) -> ApiResult<Response> {
    state
        .jwt_service
        .blacklist_token(&state.redis_pool, &session.token, session.exp)
        .await
        .map_err(|e| {
            error!("Failed to blacklist token: {}", e);
            ApiError::InternalServerError
        })?;

    info!("User {} logged out", user.id);

    Ok((
        clear_cookies(jar),
        Redirect::to(&state.settings.auth_app_url),
    )
        .into_response())
}

/// Current user; records where they were seen from
pub async fn get_me(
    State(state): State<AppState>,
    client_ip: ClientIp,
    Extension(user): Extension<User>,
) -> ApiResult<Json<User>> {
    let user_id = user.id;

    tokio::spawn(async move {
        let result = async {
            let location = state.geolocator.locate_client(&client_ip).await?;
            state
                .user_repository
                .upsert_metadata(user_id, &client_ip.0, &location)
                .await
        }
        .await;

        if let Err(e) = result {
            warn!("Failed to record metadata for user {}: {}", user_id, e);
        }
    });

    Ok(Json(user))
}

/// Update own profile
pub async fn edit_me(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<EditMeDto>,
) -> ApiResult<Json<User>> {
    payload.validate()?;
    let changes = payload.into_update();

    if let Some(username) = changes.username.as_deref() {
        if username != user.username && state.user_repository.username_exists(username).await? {
            return Err(ApiError::Conflict("Username already taken".to_string()));
        }
    }

    let updated = state
        .user_repository
        .update_profile(user.id, &changes)
        .await?;

    Ok(Json(updated))
}

/// Confirm the emailed verification code
pub async fn email_verification(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<EmailVerificationDto>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;

    if user.is_verified {
        return Err(ApiError::BadRequest(
            "User has already been verified".to_string(),
        ));
    }

    let matches = user
        .verification_token
        .as_deref()
        .is_some_and(|hash| verify_secret(&payload.code, hash));

    if !matches {
        return Err(ApiError::Conflict("Code doesn't match".to_string()));
    }

    state.user_repository.mark_verified(user.id).await?;
    info!("User {} verified their email", user.id);

    Ok(Json(json!({ "success": true })))
}

/// Mail a single-use password reset link
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<EmailDto>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;

    let user = require_active(state.user_repository.find_by_email(&payload.email).await?)?;

    let token = state.jwt_service.generate_reset_password_token(user.id)?;
    state
        .user_repository
        .set_reset_password_token(user.id, &token)
        .await?;

    let link = format!(
        "{}/password/reset?identification_token={}",
        state.settings.auth_app_url, token
    );

    state
        .mailer
        .send_password_reset(&user.email, &user.first_name, &link)
        .await
        .map_err(|e| {
            error!("Failed to send password reset mail: {}", e);
            ApiError::ServiceUnavailable("Failed to send password reset link".to_string())
        })?;

    Ok(Json(json!({
        "message": format!("Password reset link has been sent to {}", user.email)
    })))
}

/// Set a new password with a reset token
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordDto>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;

    let claims = state
        .jwt_service
        .validate_reset_password_token(&payload.identification_token)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    let user = state
        .user_repository
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;

    if user.reset_password_token.as_deref() != Some(payload.identification_token.as_str()) {
        warn!("Reused or superseded reset token for user {}", user.id);
        return Err(ApiError::Unauthorized(ResetTokenError::Invalid.to_string()));
    }

    let password_hash = hash_secret(&payload.password)?;
    state
        .user_repository
        .update_password(user.id, &password_hash)
        .await?;

    info!("Password updated for user {}", user.id);

    Ok(Json(json!({
        "message": "Your password has been successfully updated"
    })))
}
