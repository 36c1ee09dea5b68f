//! Email one-time password handlers

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use chrono::Utc;
use common::{
    client_ip::ClientIp,
    error::{ApiError, ApiResult},
    guard::require_active,
    secret::{generate_otp, hash_secret, verify_secret},
};
use serde_json::json;
use tracing::{error, info};

use crate::{
    models::{CheckEmailOtpDto, EmailDto, EmailOtp},
    routes::wants_redirect,
    session::{Issuance, issue},
    state::AppState,
};

/// OTPs are valid for five minutes
const OTP_TTL_SECONDS: i64 = 300;

fn not_found() -> ApiError {
    ApiError::BadRequest("Verification OTP not found".to_string())
}

fn expired() -> ApiError {
    ApiError::BadRequest("Verification OTP has expired".to_string())
}

async fn find_otp(state: &AppState, email: &str) -> ApiResult<EmailOtp> {
    state
        .otp_repository
        .find(email)
        .await?
        .ok_or_else(not_found)
}

/// Mail a fresh OTP to an existing account
pub async fn send_email_otp(
    State(state): State<AppState>,
    Json(payload): Json<EmailDto>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;

    let user = require_active(state.user_repository.find_by_email(&payload.email).await?)?;

    let otp = generate_otp();
    let otp_hash = hash_secret(&otp)?;
    let expires = Utc::now().timestamp() + OTP_TTL_SECONDS;

    state
        .otp_repository
        .upsert(&user.email, &otp_hash, expires)
        .await?;

    state
        .mailer
        .send_email_otp(&user.email, &otp)
        .await
        .map_err(|e| {
            error!("Failed to mail OTP to {}: {}", user.email, e);
            ApiError::ServiceUnavailable("Failed to send verification OTP".to_string())
        })?;

    Ok(Json(json!({ "success": true })))
}

/// Verify an OTP and sign the account in
pub async fn check_email_otp(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    jar: SignedCookieJar,
    Query(query): Query<HashMap<String, String>>,
    Json(payload): Json<CheckEmailOtpDto>,
) -> ApiResult<Response> {
    state
        .rate_limiter
        .check_attempt("email-otp-check", &ip, &payload.email)
        .await?;
    payload.validate()?;

    let user = require_active(state.user_repository.find_by_email(&payload.email).await?)?;
    let email_otp = find_otp(&state, &user.email).await?;

    if !verify_secret(&payload.otp, &email_otp.otp) {
        return Err(ApiError::BadRequest("Invalid verification OTP".to_string()));
    }

    if email_otp.is_expired(Utc::now().timestamp()) {
        return Err(expired());
    }

    state.user_repository.mark_verified(user.id).await?;
    state.otp_repository.mark_verified(&user.email).await?;
    info!("User {} verified by email OTP", user.id);

    issue(
        &state,
        jar,
        user.id,
        Issuance::Token,
        wants_redirect(&query),
        StatusCode::OK,
    )
}

/// Whether the last OTP sent to an address has been confirmed
pub async fn check_status(
    State(state): State<AppState>,
    Json(payload): Json<EmailDto>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;

    let user = require_active(state.user_repository.find_by_email(&payload.email).await?)?;
    let email_otp = find_otp(&state, &user.email).await?;

    if email_otp.is_expired(Utc::now().timestamp()) {
        return Err(expired());
    }

    Ok(Json(json!({ "verified": email_otp.is_verified })))
}

#[cfg(test)]
mod tests {
    use crate::{routes::create_router, state::test_support::test_state};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use serde_json::json;
    use tower::ServiceExt;

    fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_otp_rejects_bad_email() {
        let app = create_router(test_state());

        let response = app
            .oneshot(post("/others/email-otp", json!({ "email": "not-an-email" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_check_otp_requires_six_chars() {
        let app = create_router(test_state());

        let response = app
            .oneshot(post(
                "/others/email-otp/check",
                json!({ "email": "ada@example.com", "otp": "123" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
