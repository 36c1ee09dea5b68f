//! Handing a signed token to the client after a successful sign-in
//!
//! The token travels three ways at once: the `Authorization` response
//! header, a signed http-only cookie, and a redirect target.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use common::{
    error::{ApiError, ApiResult},
    guard::{SESSION_COOKIE, TOKEN_COOKIE},
};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::state::AppState;

/// Which cookie and redirect target a token is issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Issuance {
    /// Register, login and Google sign-in
    Session,
    /// Email OTP check
    Token,
}

impl Issuance {
    fn cookie_name(self) -> &'static str {
        match self {
            Issuance::Session => SESSION_COOKIE,
            Issuance::Token => TOKEN_COOKIE,
        }
    }

    fn same_site(self) -> SameSite {
        match self {
            Issuance::Session => SameSite::Strict,
            Issuance::Token => SameSite::None,
        }
    }

    /// `(absolute redirect, redirectUrl body value)`
    fn targets(self, state: &AppState, token: &str) -> (String, String) {
        match self {
            Issuance::Session => (
                format!("{}/redirect?session={}", state.settings.auth_app_url, token),
                format!("/redirect?session={}", token),
            ),
            Issuance::Token => {
                let url = format!(
                    "{}/redirect?token={}",
                    state.settings.frontend_base_url, token
                );
                (url.clone(), url)
            }
        }
    }
}

/// Sign a token for `user_id` and build the response carrying it.
///
/// With `redirect` set (the request had an `authuser` query parameter) the
/// client is redirected, otherwise the body is `{ "redirectUrl": ... }`.
pub fn issue(
    state: &AppState,
    jar: SignedCookieJar,
    user_id: Uuid,
    kind: Issuance,
    redirect: bool,
    status: StatusCode,
) -> ApiResult<Response> {
    let token = state
        .jwt_service
        .generate_session_token(user_id)
        .map_err(|e| {
            error!("Failed to sign token: {}", e);
            ApiError::InternalServerError
        })?;

    let cookie = Cookie::build((kind.cookie_name(), token.clone()))
        .path("/")
        .http_only(true)
        .secure(state.settings.is_production())
        .same_site(kind.same_site())
        .max_age(time::Duration::seconds(
            state.jwt_service.session_expiry() as i64,
        ))
        .build();
    let jar = jar.add(cookie);

    let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| ApiError::InternalServerError)?;

    info!("Issued {:?} token for user {}", kind, user_id);

    let (redirect_to, redirect_url) = kind.targets(state, &token);
    let response = if redirect {
        (jar, [(AUTHORIZATION, bearer)], Redirect::to(&redirect_to)).into_response()
    } else {
        (
            status,
            jar,
            [(AUTHORIZATION, bearer)],
            Json(json!({ "redirectUrl": redirect_url })),
        )
            .into_response()
    };

    Ok(response)
}

/// Remove both authentication cookies
pub fn clear_cookies(jar: SignedCookieJar) -> SignedCookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
        .remove(Cookie::build(TOKEN_COOKIE).path("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use axum::http::header::{LOCATION, SET_COOKIE};

    #[tokio::test]
    async fn test_session_issuance_json() {
        let state = test_state();
        let jar = SignedCookieJar::new(state.cookie_key.clone());

        let response = issue(
            &state,
            jar,
            Uuid::new_v4(),
            Issuance::Session,
            false,
            StatusCode::CREATED,
        )
        .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);

        let auth = response.headers()[AUTHORIZATION].to_str().unwrap();
        assert!(auth.starts_with("Bearer "));

        let cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
    }

    #[tokio::test]
    async fn test_token_issuance_redirects_to_frontend() {
        let state = test_state();
        let jar = SignedCookieJar::new(state.cookie_key.clone());

        let response = issue(
            &state,
            jar,
            Uuid::new_v4(),
            Issuance::Token,
            true,
            StatusCode::OK,
        )
        .unwrap();

        assert!(response.status().is_redirection());
        let location = response.headers()[LOCATION].to_str().unwrap();
        assert!(location.starts_with("http://localhost:5173/redirect?token="));

        let cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("token="));
        assert!(cookie.contains("SameSite=None"));
    }
}
