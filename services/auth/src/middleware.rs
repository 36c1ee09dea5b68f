//! Middleware resolving the signed-in user for protected routes

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use axum_extra::extract::cookie::SignedCookieJar;
use common::{error::ApiError, guard::authenticate};

use crate::state::AppState;

/// Attach the authenticated `User` and its `SessionToken` to the request
pub async fn auth_middleware(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let (user, session) = authenticate(
        &state.jwt_service,
        &state.redis_pool,
        &state.user_repository,
        req.headers(),
        &jar,
    )
    .await?;

    req.extensions_mut().insert(user);
    req.extensions_mut().insert(session);

    Ok(next.run(req).await)
}
