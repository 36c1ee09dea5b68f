//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use common::{
    cache::RedisPool, client_ip::ProxyPolicy, email_verifier::EmailVerifier,
    geolocation::Geolocator, jwt::JwtService, mail::Mailer, repositories::UserRepository,
    settings::Settings,
};
use crate::{oauth::GoogleOAuth, rate_limiter::RateLimiter, repositories::OtpRepository};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub cookie_key: Key,
    pub redis_pool: RedisPool,
    pub jwt_service: JwtService,
    pub user_repository: UserRepository,
    pub otp_repository: OtpRepository,
    pub rate_limiter: RateLimiter,
    pub mailer: Mailer,
    pub email_verifier: EmailVerifier,
    pub geolocator: Geolocator,
    /// `None` when Google credentials are not configured
    pub google: Option<GoogleOAuth>,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

impl FromRef<AppState> for ProxyPolicy {
    fn from_ref(state: &AppState) -> Self {
        state.settings.proxy_policy()
    }
}
