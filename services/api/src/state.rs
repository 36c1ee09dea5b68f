//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use common::{
    cache::RedisPool, client_ip::ProxyPolicy, email_verifier::EmailVerifier,
    geolocation::Geolocator, jwt::JwtService, repositories::UserRepository, settings::Settings,
};
use sqlx::PgPool;

use crate::{
    openai::OpenAi,
    repositories::{ChatRepository, CounterRepository},
    storage::Storage,
    telegram::Telegram,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub cookie_key: Key,
    pub db_pool: PgPool,
    pub redis_pool: RedisPool,
    pub jwt_service: JwtService,
    pub user_repository: UserRepository,
    pub chat_repository: ChatRepository,
    pub counter_repository: CounterRepository,
    pub storage: Storage,
    pub openai: OpenAi,
    pub telegram: Telegram,
    pub email_verifier: EmailVerifier,
    pub geolocator: Geolocator,
    /// Shared client for outbound calls that have no dedicated wrapper
    pub http: reqwest::Client,
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
