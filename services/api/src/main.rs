use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod ai;
mod chat;
mod middleware;
mod models;
mod openai;
mod others;
mod repositories;
mod routes;
mod state;
mod storage;
mod telegram;
mod upload;
mod users;

use common::{
    cache::{RedisConfig, RedisPool},
    database::{self, DatabaseConfig},
    email_verifier::EmailVerifier,
    geolocation::Geolocator,
    jwt::{JwtConfig, JwtService},
    repositories::UserRepository,
    settings::Settings,
};

use crate::{
    openai::{OpenAi, OpenAiConfig},
    repositories::{ChatRepository, CounterRepository},
    state::AppState,
    storage::{Storage, StorageConfig},
    telegram::{Telegram, TelegramConfig},
};

fn cors_layer(settings: &Settings) -> Result<CorsLayer> {
    let origins = settings
        .allowed_origins()
        .iter()
        .map(|origin| HeaderValue::from_str(origin))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
        .expose_headers([HeaderName::from_static("authorization")]))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting API service");

    let settings = Settings::from_env()?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    if database::health_check(&pool).await {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    database::run_migrations(&pool).await?;

    let http = reqwest::Client::new();

    let openai_config = OpenAiConfig::from_env();
    if openai_config.api_key.is_none() {
        warn!("OPEN_AI_SECRET_KEY not set, AI endpoints will answer 503");
    }

    let telegram_config = TelegramConfig::from_env();
    if telegram_config.is_none() {
        warn!("Telegram credentials not set, contact messages will answer 503");
    }

    let app_state = AppState {
        cookie_key: settings.cookie_key()?,
        settings: Arc::new(settings.clone()),
        user_repository: UserRepository::new(pool.clone()),
        chat_repository: ChatRepository::new(pool.clone()),
        counter_repository: CounterRepository::new(pool.clone()),
        db_pool: pool,
        redis_pool: RedisPool::new(&RedisConfig::from_env()?)?,
        jwt_service: JwtService::new(JwtConfig::from_env()?),
        storage: Storage::new(&StorageConfig::from_env()?).await,
        openai: OpenAi::new(http.clone(), openai_config),
        telegram: Telegram::new(http.clone(), telegram_config),
        email_verifier: EmailVerifier::from_env(http.clone()),
        geolocator: Geolocator::from_env(http.clone()),
        http,
    };

    info!("API service initialized successfully");

    let app = routes::create_router(app_state)
        .layer(cors_layer(&settings)?)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.api_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API service listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
