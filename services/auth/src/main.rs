use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod accounts;
mod middleware;
mod models;
mod oauth;
mod otp;
mod rate_limiter;
mod repositories;
mod routes;
mod session;
mod state;

use common::{
    cache::{RedisConfig, RedisPool},
    database::{self, DatabaseConfig},
    email_verifier::EmailVerifier,
    geolocation::Geolocator,
    jwt::{JwtConfig, JwtService},
    mail::{Mailer, MailerConfig},
    repositories::UserRepository,
    settings::Settings,
};

use crate::{
    oauth::{GoogleOAuth, OAuthConfig},
    rate_limiter::{RateLimiter, RateLimiterConfig},
    repositories::OtpRepository,
    state::AppState,
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

    info!("Starting authentication service");

    let settings = Settings::from_env()?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    // Check database connectivity
    if database::health_check(&pool).await {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    database::run_migrations(&pool).await?;

    let jwt_service = JwtService::new(JwtConfig::from_env()?);
    let redis_pool = RedisPool::new(&RedisConfig::from_env()?)?;
    let http = reqwest::Client::new();

    let google = match OAuthConfig::from_env() {
        Some(config) => Some(GoogleOAuth::new(config, http.clone(), redis_pool.clone())?),
        None => {
            warn!("Google OAuth credentials not set, Google sign-in is disabled");
            None
        }
    };

    let app_state = AppState {
        cookie_key: settings.cookie_key()?,
        settings: Arc::new(settings.clone()),
        user_repository: UserRepository::new(pool.clone()),
        otp_repository: OtpRepository::new(pool),
        redis_pool,
        jwt_service,
        rate_limiter: RateLimiter::new(RateLimiterConfig::default()),
        mailer: Mailer::new(&MailerConfig::from_env()?)?,
        email_verifier: EmailVerifier::from_env(http.clone()),
        geolocator: Geolocator::from_env(http),
        google,
    };

    info!("Authentication service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state)
        .layer(cors_layer(&settings)?)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.auth_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Authentication service listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
