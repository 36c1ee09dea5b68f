//! API service routes

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use common::{client_ip::ClientIp, database};
use serde_json::json;
use tracing::{error, warn};

use crate::{ai, chat, middleware::auth_middleware, others, state::AppState, upload, users};

/// Multipart bodies may exceed the default 2 MB limit. Size rules are
/// enforced by the handlers themselves.
const MULTIPART_BODY_LIMIT: usize = 20 * 1024 * 1024;

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/users", get(users::list_users))
        .route(
            "/users/:username",
            get(users::get_user).delete(users::delete_user),
        )
        .route("/chat", post(chat::create_chat).get(chat::list_chats))
        .route("/chat/:chat_id", get(chat::get_chat))
        .route(
            "/chat/:chat_id/conversations",
            post(chat::create_conversation).get(chat::list_conversations),
        )
        .route(
            "/upload/photo",
            put(upload::upload_photo).layer(DefaultBodyLimit::max(MULTIPART_BODY_LIMIT)),
        )
        .route("/chat-gpt/completion", post(ai::completion))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route(
            "/chat-gpt/transcribe",
            post(ai::transcribe).layer(DefaultBodyLimit::max(MULTIPART_BODY_LIMIT)),
        )
        .route("/chat-gpt/conversation/stream", post(ai::stream))
        .route("/chat-gpt/image", post(ai::image))
        .route("/chat-gpt/speech", post(ai::speech))
        .route("/chat-gpt/vision", post(ai::vision))
        .route("/others/message", post(others::send_message))
        .route("/others/views", post(others::add_view))
        .merge(protected_routes)
        .with_state(state)
}

/// Count the request and report liveness to the uptime monitor
pub async fn root(State(state): State<AppState>, client_ip: ClientIp) -> impl IntoResponse {
    if let Err(e) = state.counter_repository.record_request(&client_ip.0).await {
        error!("Failed to record request from {}: {:#}", client_ip.0, e);
    }

    ping_uptime(&state, &client_ip);

    Json(json!({
        "status": 200,
        "message": "OK ✅"
    }))
}

fn ping_uptime(state: &AppState, client_ip: &ClientIp) {
    let Some(url) = state.settings.healthcheck_url.clone() else {
        return;
    };

    if client_ip.is_loopback() {
        return;
    }

    let http = state.http.clone();
    let ip = client_ip.0.clone();

    tokio::spawn(async move {
        let result = http
            .get(&url)
            .header("x-forwarded-for", ip)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        if let Err(e) = result {
            warn!("Uptime ping to {} failed: {}", url, e);
        }
    });
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (database, cache) = tokio::join!(
        database::health_check(&state.db_pool),
        state.redis_pool.health_check()
    );

    Json(json!({
        "status": "ok",
        "service": "api-service",
        "database": database,
        "cache": cache
    }))
}
