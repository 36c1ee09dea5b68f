//! Contact form and page view counter

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
    response::IntoResponse,
};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use common::{
    client_ip::ClientIp,
    error::{ApiError, ApiResult},
    models::Location,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    models::SendMessageDto,
    state::AppState,
    telegram::{ContactMessage, device_from_user_agent},
};

async fn locate(state: &AppState, client_ip: &ClientIp) -> Location {
    state
        .geolocator
        .locate_client(client_ip)
        .await
        .unwrap_or_else(|e| {
            warn!("Geolocation of {} failed: {}", client_ip.0, e);
            Location::default()
        })
}

/// Relay a contact form message to Telegram
pub async fn send_message(
    State(state): State<AppState>,
    client_ip: ClientIp,
    headers: HeaderMap,
    Json(payload): Json<SendMessageDto>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;

    let email = payload.email.trim().to_lowercase();
    if !state.email_verifier.verify(&email).await {
        return Err(ApiError::BadRequest("Your email is not valid".to_string()));
    }

    let location = locate(&state, &client_ip).await;
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let device = device_from_user_agent(user_agent);

    let text = ContactMessage {
        ip: &client_ip.0,
        full_name: payload.full_name.trim(),
        email: &email,
        message: &payload.message,
        location: &location,
        device: &device,
    }
    .to_html();

    state.telegram.send_html(&text).await.map_err(|e| {
        error!("Failed to deliver contact message: {:#}", e);
        ApiError::ServiceUnavailable("Failed to send message".to_string())
    })?;

    info!("Contact message from {} delivered", client_ip.0);
    Ok(Json(json!({ "success": true })))
}

/// `DD.MM.YYYY hh:mm:ss AM` in a fixed display offset
fn format_view_time(now: DateTime<Utc>, offset_hours: i32) -> String {
    let offset = FixedOffset::east_opt(offset_hours.saturating_mul(3600)).unwrap_or(Utc.fix());

    now.with_timezone(&offset)
        .format("%d.%m.%Y %I:%M:%S %p")
        .to_string()
}

pub async fn add_view(State(state): State<AppState>) -> ApiResult<Json<i64>> {
    let last_view_at = format_view_time(Utc::now(), state.settings.display_utc_offset_hours);
    let count = state.counter_repository.record_view(&last_view_at).await?;

    Ok(Json(count))
}
