//! AI proxy endpoints
//!
//! Provider failures surface as 503 with a message per endpoint. Nothing is
//! retried.

use axum::{
    Extension, Json,
    body::Body,
    extract::{Multipart, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use common::{
    error::{ApiError, ApiResult},
    models::User,
};
use rand::Rng;
use serde_json::json;
use tracing::{error, info};

use crate::{
    chat::{ensure_quota, find_active_chat, store_conversation},
    models::{CompletionDto, Conversation, TextDto, VisionDto},
    state::AppState,
    storage::AUDIOS_BUCKET,
    upload::read_file_field,
};

fn unavailable(message: &str) -> impl FnOnce(anyhow::Error) -> ApiError + '_ {
    move |e| {
        error!("{}: {:#}", message, e);
        ApiError::ServiceUnavailable(message.to_string())
    }
}

fn audio_key() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..100_000_000);
    format!("audio-{}.mp3", n)
}

/// Speech to text with Whisper
pub async fn transcribe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let audio = read_file_field(&mut multipart, "audio")
        .await?
        .ok_or_else(|| ApiError::BadRequest("Audio file is required".to_string()))?;

    if !audio.content_type.starts_with("audio/") {
        return Err(ApiError::BadRequest(
            "Only audio files are allowed".to_string(),
        ));
    }

    let file_name = audio.file_name.as_deref().unwrap_or("input.wav").to_string();
    let text = state
        .openai
        .transcribe(audio.data.to_vec(), &file_name, &audio.content_type)
        .await
        .map_err(unavailable("Failed to transcribe audio"))?;

    Ok(Json(json!({ "text": text })))
}

/// Relay a streamed completion as plain text
pub async fn stream(
    State(state): State<AppState>,
    Json(payload): Json<TextDto>,
) -> ApiResult<Response> {
    payload.validate(8192)?;

    let deltas = state
        .openai
        .stream(&payload.text)
        .await
        .map_err(unavailable("Failed request to ChatGPT"))?;

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
        ],
        Body::from_stream(deltas),
    )
        .into_response())
}

/// Answer a stored chat and keep the answer in its history
pub async fn completion(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<CompletionDto>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let chat_id = payload.validate()?;

    let chat = find_active_chat(&state, &user, chat_id).await?;
    // skip the provider call when the quota is already spent
    ensure_quota(&state, &user, &chat).await?;

    let history = state.chat_repository.conversations(chat.id).await?;
    let answer = state
        .openai
        .complete(&history)
        .await
        .map_err(unavailable("Failed request to ChatGPT"))?;

    let conversation = store_conversation(&state, &user, &chat, "assistant", &answer).await?;

    info!("Stored completion {} in chat {}", conversation.id, chat.id);
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn image(
    State(state): State<AppState>,
    Json(payload): Json<TextDto>,
) -> ApiResult<impl IntoResponse> {
    payload.validate(4000)?;

    let url = state
        .openai
        .image(&payload.text)
        .await
        .map_err(unavailable("Failed to generate image"))?;

    Ok(Json(json!({ "url": url })))
}

/// Text to speech, stored as MP3
pub async fn speech(
    State(state): State<AppState>,
    Json(payload): Json<TextDto>,
) -> ApiResult<impl IntoResponse> {
    payload.validate(4096)?;

    let synthesize = async {
        let audio = state.openai.speech(&payload.text).await?;
        state
            .storage
            .upload(AUDIOS_BUCKET, &audio_key(), audio, "audio/mpeg")
            .await
    };

    let url = synthesize
        .await
        .map_err(unavailable("Failed to synthesize speech"))?;

    Ok(Json(json!({ "url": url })))
}

pub async fn vision(
    State(state): State<AppState>,
    Json(payload): Json<VisionDto>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;

    let text = state
        .openai
        .vision(&payload.text, &payload.urls)
        .await
        .map_err(unavailable("Unable to recognize image"))?;

    Ok(Json(json!({ "text": text })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{routes::create_router, state::test_support::test_state};
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn message(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        body["message"].clone()
    }

    #[test]
    fn test_audio_key() {
        let key = audio_key();
        assert!(key.starts_with("audio-"));
        assert!(key.ends_with(".mp3"));
    }

    #[tokio::test]
    async fn test_empty_prompt_is_rejected() {
        let app = create_router(test_state());

        let response = app
            .oneshot(post_json("/chat-gpt/image", json!({ "text": "" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_provider_failures_map_to_service_unavailable() {
        for (uri, body, expected) in [
            (
                "/chat-gpt/image",
                json!({ "text": "a lighthouse" }),
                "Failed to generate image",
            ),
            (
                "/chat-gpt/conversation/stream",
                json!({ "text": "hello" }),
                "Failed request to ChatGPT",
            ),
            (
                "/chat-gpt/speech",
                json!({ "text": "hello" }),
                "Failed to synthesize speech",
            ),
            (
                "/chat-gpt/vision",
                json!({ "text": "what is this?", "urls": ["https://example.com/a.png"] }),
                "Unable to recognize image",
            ),
        ] {
            let app = create_router(test_state());
            let response = app.oneshot(post_json(uri, body)).await.unwrap();

            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{uri}");
            assert_eq!(message(response).await, expected);
        }
    }

    #[tokio::test]
    async fn test_transcribe_requires_audio_part() {
        let boundary = "X-BOUNDARY";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nhello\r\n--{boundary}--\r\n"
        );

        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/chat-gpt/transcribe")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(response).await, "Only audio files are allowed");
    }
}
