//! Chat threads and their conversations

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use common::{
    error::{ApiError, ApiResult},
    models::{Role, User},
};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    models::{
        Chat, ChatWithConversations, Conversation, CreateChatDto, CreateConversationDto,
    },
    state::AppState,
};

/// Load one of the caller's chats. Inactive chats are refused.
pub(crate) async fn find_active_chat(
    state: &AppState,
    user: &User,
    chat_id: Uuid,
) -> ApiResult<Chat> {
    let chat = state
        .chat_repository
        .find(user.id, chat_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Chat doesn't exist".to_string()))?;

    if !chat.is_active {
        return Err(ApiError::Forbidden("Chat has been deactivated".to_string()));
    }

    Ok(chat)
}

/// Conversations a user of `role` may store in one chat, `None` when unbounded
pub(crate) fn conversation_limit(role: Role, user_attempts: u32) -> Option<i64> {
    match role {
        Role::User => Some(i64::from(user_attempts) * 2),
        Role::Admin => None,
    }
}

fn quota_exhausted(user: &User, chat: &Chat) -> ApiError {
    warn!("User {} reached the conversation limit in chat {}", user.id, chat.id);
    ApiError::Forbidden("Insufficient number of attempts".to_string())
}

/// Fail with 403 once the caller has used up the chat's quota.
/// Advisory only, `store_conversation` repeats the check under a row lock.
pub(crate) async fn ensure_quota(state: &AppState, user: &User, chat: &Chat) -> ApiResult<()> {
    let Some(limit) = conversation_limit(user.role, state.settings.user_attempts) else {
        return Ok(());
    };

    let count = state.chat_repository.count_conversations(chat.id).await?;
    if count >= limit {
        return Err(quota_exhausted(user, chat));
    }

    Ok(())
}

/// Append a message to `chat`, enforcing the caller's quota atomically
pub(crate) async fn store_conversation(
    state: &AppState,
    user: &User,
    chat: &Chat,
    role: &str,
    content: &str,
) -> ApiResult<Conversation> {
    let limit = conversation_limit(user.role, state.settings.user_attempts);

    state
        .chat_repository
        .add_conversation(user.id, chat.id, role, content, limit)
        .await?
        .ok_or_else(|| quota_exhausted(user, chat))
}

pub async fn create_chat(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<CreateChatDto>,
) -> ApiResult<Json<Chat>> {
    payload.validate()?;

    let chat = state
        .chat_repository
        .create(user.id, payload.title.trim())
        .await?;

    info!("User {} created chat {}", user.id, chat.id);
    Ok(Json(chat))
}

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<impl IntoResponse> {
    let chats = state.chat_repository.list(user.id).await?;

    Ok(Json(json!({
        "count": chats.len(),
        "chats": chats
    })))
}

pub async fn get_chat(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(chat_id): Path<Uuid>,
) -> ApiResult<Json<ChatWithConversations>> {
    let chat = find_active_chat(&state, &user, chat_id).await?;
    let conversations = state.chat_repository.conversations(chat.id).await?;

    Ok(Json(ChatWithConversations {
        chat,
        conversations,
    }))
}

pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(chat_id): Path<Uuid>,
    Json(payload): Json<CreateConversationDto>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    payload.validate()?;

    let chat = find_active_chat(&state, &user, chat_id).await?;
    let conversation =
        store_conversation(&state, &user, &chat, &payload.role, &payload.content).await?;

    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(chat_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Conversation>>> {
    let chat = find_active_chat(&state, &user, chat_id).await?;

    Ok(Json(state.chat_repository.conversations(chat.id).await?))
}
