//! Chat threads and the conversations stored in them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{
    error::ApiResult,
    validation::{collect, validate_length, validate_one_of},
};

/// Roles a conversation entry may carry
pub const CONVERSATION_ROLES: [&str; 3] = ["user", "assistant", "system"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chat_id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A chat together with its ordered history
#[derive(Debug, Serialize)]
pub struct ChatWithConversations {
    #[serde(flatten)]
    pub chat: Chat,
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CreateChatDto {
    pub title: String,
}

impl CreateChatDto {
    pub fn validate(&self) -> ApiResult<()> {
        collect([validate_length("title", self.title.trim(), 3, 25)])
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CreateConversationDto {
    pub role: String,
    pub content: String,
}

impl CreateConversationDto {
    pub fn validate(&self) -> ApiResult<()> {
        collect([
            validate_one_of("role", &self.role, &CONVERSATION_ROLES),
            validate_length("content", &self.content, 1, 8192),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::error::ApiError;

    #[test]
    fn test_chat_title_bounds() {
        assert!(CreateChatDto { title: "Trip".to_string() }.validate().is_ok());
        assert!(CreateChatDto { title: "ab".to_string() }.validate().is_err());
        assert!(
            CreateChatDto { title: "x".repeat(26) }
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_conversation_reports_every_violation() {
        let dto = CreateConversationDto {
            role: "robot".to_string(),
            content: String::new(),
        };

        match dto.validate() {
            Err(ApiError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn test_chat_with_conversations_is_flat() {
        let now = Utc::now();
        let chat = Chat {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Trip".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(ChatWithConversations {
            chat,
            conversations: vec![],
        })
        .unwrap();

        assert_eq!(json["title"], "Trip");
        assert_eq!(json["isActive"], true);
        assert!(json["conversations"].as_array().unwrap().is_empty());
    }
}
