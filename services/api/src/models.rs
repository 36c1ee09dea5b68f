//! API models for request and response payloads

pub mod ai;
pub mod chat;
pub mod others;

pub use ai::{CompletionDto, TextDto, VisionDto};
pub use chat::{Chat, ChatWithConversations, Conversation, CreateChatDto, CreateConversationDto};
pub use others::SendMessageDto;
