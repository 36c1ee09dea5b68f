//! Request bodies for the AI proxy

use serde::Deserialize;
use uuid::Uuid;

use common::{
    error::{ApiError, ApiResult},
    validation::{collect, validate_length},
};

/// Free text prompt. Each endpoint applies its own upper bound.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct TextDto {
    pub text: String,
}

impl TextDto {
    pub fn validate(&self, max: usize) -> ApiResult<()> {
        collect([validate_length("text", &self.text, 1, max)])
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionDto {
    pub chat_id: Option<Uuid>,
}

impl CompletionDto {
    /// The chat to answer
    pub fn validate(&self) -> ApiResult<Uuid> {
        self.chat_id
            .ok_or_else(|| ApiError::Validation(vec!["chatId must be a UUID".to_string()]))
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct VisionDto {
    pub text: String,
    pub urls: Vec<String>,
}

impl VisionDto {
    pub fn validate(&self) -> ApiResult<()> {
        let count = if (1..=4).contains(&self.urls.len()) {
            Ok(())
        } else {
            Err("urls must contain between 1 and 4 elements".to_string())
        };

        let urls = self
            .urls
            .iter()
            .find(|url| !(url.starts_with("https://") || url.starts_with("http://")))
            .map_or(Ok(()), |_| Err("each value in urls must be a URL address".to_string()));

        collect([validate_length("text", &self.text, 1, 8192), count, urls])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_bound_is_per_endpoint() {
        let dto = TextDto {
            text: "x".repeat(4001),
        };
        assert!(dto.validate(4096).is_ok());
        assert!(dto.validate(4000).is_err());
        assert!(TextDto::default().validate(4000).is_err());
    }

    #[test]
    fn test_completion_requires_chat_id() {
        assert!(CompletionDto::default().validate().is_err());

        let chat_id = Uuid::new_v4();
        let dto = CompletionDto {
            chat_id: Some(chat_id),
        };
        assert_eq!(dto.validate().unwrap(), chat_id);
    }

    #[test]
    fn test_vision_urls() {
        let valid = VisionDto {
            text: "What is this?".to_string(),
            urls: vec!["https://example.com/cat.png".to_string()],
        };
        assert!(valid.validate().is_ok());

        let too_many = VisionDto {
            urls: vec!["https://example.com/a.png".to_string(); 5],
            ..valid
        };
        assert!(too_many.validate().is_err());

        let not_url = VisionDto {
            text: "What is this?".to_string(),
            urls: vec!["cat.png".to_string()],
        };
        assert!(not_url.validate().is_err());
    }
}
