use serde::Deserialize;

use common::{
    error::ApiResult,
    validation::{collect, validate_email, validate_length},
};

/// Contact form message relayed to Telegram
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SendMessageDto {
    pub full_name: String,
    pub email: String,
    pub message: String,
}

impl SendMessageDto {
    pub fn validate(&self) -> ApiResult<()> {
        collect([
            validate_length("fullName", self.full_name.trim(), 2, 64),
            validate_email("email", &self.email),
            validate_length("message", &self.message, 1, 2048),
        ])
    }
}
