//! Request bodies accepted by the authentication service
//!
//! Missing fields deserialize to empty values so that validation reports
//! them alongside every other violation.

use serde::Deserialize;

use common::{
    error::ApiResult,
    models::UpdateProfile,
    validation::{
        collect, validate_code, validate_email, validate_length, validate_not_empty,
        validate_optional_length,
    },
};

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterDto {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl RegisterDto {
    pub fn validate(&self) -> ApiResult<()> {
        collect([
            validate_length("firstName", &self.first_name, 2, 64),
            validate_length("lastName", &self.last_name, 2, 64),
            validate_email("email", &self.email),
            validate_length("password", &self.password, 8, 16),
        ])
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginDto {
    pub email_or_username: String,
    pub password: String,
}

impl LoginDto {
    pub fn validate(&self) -> ApiResult<()> {
        collect([
            validate_not_empty("emailOrUsername", &self.email_or_username),
            validate_length("password", &self.password, 8, 16),
        ])
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EditMeDto {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl EditMeDto {
    pub fn validate(&self) -> ApiResult<()> {
        collect([
            validate_optional_length("firstName", self.first_name.as_deref(), 2, 64),
            validate_optional_length("lastName", self.last_name.as_deref(), 2, 64),
            validate_optional_length("username", self.username.as_deref().map(str::trim), 3, 80),
        ])
    }

    /// Usernames are stored lowercase
    pub fn into_update(self) -> UpdateProfile {
        UpdateProfile {
            first_name: self.first_name,
            last_name: self.last_name,
            username: self.username.map(|u| u.trim().to_lowercase()),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct EmailVerificationDto {
    pub code: String,
}

impl EmailVerificationDto {
    pub fn validate(&self) -> ApiResult<()> {
        collect([validate_code("code", &self.code)])
    }
}

/// Body carrying only an email: forgot password, send OTP, OTP status
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct EmailDto {
    pub email: String,
}

impl EmailDto {
    pub fn validate(&self) -> ApiResult<()> {
        collect([validate_email("email", &self.email)])
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ResetPasswordDto {
    pub identification_token: String,
    pub password: String,
}

impl ResetPasswordDto {
    pub fn validate(&self) -> ApiResult<()> {
        collect([
            validate_not_empty("identificationToken", &self.identification_token),
            validate_length("password", &self.password, 8, 16),
        ])
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CheckEmailOtpDto {
    pub email: String,
    pub otp: String,
}

impl CheckEmailOtpDto {
    pub fn validate(&self) -> ApiResult<()> {
        collect([
            validate_email("email", &self.email),
            validate_code("otp", &self.otp),
        ])
    }
}
