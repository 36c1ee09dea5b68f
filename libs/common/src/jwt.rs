//! JWT service for token generation, validation, and management
//!
//! Session tokens and reset-password tokens are HS256 JWTs signed with two
//! different secrets. Revoked session tokens are blacklisted in Redis for
//! the rest of their lifetime.

use anyhow::Result;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use crate::cache::RedisPool;

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret for signing session tokens
    pub secret: String,
    /// Secret for signing reset-password tokens
    pub reset_password_secret: String,
    /// Session token expiration time in seconds (default: 30 minutes)
    pub session_expiry: u64,
    /// Reset-password token expiration time in seconds (default: 2 minutes)
    pub reset_password_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_SECRET_KEY`: Secret for session tokens
    /// - `JWT_RESET_PASSWORD_SECRET`: Secret for reset-password tokens
    /// - `JWT_SESSION_EXPIRY`: Session token expiry in seconds (default: 1800)
    /// - `JWT_RESET_PASSWORD_EXPIRY`: Reset token expiry in seconds (default: 120)
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("JWT_SECRET_KEY")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET_KEY environment variable not set"))?;

        let reset_password_secret = std::env::var("JWT_RESET_PASSWORD_SECRET").map_err(|_| {
            anyhow::anyhow!("JWT_RESET_PASSWORD_SECRET environment variable not set")
        })?;

        if secret == reset_password_secret {
            anyhow::bail!("JWT_SECRET_KEY and JWT_RESET_PASSWORD_SECRET must differ");
        }

        let session_expiry = std::env::var("JWT_SESSION_EXPIRY")
            .unwrap_or_else(|_| "1800".to_string())
            .parse()
            .unwrap_or(1800);

        let reset_password_expiry = std::env::var("JWT_RESET_PASSWORD_EXPIRY")
            .unwrap_or_else(|_| "120".to_string())
            .parse()
            .unwrap_or(120);

        Ok(JwtConfig {
            secret,
            reset_password_secret,
            session_expiry,
            reset_password_expiry,
        })
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
    pub token_type: TokenType,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Session,
    ResetPassword,
}

/// Why a reset-password token was refused
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResetTokenError {
    #[error(
        "The reset password link has expired. Please click the link below to reset your password again."
    )]
    Expired,
    #[error("Invalid reset password token. Please use the link provided to reset your password.")]
    Invalid,
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    session_encoding: EncodingKey,
    session_decoding: DecodingKey,
    reset_encoding: EncodingKey,
    reset_decoding: DecodingKey,
    validation: Validation,
    config: JwtConfig,
}

fn now_secs() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow::anyhow!("Failed to get current time: {}", e))?
        .as_secs())
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        JwtService {
            session_encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            session_decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            reset_encoding: EncodingKey::from_secret(config.reset_password_secret.as_bytes()),
            reset_decoding: DecodingKey::from_secret(config.reset_password_secret.as_bytes()),
            validation,
            config,
        }
    }

    fn sign(&self, user_id: Uuid, token_type: TokenType) -> Result<String> {
        let now = now_secs()?;
        let (expiry, key) = match token_type {
            TokenType::Session => (self.config.session_expiry, &self.session_encoding),
            TokenType::ResetPassword => {
                (self.config.reset_password_expiry, &self.reset_encoding)
            }
        };

        let claims = Claims {
            sub: user_id,
            iat: now,
            exp: now + expiry,
            token_type,
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, key)?)
    }

    /// Sign a session token for a user
    pub fn generate_session_token(&self, user_id: Uuid) -> Result<String> {
        self.sign(user_id, TokenType::Session)
    }

    /// Sign a short-lived reset-password token for a user
    pub fn generate_reset_password_token(&self, user_id: Uuid) -> Result<String> {
        self.sign(user_id, TokenType::ResetPassword)
    }

    /// Validate a session token and return the claims
    pub fn validate_session_token(&self, token: &str) -> Result<Claims> {
        let claims = decode::<Claims>(token, &self.session_decoding, &self.validation)?.claims;

        if claims.token_type != TokenType::Session {
            anyhow::bail!("Token is not a session token");
        }

        Ok(claims)
    }

    /// Validate a reset-password token, telling expiry apart from tampering
    pub fn validate_reset_password_token(&self, token: &str) -> Result<Claims, ResetTokenError> {
        let claims = decode::<Claims>(token, &self.reset_decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => ResetTokenError::Expired,
                _ => ResetTokenError::Invalid,
            })?
            .claims;

        if claims.token_type != TokenType::ResetPassword {
            return Err(ResetTokenError::Invalid);
        }

        Ok(claims)
    }

    /// Check if a token is blacklisted in Redis
    pub async fn is_token_blacklisted(&self, redis_pool: &RedisPool, token: &str) -> Result<bool> {
        let key = format!("blacklisted_token:{}", token);
        let result = redis_pool.get(&key).await?;
        Ok(result.is_some())
    }

    /// Blacklist a session token until it would have expired anyway
    pub async fn blacklist_token(&self, redis_pool: &RedisPool, token: &str, exp: u64) -> Result<()> {
        let remaining = exp.saturating_sub(now_secs()?);
        if remaining == 0 {
            return Ok(());
        }

        let key = format!("blacklisted_token:{}", token);
        redis_pool.set(&key, "1", Some(remaining)).await?;
        Ok(())
    }

    /// Get the session token expiry time
    pub fn session_expiry(&self) -> u64 {
        self.config.session_expiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new(JwtConfig {
            secret: "session-secret".to_string(),
            reset_password_secret: "reset-secret".to_string(),
            session_expiry: 1800,
            reset_password_expiry: 120,
        })
    }

    fn expired_token(secret: &str, token_type: TokenType) -> String {
        let now = now_secs().unwrap();
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: now - 600,
            exp: now - 300,
            token_type,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_session_token_validates() {
        let jwt = service();
        let user_id = Uuid::new_v4();

        let token = jwt.generate_session_token(user_id).unwrap();
        let claims = jwt.validate_session_token(&token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.token_type, TokenType::Session);
        assert_eq!(claims.exp - claims.iat, 1800);
    }

    #[test]
    fn test_expired_session_token_is_rejected() {
        let jwt = service();
        let token = expired_token("session-secret", TokenType::Session);

        assert!(jwt.validate_session_token(&token).is_err());
    }

    #[test]
    fn test_reset_token_is_not_a_session_token() {
        let jwt = service();
        let token = jwt.generate_reset_password_token(Uuid::new_v4()).unwrap();

        assert!(jwt.validate_session_token(&token).is_err());
    }

    #[test]
    fn test_session_token_is_not_a_reset_token() {
        let jwt = service();
        let token = jwt.generate_session_token(Uuid::new_v4()).unwrap();

        assert_eq!(
            jwt.validate_reset_password_token(&token).unwrap_err(),
            ResetTokenError::Invalid
        );
    }

    #[test]
    fn test_expired_reset_token_reports_expiry() {
        let jwt = service();
        let token = expired_token("reset-secret", TokenType::ResetPassword);

        assert_eq!(
            jwt.validate_reset_password_token(&token).unwrap_err(),
            ResetTokenError::Expired
        );
    }

    #[test]
    fn test_garbage_reset_token_is_invalid() {
        let jwt = service();

        assert_eq!(
            jwt.validate_reset_password_token("not-a-jwt").unwrap_err(),
            ResetTokenError::Invalid
        );
    }
}
