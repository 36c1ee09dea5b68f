//! Email OTP repository

use anyhow::Result;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::models::EmailOtp;

/// Email OTP repository
#[derive(Clone)]
pub struct OtpRepository {
    pool: PgPool,
}

impl OtpRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store a fresh OTP hash for `email`, replacing any previous one
    pub async fn upsert(&self, email: &str, otp_hash: &str, expires: i64) -> Result<()> {
        info!("Storing email OTP for {}", email);

        sqlx::query(
            r#"
            INSERT INTO email_otps (email, otp, expires, is_verified, created_at)
            VALUES ($1, $2, $3, FALSE, NOW())
            ON CONFLICT (email) DO UPDATE SET
                otp = EXCLUDED.otp,
                expires = EXCLUDED.expires,
                is_verified = FALSE,
                created_at = NOW()
            "#,
        )
        .bind(email)
        .bind(otp_hash)
        .bind(expires)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find(&self, email: &str) -> Result<Option<EmailOtp>> {
        let row = sqlx::query(
            r#"
            SELECT email, otp, expires, is_verified, created_at
            FROM email_otps
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| EmailOtp {
            email: row.get("email"),
            otp: row.get("otp"),
            expires: row.get("expires"),
            is_verified: row.get("is_verified"),
            created_at: row.get("created_at"),
        }))
    }

    pub async fn mark_verified(&self, email: &str) -> Result<()> {
        sqlx::query("UPDATE email_otps SET is_verified = TRUE WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
