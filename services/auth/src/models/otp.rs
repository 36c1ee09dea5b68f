//! Email one-time password record

use chrono::{DateTime, Utc};

/// Pending or verified OTP for an email address. `otp` is an Argon2 hash.
#[derive(Debug, Clone)]
pub struct EmailOtp {
    pub email: String,
    pub otp: String,
    /// Unix seconds after which the OTP is rejected
    pub expires: i64,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl EmailOtp {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_exclusive() {
        let otp = EmailOtp {
            email: "ada@example.com".to_string(),
            otp: String::new(),
            expires: 1_000,
            is_verified: false,
            created_at: Utc::now(),
        };

        assert!(!otp.is_expired(1_000));
        assert!(otp.is_expired(1_001));
    }
}
