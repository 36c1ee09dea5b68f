//! Authentication service models

pub mod dto;
pub mod otp;

// Re-export for convenience
pub use dto::{
    CheckEmailOtpDto, EditMeDto, EmailDto, EmailVerificationDto, LoginDto, RegisterDto,
    ResetPasswordDto,
};
pub use otp::EmailOtp;
