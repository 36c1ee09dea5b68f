//! Repository module for database operations

pub mod otp;

pub use otp::OtpRepository;
