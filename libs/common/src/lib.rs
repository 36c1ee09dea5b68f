//! Common library for the Nest Hub services
//!
//! This crate provides shared functionality used by the `auth` and `api`
//! services: database and cache connectivity, error handling, JWT sessions,
//! the user model and repository, request authentication, and clients for
//! the mail, email verification and geolocation providers.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, init_pool, health_check};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     println!("Database health check: {}", health_check(&pool).await);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client_ip;
pub mod database;
pub mod email_verifier;
pub mod error;
pub mod geolocation;
pub mod guard;
pub mod jwt;
pub mod mail;
pub mod models;
pub mod repositories;
pub mod secret;
pub mod settings;
pub mod validation;
