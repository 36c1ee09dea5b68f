//! Service settings shared by both binaries, read from the environment

use anyhow::{Context, Result};
use axum_extra::extract::cookie::Key;

use crate::client_ip::ProxyPolicy;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub frontend_base_url: String,
    pub auth_app_url: String,
    /// Cookie signing secret, at least 64 bytes
    pub app_secret: String,
    pub app_env: String,
    pub auth_port: u16,
    pub api_port: u16,
    /// Conversations a `USER` may store per chat is twice this value
    pub user_attempts: u32,
    pub display_utc_offset_hours: i32,
    pub healthcheck_url: Option<String>,
    /// Believe `x-real-ip` / `x-forwarded-for` from a reverse proxy
    pub trust_proxy: bool,
}

impl Settings {
    /// Load settings from environment variables with defaults.
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("frontend_base_url", "http://localhost:3000")?
            .set_default("auth_app_url", "http://localhost:3000")?
            .set_default("app_env", "development")?
            .set_default("auth_port", 3000)?
            .set_default("api_port", 3001)?
            .set_default("user_attempts", 10)?
            .set_default("display_utc_offset_hours", 6)?
            .set_default("trust_proxy", false)?
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize::<Settings>()
            .context("Invalid service settings")?;

        Ok(settings)
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    /// Key used to sign the `session` and `token` cookies
    pub fn cookie_key(&self) -> Result<Key> {
        Key::try_from(self.app_secret.as_bytes())
            .map_err(|_| anyhow::anyhow!("APP_SECRET must be at least 64 bytes long"))
    }

    pub fn proxy_policy(&self) -> ProxyPolicy {
        ProxyPolicy {
            trust_forwarded_headers: self.trust_proxy,
        }
    }

    /// Origins allowed by CORS
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins = vec!["http://localhost:3000".to_string()];
        let frontend = self.frontend_base_url.trim_end_matches('/').to_string();
        if !origins.contains(&frontend) {
            origins.push(frontend);
        }
        origins
    }
}

#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    Settings {
        frontend_base_url: "http://localhost:5173".to_string(),
        auth_app_url: "http://localhost:4000".to_string(),
        app_secret: "x".repeat(64),
        app_env: "development".to_string(),
        auth_port: 3000,
        api_port: 3001,
        user_attempts: 10,
        display_utc_offset_hours: 6,
        healthcheck_url: None,
        trust_proxy: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_settings_from_env_with_defaults() {
        unsafe {
            std::env::set_var("APP_SECRET", "s".repeat(64));
            std::env::remove_var("API_PORT");
            std::env::set_var("USER_ATTEMPTS", "3");
        }

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.api_port, 3001);
        assert_eq!(settings.user_attempts, 3);
        assert!(!settings.is_production());
        assert!(!settings.proxy_policy().trust_forwarded_headers);

        unsafe {
            std::env::remove_var("APP_SECRET");
            std::env::remove_var("USER_ATTEMPTS");
        }
    }

    #[test]
    #[serial]
    fn test_missing_app_secret_fails() {
        unsafe {
            std::env::remove_var("APP_SECRET");
        }

        assert!(Settings::from_env().is_err());
    }

    #[test]
    fn test_short_cookie_secret_is_rejected() {
        let mut settings = test_settings();
        assert!(settings.cookie_key().is_ok());

        settings.app_secret = "short".to_string();
        assert!(settings.cookie_key().is_err());
    }

    #[test]
    fn test_allowed_origins() {
        let settings = test_settings();
        assert_eq!(
            settings.allowed_origins(),
            vec!["http://localhost:3000", "http://localhost:5173"]
        );
    }
}
