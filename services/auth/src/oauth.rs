//! Google OAuth2 sign-in with PKCE

use anyhow::Result;
use common::cache::RedisPool;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl, basic::BasicClient,
    reqwest::async_http_client,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Pending handshakes expire after ten minutes
const OAUTH_SESSION_TTL: u64 = 600;

/// OAuth2 configuration for Google
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

impl OAuthConfig {
    /// Reads `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET` and `GOOGLE_CALLBACK_URL`.
    /// Returns `None` unless all three are set.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        Some(OAuthConfig {
            client_id: var("GOOGLE_CLIENT_ID")?,
            client_secret: var("GOOGLE_CLIENT_SECRET")?,
            redirect_url: var("GOOGLE_CALLBACK_URL")?,
        })
    }
}

/// Google profile as returned by the userinfo endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub email: String,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// OAuth handshake data kept in Redis between redirect and callback
#[derive(Debug, Serialize, Deserialize)]
struct OAuthSession {
    csrf_token: String,
    pkce_verifier: String,
}

fn session_key(state: &str) -> String {
    format!("oauth_session:{}", state)
}

#[derive(Clone)]
pub struct GoogleOAuth {
    client: BasicClient,
    http: reqwest::Client,
    redis: RedisPool,
}

impl GoogleOAuth {
    pub fn new(config: OAuthConfig, http: reqwest::Client, redis: RedisPool) -> Result<Self> {
        let client = BasicClient::new(
            ClientId::new(config.client_id),
            Some(ClientSecret::new(config.client_secret)),
            AuthUrl::new(GOOGLE_AUTH_URL.to_string())?,
            Some(TokenUrl::new(GOOGLE_TOKEN_URL.to_string())?),
        )
        .set_redirect_uri(RedirectUrl::new(config.redirect_url)?);

        Ok(Self {
            client,
            http,
            redis,
        })
    }

    /// Build the consent URL and remember the handshake under its CSRF state
    pub async fn authorize_url(&self) -> Result<String> {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("profile".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        let session = OAuthSession {
            csrf_token: csrf_token.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        };

        self.redis
            .set(
                &session_key(csrf_token.secret()),
                &serde_json::to_string(&session)?,
                Some(OAUTH_SESSION_TTL),
            )
            .await?;

        info!("Started Google OAuth handshake");
        Ok(auth_url.to_string())
    }

    /// Finish the handshake: consume the stored session, exchange the code,
    /// and fetch the profile. `Ok(None)` means the state is unknown or stale.
    pub async fn complete(&self, code: &str, state: &str) -> Result<Option<GoogleProfile>> {
        let Some(raw) = self.redis.take(&session_key(state)).await? else {
            warn!("Unknown or expired OAuth state");
            return Ok(None);
        };

        let session: OAuthSession = serde_json::from_str(&raw)?;
        if session.csrf_token != state {
            warn!("OAuth state mismatch");
            return Ok(None);
        }

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(session.pkce_verifier))
            .request_async(async_http_client)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to exchange authorization code: {}", e))?;

        let profile = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(token.access_token().secret())
            .send()
            .await?
            .error_for_status()?
            .json::<GoogleProfile>()
            .await?;

        Ok(Some(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_tolerates_missing_names() {
        let profile: GoogleProfile =
            serde_json::from_str(r#"{"id":"1","email":"ada@gmail.com","verified_email":true}"#)
                .unwrap();

        assert_eq!(profile.email, "ada@gmail.com");
        assert!(profile.given_name.is_none());
        assert!(profile.picture.is_none());
    }

    #[test]
    #[serial_test::serial]
    fn test_config_needs_every_credential() {
        unsafe {
            std::env::set_var("GOOGLE_CLIENT_ID", "client");
            std::env::set_var("GOOGLE_CLIENT_SECRET", "secret");
            std::env::remove_var("GOOGLE_CALLBACK_URL");
        }
        assert!(OAuthConfig::from_env().is_none());

        unsafe {
            std::env::set_var("GOOGLE_CALLBACK_URL", "http://localhost:3000/google/callback");
        }
        let config = OAuthConfig::from_env().unwrap();
        assert_eq!(config.client_id, "client");

        unsafe {
            std::env::remove_var("GOOGLE_CLIENT_ID");
            std::env::remove_var("GOOGLE_CLIENT_SECRET");
            std::env::remove_var("GOOGLE_CALLBACK_URL");
        }
    }

    #[test]
    fn test_session_key() {
        assert_eq!(session_key("abc"), "oauth_session:abc");
    }
}
