//! Account creation and verification-code delivery

use chrono::Utc;
use common::{
    error::{ApiError, ApiResult},
    models::{NewUser, User},
    secret::{generate_verification_code, hash_secret, unusable_password},
};
use tracing::{error, info};

use crate::{oauth::GoogleProfile, state::AppState};

/// Profile fields of an account about to be created
pub struct Signup {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub photo: Option<String>,
}

/// Result of signing in with Google
pub enum GoogleSignIn {
    Active(User),
    Deactivated,
}

/// Username candidate taken from the local part of an email
pub fn username_from_email(email: &str) -> String {
    email
        .split('@')
        .next()
        .unwrap_or(email)
        .trim()
        .to_lowercase()
}

async fn unique_username(state: &AppState, email: &str) -> ApiResult<String> {
    let candidate = username_from_email(email);

    if state.user_repository.username_exists(&candidate).await? {
        return Ok(format!("{}-{}", candidate, Utc::now().timestamp_millis()));
    }

    Ok(candidate)
}

pub async fn create_user(state: &AppState, signup: Signup) -> ApiResult<User> {
    let email = signup.email.trim().to_lowercase();

    if state.user_repository.find_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict("User already exists".to_string()));
    }

    if !state.email_verifier.verify(&email).await {
        return Err(ApiError::BadRequest("Your email is not valid".to_string()));
    }

    let password_hash = hash_secret(&signup.password)?;
    let username = unique_username(state, &email).await?;

    let user = state
        .user_repository
        .create(&NewUser {
            first_name: signup.first_name.trim().to_string(),
            last_name: signup.last_name.trim().to_string(),
            email,
            username,
            password_hash,
            photo: signup.photo,
        })
        .await?;

    info!("Created user {}", user.id);
    Ok(user)
}

/// Unverified users, or users with no pending code, get a fresh one
pub fn needs_verification_code(user: &User) -> bool {
    !user.is_verified || user.verification_token.is_none()
}

/// Store a new verification code and mail it, in the background.
/// Failures are logged only.
pub fn send_verification_code(state: &AppState, user: &User) {
    let state = state.clone();
    let (user_id, email, name) = (user.id, user.email.clone(), user.first_name.clone());

    tokio::spawn(async move {
        let code = generate_verification_code();

        let result = async {
            let code_hash = hash_secret(&code)?;
            state
                .user_repository
                .set_verification_token(user_id, &code_hash)
                .await?;
            state.mailer.send_verification_code(&email, &name, &code).await
        }
        .await;

        if let Err(e) = result {
            error!("Failed to send verification code to {}: {}", user_id, e);
        }
    });
}

/// Sign in or sign up from a Google profile
pub async fn google_sign_in(state: &AppState, profile: GoogleProfile) -> ApiResult<GoogleSignIn> {
    let email = profile.email.trim().to_lowercase();

    if let Some(existing) = state.user_repository.find_by_email(&email).await? {
        if needs_verification_code(&existing) {
            send_verification_code(state, &existing);
        }

        if !existing.is_active {
            return Ok(GoogleSignIn::Deactivated);
        }

        return Ok(GoogleSignIn::Active(existing));
    }

    let user = create_user(
        state,
        Signup {
            first_name: profile.given_name.unwrap_or_default(),
            last_name: profile.family_name.unwrap_or_default(),
            email,
            password: unusable_password(),
            photo: profile.picture,
        },
    )
    .await?;

    send_verification_code(state, &user);
    Ok(GoogleSignIn::Active(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_from_email() {
        assert_eq!(username_from_email("Ada.Lovelace@Example.com"), "ada.lovelace");
        assert_eq!(username_from_email("  bob @x.io"), "bob");
    }
}
