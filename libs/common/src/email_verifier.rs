//! Deliverability check for user-supplied email addresses (hunter.io)

use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, error};

const HUNTER_URL: &str = "https://api.hunter.io/v2/email-verifier";

#[derive(Debug, Deserialize)]
struct HunterResponse {
    data: HunterData,
}

#[derive(Debug, Deserialize)]
struct HunterData {
    status: Option<String>,
    regexp: Option<bool>,
    result: Option<String>,
}

impl HunterData {
    fn is_deliverable(&self) -> bool {
        self.status.as_deref() == Some("valid")
            && self.regexp == Some(true)
            && self.result.as_deref() == Some("deliverable")
    }
}

#[derive(Clone)]
pub struct EmailVerifier {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl EmailVerifier {
    /// Without an API key every address is accepted.
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        EmailVerifier { client, api_key }
    }

    /// Reads `EMAIL_VERIFICATION_TOKEN`
    pub fn from_env(client: reqwest::Client) -> Self {
        let api_key = std::env::var("EMAIL_VERIFICATION_TOKEN")
            .ok()
            .filter(|k| !k.is_empty());

        Self::new(client, api_key)
    }

    /// True when the provider reports the address as valid and deliverable.
    /// Provider failures count as invalid.
    pub async fn verify(&self, email: &str) -> bool {
        let Some(api_key) = &self.api_key else {
            debug!("EMAIL_VERIFICATION_TOKEN not set, skipping verification of {}", email);
            return true;
        };

        match self.lookup(email, api_key).await {
            Ok(data) => data.is_deliverable(),
            Err(e) => {
                error!("Error verifying email {}: {}", email, e);
                false
            }
        }
    }

    async fn lookup(&self, email: &str, api_key: &str) -> Result<HunterData> {
        let response: HunterResponse = self
            .client
            .get(HUNTER_URL)
            .query(&[("email", email), ("api_key", api_key)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deliverable_requires_all_three_signals() {
        let parse = |raw: &str| serde_json::from_str::<HunterResponse>(raw).unwrap().data;

        assert!(
            parse(r#"{"data":{"status":"valid","regexp":true,"result":"deliverable"}}"#)
                .is_deliverable()
        );
        assert!(
            !parse(r#"{"data":{"status":"accept_all","regexp":true,"result":"deliverable"}}"#)
                .is_deliverable()
        );
        assert!(!parse(r#"{"data":{"status":"valid","regexp":true}}"#).is_deliverable());
    }

    #[tokio::test]
    async fn test_without_api_key_every_address_passes() {
        let verifier = EmailVerifier::new(reqwest::Client::new(), None);
        assert!(verifier.verify("anyone@example.com").await);
    }
}
