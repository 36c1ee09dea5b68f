//! IP geolocation (ipinfo.io)

use anyhow::Result;

use crate::{client_ip::ClientIp, models::Location};

#[derive(Clone)]
pub struct Geolocator {
    client: reqwest::Client,
    token: Option<String>,
}

impl Geolocator {
    /// Reads `IP_INFO_SECRET_KEY`. Lookups without a token use the anonymous tier.
    pub fn from_env(client: reqwest::Client) -> Self {
        Geolocator {
            client,
            token: std::env::var("IP_INFO_SECRET_KEY")
                .ok()
                .filter(|t| !t.is_empty()),
        }
    }

    /// Loopback and unknown clients resolve to an empty location without a lookup
    pub async fn locate_client(&self, client_ip: &ClientIp) -> Result<Location> {
        if !client_ip.is_known_remote() {
            return Ok(Location::default());
        }

        self.locate(&client_ip.0).await
    }

    pub async fn locate(&self, ip: &str) -> Result<Location> {
        let mut request = self.client.get(format!("https://ipinfo.io/{ip}/json"));
        if let Some(token) = &self.token {
            request = request.query(&[("token", token)]);
        }

        let location = request
            .send()
            .await?
            .error_for_status()?
            .json::<Location>()
            .await?;

        Ok(location)
    }
}
