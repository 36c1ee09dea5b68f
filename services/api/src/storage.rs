//! Object storage for uploaded photos and synthesized audio
//!
//! Files go to an S3-compatible endpoint (Supabase storage by default) and are
//! served back through the public object URL.

use anyhow::Result;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{Client, config::Region, primitives::ByteStream};
use tracing::info;

pub const PHOTOS_BUCKET: &str = "photos";
pub const AUDIOS_BUCKET: &str = "audios";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub supabase_url: String,
    pub endpoint: String,
    pub region: String,
}

impl StorageConfig {
    /// # Environment Variables
    /// - `SUPABASE_URL`: base URL of the storage project
    /// - `STORAGE_ENDPOINT`: S3 endpoint (default: `<SUPABASE_URL>/storage/v1/s3`)
    /// - `STORAGE_REGION`: (default: "us-east-1")
    ///
    /// Credentials come from the standard AWS provider chain.
    pub fn from_env() -> Result<Self> {
        let supabase_url = std::env::var("SUPABASE_URL")
            .map_err(|_| anyhow::anyhow!("SUPABASE_URL must be set"))?
            .trim_end_matches('/')
            .to_string();

        let endpoint = std::env::var("STORAGE_ENDPOINT")
            .unwrap_or_else(|_| format!("{}/storage/v1/s3", supabase_url));
        let region = std::env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".to_string());

        Ok(Self {
            supabase_url,
            endpoint,
            region,
        })
    }
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    supabase_url: String,
}

impl Storage {
    pub async fn new(config: &StorageConfig) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        info!("Object storage client initialized for {}", config.endpoint);

        Self::with_client(Client::from_conf(s3_config), &config.supabase_url)
    }

    pub fn with_client(client: Client, supabase_url: &str) -> Self {
        Self {
            client,
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.supabase_url, bucket, key
        )
    }

    /// Store `data` under `bucket/key` and return its public URL
    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await?;

        info!("Uploaded {}/{}", bucket, key);
        Ok(self.public_url(bucket, key))
    }
}

#[cfg(test)]
pub(crate) fn test_storage() -> Storage {
    let config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .endpoint_url("http://127.0.0.1:1")
        .force_path_style(true)
        .build();

    Storage::with_client(Client::from_conf(config), "https://project.supabase.co/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_endpoint_defaults_to_supabase_s3() {
        unsafe {
            std::env::set_var("SUPABASE_URL", "https://project.supabase.co/");
            std::env::remove_var("STORAGE_ENDPOINT");
            std::env::remove_var("STORAGE_REGION");
        }

        let config = StorageConfig::from_env().unwrap();
        assert_eq!(config.endpoint, "https://project.supabase.co/storage/v1/s3");
        assert_eq!(config.region, "us-east-1");

        unsafe {
            std::env::remove_var("SUPABASE_URL");
        }
        assert!(StorageConfig::from_env().is_err());
    }

    #[test]
    fn test_public_url() {
        let storage = test_storage();
        assert_eq!(
            storage.public_url(PHOTOS_BUCKET, "user-1-photo-2.png"),
            "https://project.supabase.co/storage/v1/object/public/photos/user-1-photo-2.png"
        );
    }
}
