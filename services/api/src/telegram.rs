//! Contact messages delivered to a Telegram chat

use std::sync::OnceLock;

use anyhow::{Result, anyhow};
use common::models::Location;
use regex::Regex;
use serde_json::json;

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramConfig {
    /// `None` unless both `TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID` are set
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok().filter(|v| !v.is_empty())?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok().filter(|v| !v.is_empty())?;

        Some(Self { bot_token, chat_id })
    }
}

#[derive(Clone)]
pub struct Telegram {
    http: reqwest::Client,
    config: Option<TelegramConfig>,
}

impl Telegram {
    pub fn new(http: reqwest::Client, config: Option<TelegramConfig>) -> Self {
        Self { http, config }
    }

    /// Post an HTML formatted message to the configured chat
    pub async fn send_html(&self, text: &str) -> Result<()> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| anyhow!("Telegram is not configured"))?;

        self.http
            .post(format!(
                "https://api.telegram.org/bot{}/sendMessage",
                config.bot_token
            ))
            .json(&json!({
                "chat_id": config.chat_id,
                "parse_mode": "html",
                "text": text,
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// Fields rendered into a contact message
pub struct ContactMessage<'a> {
    pub ip: &'a str,
    pub full_name: &'a str,
    pub email: &'a str,
    pub message: &'a str,
    pub location: &'a Location,
    pub device: &'a str,
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl ContactMessage<'_> {
    pub fn to_html(&self) -> String {
        let field = |value: Option<&String>| value.map_or("unknown".to_string(), |v| escape_html(v));

        format!(
            "🌐  IP: <b>{}</b>\n\
             👤  full name: <b>{}</b>\n\
             📪  email: <b>{}</b>\n\
             ✉️  message: <b>{}</b>\n\
             📍  location: <b>{}, {}</b>\n\
             ⏱️  timezone: <b>{}</b>\n\
             💻  device: <b>{}</b>",
            escape_html(self.ip),
            escape_html(self.full_name),
            escape_html(self.email),
            escape_html(self.message),
            field(self.location.city.as_ref()),
            field(self.location.country.as_ref()),
            field(self.location.timezone.as_ref()),
            escape_html(self.device),
        )
    }
}

/// Coarse device name from a `User-Agent` header
pub fn device_from_user_agent(user_agent: &str) -> String {
    static IPHONE: OnceLock<Regex> = OnceLock::new();
    static ANDROID: OnceLock<Regex> = OnceLock::new();

    let lower = user_agent.to_lowercase();

    if lower.contains("iphone") {
        let regex = IPHONE.get_or_init(|| {
            Regex::new(r"iPhone\s(?:OS\s)?([\d_]+)").expect("Failed to compile iPhone regex")
        });
        return match regex.captures(user_agent) {
            Some(caps) => format!("iPhone {}", caps[1].replace('_', ".")),
            None => "iPhone".to_string(),
        };
    }

    if lower.contains("android") {
        let regex = ANDROID.get_or_init(|| {
            Regex::new(r"Android\s([\d.]+)").expect("Failed to compile Android regex")
        });
        return match regex.captures(user_agent) {
            Some(caps) => format!("Android {}", &caps[1]),
            None => "Android".to_string(),
        };
    }

    if lower.contains("macintosh") {
        "MacOS".to_string()
    } else if lower.contains("windows") {
        "Windows".to_string()
    } else if lower.contains("linux") {
        "Linux".to_string()
    } else {
        "Unknown".to_string()
    }
}
