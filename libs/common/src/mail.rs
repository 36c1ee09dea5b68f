//! Outgoing HTML mail over SMTP

use anyhow::Result;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::{info, warn};

/// SMTP configuration
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub host: Option<String>,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl MailerConfig {
    /// Create a new MailerConfig from environment variables
    ///
    /// # Environment Variables
    /// - `MAILER_HOST`: SMTP relay host; mail is disabled when unset
    /// - `MAILER_PORT`: SMTP port (default: 465)
    /// - `MAILER_USER`: SMTP user, also the sender address
    /// - `MAILER_PASSWORD`: SMTP password
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("MAILER_HOST").ok().filter(|h| !h.is_empty());

        let port = std::env::var("MAILER_PORT")
            .unwrap_or_else(|_| "465".to_string())
            .parse()
            .unwrap_or(465);

        Ok(MailerConfig {
            host,
            port,
            user: std::env::var("MAILER_USER").unwrap_or_default(),
            password: std::env::var("MAILER_PASSWORD").unwrap_or_default(),
        })
    }
}

/// SMTP mailer. Without a configured host every send is skipped.
#[derive(Clone)]
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: String,
}

impl Mailer {
    pub fn new(config: &MailerConfig) -> Result<Self> {
        let transport = match &config.host {
            Some(host) => Some(
                AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
                    .port(config.port)
                    .credentials(Credentials::new(
                        config.user.clone(),
                        config.password.clone(),
                    ))
                    .build(),
            ),
            None => {
                warn!("MAILER_HOST not set, outgoing mail is disabled");
                None
            }
        };

        Ok(Mailer {
            transport,
            from: config.user.clone(),
        })
    }

    pub async fn send_html(&self, to: &str, subject: &str, html: String) -> Result<()> {
        let Some(transport) = &self.transport else {
            warn!("Skipping mail '{}' to {}: mailer disabled", subject, to);
            return Ok(());
        };

        let message = Message::builder()
            .from(self.from.parse::<Mailbox>()?)
            .to(to.parse::<Mailbox>()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)?;

        transport.send(message).await?;
        info!("Sent '{}' to {}", subject, to);
        Ok(())
    }

    pub async fn send_verification_code(&self, to: &str, name: &str, code: &str) -> Result<()> {
        self.send_html(to, "Verification Code", verification_code_html(name, code))
            .await
    }

    pub async fn send_password_reset(&self, to: &str, name: &str, link: &str) -> Result<()> {
        self.send_html(to, "Password reset", password_reset_html(name, link))
            .await
    }

    pub async fn send_email_otp(&self, to: &str, otp: &str) -> Result<()> {
        self.send_html(to, "Email Verification OTP", email_otp_html(otp))
            .await
    }
}

fn verification_code_html(name: &str, code: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <div style="background-color: #f8f8f8; padding: 20px;">
    <h2 style="color: #333;">Hey {name},</h2>
    <p style="font-size: 16px;">Your verification code is:</p>
    <div style="background-color: #fff; border: 1px solid #ccc; padding: 15px; border-radius: 5px; margin-top: 10px;">
      <h3 style="margin: 0; font-size: 24px; color: #007bff;">{code}</h3>
    </div>
    <p style="font-size: 14px; margin-top: 15px;">Please use this code to verify your email address.</p>
  </div>
  <p style="font-size: 14px; color: #666; margin-top: 20px;">This email was sent automatically. Please do not reply.</p>
</div>"#
    )
}

fn password_reset_html(name: &str, link: &str) -> String {
    format!(
        r#"<h2>Hey {name}</h2>
<p>To recover your password, please use this <a target="_self" href="{link}">link</a>.</p>"#
    )
}

fn email_otp_html(otp: &str) -> String {
    format!(
        r#"<h2>Hey!</h2>
<p>Your email verification OTP is <strong style="color:blue">{otp}</strong>.</p>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_embed_values() {
        assert!(verification_code_html("Ada", "123456").contains("123456"));
        assert!(password_reset_html("Ada", "https://x/reset").contains("href=\"https://x/reset\""));
        assert!(email_otp_html("004213").contains("004213"));
    }

    #[tokio::test]
    async fn test_disabled_mailer_skips_sending() {
        let mailer = Mailer::new(&MailerConfig {
            host: None,
            port: 465,
            user: String::new(),
            password: String::new(),
        })
        .unwrap();

        assert!(mailer.send_email_otp("ada@example.com", "123456").await.is_ok());
    }
}
