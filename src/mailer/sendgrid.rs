//! SendGrid v3 Mail Send client.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::{Mailer, OutgoingEmail, ProviderResponse};
use crate::config::env_string;
use crate::error::{ConfigError, ProviderError};

/// Production Mail Send endpoint.
pub const SENDGRID_API_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Longest provider error body kept in a failure record.
const MAX_DETAIL_CHARS: usize = 200;

/// SendGrid settings.
#[derive(Debug, Clone)]
pub struct SendGridConfig {
    pub api_key: SecretString,
    pub api_url: String,
    pub timeout: Duration,
}

impl SendGridConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_url: SENDGRID_API_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Requires `SENDGRID_API_KEY`; `SENDGRID_API_URL` overrides the endpoint.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env_string("SENDGRID_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("SENDGRID_API_KEY".to_string()))?;
        let mut config = Self::new(SecretString::from(api_key));
        if let Some(url) = env_string("SENDGRID_API_URL") {
            config.api_url = url;
        }
        Ok(config)
    }
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MailSendRequest<'a> {
    personalizations: [Personalization<'a>; 1],
    from: EmailAddress<'a>,
    subject: &'a str,
    content: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    tracking_settings: Option<TrackingSettings>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: [EmailAddress<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmailAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

impl<'a> EmailAddress<'a> {
    fn new(email: &'a str, name: &'a str) -> Self {
        let name = Some(name.trim()).filter(|n| !n.is_empty());
        Self { email, name }
    }
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct TrackingSettings {
    click_tracking: ClickTracking,
}

#[derive(Debug, Serialize)]
struct ClickTracking {
    enable: bool,
    enable_text: bool,
}

fn build_request(email: &OutgoingEmail) -> MailSendRequest<'_> {
    MailSendRequest {
        personalizations: [Personalization {
            to: [EmailAddress::new(&email.to_email, &email.to_name)],
        }],
        from: EmailAddress::new(&email.from.address, &email.from.name),
        subject: &email.subject,
        content: [Content {
            content_type: "text/html",
            value: &email.html_body,
        }],
        tracking_settings: email.tracking_disabled.then_some(TrackingSettings {
            click_tracking: ClickTracking {
                enable: false,
                enable_text: false,
            },
        }),
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Sends through the SendGrid HTTP API.
pub struct SendGridMailer {
    config: SendGridConfig,
    client: reqwest::Client,
}

impl SendGridMailer {
    pub fn new(config: SendGridConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Request {
                provider: "sendgrid".into(),
                reason: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    fn name(&self) -> &str {
        "sendgrid"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<ProviderResponse, ProviderError> {
        let body = build_request(email);

        let resp = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                provider: "sendgrid".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let response = ProviderResponse::new(status.as_u16());
        if status.is_success() {
            return Ok(response);
        }

        let text = resp.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), to = %email.to_email, "SendGrid rejected message");
        Ok(response.with_detail(text.chars().take(MAX_DETAIL_CHARS).collect::<String>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::Sender;

    fn email(to_name: &str, tracking_disabled: bool) -> OutgoingEmail {
        OutgoingEmail {
            from: Sender {
                address: "sales@example.com".into(),
                name: "Example Store".into(),
            },
            to_email: "ana@example.com".into(),
            to_name: to_name.into(),
            subject: "Hola".into(),
            html_body: "<p>Hola Ana</p>".into(),
            tracking_disabled,
        }
    }

    #[test]
    fn request_shape_matches_mail_send_api() {
        let email = email("Ana María López", true);
        let json = serde_json::to_value(build_request(&email)).unwrap();

        assert_eq!(json["personalizations"][0]["to"][0]["email"], "ana@example.com");
        assert_eq!(json["personalizations"][0]["to"][0]["name"], "Ana María López");
        assert_eq!(json["from"]["email"], "sales@example.com");
        assert_eq!(json["from"]["name"], "Example Store");
        assert_eq!(json["subject"], "Hola");
        assert_eq!(json["content"][0]["type"], "text/html");
        assert_eq!(json["content"][0]["value"], "<p>Hola Ana</p>");
        assert_eq!(json["tracking_settings"]["click_tracking"]["enable"], false);
        assert_eq!(json["tracking_settings"]["click_tracking"]["enable_text"], false);
    }

    #[test]
    fn empty_recipient_name_is_omitted() {
        let email = email("", false);
        let json = serde_json::to_value(build_request(&email)).unwrap();
        assert!(json["personalizations"][0]["to"][0].get("name").is_none());
        assert!(json.get("tracking_settings").is_none());
    }

    #[test]
    fn config_defaults_to_production_endpoint() {
        let config = SendGridConfig::new(SecretString::from("SG.key"));
        assert_eq!(config.api_url, SENDGRID_API_URL);
    }
}
