//! Delivery providers.
//!
//! Supports:
//! - **SendGrid**: v3 Mail Send API over HTTPS via reqwest
//! - **SMTP**: any relay via lettre
//!
//! Both sit behind the `Mailer` trait; the dispatcher never sees which one
//! it is talking to.

pub mod sendgrid;
pub mod smtp;

pub use sendgrid::{SendGridConfig, SendGridMailer};
pub use smtp::{SmtpConfig, SmtpMailer};

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::env_string;
use crate::error::{ConfigError, ProviderError};

/// Sender identity on outgoing messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub address: String,
    pub name: String,
}

/// One fully rendered message.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub from: Sender,
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub html_body: String,
    /// Ask the provider not to rewrite links for click tracking.
    pub tracking_disabled: bool,
}

/// What the provider said about a submitted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    /// HTTP status (SendGrid) or SMTP reply code.
    pub status_code: u16,
    /// Short provider-supplied explanation, when there is one.
    pub detail: Option<String>,
}

impl ProviderResponse {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if !detail.trim().is_empty() {
            self.detail = Some(detail);
        }
        self
    }

    /// 2xx: HTTP 200/201/202 from SendGrid, 250 from an SMTP relay.
    pub fn is_accepted(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// The "send one message" capability.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Submit one message. A returned response may still be a rejection;
    /// `Err` means no usable response was obtained.
    async fn send(&self, email: &OutgoingEmail) -> Result<ProviderResponse, ProviderError>;
}

/// Which provider to use, with its settings.
#[derive(Debug, Clone)]
pub enum MailerConfig {
    SendGrid(SendGridConfig),
    Smtp(SmtpConfig),
}

impl MailerConfig {
    /// Select the provider from `MAIL_PROVIDER` (`sendgrid` by default).
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = env_string("MAIL_PROVIDER").unwrap_or_else(|| "sendgrid".to_string());
        match provider.to_ascii_lowercase().as_str() {
            "sendgrid" => Ok(Self::SendGrid(SendGridConfig::from_env()?)),
            "smtp" => Ok(Self::Smtp(SmtpConfig::from_env()?)),
            other => Err(ConfigError::InvalidValue {
                key: "MAIL_PROVIDER".to_string(),
                message: format!("unknown provider '{other}' (expected sendgrid or smtp)"),
            }),
        }
    }
}

/// Create a mailer from configuration.
pub fn create_mailer(config: &MailerConfig) -> Result<Arc<dyn Mailer>, ProviderError> {
    match config {
        MailerConfig::SendGrid(cfg) => {
            tracing::info!("Using SendGrid ({})", cfg.api_url);
            Ok(Arc::new(SendGridMailer::new(cfg.clone())?))
        }
        MailerConfig::Smtp(cfg) => {
            tracing::info!("Using SMTP relay {}:{}", cfg.host, cfg.port);
            Ok(Arc::new(SmtpMailer::new(cfg.clone())?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_codes_are_2xx() {
        for code in [200, 201, 202, 250] {
            assert!(ProviderResponse::new(code).is_accepted(), "{code}");
        }
        for code in [199, 301, 400, 429, 500, 550] {
            assert!(!ProviderResponse::new(code).is_accepted(), "{code}");
        }
    }

    #[test]
    fn blank_detail_is_dropped() {
        assert_eq!(ProviderResponse::new(500).with_detail("  ").detail, None);
        assert_eq!(
            ProviderResponse::new(500).with_detail("oops").detail.as_deref(),
            Some("oops")
        );
    }

    #[test]
    fn create_sendgrid_mailer_constructs_without_network() {
        let config = MailerConfig::SendGrid(SendGridConfig::new(secrecy::SecretString::from(
            "SG.test",
        )));
        let mailer = create_mailer(&config).unwrap();
        assert_eq!(mailer.name(), "sendgrid");
    }
}
