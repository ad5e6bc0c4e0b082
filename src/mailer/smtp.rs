//! SMTP delivery via lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};

use super::{Mailer, OutgoingEmail, ProviderResponse};
use crate::config::{env_parse, env_string};
use crate::error::{ConfigError, ProviderError};

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl SmtpConfig {
    /// Requires `SMTP_HOST`; port defaults to 587.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host =
            env_string("SMTP_HOST").ok_or_else(|| ConfigError::MissingEnvVar("SMTP_HOST".into()))?;
        Ok(Self {
            host,
            port: env_parse("SMTP_PORT")?.unwrap_or(587),
            username: env_string("SMTP_USERNAME").unwrap_or_default(),
            password: env_string("SMTP_PASSWORD").unwrap_or_default(),
        })
    }
}

/// Sends through an authenticated SMTP relay. Click tracking is a provider
/// feature SMTP does not have, so `tracking_disabled` is a no-op here.
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self, ProviderError> {
        let creds = Credentials::new(config.username, config.password);
        let transport = SmtpTransport::relay(&config.host)
            .map_err(|e| ProviderError::Request {
                provider: "smtp".into(),
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(config.port)
            .credentials(creds)
            .build();
        Ok(Self { transport })
    }
}

fn parse_address(raw: &str) -> Result<Address, ProviderError> {
    raw.trim()
        .parse()
        .map_err(|e| ProviderError::InvalidAddress {
            address: raw.to_string(),
            reason: format!("{e}"),
        })
}

fn mailbox(address: &str, name: &str) -> Result<Mailbox, ProviderError> {
    let name = Some(name.trim().to_string()).filter(|n| !n.is_empty());
    Ok(Mailbox::new(name, parse_address(address)?))
}

/// Build the MIME message for one outgoing email.
pub fn build_message(email: &OutgoingEmail) -> Result<Message, ProviderError> {
    Message::builder()
        .from(mailbox(&email.from.address, &email.from.name)?)
        .to(mailbox(&email.to_email, &email.to_name)?)
        .subject(email.subject.clone())
        .header(ContentType::TEXT_HTML)
        .body(email.html_body.clone())
        .map_err(|e| ProviderError::Build(e.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<ProviderResponse, ProviderError> {
        let message = build_message(email)?;
        let transport = self.transport.clone();

        let result = tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| ProviderError::Transport(format!("SMTP send task panicked: {e}")))?;

        match result {
            Ok(response) => Ok(reply_to_response(
                &response.code().to_string(),
                response
                    .message()
                    .map(|line| line.to_string())
                    .collect::<Vec<_>>()
                    .join(" "),
            )),
            // A negative SMTP reply is a rejection with a code, not a
            // transport failure.
            Err(e) => match e.status() {
                Some(code) => Ok(reply_to_response(&code.to_string(), e.to_string())),
                None => Err(ProviderError::Transport(format!("SMTP send failed: {e}"))),
            },
        }
    }
}

fn reply_to_response(code: &str, detail: String) -> ProviderResponse {
    let status_code = code.parse().unwrap_or(0);
    let response = ProviderResponse::new(status_code);
    if response.is_accepted() {
        response
    } else {
        response.with_detail(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::Sender;

    fn email(to: &str, to_name: &str) -> OutgoingEmail {
        OutgoingEmail {
            from: Sender {
                address: "sales@example.com".into(),
                name: "Example Store".into(),
            },
            to_email: to.into(),
            to_name: to_name.into(),
            subject: "PROMOCIÓN ESPECIAL".into(),
            html_body: "<p>Hola Ana</p>".into(),
            tracking_disabled: true,
        }
    }

    #[test]
    fn builds_html_message_with_display_names() {
        let message = build_message(&email("ana@example.com", "Ana López")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains("ana@example.com"));
        assert!(raw.contains("sales@example.com"));
    }

    #[test]
    fn invalid_recipient_address_is_rejected() {
        let err = build_message(&email("not an address", "X")).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidAddress { .. }));
    }

    #[test]
    fn reply_codes_map_to_responses() {
        assert!(reply_to_response("250", "OK".into()).is_accepted());
        let rejected = reply_to_response("550", "mailbox unavailable".into());
        assert_eq!(rejected.status_code, 550);
        assert_eq!(rejected.detail.as_deref(), Some("mailbox unavailable"));
    }
}
