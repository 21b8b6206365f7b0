//! SMTP mail delivery using lettre.

use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("{0}")]
    InvalidAddress(String),

    #[error("Address error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Message build error: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Email message to be sent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
}

/// Result of a delivery attempt, returned verbatim to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailReceipt {
    pub accepted: bool,
    pub code: String,
    pub message: String,
}

/// Async SMTP mailer configured once at startup.
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl Mailer {
    pub fn from_config(config: &SmtpConfig) -> Result<Self, MailError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from: Mailbox =
            format!("{} <{}>", config.from_name, config.from_address).parse()?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    pub async fn send(&self, message: &EmailMessage) -> Result<MailReceipt, MailError> {
        if !message.to.contains('@') {
            return Err(MailError::InvalidAddress(
                "Invalid recipient email address".to_string(),
            ));
        }

        debug!("Sending mail to {}", message.to);

        let builder = Message::builder()
            .from(self.from.clone())
            .to(message.to.parse()?)
            .subject(message.subject.clone());

        let email = match &message.html_body {
            Some(html) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(message.text_body.clone()))
                    .singlepart(SinglePart::html(html.clone())),
            )?,
            None => builder.singlepart(SinglePart::plain(message.text_body.clone()))?,
        };

        let response = self.transport.send(email).await?;

        Ok(MailReceipt {
            accepted: response.is_positive(),
            code: response.code().to_string(),
            message: response.message().collect::<Vec<_>>().join(" "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp_config() -> SmtpConfig {
        SmtpConfig {
            host: "localhost".to_string(),
            port: 1025,
            username: None,
            password: None,
            from_address: "no-reply@localhost".to_string(),
            from_name: "Forms API".to_string(),
        }
    }

    #[test]
    fn builds_mailer_from_config() {
        assert!(Mailer::from_config(&smtp_config()).is_ok());
    }

    #[tokio::test]
    async fn rejects_recipient_without_at_sign() {
        let mailer = Mailer::from_config(&smtp_config()).unwrap();
        let result = mailer
            .send(&EmailMessage {
                to: "not-an-address".to_string(),
                subject: "hi".to_string(),
                text_body: "hello".to_string(),
                html_body: None,
            })
            .await;

        assert!(matches!(result, Err(MailError::InvalidAddress(_))));
    }
}
