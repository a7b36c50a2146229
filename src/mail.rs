use lettre::message::header::ContentType;
use lettre::message::{Mailbox, SinglePart};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::debug;

use crate::config::{AuthMethod, SmtpConfig};
use crate::invite;
use crate::types::CachedOutage;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("smtp transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("message build error: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("invalid content type: {0}")]
    ContentType(#[from] lettre::message::header::ContentTypeErr),
    #[error("auth method `{0}` is not supported by the smtp transport")]
    UnsupportedAuth(&'static str),
}

/// Delivers one outage notification. The calendar body must carry the
/// entry's sequence so clients treat re-sends as event updates.
pub trait MailSender {
    fn send_invite(&self, entry: &CachedOutage)
    -> impl Future<Output = Result<(), MailError>> + Send;
}

pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    sender_address: String,
}

impl Mailer {
    /// Builds the SMTP client once: STARTTLS against the configured host,
    /// credentials, and the single auth mechanism selected by the config.
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let mechanism = match config.auth_method {
            AuthMethod::Plain => Mechanism::Plain,
            AuthMethod::Custom => Mechanism::Login,
            // lettre has no CRAM-MD5 mechanism; surfacing this at startup
            // beats failing on the first delivery attempt.
            AuthMethod::Md5 => return Err(MailError::UnsupportedAuth("md5")),
        };

        let tls = TlsParameters::builder(config.host.clone())
            .dangerous_accept_invalid_certs(config.skip_tls)
            .build()?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.host.as_str())
            .port(config.port)
            .tls(Tls::Required(tls))
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .authentication(vec![mechanism])
            .build();

        let from: Mailbox = format!("{} <{}>", config.from, config.mail).parse()?;

        Ok(Self {
            transport,
            from,
            sender_address: config.mail.clone(),
        })
    }
}

impl MailSender for Mailer {
    async fn send_invite(&self, entry: &CachedOutage) -> Result<(), MailError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(entry.summary());
        for recipient in &entry.recipients {
            builder = builder.to(recipient.parse()?);
        }

        let body = invite::invite_body(entry, &self.sender_address);
        let message = builder.singlepart(
            SinglePart::builder()
                .header(ContentType::parse(
                    "text/calendar; method=REQUEST; charset=\"UTF-8\"",
                )?)
                .body(body),
        )?;

        debug!(uid = %entry.uid, sequence = entry.sequence, "sending invite");
        self.transport.send(message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp_config(auth_method: AuthMethod) -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            mail: "sender@example.com".to_string(),
            from: "Barghman".to_string(),
            username: "sender@example.com".to_string(),
            password: "secret".to_string(),
            auth_method,
            skip_tls: false,
        }
    }

    // The pooled transport needs a runtime to drop on, so these run under
    // tokio even though construction itself never awaits.
    #[tokio::test]
    async fn plain_and_custom_auth_construct_a_client() {
        assert!(Mailer::new(&smtp_config(AuthMethod::Plain)).is_ok());
        assert!(Mailer::new(&smtp_config(AuthMethod::Custom)).is_ok());
    }

    #[tokio::test]
    async fn md5_auth_is_rejected_at_construction() {
        assert!(matches!(
            Mailer::new(&smtp_config(AuthMethod::Md5)),
            Err(MailError::UnsupportedAuth("md5"))
        ));
    }

    #[tokio::test]
    async fn bad_sender_address_is_rejected() {
        let mut config = smtp_config(AuthMethod::Plain);
        config.mail = "not an address".to_string();
        assert!(matches!(
            Mailer::new(&config),
            Err(MailError::Address(_))
        ));
    }
}
