use std::{io, time::Duration};

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{UpdateError, UpdateHandler};
use crate::authorization::{AuthorizationHandler, TextFileAuthorization};

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SUBJECT: &str = "Job status update";

/// Mails the message through an authenticated relay.
///
/// The credential file's user name is the login and the sender address.
#[derive(Debug, Clone)]
pub struct EmailUpdateHandler {
    relay: String,
    port: u16,
    credentials: TextFileAuthorization,
    recipient: String,
    subject: String,
    timeout: Duration,
}

impl EmailUpdateHandler {
    pub fn new(
        relay: impl Into<String>,
        credentials: TextFileAuthorization,
        recipient: impl Into<String>,
    ) -> EmailUpdateHandler {
        EmailUpdateHandler {
            relay: relay.into(),
            port: DEFAULT_SMTP_PORT,
            credentials,
            recipient: recipient.into(),
            subject: DEFAULT_SUBJECT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) -> &mut Self {
        self.subject = subject.into();
        self
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    fn build_message(&self, body: &str) -> Result<Message, UpdateError> {
        let sender = self.credentials.username();
        if sender.is_empty() {
            return Err(UpdateError::Incomplete("sender"));
        }
        if self.recipient.is_empty() {
            return Err(UpdateError::Incomplete("recipient"));
        }

        let message = Message::builder()
            .from(parse_mailbox(sender)?)
            .to(parse_mailbox(&self.recipient)?)
            .subject(self.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;
        Ok(message)
    }

    async fn send(&self, body: &str) -> Result<(), UpdateError> {
        if self.relay.is_empty() {
            return Err(UpdateError::Incomplete("relay"));
        }
        let message = self.build_message(body)?;
        let password = self.credentials.password().unwrap_or_default();

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.relay)?
            .port(self.port)
            .credentials(Credentials::new(
                self.credentials.username().to_string(),
                password.to_string(),
            ))
            .timeout(Some(self.timeout))
            .build();
        transport.send(message).await?;
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, UpdateError> {
    address.parse().map_err(|source| UpdateError::Address {
        address: address.to_string(),
        source,
    })
}

#[async_trait]
impl UpdateHandler for EmailUpdateHandler {
    async fn post_update(&self, message: &str) -> io::Result<()> {
        tracing::debug!(relay = %self.relay, recipient = %self.recipient, "mailing update");
        self.send(message).await.map_err(io::Error::from)
    }
}
