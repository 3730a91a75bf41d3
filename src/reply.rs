//! Composing and sending the automated replies.
//!
//! A [`Reply`] is plain data; turning it into a MIME message and delivering it
//! is the job of a [`ReplyDispatcher`]. The production dispatcher is
//! [`SmtpDispatcher`], which submits over SMTP with STARTTLS.

use crate::config::WatchConfig;
use crate::error::{Error, Result};
use crate::message::CandidateMessage;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use secrecy::ExposeSecret;
use tracing::{info, instrument};

/// One outgoing reply, threaded on the message it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Recipient address.
    pub to: String,
    /// Subject of the message being answered; sent as `Re: <subject>`.
    pub subject: String,
    /// `Message-ID` of the answered message.
    pub in_reply_to: Option<String>,
    /// `References` value, normally the same Message-ID.
    pub references: Option<String>,
    /// Plain-text body.
    pub body: String,
}

impl Reply {
    /// Builds a reply to `message` addressed to `to`.
    #[must_use]
    pub fn answering(message: &CandidateMessage, to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: message.subject.clone(),
            in_reply_to: message.message_id.clone(),
            references: message.message_id.clone(),
            body: body.into(),
        }
    }

    /// The subject line actually sent.
    #[must_use]
    pub fn reply_subject(&self) -> String {
        format!("Re: {}", self.subject)
    }

    /// Renders the reply as a MIME message from `from`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMailbox`] if `to` is not a valid address, or
    /// [`Error::ComposeReply`] if the message cannot be built.
    pub fn to_message(&self, from: &Mailbox) -> Result<Message> {
        let to = self
            .to
            .parse::<Mailbox>()
            .map_err(|source| Error::InvalidMailbox {
                address: self.to.clone(),
                source,
            })?;

        let mut builder = Message::builder()
            .from(from.clone())
            .to(to)
            .subject(self.reply_subject());

        if let Some(id) = &self.in_reply_to {
            builder = builder.in_reply_to(id.clone());
        }
        if let Some(id) = &self.references {
            builder = builder.references(id.clone());
        }

        builder
            .header(ContentType::TEXT_PLAIN)
            .body(self.body.clone())
            .map_err(|source| Error::ComposeReply { source })
    }
}

/// Delivers replies.
///
/// The watcher is generic over this trait so the delivery channel can be
/// swapped, e.g. for a recorder in tests.
#[allow(async_fn_in_trait)]
pub trait ReplyDispatcher {
    /// Sends one reply.
    ///
    /// # Errors
    ///
    /// Returns a [`Send`](crate::ErrorCategory::Send) category error if the
    /// reply cannot be composed or delivered.
    async fn send(&self, reply: &Reply) -> Result<()>;
}

/// SMTP submission with STARTTLS and login credentials.
pub struct SmtpDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    host: String,
}

impl SmtpDispatcher {
    /// Prepares a transport for the configured SMTP host and credentials.
    ///
    /// No connection is opened until the first reply is sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SmtpTransport`] if the relay cannot be configured.
    pub fn new(config: &WatchConfig) -> Result<Self> {
        let host = config.smtp_host().to_string();
        let credentials = Credentials::new(
            config.smtp_username().to_string(),
            config.smtp_password().expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
            .map_err(|source| Error::SmtpTransport {
                host: host.clone(),
                source,
            })?
            .port(config.reply.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from: config.reply.from.clone(),
            host,
        })
    }
}

impl std::fmt::Debug for SmtpDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpDispatcher")
            .field("host", &self.host)
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

impl ReplyDispatcher for SmtpDispatcher {
    #[instrument(
        name = "reply::send",
        skip_all,
        fields(to = %reply.to, smtp_host = %self.host)
    )]
    async fn send(&self, reply: &Reply) -> Result<()> {
        let message = reply.to_message(&self.from)?;

        self.transport
            .send(message)
            .await
            .map_err(|source| Error::SmtpSend {
                to: reply.to.clone(),
                source,
            })?;

        info!(subject = %reply.reply_subject(), "Reply sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched() -> CandidateMessage {
        CandidateMessage {
            seq: 120,
            from: "sender@example.com".into(),
            subject: "Grove lot availability".into(),
            message_id: Some("<abc123@mail.example.com>".into()),
        }
    }

    fn from() -> Mailbox {
        "John Smith <jsmith@example.com>".parse().unwrap()
    }

    fn rendered(reply: &Reply) -> String {
        String::from_utf8(reply.to_message(&from()).unwrap().formatted()).unwrap()
    }

    #[test]
    fn test_answering_threads_on_message_id() {
        let reply = Reply::answering(&matched(), "sender@example.com", "Name: John Smith");
        assert_eq!(reply.to, "sender@example.com");
        assert_eq!(reply.in_reply_to.as_deref(), Some("<abc123@mail.example.com>"));
        assert_eq!(reply.references, reply.in_reply_to);
        assert_eq!(reply.reply_subject(), "Re: Grove lot availability");
    }

    #[test]
    fn test_message_headers() {
        let reply = Reply::answering(&matched(), "4085551234@txt.att.net", "done");
        let text = rendered(&reply);

        assert!(text.contains("<jsmith@example.com>"));
        assert!(text.contains("To: 4085551234@txt.att.net\r\n"));
        assert!(text.contains("Subject: Re: Grove lot availability\r\n"));
        assert!(text.contains("In-Reply-To: <abc123@mail.example.com>\r\n"));
        assert!(text.contains("References: <abc123@mail.example.com>\r\n"));
        assert!(text.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(text.contains("\r\n\r\ndone"));
    }

    #[test]
    fn test_missing_message_id_omits_threading() {
        let mut message = matched();
        message.message_id = None;
        let text = rendered(&Reply::answering(&message, "sender@example.com", "hi"));

        assert!(!text.contains("In-Reply-To:"));
        assert!(!text.contains("References:"));
    }

    #[test]
    fn test_invalid_recipient() {
        let reply = Reply::answering(&matched(), "not an address", "hi");
        assert!(matches!(
            reply.to_message(&from()),
            Err(Error::InvalidMailbox { .. })
        ));
    }
}
