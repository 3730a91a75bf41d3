//! Error types for the idle-reply crate.
//!
//! All errors implement [`std::error::Error`] and provide context about what went wrong.
//! Errors are classified by what the watch loop does with them - see [`Error::is_fatal`].

use crate::session::SessionState;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while watching a mailbox and replying.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration / validation errors (FATAL, reported at startup)
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid email address format.
    #[error("invalid email format: {email}")]
    InvalidEmailFormat {
        /// The invalid email address.
        email: String,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Transport errors (FATAL, no retry)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to establish TCP connection.
    #[error("failed to connect to {target}")]
    TcpConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection.
    #[error("failed to establish TLS connection to {target}")]
    TlsConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Connection timeout.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Reading from or writing to the established connection failed.
    #[error("connection I/O failed")]
    Io {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The server closed the connection or already said BYE.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// No response unit arrived within the requested receive timeout.
    #[error("no response from server after {timeout:?}")]
    ReceiveTimeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// The server sent something that is not a valid response.
    #[error("malformed server response: {line}")]
    MalformedResponse {
        /// The offending response, lossily decoded.
        line: String,
    },

    /// A response line exceeded the framing limit.
    #[error("response line longer than {limit} bytes")]
    LineTooLong {
        /// The configured line limit.
        limit: usize,
    },

    /// A response literal exceeded the framing limit.
    #[error("literal too large: {size} bytes (max {limit})")]
    LiteralTooLarge {
        /// Announced literal size.
        size: usize,
        /// The configured literal limit.
        limit: usize,
    },

    /// The server greeted with BYE.
    #[error("server refused the connection: {text}")]
    GreetingRejected {
        /// Text of the BYE greeting.
        text: String,
    },

    /// Logout timeout (not critical).
    #[error("logout timeout after {timeout:?}")]
    LogoutTimeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Protocol state errors (FATAL, contract violations)
    // ─────────────────────────────────────────────────────────────────────────
    /// A command was issued in a session state that does not permit it.
    #[error("{verb} is not permitted in state {state}")]
    ProtocolState {
        /// The rejected command verb.
        verb: &'static str,
        /// The state the session was in.
        state: SessionState,
    },

    /// A command was issued while another one was still outstanding.
    #[error("cannot issue {verb}: command {tag} is still in flight")]
    CommandInFlight {
        /// The rejected command verb.
        verb: &'static str,
        /// Tag of the outstanding command.
        tag: String,
    },

    /// A command argument contains bytes a quoted string cannot carry
    /// (NUL, CR, LF or 8-bit).
    #[error("{verb} argument cannot be sent as a quoted string")]
    UnquotableArgument {
        /// The rejected command verb.
        verb: &'static str,
    },

    /// The result of a command was requested before it completed.
    #[error("command {tag} has not completed yet")]
    CommandIncomplete {
        /// Tag of the command.
        tag: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Command outcome errors (RECOVERABLE inside the watch loop)
    // ─────────────────────────────────────────────────────────────────────────
    /// The server rejected a command with NO or BAD.
    #[error("{verb} failed: {text}")]
    CommandFailed {
        /// The command verb.
        verb: &'static str,
        /// The server's completion text.
        text: String,
    },

    /// The command was torn down before the server completed it.
    #[error("{verb} aborted before completion")]
    CommandAborted {
        /// The command verb.
        verb: &'static str,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Header parsing errors (RECOVERABLE - the message is skipped)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to parse a message header block.
    #[error("failed to parse message header")]
    ParseHeader {
        /// The underlying parse error.
        #[source]
        source: mailparse::MailParseError,
    },

    /// The From header could not be parsed into a single mailbox address.
    #[error("invalid From address: {value}")]
    ParseAddress {
        /// Raw From header value.
        value: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Reply dispatch errors (FATAL - the match is one-shot)
    // ─────────────────────────────────────────────────────────────────────────
    /// A reply address could not be turned into a mailbox.
    #[error("invalid reply mailbox '{address}'")]
    InvalidMailbox {
        /// The rejected address.
        address: String,
        /// The underlying address error.
        #[source]
        source: lettre::address::AddressError,
    },

    /// The reply message could not be built.
    #[error("failed to compose reply")]
    ComposeReply {
        /// The underlying builder error.
        #[source]
        source: lettre::error::Error,
    },

    /// The SMTP transport could not be set up.
    #[error("failed to prepare SMTP transport for {host}")]
    SmtpTransport {
        /// The SMTP relay host.
        host: String,
        /// The underlying SMTP error.
        #[source]
        source: lettre::transport::smtp::Error,
    },

    /// Handing a reply to the SMTP server failed.
    #[error("failed to send reply to {to}")]
    SmtpSend {
        /// The reply recipient.
        to: String,
        /// The underlying SMTP error.
        #[source]
        source: lettre::transport::smtp::Error,
    },
}

impl Error {
    /// Returns `true` if this error ends the watch.
    ///
    /// Command failures, aborted commands and unparsable headers are logged and the
    /// watch carries on with the next cycle. Everything else stops the process:
    ///
    /// ```
    /// use idle_reply::Error;
    ///
    /// let err = Error::CommandFailed { verb: "FETCH", text: "try later".into() };
    /// assert!(!err.is_fatal());
    /// assert!(Error::ConnectionClosed.is_fatal());
    /// ```
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.category(),
            ErrorCategory::CommandFailed | ErrorCategory::CommandAborted | ErrorCategory::Parse
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidDnsName { .. } => ErrorCategory::Configuration,

            Error::TcpConnect { .. }
            | Error::TlsConnect { .. }
            | Error::ConnectTimeout { .. }
            | Error::Io { .. }
            | Error::ConnectionClosed
            | Error::ReceiveTimeout { .. }
            | Error::MalformedResponse { .. }
            | Error::LineTooLong { .. }
            | Error::LiteralTooLarge { .. }
            | Error::GreetingRejected { .. }
            | Error::LogoutTimeout { .. } => ErrorCategory::Transport,

            Error::ProtocolState { .. }
            | Error::CommandInFlight { .. }
            | Error::UnquotableArgument { .. }
            | Error::CommandIncomplete { .. } => ErrorCategory::ProtocolState,

            Error::CommandFailed { .. } => ErrorCategory::CommandFailed,
            Error::CommandAborted { .. } => ErrorCategory::CommandAborted,

            Error::ParseHeader { .. } | Error::ParseAddress { .. } => ErrorCategory::Parse,

            Error::InvalidMailbox { .. }
            | Error::ComposeReply { .. }
            | Error::SmtpTransport { .. }
            | Error::SmtpSend { .. } => ErrorCategory::Send,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::ConnectionClosed
        } else {
            Error::Io { source }
        }
    }
}

/// Error categories for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or validation errors.
    Configuration,
    /// Connection establishment or connection I/O errors.
    Transport,
    /// Commands issued in the wrong session state.
    ProtocolState,
    /// The server rejected a command.
    CommandFailed,
    /// A command was torn down mid-flight.
    CommandAborted,
    /// Message header parsing errors.
    Parse,
    /// Reply submission errors.
    Send,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Transport => write!(f, "transport"),
            ErrorCategory::ProtocolState => write!(f, "protocol_state"),
            ErrorCategory::CommandFailed => write!(f, "command_failed"),
            ErrorCategory::CommandAborted => write!(f, "command_aborted"),
            ErrorCategory::Parse => write!(f, "parse"),
            ErrorCategory::Send => write!(f, "send"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        // Transport errors end the watch
        let err = Error::TcpConnect {
            target: "imap.example.com:993".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.is_fatal());

        // Contract violations end the watch
        let err = Error::ProtocolState {
            verb: "FETCH",
            state: SessionState::Authenticated,
        };
        assert!(err.is_fatal());

        // Server-side command outcomes are recoverable
        assert!(!Error::CommandAborted { verb: "FETCH" }.is_fatal());
        assert!(!Error::ParseAddress {
            value: "garbage".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_error_categories() {
        let err = Error::InvalidEmailFormat {
            email: "bad".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = Error::CommandFailed {
            verb: "FETCH",
            text: "no such message".into(),
        };
        assert_eq!(err.category(), ErrorCategory::CommandFailed);
        assert_eq!(err.category().to_string(), "command_failed");
    }

    #[test]
    fn test_eof_maps_to_connection_closed() {
        let err = Error::from(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "eof",
        ));
        assert!(matches!(err, Error::ConnectionClosed));

        let err = Error::from(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe"));
        assert!(matches!(err, Error::Io { .. }));
    }
}
