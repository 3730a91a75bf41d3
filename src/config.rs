//! Configuration for the mailbox watch and the replies.
//!
//! Use [`WatchConfigBuilder`] to create a configuration with sensible defaults:
//!
//! ```
//! use idle_reply::WatchConfig;
//!
//! let config = WatchConfig::builder()
//!     .email("jsmith@example.com")
//!     .password("app-password")
//!     .watch_for("sender@example.com")
//!     .reply_body("Name: John Smith")
//!     .sms_gateway("4085551234@txt.att.net")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.imap_host(), "imap.example.com");
//! assert_eq!(config.mailbox, "INBOX");
//! ```

use crate::error::{Error, Result};
use crate::known_servers::{MailServers, ServerRegistry};
use email_address::EmailAddress;
use lettre::message::Mailbox;
use secrecy::SecretString;
use std::time::Duration;

/// Everything the watcher needs: account, mailbox, match rule and replies.
///
/// Passwords are stored as [`SecretString`] and redacted in `Debug`.
#[derive(Clone)]
pub struct WatchConfig {
    email: EmailAddress,
    password: SecretString,
    servers: MailServers,
    /// IMAP port (default: 993).
    pub imap_port: u16,
    /// Mailbox to watch (default: `INBOX`).
    pub mailbox: String,
    /// Sender address that triggers the replies, compared exactly.
    pub watch_for: String,
    /// Reply composition and delivery.
    pub reply: ReplyConfig,
    /// Timeouts for setup and shutdown.
    pub timeouts: TimeoutConfig,
}

impl std::fmt::Debug for WatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchConfig")
            .field("email", &self.email.as_str())
            .field("password", &"[REDACTED]")
            .field("servers", &self.servers)
            .field("imap_port", &self.imap_port)
            .field("mailbox", &self.mailbox)
            .field("watch_for", &self.watch_for)
            .field("reply", &self.reply)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl WatchConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> WatchConfigBuilder {
        WatchConfigBuilder::default()
    }

    /// Account address, used as the IMAP login.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Account password.
    #[must_use]
    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// IMAP host, explicit or discovered from the account domain.
    #[must_use]
    pub fn imap_host(&self) -> &str {
        &self.servers.imap
    }

    /// SMTP submission host, explicit or discovered from the account domain.
    #[must_use]
    pub fn smtp_host(&self) -> &str {
        &self.servers.smtp
    }

    /// SMTP login, defaulting to the account address.
    #[must_use]
    pub fn smtp_username(&self) -> &str {
        self.reply.smtp_username.as_deref().unwrap_or(self.email.as_str())
    }

    /// SMTP password, defaulting to the account password.
    #[must_use]
    pub fn smtp_password(&self) -> &SecretString {
        self.reply.smtp_password.as_ref().unwrap_or(&self.password)
    }
}

/// How replies are composed and delivered.
#[derive(Clone)]
pub struct ReplyConfig {
    /// `From` mailbox of the replies, e.g. `John Smith <jsmith@example.com>`.
    pub from: Mailbox,
    /// Body of the reply to the matched sender.
    pub body: String,
    /// Address of the SMS-via-email gateway that gets the acknowledgement.
    pub sms_gateway: String,
    /// Body of the acknowledgement (default: `done`).
    pub sms_body: String,
    /// SMTP submission port, STARTTLS (default: 587).
    pub smtp_port: u16,
    smtp_username: Option<String>,
    smtp_password: Option<SecretString>,
}

impl std::fmt::Debug for ReplyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyConfig")
            .field("from", &self.from.to_string())
            .field("body_len", &self.body.len())
            .field("sms_gateway", &self.sms_gateway)
            .field("sms_body", &self.sms_body)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field(
                "smtp_password",
                &self.smtp_password.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Timeouts for the parts of the run that are allowed to give up.
///
/// The IDLE wait itself is never bounded.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Bound on TCP connect plus TLS handshake (default: none).
    pub connect: Option<Duration>,
    /// Bound on LOGOUT after a match (default: 5 s).
    pub logout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: None,
            logout: Duration::from_secs(5),
        }
    }
}

/// Prefix of the environment variables read by [`WatchConfig::from_env`].
pub const ENV_PREFIX: &str = "IDLE_REPLY_";

impl WatchConfig {
    /// Reads the configuration from `IDLE_REPLY_*` environment variables.
    ///
    /// Required: `EMAIL`, `PASSWORD`, `WATCH_FOR`, `REPLY_BODY`, `SMS_GATEWAY`.
    /// Optional: `REPLY_FROM`, `SMS_BODY`, `MAILBOX`, `IMAP_HOST`, `IMAP_PORT`,
    /// `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME` with `SMTP_PASSWORD`,
    /// `CONNECT_TIMEOUT_SECS`, `LOGOUT_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for unparsable numbers, plus every
    /// error of [`WatchConfigBuilder::build`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`WatchConfig::from_env`] with a custom variable source.
    ///
    /// `lookup` receives the full variable name, prefix included.
    ///
    /// # Errors
    ///
    /// See [`WatchConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty())
        };
        let number = |name: &str| -> Result<Option<u64>> {
            var(name)
                .map(|value| {
                    value.trim().parse::<u64>().map_err(|_| Error::InvalidConfig {
                        message: format!("{ENV_PREFIX}{name} must be a number, got '{value}'"),
                    })
                })
                .transpose()
        };
        let port = |name: &str| -> Result<Option<u16>> {
            number(name)?
                .map(|value| {
                    u16::try_from(value).map_err(|_| Error::InvalidConfig {
                        message: format!("{ENV_PREFIX}{name} is not a valid port: {value}"),
                    })
                })
                .transpose()
        };

        let mut builder = WatchConfig::builder();
        builder.email = var("EMAIL");
        builder.password = var("PASSWORD");
        builder.watch_for = var("WATCH_FOR");
        builder.reply_body = var("REPLY_BODY");
        builder.sms_gateway = var("SMS_GATEWAY");
        builder.reply_from = var("REPLY_FROM");
        builder.sms_body = var("SMS_BODY");
        builder.mailbox = var("MAILBOX");
        builder.imap_host = var("IMAP_HOST");
        builder.imap_port = port("IMAP_PORT")?;
        builder.smtp_host = var("SMTP_HOST");
        builder.smtp_port = port("SMTP_PORT")?;

        if let (Some(username), Some(password)) = (var("SMTP_USERNAME"), var("SMTP_PASSWORD")) {
            builder = builder.smtp_credentials(username, password);
        }
        if let Some(secs) = number("CONNECT_TIMEOUT_SECS")? {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = number("LOGOUT_TIMEOUT_SECS")? {
            builder = builder.logout_timeout(Duration::from_secs(secs));
        }

        builder.build()
    }
}

fn validate_email(email: &str) -> Result<EmailAddress> {
    EmailAddress::parse_with_options(email, email_address::Options::default()).map_err(|_| {
        Error::InvalidEmailFormat {
            email: email.to_string(),
        }
    })
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    value.ok_or_else(|| Error::InvalidConfig {
        message: format!("{name} is required"),
    })
}

/// Builder for [`WatchConfig`].
#[derive(Debug, Default)]
pub struct WatchConfigBuilder {
    email: Option<String>,
    password: Option<String>,
    imap_host: Option<String>,
    imap_port: Option<u16>,
    mailbox: Option<String>,
    watch_for: Option<String>,
    reply_from: Option<String>,
    reply_body: Option<String>,
    sms_gateway: Option<String>,
    sms_body: Option<String>,
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    smtp_username: Option<String>,
    smtp_password: Option<String>,
    timeouts: Option<TimeoutConfig>,
    server_registry: Option<ServerRegistry>,
}

impl WatchConfigBuilder {
    /// Sets the account address (required).
    ///
    /// Its domain is used to discover the IMAP and SMTP hosts if they are not
    /// set explicitly.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the account password (required).
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the IMAP host explicitly.
    #[must_use]
    pub fn imap_host(mut self, host: impl Into<String>) -> Self {
        self.imap_host = Some(host.into());
        self
    }

    /// Sets the IMAP port.
    #[must_use]
    pub fn imap_port(mut self, port: u16) -> Self {
        self.imap_port = Some(port);
        self
    }

    /// Sets the mailbox to watch.
    #[must_use]
    pub fn mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = Some(mailbox.into());
        self
    }

    /// Sets the sender address that triggers the replies (required).
    #[must_use]
    pub fn watch_for(mut self, address: impl Into<String>) -> Self {
        self.watch_for = Some(address.into());
        self
    }

    /// Sets the `From` of the replies; defaults to the account address.
    #[must_use]
    pub fn reply_from(mut self, from: impl Into<String>) -> Self {
        self.reply_from = Some(from.into());
        self
    }

    /// Sets the body of the reply to the matched sender (required).
    #[must_use]
    pub fn reply_body(mut self, body: impl Into<String>) -> Self {
        self.reply_body = Some(body.into());
        self
    }

    /// Sets the SMS gateway address for the acknowledgement (required).
    #[must_use]
    pub fn sms_gateway(mut self, address: impl Into<String>) -> Self {
        self.sms_gateway = Some(address.into());
        self
    }

    /// Sets the acknowledgement body.
    #[must_use]
    pub fn sms_body(mut self, body: impl Into<String>) -> Self {
        self.sms_body = Some(body.into());
        self
    }

    /// Sets the SMTP host explicitly.
    #[must_use]
    pub fn smtp_host(mut self, host: impl Into<String>) -> Self {
        self.smtp_host = Some(host.into());
        self
    }

    /// Sets the SMTP submission port.
    #[must_use]
    pub fn smtp_port(mut self, port: u16) -> Self {
        self.smtp_port = Some(port);
        self
    }

    /// Sets SMTP credentials that differ from the IMAP account.
    #[must_use]
    pub fn smtp_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.smtp_username = Some(username.into());
        self.smtp_password = Some(password.into());
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = Some(timeout);
        self
    }

    /// Sets the logout timeout.
    #[must_use]
    pub fn logout_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .logout = timeout;
        self
    }

    /// Sets a custom registry for host discovery.
    #[must_use]
    pub fn server_registry(mut self, registry: ServerRegistry) -> Self {
        self.server_registry = Some(registry);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a missing required field,
    /// [`Error::InvalidEmailFormat`] for a malformed address, or
    /// [`Error::InvalidMailbox`] for an unusable `reply_from`.
    pub fn build(self) -> Result<WatchConfig> {
        let email = validate_email(&required(self.email, "email")?)?;
        let password = required(self.password, "password")?;

        let watch_for = required(self.watch_for, "watch_for")?;
        validate_email(&watch_for)?;
        let sms_gateway = required(self.sms_gateway, "sms_gateway")?;
        validate_email(&sms_gateway)?;
        let body = required(self.reply_body, "reply_body")?;

        let from_raw = self.reply_from.unwrap_or_else(|| email.to_string());
        let from = from_raw
            .parse::<Mailbox>()
            .map_err(|source| Error::InvalidMailbox {
                address: from_raw.clone(),
                source,
            })?;

        // Explicit host > registry > built-in table
        let discovered = self
            .server_registry
            .unwrap_or_else(ServerRegistry::with_defaults)
            .discover(email.as_str());
        let servers = MailServers {
            imap: self.imap_host.unwrap_or(discovered.imap),
            smtp: self.smtp_host.unwrap_or(discovered.smtp),
        };

        let mailbox = self.mailbox.unwrap_or_else(|| "INBOX".to_string());
        if mailbox.is_empty() {
            return Err(Error::InvalidConfig {
                message: "mailbox must not be empty".into(),
            });
        }

        Ok(WatchConfig {
            email,
            password: SecretString::from(password),
            servers,
            imap_port: self.imap_port.unwrap_or(993),
            mailbox,
            watch_for,
            reply: ReplyConfig {
                from,
                body,
                sms_gateway,
                sms_body: self.sms_body.unwrap_or_else(|| "done".to_string()),
                smtp_port: self.smtp_port.unwrap_or(587),
                smtp_username: self.smtp_username,
                smtp_password: self.smtp_password.map(SecretString::from),
            },
            timeouts: self.timeouts.unwrap_or_default(),
        })
    }
}
