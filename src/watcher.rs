//! The watch loop: IDLE until the mailbox changes, fetch the newest headers,
//! answer the first message from the watched sender.
//!
//! # Example
//!
//! ```no_run
//! use idle_reply::{WatchConfig, Watcher};
//!
//! # async fn example() -> idle_reply::Result<()> {
//! let config = WatchConfig::builder()
//!     .email("jsmith@gmail.com")
//!     .password("app-password")
//!     .watch_for("sender@example.com")
//!     .reply_body("Name: John Smith")
//!     .sms_gateway("4085551234@txt.att.net")
//!     .build()?;
//!
//! let mut watcher = Watcher::connect(&config).await?;
//! let matched = watcher.run().await?;
//! println!("answered {}", matched.message.subject);
//! # Ok(())
//! # }
//! ```

use crate::command::{Command, CommandStatus, Verb};
use crate::config::{ReplyConfig, WatchConfig};
use crate::connection::{self, TlsStream};
use crate::error::{Error, Result};
use crate::matcher::{ExactSender, MatchPolicy};
use crate::message::CandidateMessage;
use crate::reply::{Reply, ReplyDispatcher, SmtpDispatcher};
use crate::response::{Payload, Status, RFC822_HEADER};
use crate::sequence::SequenceSet;
use crate::session::{Session, SessionState};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, instrument, warn};

// ─────────────────────────────────────────────────────────────────────────────
// IDLE cycle
// ─────────────────────────────────────────────────────────────────────────────

/// Progress of one IDLE wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePhase {
    /// Server acknowledged the IDLE; waiting for any mailbox activity.
    Waiting,
    /// `DONE` sent; draining until the tagged completion.
    Terminating,
    /// IDLE completed.
    Done,
}

/// One IDLE long poll: enter, wait for a change signal, terminate.
#[derive(Debug)]
pub struct IdleCycle {
    command: Command,
    phase: IdlePhase,
}

impl IdleCycle {
    /// Issues IDLE and waits for the server's continuation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] if the server refuses the IDLE, or any
    /// session error.
    #[instrument(name = "idle::enter", skip_all)]
    pub async fn enter<S>(session: &mut Session<S>) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut command = session.issue(Verb::Idle).await?;

        while command.status() == CommandStatus::Pending {
            session.receive_next(&mut command, None).await?;
            log_unsolicited(session);
        }
        for unit in command.drain_data() {
            debug!(tag = command.tag(), %unit, "IDLE accepted");
        }

        let phase = if command.is_in_progress() {
            IdlePhase::Waiting
        } else {
            command.result(Status::Ok)?;
            IdlePhase::Done
        };

        Ok(Self { command, phase })
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> IdlePhase {
        self.phase
    }

    /// Blocks until the mailbox changes, then ends the IDLE.
    ///
    /// Any unit received while waiting is the change signal. Never times out.
    ///
    /// # Errors
    ///
    /// Returns a transport error, [`Error::CommandAborted`] after a server
    /// BYE, or [`Error::CommandFailed`] if the IDLE completes with NO/BAD.
    #[instrument(name = "idle::wait", skip_all, fields(tag = self.command.tag()))]
    pub async fn wait<S>(&mut self, session: &mut Session<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while self.command.is_in_progress() {
            session.receive_next(&mut self.command, None).await?;

            for unit in self.command.drain_data() {
                info!(%unit, "Idle response");
            }
            log_unsolicited(session);

            if self.phase == IdlePhase::Waiting && session.terminate(&mut self.command).await? {
                self.phase = IdlePhase::Terminating;
            }
        }

        self.phase = IdlePhase::Done;
        self.command.result(Status::Ok)?;
        Ok(())
    }
}

fn log_unsolicited<S>(session: &mut Session<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    for unit in session.drain_unsolicited() {
        info!(%unit, "Server data");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Watcher
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a successful watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matched {
    /// The message that triggered the replies.
    pub message: CandidateMessage,
}

/// Drives a selected session through the wait → fetch → evaluate loop.
pub struct Watcher<S, D> {
    session: Session<S>,
    dispatcher: D,
    policy: Box<dyn MatchPolicy>,
    reply: ReplyConfig,
    logout_timeout: Duration,
}

impl Watcher<TlsStream, SmtpDispatcher> {
    /// Connects over TLS, logs in and opens the configured mailbox.
    ///
    /// # Errors
    ///
    /// Returns any connection, authentication or selection error, or
    /// [`Error::SmtpTransport`] if the SMTP relay cannot be configured.
    #[instrument(
        name = "Watcher::connect",
        skip_all,
        fields(
            email = %config.email(),
            imap_host = %config.imap_host(),
            mailbox = %config.mailbox
        )
    )]
    pub async fn connect(config: &WatchConfig) -> Result<Self> {
        let dispatcher = SmtpDispatcher::new(config)?;
        let stream =
            connection::connect(config.imap_host(), config.imap_port, config.timeouts.connect)
                .await?;

        debug!("TLS connection established");

        Self::setup(stream, dispatcher, config).await
    }
}

impl<S, D> Watcher<S, D>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: ReplyDispatcher,
{
    /// Reads the greeting, logs in unless pre-authenticated and opens the
    /// configured mailbox read-only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GreetingRejected`], a login or EXAMINE
    /// [`Error::CommandFailed`], or a transport error.
    pub async fn setup(stream: S, dispatcher: D, config: &WatchConfig) -> Result<Self> {
        let mut session = Session::start(stream).await?;
        for unit in session.drain_unsolicited() {
            info!(greeting = %unit, "Server says hello");
        }

        if session.state() == SessionState::NotAuthenticated {
            session
                .login(config.email(), config.password().clone())
                .await?;
        }
        log_unsolicited(&mut session);

        let mailbox = session.examine(&config.mailbox).await?;
        info!(%mailbox, "Mailbox status");
        log_unsolicited(&mut session);

        Ok(Self {
            session,
            dispatcher,
            policy: Box::new(ExactSender::new(config.watch_for.clone())),
            reply: config.reply.clone(),
            logout_timeout: config.timeouts.logout,
        })
    }

    /// Replaces the match policy.
    #[must_use]
    pub fn with_policy(mut self, policy: impl MatchPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// The underlying session.
    #[must_use]
    pub fn session(&self) -> &Session<S> {
        &self.session
    }

    /// The reply dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Watches until a message matches, then logs out.
    ///
    /// Failed or aborted fetches are logged and the loop carries on. A
    /// failed LOGOUT after the match is only logged.
    ///
    /// # Errors
    ///
    /// Returns the first error that is not a fetch outcome: transport
    /// failures, IDLE failures, protocol-state errors and reply delivery
    /// errors all end the watch.
    #[instrument(
        name = "Watcher::run",
        skip_all,
        fields(watch_for = %self.policy.description())
    )]
    pub async fn run(&mut self) -> Result<Matched> {
        let matched = loop {
            if let Some(matched) = self.cycle().await? {
                break matched;
            }
        };

        if let Err(e) = self.logout().await {
            warn!(error = %e, "Logout after match failed");
        }

        Ok(matched)
    }

    /// Runs one IDLE wait followed by one fetch of the newest headers.
    ///
    /// Returns the matched message once the replies have been sent.
    ///
    /// # Errors
    ///
    /// Same as [`Watcher::run`].
    pub async fn cycle(&mut self) -> Result<Option<Matched>> {
        let mut idle = IdleCycle::enter(&mut self.session).await?;
        idle.wait(&mut self.session).await?;

        self.fetch_recent().await
    }

    /// Logs out, bounded by the configured logout timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LogoutTimeout`] if the server does not complete the
    /// LOGOUT in time.
    pub async fn logout(&mut self) -> Result<()> {
        let timeout = self.logout_timeout;
        tokio::time::timeout(timeout, self.session.logout())
            .await
            .map_err(|_| Error::LogoutTimeout { timeout })?
    }

    #[instrument(
        name = "Watcher::fetch_recent",
        skip_all,
        fields(messages = self.session.message_count())
    )]
    async fn fetch_recent(&mut self) -> Result<Option<Matched>> {
        let set = SequenceSet::recent(self.session.message_count());
        let mut fetch = self
            .session
            .issue(Verb::Fetch {
                set,
                items: RFC822_HEADER.to_string(),
            })
            .await?;

        info!(
            tag = fetch.tag(),
            "Messages from {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S %z")
        );

        let mut matched: Option<CandidateMessage> = None;

        while fetch.is_in_progress() {
            if let Err(e) = self.session.receive_next(&mut fetch, None).await {
                // Replies are already out; the match stands
                if matched.is_some() {
                    warn!(error = %e, "Connection lost while draining fetch");
                    break;
                }
                return Err(e);
            }

            for unit in fetch.drain_data() {
                if matched.is_some() {
                    continue;
                }
                let Payload::Fetch { seq, .. } = &unit.payload else {
                    continue;
                };
                let seq = *seq;
                let Some(header) = unit.payload.attribute(RFC822_HEADER) else {
                    debug!(seq, "FETCH without header");
                    continue;
                };

                let message = match CandidateMessage::parse(seq, header) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(seq, error = %e, "Skipping unparsable header");
                        continue;
                    }
                };

                info!("|-- {}   {}", message.from, message.subject);

                if self.policy.matches(&message) {
                    self.dispatch(&message).await?;
                    matched = Some(message);
                }
            }

            log_unsolicited(&mut self.session);
        }

        if let Some(message) = matched {
            return Ok(Some(Matched { message }));
        }

        match fetch.result(Status::Ok) {
            Ok(_) => {}
            Err(Error::CommandAborted { .. }) => warn!("Fetch command aborted"),
            Err(e @ Error::CommandFailed { .. }) => warn!(error = %e, "Fetch error"),
            Err(e) => return Err(e),
        }
        Ok(None)
    }

    /// Sends the reply to the sender, then the acknowledgement to the gateway.
    #[instrument(
        name = "Watcher::dispatch",
        skip_all,
        fields(seq = message.seq, to = %message.from)
    )]
    async fn dispatch(&self, message: &CandidateMessage) -> Result<()> {
        let primary = Reply::answering(message, message.from.clone(), self.reply.body.clone());
        self.dispatcher.send(&primary).await?;

        let acknowledgement = Reply::answering(
            message,
            self.reply.sms_gateway.clone(),
            self.reply.sms_body.clone(),
        );
        self.dispatcher.send(&acknowledgement).await?;

        info!(
            message_id = message.message_id.as_deref().unwrap_or_default(),
            subject = %message.subject,
            "Replied to watched sender"
        );
        Ok(())
    }
}

impl<S, D> std::fmt::Debug for Watcher<S, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("session", &self.session)
            .field("watch_for", &self.policy.description())
            .field("logout_timeout", &self.logout_timeout)
            .finish_non_exhaustive()
    }
}
