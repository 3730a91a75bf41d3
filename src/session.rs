//! IMAP session: state machine, command issue and response demultiplexing.
//!
//! The session owns the transport and the unsolicited-data queue. Commands are
//! owned by the caller and lent to [`Session::receive_next`], which routes each
//! response unit to either the command or the unsolicited queue.

use crate::command::{Command, TagGenerator, Verb};
use crate::error::{Error, Result};
use crate::framing::FramedStream;
use crate::response::{Correlation, Payload, ResponseUnit, Status};
use bytes::BytesMut;
use secrecy::SecretString;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, instrument, warn};

/// Connection state as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Greeted, no credentials exchanged yet.
    NotAuthenticated,
    /// Logged in, no mailbox selected.
    Authenticated,
    /// A mailbox is selected.
    Selected,
    /// The server said BYE or the connection failed; nothing can be issued.
    Logout,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::NotAuthenticated => write!(f, "not-authenticated"),
            SessionState::Authenticated => write!(f, "authenticated"),
            SessionState::Selected => write!(f, "selected"),
            SessionState::Logout => write!(f, "logout"),
        }
    }
}

/// Metadata of the selected mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Mailbox name.
    pub name: String,
    /// Number of messages (last EXISTS, adjusted by EXPUNGE).
    pub messages: u32,
    /// Number of messages with the `\Recent` flag.
    pub recent: u32,
    /// Whether the mailbox was opened with EXAMINE.
    pub read_only: bool,
}

impl Mailbox {
    fn opening(name: &str, read_only: bool) -> Self {
        Self {
            name: name.to_string(),
            messages: 0,
            recent: 0,
            read_only,
        }
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} messages, {} recent{})",
            self.name,
            self.messages,
            self.recent,
            if self.read_only { ", read-only" } else { "" }
        )
    }
}

/// Where one response unit goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// Tagged completion of the outstanding command.
    Complete(Status),
    /// Data of the outstanding command.
    Command,
    /// Connection-wide data.
    Unsolicited,
}

/// An IMAP connection after the greeting.
pub struct Session<S> {
    stream: FramedStream<S>,
    state: SessionState,
    tags: TagGenerator,
    unsolicited: Vec<ResponseUnit>,
    mailbox: Option<Mailbox>,
    selecting: Option<Mailbox>,
    in_flight: Option<String>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Reads the server greeting and creates the session.
    ///
    /// The greeting is queued as unsolicited data. A `PREAUTH` greeting starts
    /// the session authenticated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GreetingRejected`] for a `BYE` greeting, or a transport
    /// error if the greeting cannot be read.
    #[instrument(name = "session::start", skip_all)]
    pub async fn start(stream: S) -> Result<Self> {
        let mut stream = FramedStream::new(stream);
        let raw = stream.read_response().await?;
        let payload = Payload::parse(&raw)?;

        let state = match &payload {
            Payload::Status {
                tag: None,
                status: Status::Ok,
                ..
            } => SessionState::NotAuthenticated,
            Payload::Status {
                tag: None,
                status: Status::PreAuth,
                ..
            } => SessionState::Authenticated,
            Payload::Status {
                tag: None,
                status: Status::Bye,
                text,
                ..
            } => {
                return Err(Error::GreetingRejected { text: text.clone() });
            }
            _ => {
                return Err(Error::MalformedResponse {
                    line: String::from_utf8_lossy(&raw).trim_end().to_string(),
                });
            }
        };

        debug!(%state, "Greeting received");

        Ok(Self {
            stream,
            state,
            tags: TagGenerator::default(),
            unsolicited: vec![ResponseUnit {
                correlation: Correlation::Unsolicited,
                payload,
            }],
            mailbox: None,
            selecting: None,
            in_flight: None,
        })
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The selected mailbox, if any.
    #[must_use]
    pub fn mailbox(&self) -> Option<&Mailbox> {
        self.mailbox.as_ref()
    }

    /// Message count of the selected mailbox (0 when nothing is selected).
    #[must_use]
    pub fn message_count(&self) -> u32 {
        self.mailbox.as_ref().map_or(0, |mailbox| mailbox.messages)
    }

    /// Takes every unsolicited unit received so far.
    pub fn drain_unsolicited(&mut self) -> Vec<ResponseUnit> {
        std::mem::take(&mut self.unsolicited)
    }

    /// Writes a command and returns it in `Pending` status.
    ///
    /// Nothing is written if the verb is illegal in the current state or
    /// another command is still in flight.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] after BYE or a transport failure
    /// - [`Error::CommandInFlight`] while another command is outstanding
    /// - [`Error::ProtocolState`] if the verb is illegal in the current state
    /// - [`Error::UnquotableArgument`] if an argument cannot be sent
    /// - a transport error if the write fails
    pub async fn issue(&mut self, verb: Verb) -> Result<Command> {
        if self.state == SessionState::Logout {
            return Err(Error::ConnectionClosed);
        }
        if let Some(tag) = &self.in_flight {
            return Err(Error::CommandInFlight {
                verb: verb.name(),
                tag: tag.clone(),
            });
        }
        if !verb.permitted_in(self.state) {
            return Err(Error::ProtocolState {
                verb: verb.name(),
                state: self.state,
            });
        }

        let tag = self.tags.next();
        let mut line = BytesMut::new();
        verb.encode(&tag, &mut line)?;

        debug!(tag = %tag, verb = verb.name(), "Issuing command");

        if let Err(e) = self.stream.write_all(&line).await {
            self.state = SessionState::Logout;
            return Err(e);
        }

        match &verb {
            Verb::Select { mailbox } => self.selecting = Some(Mailbox::opening(mailbox, false)),
            Verb::Examine { mailbox } => self.selecting = Some(Mailbox::opening(mailbox, true)),
            _ => {}
        }
        self.in_flight = Some(tag.clone());

        Ok(Command::new(tag, verb))
    }

    /// Reads one response unit and routes it.
    ///
    /// The unit lands in `command`'s data if it is correlated with it, in the
    /// unsolicited queue otherwise, never in both. `timeout = None` waits
    /// indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReceiveTimeout`] if `timeout` elapses. Any transport
    /// failure aborts `command`, closes the session and is returned.
    pub async fn receive_next(
        &mut self,
        command: &mut Command,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let read = self.stream.read_response();
        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| Error::ReceiveTimeout { timeout: limit })?,
            None => read.await,
        };

        let payload = match received.and_then(|raw| Payload::parse(&raw)) {
            Ok(payload) => payload,
            Err(e) => {
                self.fail(command);
                return Err(e);
            }
        };

        self.observe(&payload);
        let bye = matches!(
            payload,
            Payload::Status {
                tag: None,
                status: Status::Bye,
                ..
            }
        );

        match Self::route(command, &payload) {
            Route::Complete(status) => {
                let unit = ResponseUnit {
                    correlation: Correlation::Command(command.tag().to_string()),
                    payload,
                };
                debug!(tag = command.tag(), %unit, "Command completed");
                command.complete(status, unit);
                self.in_flight = None;
                self.apply_completion(command, status);
            }
            Route::Command => {
                let unit = ResponseUnit {
                    correlation: Correlation::Command(command.tag().to_string()),
                    payload,
                };
                debug!(tag = command.tag(), %unit, "Command data");
                command.accept(unit);
            }
            Route::Unsolicited => {
                let unit = ResponseUnit {
                    correlation: Correlation::Unsolicited,
                    payload,
                };
                debug!(%unit, "Unsolicited data");
                self.unsolicited.push(unit);
            }
        }

        if bye {
            warn!("Server said BYE");
            self.state = SessionState::Logout;
            if command.is_in_progress() && !matches!(command.verb(), Verb::Logout) {
                command.abort();
                self.in_flight = None;
            }
        }

        Ok(())
    }

    /// Ends an IDLE by sending `DONE`.
    ///
    /// Only sends once, and only after the server has acknowledged the IDLE;
    /// the command completes when the server's tagged response arrives.
    /// Returns whether `DONE` was written.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the write fails.
    pub async fn terminate(&mut self, command: &mut Command) -> Result<bool> {
        if self.in_flight.as_deref() != Some(command.tag()) || !command.mark_done_sent() {
            return Ok(false);
        }

        debug!(tag = command.tag(), "Ending IDLE");

        if let Err(e) = self.stream.write_all(b"DONE\r\n").await {
            self.fail(command);
            return Err(e);
        }
        Ok(true)
    }

    /// Receives until `command` is terminal and returns all of its data.
    ///
    /// # Errors
    ///
    /// Returns any transport error from [`Session::receive_next`].
    pub async fn finish(&mut self, command: &mut Command) -> Result<Vec<ResponseUnit>> {
        let mut data = Vec::new();
        while command.is_in_progress() {
            self.receive_next(command, None).await?;
            data.extend(command.drain_data());
        }
        Ok(data)
    }

    /// Logs in with a username and password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] if the server rejects the credentials.
    #[instrument(name = "session::login", skip(self, password))]
    pub async fn login(&mut self, username: &str, password: SecretString) -> Result<()> {
        let mut command = self
            .issue(Verb::Login {
                username: username.to_string(),
                password,
            })
            .await?;
        self.finish(&mut command).await?;
        command.result(Status::Ok)?;

        debug!("Authenticated");
        Ok(())
    }

    /// Opens a mailbox read-only and returns its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] if the mailbox cannot be opened.
    #[instrument(name = "session::examine", skip(self))]
    pub async fn examine(&mut self, mailbox: &str) -> Result<&Mailbox> {
        let mut command = self
            .issue(Verb::Examine {
                mailbox: mailbox.to_string(),
            })
            .await?;
        self.finish(&mut command).await?;
        command.result(Status::Ok)?;

        self.mailbox.as_ref().ok_or(Error::ConnectionClosed)
    }

    /// Logs out and closes the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] if the server rejects the LOGOUT.
    #[instrument(name = "session::logout", skip(self))]
    pub async fn logout(&mut self) -> Result<()> {
        let mut command = self.issue(Verb::Logout).await?;
        self.finish(&mut command).await?;
        command.result(Status::Ok)?;

        debug!("Logged out");
        Ok(())
    }

    /// Decides which buffer a unit belongs to.
    fn route(command: &Command, payload: &Payload) -> Route {
        if !command.is_in_progress() {
            return Route::Unsolicited;
        }
        match payload {
            Payload::Status {
                tag: Some(tag),
                status,
                ..
            } if tag == command.tag() => Route::Complete(*status),
            Payload::Status { tag: Some(_), .. } => Route::Unsolicited,
            other if command.verb().claims(other) => Route::Command,
            _ => Route::Unsolicited,
        }
    }

    /// Keeps mailbox metadata current, whichever buffer the unit goes to.
    fn observe(&mut self, payload: &Payload) {
        let target = self.selecting.as_mut().or(self.mailbox.as_mut());
        let Some(mailbox) = target else {
            return;
        };

        match payload {
            Payload::Exists(n) => mailbox.messages = *n,
            Payload::Recent(n) => mailbox.recent = *n,
            Payload::Expunge(_) => mailbox.messages = mailbox.messages.saturating_sub(1),
            _ => {}
        }
    }

    /// State transitions driven by a command's tagged completion.
    fn apply_completion(&mut self, command: &Command, status: Status) {
        match (command.verb(), status) {
            (Verb::Login { .. }, Status::Ok) => self.state = SessionState::Authenticated,
            (Verb::Select { .. } | Verb::Examine { .. }, Status::Ok) => {
                self.mailbox = self.selecting.take();
                self.state = SessionState::Selected;
                if let Some(mailbox) = &self.mailbox {
                    info!(%mailbox, "Mailbox selected");
                }
            }
            (Verb::Select { .. } | Verb::Examine { .. }, _) => {
                self.selecting = None;
                self.mailbox = None;
                self.state = SessionState::Authenticated;
            }
            (Verb::Logout, _) => self.state = SessionState::Logout,
            _ => {}
        }
    }

    fn fail(&mut self, command: &mut Command) {
        command.abort();
        self.in_flight = None;
        self.state = SessionState::Logout;
    }
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("mailbox", &self.mailbox)
            .field("in_flight", &self.in_flight)
            .field("unsolicited", &self.unsolicited.len())
            .finish_non_exhaustive()
    }
}
