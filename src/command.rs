//! Command lifecycle: one outstanding request and the data it accumulates.
//!
//! A [`Command`] is created by [`Session::issue`](crate::Session::issue) in
//! [`CommandStatus::Pending`] and advanced by
//! [`Session::receive_next`](crate::Session::receive_next). Callers alternate
//! receiving with [`Command::drain_data`] and inspect the outcome with
//! [`Command::result`] once [`Command::is_in_progress`] turns false.

use crate::error::{Error, Result};
use crate::response::{Payload, ResponseUnit, Status};
use crate::sequence::SequenceSet;
use crate::session::SessionState;
use bytes::{BufMut, BytesMut};
use secrecy::{ExposeSecret, SecretString};

/// A protocol request and its arguments.
#[derive(Debug)]
pub enum Verb {
    /// `CAPABILITY`
    Capability,
    /// `NOOP`
    Noop,
    /// `LOGIN user password`
    Login {
        /// Account name.
        username: String,
        /// Account password, redacted in `Debug`.
        password: SecretString,
    },
    /// `SELECT mailbox`
    Select {
        /// Mailbox name.
        mailbox: String,
    },
    /// `EXAMINE mailbox` (read-only select)
    Examine {
        /// Mailbox name.
        mailbox: String,
    },
    /// `FETCH set items`
    Fetch {
        /// Messages to fetch.
        set: SequenceSet,
        /// Fetch attribute list, e.g. `RFC822.HEADER`.
        items: String,
    },
    /// `IDLE` (RFC 2177 long poll)
    Idle,
    /// `LOGOUT`
    Logout,
}

impl Verb {
    /// Protocol name of the verb.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Verb::Capability => "CAPABILITY",
            Verb::Noop => "NOOP",
            Verb::Login { .. } => "LOGIN",
            Verb::Select { .. } => "SELECT",
            Verb::Examine { .. } => "EXAMINE",
            Verb::Fetch { .. } => "FETCH",
            Verb::Idle => "IDLE",
            Verb::Logout => "LOGOUT",
        }
    }

    /// Returns `true` if the verb may be issued in `state`.
    #[must_use]
    pub fn permitted_in(&self, state: SessionState) -> bool {
        match self {
            Verb::Capability | Verb::Noop | Verb::Logout => state != SessionState::Logout,
            Verb::Login { .. } => state == SessionState::NotAuthenticated,
            Verb::Select { .. } | Verb::Examine { .. } => {
                matches!(state, SessionState::Authenticated | SessionState::Selected)
            }
            Verb::Fetch { .. } | Verb::Idle => state == SessionState::Selected,
        }
    }

    /// Returns `true` if untagged data of this kind belongs to this verb.
    ///
    /// Continuation requests always belong to the outstanding command; tagged
    /// completions are matched by tag before this is consulted.
    pub(crate) fn claims(&self, payload: &Payload) -> bool {
        match (self, payload) {
            (_, Payload::Continuation { .. }) => true,
            (
                Verb::Select { .. } | Verb::Examine { .. },
                Payload::Exists(_)
                | Payload::Recent(_)
                | Payload::Flags(_)
                | Payload::Status {
                    tag: None,
                    status: Status::Ok,
                    ..
                },
            ) => true,
            (Verb::Fetch { .. }, Payload::Fetch { .. }) => true,
            (Verb::Capability, Payload::Capabilities(_)) => true,
            (
                Verb::Logout,
                Payload::Status {
                    tag: None,
                    status: Status::Bye,
                    ..
                },
            ) => true,
            _ => false,
        }
    }

    /// Serializes `<tag> <verb> <args>\r\n`.
    ///
    /// Fails without touching `buf` if an argument cannot be quoted.
    pub(crate) fn encode(&self, tag: &str, buf: &mut BytesMut) -> Result<()> {
        let unquotable = match self {
            Verb::Login { username, password } => {
                !is_quotable(username) || !is_quotable(password.expose_secret())
            }
            Verb::Select { mailbox } | Verb::Examine { mailbox } => !is_quotable(mailbox),
            _ => false,
        };
        if unquotable {
            return Err(Error::UnquotableArgument { verb: self.name() });
        }

        buf.put_slice(tag.as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.name().as_bytes());

        match self {
            Verb::Login { username, password } => {
                buf.put_u8(b' ');
                write_astring(buf, username);
                buf.put_u8(b' ');
                write_astring(buf, password.expose_secret());
            }
            Verb::Select { mailbox } | Verb::Examine { mailbox } => {
                buf.put_u8(b' ');
                write_astring(buf, mailbox);
            }
            Verb::Fetch { set, items } => {
                buf.put_slice(format!(" {set} {items}").as_bytes());
            }
            Verb::Capability | Verb::Noop | Verb::Idle | Verb::Logout => {}
        }

        buf.put_slice(b"\r\n");
        Ok(())
    }
}

/// Quoted strings carry 7-bit text without NUL, CR or LF.
fn is_quotable(s: &str) -> bool {
    s.bytes().all(|b| b != 0 && b != b'\r' && b != b'\n' && b.is_ascii())
}

/// Writes an atom, or a quoted string when the atom rules don't allow it.
fn write_astring(buf: &mut BytesMut, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.put_u8(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.put_u8(b'\\');
            }
            buf.put_u8(b);
        }
        buf.put_u8(b'"');
    } else {
        buf.put_slice(s.as_bytes());
    }
}

const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']') || b < 0x20 || b == 0x7F
}

/// Lifecycle status of a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    /// Written to the server, nothing received for it yet.
    Pending,
    /// At least one unit has been routed to the command.
    InProgress,
    /// Tagged `OK` received.
    CompletedOk,
    /// Tagged `NO` or `BAD` received.
    CompletedError,
    /// Torn down before the server completed it.
    Aborted,
}

impl CommandStatus {
    /// Returns `true` for the three terminal statuses.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, CommandStatus::Pending | CommandStatus::InProgress)
    }
}

/// One outstanding protocol request.
#[derive(Debug)]
pub struct Command {
    tag: String,
    verb: Verb,
    status: CommandStatus,
    data: Vec<ResponseUnit>,
    completion: Option<ResponseUnit>,
    done_sent: bool,
}

impl Command {
    pub(crate) fn new(tag: String, verb: Verb) -> Self {
        Self {
            tag,
            verb,
            status: CommandStatus::Pending,
            data: Vec::new(),
            completion: None,
            done_sent: false,
        }
    }

    /// The command's tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The command's verb and arguments.
    #[must_use]
    pub fn verb(&self) -> &Verb {
        &self.verb
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> CommandStatus {
        self.status
    }

    /// Returns `true` while the command is `Pending` or `InProgress`.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Takes every unit received for this command since the last drain.
    ///
    /// Data drained before the command is terminal may be followed by more.
    pub fn drain_data(&mut self) -> Vec<ResponseUnit> {
        std::mem::take(&mut self.data)
    }

    /// Returns the tagged completion if it carries the `expected` status.
    ///
    /// # Errors
    ///
    /// - [`Error::CommandIncomplete`] if the command is still running
    /// - [`Error::CommandAborted`] if it was torn down before completing
    /// - [`Error::CommandFailed`] with the server's text for any other status
    pub fn result(&self, expected: Status) -> Result<&ResponseUnit> {
        let verb = self.verb.name();

        match self.status {
            CommandStatus::Pending | CommandStatus::InProgress => Err(Error::CommandIncomplete {
                tag: self.tag.clone(),
            }),
            CommandStatus::Aborted => Err(Error::CommandAborted { verb }),
            CommandStatus::CompletedOk | CommandStatus::CompletedError => {
                let Some(unit) = &self.completion else {
                    return Err(Error::CommandAborted { verb });
                };
                match &unit.payload {
                    Payload::Status { status, .. } if *status == expected => Ok(unit),
                    Payload::Status { text, .. } => Err(Error::CommandFailed {
                        verb,
                        text: text.clone(),
                    }),
                    _ => Err(Error::CommandAborted { verb }),
                }
            }
        }
    }

    /// Stores a routed unit and marks the command as streaming.
    pub(crate) fn accept(&mut self, unit: ResponseUnit) {
        if self.status == CommandStatus::Pending {
            self.status = CommandStatus::InProgress;
        }
        self.data.push(unit);
    }

    /// Records the tagged completion and makes the command terminal.
    pub(crate) fn complete(&mut self, status: Status, unit: ResponseUnit) {
        self.status = if status == Status::Ok {
            CommandStatus::CompletedOk
        } else {
            CommandStatus::CompletedError
        };
        self.completion = Some(unit);
    }

    pub(crate) fn abort(&mut self) {
        if self.is_in_progress() {
            self.status = CommandStatus::Aborted;
        }
    }

    /// Returns `true` the first time an IDLE may be ended with `DONE`.
    pub(crate) fn mark_done_sent(&mut self) -> bool {
        let ready = matches!(self.verb, Verb::Idle)
            && self.status == CommandStatus::InProgress
            && !self.done_sent;
        if ready {
            self.done_sent = true;
        }
        ready
    }
}

/// Generates sequential command tags: `A0001`, `A0002`, ...
#[derive(Debug, Default)]
pub(crate) struct TagGenerator {
    counter: u32,
}

impl TagGenerator {
    pub(crate) fn next(&mut self) -> String {
        self.counter = self.counter.wrapping_add(1);
        format!("A{:04}", self.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Correlation;

    fn unit(tag: &str, payload: Payload) -> ResponseUnit {
        ResponseUnit {
            correlation: Correlation::Command(tag.to_string()),
            payload,
        }
    }

    fn completion(tag: &str, status: Status, text: &str) -> ResponseUnit {
        unit(
            tag,
            Payload::Status {
                tag: Some(tag.to_string()),
                status,
                code: None,
                text: text.to_string(),
            },
        )
    }

    fn encoded(verb: &Verb) -> String {
        let mut buf = BytesMut::new();
        verb.encode("A0007", &mut buf).unwrap();
        String::from_utf8(buf.to_vec()).unwrap()
    }

    #[test]
    fn test_tag_generation() {
        let mut tags = TagGenerator::default();
        assert_eq!(tags.next(), "A0001");
        assert_eq!(tags.next(), "A0002");
    }

    #[test]
    fn test_encode_commands() {
        assert_eq!(encoded(&Verb::Idle), "A0007 IDLE\r\n");
        assert_eq!(
            encoded(&Verb::Examine {
                mailbox: "INBOX".into()
            }),
            "A0007 EXAMINE INBOX\r\n"
        );
        assert_eq!(
            encoded(&Verb::Fetch {
                set: SequenceSet::Range(116, 120),
                items: "RFC822.HEADER".into()
            }),
            "A0007 FETCH 116:120 RFC822.HEADER\r\n"
        );
    }

    #[test]
    fn test_encode_login_quotes_when_needed() {
        let verb = Verb::Login {
            username: "jsmith@example.com".into(),
            password: SecretString::from("pa ss\"word".to_string()),
        };
        assert_eq!(
            encoded(&verb),
            "A0007 LOGIN jsmith@example.com \"pa ss\\\"word\"\r\n"
        );
    }

    #[test]
    fn test_encode_rejects_unquotable_arguments() {
        let mut buf = BytesMut::new();
        for password in ["two\r\nlines", "nul\0byte", "caf\u{e9}"] {
            let verb = Verb::Login {
                username: "jsmith@example.com".into(),
                password: SecretString::from(password.to_string()),
            };
            assert!(matches!(
                verb.encode("A0001", &mut buf),
                Err(Error::UnquotableArgument { verb: "LOGIN" })
            ));
        }
        let examine = Verb::Examine {
            mailbox: "Bo\u{ee}te".into(),
        };
        assert!(examine.encode("A0002", &mut buf).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_login_debug_redacts_password() {
        let verb = Verb::Login {
            username: "jsmith@example.com".into(),
            password: SecretString::from("hunter2".to_string()),
        };
        assert!(!format!("{verb:?}").contains("hunter2"));
    }

    #[test]
    fn test_permitted_states() {
        let fetch = Verb::Fetch {
            set: SequenceSet::All,
            items: "RFC822.HEADER".into(),
        };
        assert!(!fetch.permitted_in(SessionState::Authenticated));
        assert!(fetch.permitted_in(SessionState::Selected));
        assert!(!Verb::Idle.permitted_in(SessionState::Authenticated));
        assert!(Verb::Examine { mailbox: "INBOX".into() }.permitted_in(SessionState::Authenticated));
        assert!(!Verb::Noop.permitted_in(SessionState::Logout));
    }

    #[test]
    fn test_claims_partition_by_verb() {
        let fetch = Verb::Fetch {
            set: SequenceSet::All,
            items: "RFC822.HEADER".into(),
        };
        let fetched = Payload::Fetch {
            seq: 1,
            attributes: Default::default(),
        };
        assert!(fetch.claims(&fetched));
        assert!(!fetch.claims(&Payload::Exists(3)));
        assert!(!Verb::Idle.claims(&Payload::Exists(3)));
        assert!(Verb::Idle.claims(&Payload::Continuation { text: "idling".into() }));
        assert!(Verb::Examine { mailbox: "INBOX".into() }.claims(&Payload::Exists(3)));
    }

    #[test]
    fn test_lifecycle_and_drain() {
        let mut cmd = Command::new("A0001".into(), Verb::Noop);
        assert_eq!(cmd.status(), CommandStatus::Pending);
        assert!(cmd.is_in_progress());

        cmd.accept(unit("A0001", Payload::Exists(1)));
        cmd.accept(unit("A0001", Payload::Exists(2)));
        assert_eq!(cmd.status(), CommandStatus::InProgress);

        let drained = cmd.drain_data();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].payload, Payload::Exists(1));
        assert!(cmd.drain_data().is_empty());

        cmd.complete(Status::Ok, completion("A0001", Status::Ok, "done"));
        assert!(!cmd.is_in_progress());
        assert!(cmd.result(Status::Ok).is_ok());
    }

    #[test]
    fn test_result_reports_failure_text() {
        let mut cmd = Command::new("A0004".into(), Verb::Noop);
        assert!(matches!(
            cmd.result(Status::Ok),
            Err(Error::CommandIncomplete { .. })
        ));

        cmd.complete(Status::No, completion("A0004", Status::No, "mailbox busy"));
        assert_eq!(cmd.status(), CommandStatus::CompletedError);
        match cmd.result(Status::Ok) {
            Err(Error::CommandFailed { verb, text }) => {
                assert_eq!(verb, "NOOP");
                assert_eq!(text, "mailbox busy");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_result_reports_abort() {
        let mut cmd = Command::new("A0004".into(), Verb::Noop);
        cmd.abort();
        assert_eq!(cmd.status(), CommandStatus::Aborted);
        assert!(matches!(
            cmd.result(Status::Ok),
            Err(Error::CommandAborted { verb: "NOOP" })
        ));
    }

    #[test]
    fn test_done_only_once_while_idling() {
        let mut cmd = Command::new("A0003".into(), Verb::Idle);
        assert!(!cmd.mark_done_sent());

        cmd.accept(unit("A0003", Payload::Continuation { text: "idling".into() }));
        assert!(cmd.mark_done_sent());
        assert!(!cmd.mark_done_sent());
    }
}
