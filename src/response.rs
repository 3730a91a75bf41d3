//! Response units: one framed server response turned into an owned payload.
//!
//! The grammar itself is handled by [`imap_proto`]; this module only copies the
//! parts the watcher cares about out of the borrowed parse tree.

use crate::error::{Error, Result};
use imap_proto::{AttributeValue, MailboxDatum, Response};
use std::collections::BTreeMap;

/// Fetch attribute name for a message's raw header block.
pub const RFC822_HEADER: &str = "RFC822.HEADER";

/// Status condition of a tagged completion or an untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// `OK`
    Ok,
    /// `NO`
    No,
    /// `BAD`
    Bad,
    /// `PREAUTH` (greeting only)
    PreAuth,
    /// `BYE`
    Bye,
}

impl From<imap_proto::Status> for Status {
    fn from(status: imap_proto::Status) -> Self {
        match status {
            imap_proto::Status::Ok => Status::Ok,
            imap_proto::Status::No => Status::No,
            imap_proto::Status::Bad => Status::Bad,
            imap_proto::Status::PreAuth => Status::PreAuth,
            imap_proto::Status::Bye => Status::Bye,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::No => write!(f, "NO"),
            Status::Bad => write!(f, "BAD"),
            Status::PreAuth => write!(f, "PREAUTH"),
            Status::Bye => write!(f, "BYE"),
        }
    }
}

/// Where the demultiplexer delivered a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// Data of the command with this tag.
    Command(String),
    /// Connection-wide data not tied to the outstanding command.
    Unsolicited,
}

/// Content of one server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Tagged completion (`tag` set) or untagged status response.
    Status {
        /// Command tag for completions, `None` for `*` responses.
        tag: Option<String>,
        /// Status condition.
        status: Status,
        /// Bracketed response code, rendered for logging.
        code: Option<String>,
        /// Human-readable text.
        text: String,
    },
    /// Continuation request (`+`).
    Continuation {
        /// Text after the `+`.
        text: String,
    },
    /// `* n EXISTS`
    Exists(u32),
    /// `* n RECENT`
    Recent(u32),
    /// `* n EXPUNGE`
    Expunge(u32),
    /// `* n FETCH (...)`, keyed by attribute name.
    Fetch {
        /// Message sequence number.
        seq: u32,
        /// Attribute values; numeric attributes are stored as decimal text.
        attributes: BTreeMap<String, Vec<u8>>,
    },
    /// `* CAPABILITY ...`
    Capabilities(Vec<String>),
    /// `* FLAGS (...)`
    Flags(Vec<String>),
    /// Anything else, kept as text.
    Other {
        /// The raw response, lossily decoded.
        text: String,
    },
}

impl Payload {
    /// Parses one complete framed response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] for input that is neither a valid
    /// response nor a recognisable untagged line.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        match imap_proto::parser::parse_response(raw) {
            Ok((_, response)) => Ok(Self::from_proto(response)),
            Err(_) => Self::parse_lenient(raw),
        }
    }

    /// Returns the attribute value for a FETCH payload.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&[u8]> {
        match self {
            Payload::Fetch { attributes, .. } => attributes.get(name).map(Vec::as_slice),
            _ => None,
        }
    }

    /// Returns the informational text carried by status-like payloads.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Payload::Status { text, .. }
            | Payload::Continuation { text }
            | Payload::Other { text } => Some(text),
            _ => None,
        }
    }

    fn from_proto(response: Response<'_>) -> Self {
        match response {
            Response::Done {
                tag,
                status,
                code,
                information,
            } => Payload::Status {
                tag: Some(tag.0),
                status: status.into(),
                code: code.map(|c| format!("{c:?}")),
                text: information.map(|i| i.into_owned()).unwrap_or_default(),
            },
            Response::Data {
                status,
                code,
                information,
            } => Payload::Status {
                tag: None,
                status: status.into(),
                code: code.map(|c| format!("{c:?}")),
                text: information.map(|i| i.into_owned()).unwrap_or_default(),
            },
            Response::Continue { information, .. } => Payload::Continuation {
                text: information.map(|i| i.into_owned()).unwrap_or_default(),
            },
            Response::Expunge(seq) => Payload::Expunge(seq),
            Response::MailboxData(MailboxDatum::Exists(n)) => Payload::Exists(n),
            Response::MailboxData(MailboxDatum::Recent(n)) => Payload::Recent(n),
            Response::MailboxData(MailboxDatum::Flags(flags)) => {
                Payload::Flags(flags.iter().map(ToString::to_string).collect())
            }
            Response::Capabilities(caps) => Payload::Capabilities(
                caps.iter()
                    .map(|cap| match cap {
                        imap_proto::Capability::Imap4rev1 => "IMAP4rev1".to_string(),
                        imap_proto::Capability::Auth(mech) => format!("AUTH={mech}"),
                        imap_proto::Capability::Atom(atom) => atom.to_string(),
                        #[allow(unreachable_patterns)]
                        other => format!("{other:?}"),
                    })
                    .collect(),
            ),
            Response::Fetch(seq, values) => Payload::Fetch {
                seq,
                attributes: fetch_attributes(values),
            },
            other => Payload::Other {
                text: format!("{other:?}"),
            },
        }
    }

    /// Classifies lines the grammar rejects, so odd server chatter is routed
    /// instead of tearing the session down.
    fn parse_lenient(raw: &[u8]) -> Result<Self> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.splitn(3, ' ');
        let first = parts.next().unwrap_or_default();
        let second = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default().to_string();

        let status = match second.to_ascii_uppercase().as_str() {
            "OK" => Some(Status::Ok),
            "NO" => Some(Status::No),
            "BAD" => Some(Status::Bad),
            "BYE" => Some(Status::Bye),
            "PREAUTH" => Some(Status::PreAuth),
            _ => None,
        };

        match (first, status) {
            ("+", _) => Ok(Payload::Continuation {
                text: line.trim_start_matches('+').trim_start().to_string(),
            }),
            ("*", Some(status)) => Ok(Payload::Status {
                tag: None,
                status,
                code: None,
                text: rest,
            }),
            ("*", None) => Ok(Payload::Other {
                text: line.to_string(),
            }),
            (tag, Some(status)) if !tag.is_empty() => Ok(Payload::Status {
                tag: Some(tag.to_string()),
                status,
                code: None,
                text: rest,
            }),
            _ => Err(Error::MalformedResponse {
                line: line.to_string(),
            }),
        }
    }
}

fn fetch_attributes(values: Vec<AttributeValue<'_>>) -> BTreeMap<String, Vec<u8>> {
    let mut attributes = BTreeMap::new();

    for value in values {
        let (name, data) = match value {
            AttributeValue::Rfc822Header(Some(data)) => (RFC822_HEADER, data.into_owned()),
            AttributeValue::Rfc822(Some(data)) => ("RFC822", data.into_owned()),
            AttributeValue::Rfc822Text(Some(data)) => ("RFC822.TEXT", data.into_owned()),
            AttributeValue::Rfc822Size(size) => ("RFC822.SIZE", size.to_string().into_bytes()),
            AttributeValue::Uid(uid) => ("UID", uid.to_string().into_bytes()),
            _ => continue,
        };
        attributes.insert(name.to_string(), data);
    }

    attributes
}

/// One server response after routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseUnit {
    /// Which buffer the unit was delivered to.
    pub correlation: Correlation,
    /// The parsed content.
    pub payload: Payload,
}

impl std::fmt::Display for ResponseUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.payload {
            Payload::Status {
                tag, status, text, ..
            } => write!(f, "{} {status} {text}", tag.as_deref().unwrap_or("*")),
            Payload::Continuation { text } => write!(f, "+ {text}"),
            Payload::Exists(n) => write!(f, "* {n} EXISTS"),
            Payload::Recent(n) => write!(f, "* {n} RECENT"),
            Payload::Expunge(n) => write!(f, "* {n} EXPUNGE"),
            Payload::Fetch { seq, attributes } => {
                let names: Vec<&str> = attributes.keys().map(String::as_str).collect();
                write!(f, "* {seq} FETCH ({})", names.join(" "))
            }
            Payload::Capabilities(caps) => write!(f, "* CAPABILITY {}", caps.join(" ")),
            Payload::Flags(flags) => write!(f, "* FLAGS ({})", flags.join(" ")),
            Payload::Other { text } => write!(f, "{text}"),
        }
    }
}
