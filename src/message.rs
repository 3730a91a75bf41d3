//! Candidate messages parsed from fetched header blocks.

use crate::error::{Error, Result};
use mailparse::{MailAddr, MailHeaderMap};

/// The header fields the match policy and the replies need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMessage {
    /// Sequence number the header was fetched at.
    pub seq: u32,
    /// Bare address of the first `From` mailbox, e.g. `sender@example.com`.
    pub from: String,
    /// Decoded `Subject`, empty when absent.
    pub subject: String,
    /// `Message-ID` as it appears in the header, angle brackets included.
    pub message_id: Option<String>,
}

impl CandidateMessage {
    /// Parses a raw `RFC822.HEADER` block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParseHeader`] if the header block is malformed, or
    /// [`Error::ParseAddress`] if `From` is missing or holds no mailbox.
    pub fn parse(seq: u32, header: &[u8]) -> Result<Self> {
        let (headers, _) =
            mailparse::parse_headers(header).map_err(|source| Error::ParseHeader { source })?;

        let raw_from = headers.get_first_value("From").unwrap_or_default();
        let from = first_mailbox(&raw_from)?;

        Ok(Self {
            seq,
            from,
            subject: headers.get_first_value("Subject").unwrap_or_default(),
            message_id: headers
                .get_first_value("Message-ID")
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
        })
    }
}

/// Extracts the first mailbox address, looking inside groups.
fn first_mailbox(value: &str) -> Result<String> {
    let invalid = || Error::ParseAddress {
        value: value.to_string(),
    };

    let addrs = mailparse::addrparse(value).map_err(|_| invalid())?;
    addrs
        .iter()
        .find_map(|addr| match addr {
            MailAddr::Single(info) => Some(info.addr.clone()),
            MailAddr::Group(group) => group.addrs.first().map(|info| info.addr.clone()),
        })
        .filter(|addr| !addr.is_empty())
        .ok_or_else(invalid)
}
