//! Match policy deciding which messages trigger the replies.
//!
//! # Example
//!
//! ```
//! use idle_reply::matcher::{ExactSender, MatchPolicy};
//! use idle_reply::CandidateMessage;
//!
//! let policy = ExactSender::new("sender@example.com");
//! let message = CandidateMessage {
//!     seq: 1,
//!     from: "sender@example.com".into(),
//!     subject: "Hello".into(),
//!     message_id: None,
//! };
//! assert!(policy.matches(&message));
//! ```

use crate::message::CandidateMessage;

/// Decides whether a candidate message should be answered.
///
/// Implement this trait to plug in a different rule than [`ExactSender`].
pub trait MatchPolicy: Send + Sync {
    /// Returns `true` if `message` should trigger the replies.
    fn matches(&self, message: &CandidateMessage) -> bool;

    /// Returns a human-readable description of what this policy looks for.
    ///
    /// Used in logging.
    fn description(&self) -> &str;
}

/// Matches one sender address exactly.
///
/// The comparison is byte-for-byte: case and surrounding whitespace matter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExactSender {
    address: String,
}

impl ExactSender {
    /// Creates a policy for `address`.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// The watched address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl MatchPolicy for ExactSender {
    fn matches(&self, message: &CandidateMessage) -> bool {
        message.from == self.address
    }

    fn description(&self) -> &str {
        &self.address
    }
}

impl<P: MatchPolicy + ?Sized> MatchPolicy for Box<P> {
    fn matches(&self, message: &CandidateMessage) -> bool {
        (**self).matches(message)
    }

    fn description(&self) -> &str {
        (**self).description()
    }
}
