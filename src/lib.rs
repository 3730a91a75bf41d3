//! # idle-reply
//!
//! Watches one IMAP mailbox with IDLE and answers the first message from a
//! given sender: a reply to the sender and an acknowledgement to an
//! SMS-via-email gateway, both threaded on the original message.
//!
//! The crate is layered bottom-up:
//!
//! - [`Session`] owns the connection, tracks [`SessionState`] and mailbox
//!   metadata, and routes each server response either to the outstanding
//!   [`Command`] or to the session's unsolicited queue.
//! - [`Command`] is one protocol request with its tag, [`CommandStatus`] and
//!   accumulated data.
//! - [`Watcher`] drives the IDLE → FETCH → match loop on top of a session and
//!   hands matches to a [`ReplyDispatcher`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use idle_reply::{WatchConfig, Watcher};
//!
//! # async fn example() -> idle_reply::Result<()> {
//! let config = WatchConfig::builder()
//!     .email("jsmith@gmail.com")
//!     .password("app-password")
//!     .watch_for("sender@example.com")
//!     .reply_body("Call me at 408-555-1234")
//!     .sms_gateway("4085551234@txt.att.net")
//!     .build()?;
//!
//! let mut watcher = Watcher::connect(&config).await?;
//! let matched = watcher.run().await?;
//! println!("Answered message {}", matched.message.seq);
//! # Ok(())
//! # }
//! ```
//!
//! ## Driving a session by hand
//!
//! ```no_run
//! use idle_reply::{Session, SequenceSet, Status, Verb};
//! # use secrecy::SecretString;
//!
//! # async fn example(stream: tokio::net::TcpStream) -> idle_reply::Result<()> {
//! let mut session = Session::start(stream).await?;
//! session.login("jsmith@example.com", SecretString::from("secret".to_string())).await?;
//! session.examine("INBOX").await?;
//!
//! let set = SequenceSet::recent(session.message_count());
//! let mut fetch = session
//!     .issue(Verb::Fetch { set, items: "RFC822.HEADER".into() })
//!     .await?;
//! while fetch.is_in_progress() {
//!     session.receive_next(&mut fetch, None).await?;
//!     for unit in fetch.drain_data() {
//!         println!("{unit}");
//!     }
//!     session.drain_unsolicited();
//! }
//! fetch.result(Status::Ok)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Errors are classified by what the watch loop does with them:
//!
//! ```
//! use idle_reply::Error;
//!
//! fn report(error: &Error) {
//!     if error.is_fatal() {
//!         eprintln!("giving up ({}): {error}", error.category());
//!     } else {
//!         eprintln!("skipping: {error}");
//!     }
//! }
//! ```
//!
//! ## Observability
//!
//! All major operations emit `tracing` spans with structured fields.
//!
//! ### Span Naming Convention
//!
//! - `Watcher::connect`, `Watcher::run`, `Watcher::fetch_recent`, `Watcher::dispatch`
//! - `idle::enter`, `idle::wait`
//! - `session::start`, `session::login`, `session::examine`, `session::logout`
//! - `connection::connect`
//! - `reply::send`
//!
//! Passwords are never recorded.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod known_servers;
pub mod matcher;
pub mod message;
pub mod reply;
pub mod response;
pub mod sequence;
pub mod session;
pub mod watcher;

// Internal modules
mod framing;

// Re-exports for ergonomic API
pub use command::{Command, CommandStatus, Verb};
pub use config::{ReplyConfig, TimeoutConfig, WatchConfig, WatchConfigBuilder};
pub use error::{Error, ErrorCategory, Result};
pub use known_servers::{MailServers, ServerRegistry};
pub use matcher::{ExactSender, MatchPolicy};
pub use message::CandidateMessage;
pub use reply::{Reply, ReplyDispatcher, SmtpDispatcher};
pub use response::{Correlation, Payload, ResponseUnit, Status};
pub use sequence::SequenceSet;
pub use session::{Mailbox, Session, SessionState};
pub use watcher::{IdleCycle, IdlePhase, Matched, Watcher};
