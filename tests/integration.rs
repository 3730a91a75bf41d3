//! Integration tests for idle-reply.
//!
//! The scripted tests drive a [`Watcher`] against an in-memory server whose
//! every byte is asserted. The live test requires a real account and is
//! ignored by default. To run it:
//!
//! ```bash
//! export IDLE_REPLY_EMAIL="your@email.com"
//! export IDLE_REPLY_PASSWORD="your-app-password"
//! export IDLE_REPLY_WATCH_FOR="sender@example.com"
//! export IDLE_REPLY_REPLY_BODY="test"
//! export IDLE_REPLY_SMS_GATEWAY="you@example.com"
//!
//! cargo test --features integration-tests -- --ignored
//! ```

use idle_reply::{
    CandidateMessage, Error, ErrorCategory, Reply, ReplyDispatcher, SessionState, WatchConfig,
    Watcher,
};
use std::cell::RefCell;
use tokio_test::io::Builder;

// ─────────────────────────────────────────────────────────────────────────────
// Scripted server helpers
// ─────────────────────────────────────────────────────────────────────────────

const WATCHED: &str = "sender@example.com";
const GATEWAY: &str = "4085551234@txt.att.net";

#[derive(Default)]
struct Recorder {
    sent: RefCell<Vec<Reply>>,
}

impl ReplyDispatcher for Recorder {
    async fn send(&self, reply: &Reply) -> idle_reply::Result<()> {
        self.sent.borrow_mut().push(reply.clone());
        Ok(())
    }
}

/// Records every attempt and fails it.
#[derive(Default)]
struct Rejecting {
    attempts: RefCell<Vec<Reply>>,
}

impl ReplyDispatcher for Rejecting {
    async fn send(&self, reply: &Reply) -> idle_reply::Result<()> {
        self.attempts.borrow_mut().push(reply.clone());
        Err(Error::ComposeReply {
            source: lettre::error::Error::MissingTo,
        })
    }
}

fn config() -> WatchConfig {
    WatchConfig::builder()
        .email("jsmith@example.com")
        .password("secret")
        .watch_for(WATCHED)
        .reply_body("Name: John Smith\nChoice #1: Grove Lot 99")
        .sms_gateway(GATEWAY)
        .build()
        .expect("valid config")
}

fn header(from: &str, subject: &str, message_id: &str) -> String {
    format!("From: {from}\r\nSubject: {subject}\r\nMessage-ID: {message_id}\r\n\r\n")
}

fn fetched(seq: u32, header: &str) -> Vec<u8> {
    format!(
        "* {seq} FETCH (RFC822.HEADER {{{}}}\r\n{header})\r\n",
        header.len()
    )
    .into_bytes()
}

fn handshake(builder: &mut Builder, exists: u32) -> &mut Builder {
    builder
        .read(b"* OK IMAP4rev1 Service Ready\r\n")
        .write(b"A0001 LOGIN jsmith@example.com secret\r\n")
        .read(b"A0001 OK LOGIN completed\r\n")
        .write(b"A0002 EXAMINE INBOX\r\n")
        .read(
            format!(
                "* FLAGS (\\Answered \\Seen)\r\n* {exists} EXISTS\r\n* 0 RECENT\r\n\
                 A0002 OK [READ-ONLY] EXAMINE completed\r\n"
            )
            .as_bytes(),
        )
}

fn idle<'a>(builder: &'a mut Builder, tag: &str, signal: &str) -> &'a mut Builder {
    builder
        .write(format!("{tag} IDLE\r\n").as_bytes())
        .read(b"+ idling\r\n")
        .read(format!("{signal}\r\n").as_bytes())
        .write(b"DONE\r\n")
        .read(format!("{tag} OK IDLE terminated\r\n").as_bytes())
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripted scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_small_mailbox_without_match_keeps_watching() {
    let mut first_fetch = Vec::new();
    first_fetch.extend(fetched(1, &header("a@example.com", "Hello", "<m1@example.com>")));
    first_fetch.extend(fetched(2, "Subject: no sender at all\r\n\r\n"));
    first_fetch.extend(fetched(3, &header("Sender@example.com", "Close", "<m3@example.com>")));
    first_fetch.extend(b"A0004 OK FETCH completed\r\n");

    let mut second_fetch = first_fetch.clone();
    second_fetch.truncate(second_fetch.len() - b"A0004 OK FETCH completed\r\n".len());
    second_fetch.extend(fetched(
        4,
        &header("Jane Doe <sender@example.com>", "Lot 99", "<m4@example.com>"),
    ));
    second_fetch.extend(b"A0006 OK FETCH completed\r\n");

    let mut builder = Builder::new();
    handshake(&mut builder, 2);
    idle(&mut builder, "A0003", "* 3 EXISTS")
        .write(b"A0004 FETCH 1:* RFC822.HEADER\r\n")
        .read(&first_fetch);
    idle(&mut builder, "A0005", "* 4 EXISTS")
        .write(b"A0006 FETCH 1:* RFC822.HEADER\r\n")
        .read(&second_fetch)
        .write(b"A0007 LOGOUT\r\n")
        .read(b"* BYE see you\r\nA0007 OK LOGOUT completed\r\n");
    let mock = builder.build();

    let mut watcher = Watcher::setup(mock, Recorder::default(), &config())
        .await
        .unwrap();
    assert_eq!(watcher.session().message_count(), 2);

    // Case differs, so message 3 is not a match
    assert_eq!(watcher.cycle().await.unwrap(), None);
    assert!(watcher.dispatcher().sent.borrow().is_empty());
    assert_eq!(watcher.session().state(), SessionState::Selected);

    let matched = watcher.run().await.unwrap();
    assert_eq!(matched.message.seq, 4);
    assert_eq!(watcher.dispatcher().sent.borrow().len(), 2);
    assert_eq!(watcher.session().state(), SessionState::Logout);
}

#[tokio::test]
async fn test_large_mailbox_match_replies_twice() {
    let mut fetch = Vec::new();
    for seq in 116..120 {
        fetch.extend(fetched(
            seq,
            &header("other@example.com", "Newsletter", &format!("<m{seq}@example.com>")),
        ));
    }
    fetch.extend(fetched(
        120,
        &header(
            "Jane Doe <sender@example.com>",
            "Grove lot availability",
            "<m120@example.com>",
        ),
    ));
    fetch.extend(b"A0004 OK FETCH completed\r\n");

    let mut builder = Builder::new();
    handshake(&mut builder, 119);
    idle(&mut builder, "A0003", "* 120 EXISTS")
        .write(b"A0004 FETCH 116:120 RFC822.HEADER\r\n")
        .read(&fetch)
        .write(b"A0005 LOGOUT\r\n")
        .read(b"* BYE logging out\r\nA0005 OK LOGOUT completed\r\n");
    let mock = builder.build();

    let mut watcher = Watcher::setup(mock, Recorder::default(), &config())
        .await
        .unwrap();
    let matched = watcher.run().await.unwrap();

    assert_eq!(
        matched.message,
        CandidateMessage {
            seq: 120,
            from: WATCHED.into(),
            subject: "Grove lot availability".into(),
            message_id: Some("<m120@example.com>".into()),
        }
    );

    let sent = watcher.dispatcher().sent.borrow();
    assert_eq!(sent.len(), 2);

    assert_eq!(sent[0].to, WATCHED);
    assert_eq!(sent[0].body, "Name: John Smith\nChoice #1: Grove Lot 99");
    assert_eq!(sent[1].to, GATEWAY);
    assert_eq!(sent[1].body, "done");

    for reply in sent.iter() {
        assert_eq!(reply.reply_subject(), "Re: Grove lot availability");
        assert_eq!(reply.in_reply_to.as_deref(), Some("<m120@example.com>"));
        assert_eq!(reply.references.as_deref(), Some("<m120@example.com>"));
    }
}

#[tokio::test]
async fn test_failed_fetch_is_not_fatal() {
    let mut builder = Builder::new();
    handshake(&mut builder, 10);
    idle(&mut builder, "A0003", "* 1 RECENT")
        .write(b"A0004 FETCH 6:10 RFC822.HEADER\r\n")
        .read(b"A0004 NO server busy\r\n");
    let mock = builder.build();

    let mut watcher = Watcher::setup(mock, Recorder::default(), &config())
        .await
        .unwrap();

    assert_eq!(watcher.cycle().await.unwrap(), None);
    assert!(watcher.dispatcher().sent.borrow().is_empty());
    assert_eq!(watcher.session().state(), SessionState::Selected);
    assert_eq!(watcher.session().message_count(), 10);
}

#[tokio::test]
async fn test_bye_during_fetch_aborts_then_ends_watch() {
    let mut fetch = fetched(1, &header("a@example.com", "Hello", "<m1@example.com>"));
    fetch.extend(b"* BYE server shutting down\r\n");

    let mut builder = Builder::new();
    handshake(&mut builder, 2);
    idle(&mut builder, "A0003", "* 3 EXISTS")
        .write(b"A0004 FETCH 1:* RFC822.HEADER\r\n")
        .read(&fetch);
    let mock = builder.build();

    let mut watcher = Watcher::setup(mock, Recorder::default(), &config())
        .await
        .unwrap();

    // The aborted fetch itself is only reported
    assert_eq!(watcher.cycle().await.unwrap(), None);
    assert_eq!(watcher.session().state(), SessionState::Logout);

    let err = watcher.cycle().await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
    assert!(watcher.dispatcher().sent.borrow().is_empty());
}

#[tokio::test]
async fn test_reply_failure_is_fatal() {
    let mut fetch = fetched(
        3,
        &header("Jane Doe <sender@example.com>", "Lot 99", "<m3@example.com>"),
    );
    fetch.extend(b"A0004 OK FETCH completed\r\n");

    let mut builder = Builder::new();
    handshake(&mut builder, 2);
    idle(&mut builder, "A0003", "* 3 EXISTS")
        .write(b"A0004 FETCH 1:* RFC822.HEADER\r\n")
        .read(&fetch);
    let mock = builder.build();

    let mut watcher = Watcher::setup(mock, Rejecting::default(), &config())
        .await
        .unwrap();

    let err = watcher.run().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Send);
    assert!(err.is_fatal());

    // The acknowledgement is never attempted after the primary reply fails
    let attempts = watcher.dispatcher().attempts.borrow();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].to, WATCHED);
}

#[tokio::test]
async fn test_rejected_login_fails_setup() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0001 LOGIN jsmith@example.com secret\r\n")
        .read(b"A0001 NO [AUTHENTICATIONFAILED] invalid credentials\r\n")
        .build();

    let err = Watcher::setup(mock, Recorder::default(), &config())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CommandFailed { verb: "LOGIN", .. }));
}

#[tokio::test]
async fn test_server_hangup_is_fatal() {
    let mut builder = Builder::new();
    handshake(&mut builder, 10)
        .write(b"A0003 IDLE\r\n")
        .read(b"+ idling\r\n");
    let mock = builder.build();

    let mut watcher = Watcher::setup(mock, Recorder::default(), &config())
        .await
        .unwrap();

    let err = watcher.run().await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
    assert!(err.is_fatal());
    assert_eq!(watcher.session().state(), SessionState::Logout);
}

// ─────────────────────────────────────────────────────────────────────────────
// Live server
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_connect_and_logout() {
    dotenvy::dotenv().ok();
    let config = WatchConfig::from_env().expect("Test config from environment variables");

    let mut watcher = Watcher::connect(&config)
        .await
        .expect("Failed to connect");

    assert_eq!(watcher.session().state(), SessionState::Selected);
    assert_eq!(
        watcher.session().mailbox().map(|m| m.name.as_str()),
        Some(config.mailbox.as_str())
    );

    watcher.logout().await.expect("Failed to logout");
}
