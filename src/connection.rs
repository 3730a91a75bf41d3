//! Internal module for establishing TLS connections to the mail server.

use crate::error::{Error, Result};
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};
use webpki_roots::TLS_SERVER_ROOTS;

/// A TLS stream over TCP, used for IMAP communication.
pub type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Opens a TLS connection to `host:port`.
///
/// `timeout` bounds the TCP connect and TLS handshake together; `None` waits
/// as long as the OS does.
///
/// # Errors
///
/// Returns [`Error::InvalidDnsName`], [`Error::TcpConnect`],
/// [`Error::TlsConnect`] or [`Error::ConnectTimeout`].
#[instrument(
    name = "connection::connect",
    skip_all,
    fields(imap_host = %host, port = port, timeout = ?timeout)
)]
pub async fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<TlsStream> {
    let target = format!("{host}:{port}");
    let server_name = parse_server_name(host)?;

    let handshake = async {
        let tcp = TcpStream::connect(&target)
            .await
            .map_err(|source| Error::TcpConnect {
                target: target.clone(),
                source,
            })?;

        debug!("Performing TLS handshake");

        tls_connector()
            .connect(server_name, tcp)
            .await
            .map_err(|source| Error::TlsConnect {
                target: target.clone(),
                source,
            })
    };

    match timeout {
        Some(limit) => tokio::time::timeout(limit, handshake)
            .await
            .map_err(|_| Error::ConnectTimeout {
                target: target.clone(),
                timeout: limit,
            })?,
        None => handshake.await,
    }
}

fn tls_connector() -> TlsConnector {
    let mut roots = rustls::RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|ta| {
        rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// Server name for SNI and certificate verification.
fn parse_server_name(host: &str) -> Result<rustls::ServerName> {
    rustls::ServerName::try_from(host).map_err(|source| Error::InvalidDnsName {
        host: host.to_string(),
        source,
    })
}
