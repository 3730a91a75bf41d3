//! Internal module for IMAP response framing.
//!
//! Responses are CRLF-terminated lines that may embed `{n}` literals, in which
//! case the next `n` raw bytes belong to the same response.
//!
//! Bytes read from the transport stay in the stream's buffer until a whole
//! response has arrived, so a read that is dropped part-way (e.g. by a
//! timeout) loses nothing and the next read resumes it.

use crate::error::{Error, Result};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_BUFFER_SIZE: usize = 8192;

/// Longest single line accepted from the server.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Largest literal accepted from the server.
const MAX_LITERAL_SIZE: usize = 64 * 1024 * 1024;

/// Buffered, response-oriented view of the transport.
pub(crate) struct FramedStream<S> {
    stream: S,
    buffer: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
        }
    }

    /// Reads one complete response, literals included.
    ///
    /// Cancel-safe: partial input is kept for the next call.
    pub(crate) async fn read_response(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(len) = frame_length(&self.buffer)? {
                return Ok(self.buffer.split_to(len).to_vec());
            }

            self.buffer.reserve(READ_BUFFER_SIZE);
            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Writes one complete command line and flushes it.
    pub(crate) async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Length of the first complete response in `buf`, or `None` if more input
/// is needed.
fn frame_length(buf: &[u8]) -> Result<Option<usize>> {
    let mut pos = 0;

    loop {
        let Some(crlf) = find_crlf(&buf[pos..]) else {
            if buf.len() - pos > MAX_LINE_LENGTH {
                return Err(Error::LineTooLong {
                    limit: MAX_LINE_LENGTH,
                });
            }
            return Ok(None);
        };
        if crlf > MAX_LINE_LENGTH {
            return Err(Error::LineTooLong {
                limit: MAX_LINE_LENGTH,
            });
        }

        let line_end = pos + crlf + 2;
        let Some(size) = literal_length(&buf[pos..line_end]) else {
            return Ok(Some(line_end));
        };
        if size > MAX_LITERAL_SIZE {
            return Err(Error::LiteralTooLarge {
                size,
                limit: MAX_LITERAL_SIZE,
            });
        }

        let literal_end = line_end + size;
        if buf.len() < literal_end {
            return Ok(None);
        }
        pos = literal_end;
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses a trailing `{n}` or `{n+}` literal marker from a CRLF-terminated line.
fn literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    let digits = digits.strip_suffix(b"+").unwrap_or(digits);

    std::str::from_utf8(digits).ok()?.parse().ok()
}
