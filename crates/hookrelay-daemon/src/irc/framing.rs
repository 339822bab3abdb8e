//! Line framing over a split transport.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};

use super::transport::BoxedStream;

/// Split a transport into independently borrowable read and write halves.
pub fn split(stream: BoxedStream) -> (LineReader, LineWriter) {
    let (read, write) = tokio::io::split(stream);
    (
        LineReader {
            inner: BufReader::new(read),
            buf: Vec::with_capacity(512),
        },
        LineWriter { inner: write },
    )
}

/// Longest inbound line accepted: 8191 bytes of message tags plus a
/// 512-byte message.
pub const MAX_INBOUND_LINE_BYTES: usize = 8191 + 512;

pub struct LineReader {
    inner: BufReader<ReadHalf<BoxedStream>>,
    // Persists across calls so a cancelled read loses nothing.
    buf: Vec<u8>,
}

impl LineReader {
    /// Next non-empty line without its CRLF, or `None` on EOF.
    ///
    /// Cancel safe: partial reads stay buffered until the next call.
    /// Invalid UTF-8 is replaced rather than rejected. A line longer than
    /// [`MAX_INBOUND_LINE_BYTES`] is an `InvalidData` error.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        loop {
            let Some(line) = self.next_frame().await? else {
                return Ok(None);
            };
            if !line.is_empty() {
                return Ok(Some(line));
            }
        }
    }

    async fn next_frame(&mut self) -> io::Result<Option<String>> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                break;
            }
            let (taken, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => (end + 1, true),
                None => (available.len(), false),
            };
            self.buf.extend_from_slice(&available[..taken]);
            self.inner.consume(taken);

            if self.buf.len() > MAX_INBOUND_LINE_BYTES {
                self.buf.clear();
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("inbound line exceeds {MAX_INBOUND_LINE_BYTES} bytes"),
                ));
            }
            if complete {
                break;
            }
        }

        let line = String::from_utf8_lossy(&self.buf)
            .trim_end_matches(['\r', '\n'])
            .to_owned();
        self.buf.clear();
        Ok(Some(line))
    }
}

pub struct LineWriter {
    inner: WriteHalf<BoxedStream>,
}

impl LineWriter {
    /// Write one line followed by CRLF and flush it.
    pub async fn send(&mut self, line: &str) -> io::Result<()> {
        let mut framed = Vec::with_capacity(line.len() + 2);
        framed.extend_from_slice(line.as_bytes());
        framed.extend_from_slice(b"\r\n");
        self.inner.write_all(&framed).await?;
        self.inner.flush().await
    }

    /// [`send`](Self::send) bounded by `limit`; a stalled peer yields
    /// `TimedOut`.
    pub async fn send_within(&mut self, line: &str, limit: Duration) -> io::Result<()> {
        tokio::time::timeout(limit, self.send(line))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("write stalled for {limit:?}"),
                )
            })?
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn reads_crlf_and_bare_lf_lines() {
        let (client, mut server) = tokio::io::duplex(256);
        let (mut reader, _writer) = split(Box::new(client));

        server.write_all(b"PING :a\r\n\r\nPING :b\n").await.unwrap();
        drop(server);

        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("PING :a"));
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("PING :b"));
        assert_eq!(reader.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn returns_trailing_partial_line_before_eof() {
        let (client, mut server) = tokio::io::duplex(256);
        let (mut reader, _writer) = split(Box::new(client));

        server.write_all(b"ERROR :bye").await.unwrap();
        drop(server);

        assert_eq!(
            reader.read_line().await.unwrap().as_deref(),
            Some("ERROR :bye")
        );
        assert_eq!(reader.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let (client, mut server) = tokio::io::duplex(256);
        let (mut reader, _writer) = split(Box::new(client));

        server.write_all(b"NOTICE * :caf\xe9\r\n").await.unwrap();
        let line = reader.read_line().await.unwrap().unwrap();
        assert!(line.starts_with("NOTICE * :caf"));
        assert!(line.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn long_tagged_line_is_accepted() {
        let (client, mut server) = tokio::io::duplex(16 * 1024);
        let (mut reader, _writer) = split(Box::new(client));

        let line = format!("@+draft/x={} :n!u@h PRIVMSG #ci :hi", "t".repeat(4000));
        server
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();

        assert_eq!(reader.read_line().await.unwrap(), Some(line));
    }

    #[tokio::test]
    async fn unterminated_flood_is_rejected() {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let (mut reader, _writer) = split(Box::new(client));

        server
            .write_all(&vec![b'a'; MAX_INBOUND_LINE_BYTES + 100])
            .await
            .unwrap();

        let err = reader.read_line().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_times_out() {
        let (client, _server) = tokio::io::duplex(64);
        let (_reader, mut writer) = split(Box::new(client));

        // Nobody reads the server side, so the pipe fills up.
        let err = writer
            .send_within(&"x".repeat(256), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn writer_appends_crlf() {
        let (client, mut server) = tokio::io::duplex(256);
        let (_reader, mut writer) = split(Box::new(client));

        writer.send("NICK relay").await.unwrap();
        writer.shutdown().await.unwrap();

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "NICK relay\r\n");
    }
}
