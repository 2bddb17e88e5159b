//! Buffered line reader over a shared socket handle.
//!
//! A growable `BytesMut` is filled from the socket until a `\n` terminator
//! is found, then split off and returned. A second read mode,
//! `read_payload`, drains whatever is already buffered before doing a
//! single raw socket read, for the unframed file-transfer payload that
//! follows a `/send_ok` handshake.

use std::io;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Read-side half of a session's connection. Only the session's own receive
/// loop ever calls into this — no locking is needed on the read path.
pub struct LineReader {
    socket: Arc<TcpStream>,
    buf: BytesMut,
}

impl LineReader {
    pub fn new(socket: Arc<TcpStream>) -> Self {
        LineReader {
            socket,
            buf: BytesMut::with_capacity(1024),
        }
    }

    /// Reads one line, stripping the trailing `\n` (and a `\r` immediately
    /// before it, for clients that still send CRLF). Returns `Ok(None)` on a
    /// clean EOF with nothing left buffered; a non-terminated trailing
    /// fragment at EOF is returned as a final line, matching how a client
    /// that sends `/quit` with no newline is still expected to be understood.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let mut line = self.buf.split_to(pos + 1);
                line.truncate(line.len() - 1);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            self.buf.reserve(1024);
            let mut socket = &*self.socket;
            let n = socket.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let rest = self.buf.split();
                return Ok(Some(String::from_utf8_lossy(&rest).into_owned()));
            }
        }
    }

    /// Reads one unframed payload chunk: anything already buffered (e.g. a
    /// few bytes that arrived in the same read as the preceding command
    /// line) is returned first; otherwise a single socket read is performed.
    /// The result is truncated to `max` bytes, mirroring the fixed-size
    /// receive buffer the protocol assumes (§4.4).
    pub async fn read_payload(&mut self, max: usize) -> io::Result<Vec<u8>> {
        if !self.buf.is_empty() {
            let mut data = self.buf.split().to_vec();
            data.truncate(max);
            return Ok(data);
        }

        let mut tmp = vec![0u8; max];
        let mut socket = &*self.socket;
        let n = socket.read(&mut tmp).await?;
        tmp.truncate(n);
        Ok(tmp)
    }
}
