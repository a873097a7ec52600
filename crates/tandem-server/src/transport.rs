//! TCP transport carrying newline-delimited JSON.
//!
//! Each accepted socket is split into a [`LineReader`] and a [`LineWriter`]
//! so the connection task can read client lines and flush server lines from
//! one `select!` loop. Reads are capped at [`MAX_LINE_LEN`] bytes per line; a
//! client that never sends a newline cannot grow the buffer without bound.
//! A final line without a newline is still returned at end of stream.

use std::net::SocketAddr;

use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

use crate::{
    error::ServerError,
    protocol::{MAX_LINE_LEN, ProtocolError, ServerMessage},
};

/// Listening TCP socket.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind to `address` (e.g. `"0.0.0.0:7878"`).
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        tracing::info!("TCP transport bound to {}", addr);

        Ok(Self { listener })
    }

    /// Accept the next connection.
    pub async fn accept(&self) -> Result<TcpConnection, ServerError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| ServerError::Transport(format!("accept failed: {e}")))?;

        stream
            .set_nodelay(true)
            .map_err(|e| ServerError::Transport(format!("set_nodelay failed: {e}")))?;

        Ok(TcpConnection { stream, peer })
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// An accepted client socket.
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpConnection {
    /// Remote peer address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Split into independent read and write halves.
    pub fn into_split(self) -> (LineReader, LineWriter) {
        let (read, write) = self.stream.into_split();
        let reader = LineReader { inner: BufReader::new(read), pending: Vec::new() };
        (reader, LineWriter { inner: BufWriter::new(write) })
    }
}

/// Reads one client line at a time.
pub struct LineReader {
    inner: BufReader<OwnedReadHalf>,
    pending: Vec<u8>,
}

impl LineReader {
    /// Next line without its terminator, or `None` at end of stream.
    ///
    /// Cancel safe: bytes of a partially read line stay buffered and the next
    /// call resumes where this one stopped, so this can sit in a `select!`.
    pub async fn next_line(&mut self) -> Result<Option<String>, ServerError> {
        let limit = (MAX_LINE_LEN + 1).saturating_sub(self.pending.len()) as u64;
        let n = (&mut self.inner).take(limit).read_until(b'\n', &mut self.pending).await?;

        let complete = self.pending.last() == Some(&b'\n');
        if !complete && self.pending.len() > MAX_LINE_LEN {
            let len = self.pending.len();
            self.pending.clear();
            return Err(ProtocolError::LineTooLong { len }.into());
        }
        if n == 0 && self.pending.is_empty() {
            return Ok(None);
        }

        let mut bytes = std::mem::take(&mut self.pending);
        while matches!(bytes.last(), Some(b'\n' | b'\r')) {
            bytes.pop();
        }
        String::from_utf8(bytes).map(Some).map_err(|_| ProtocolError::InvalidUtf8.into())
    }
}

/// Writes server lines.
pub struct LineWriter {
    inner: BufWriter<OwnedWriteHalf>,
}

impl LineWriter {
    /// Write one message followed by a newline and flush.
    pub async fn send(&mut self, message: &ServerMessage) -> Result<(), ServerError> {
        let mut line = message.encode();
        line.push('\n');
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Flush and close the write half.
    pub async fn shutdown(&mut self) -> Result<(), ServerError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
