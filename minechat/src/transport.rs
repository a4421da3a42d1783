use std::{future::Future, io, time::Duration};

use tokio::{
    io::{
        AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
        WriteHalf, split,
    },
    net::TcpStream,
    time::timeout,
};
use tracing::{debug, warn};

use crate::{config::Endpoint, error::ChatError};

/// Longest line accepted from a peer, terminator included.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Opens byte streams to a chat endpoint.
///
/// The reconnecting session only talks to this trait, so tests can hand it
/// in-memory streams or point it at a local fake server.
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn connect(
        &self,
        endpoint: &Endpoint,
        connect_timeout: Duration,
    ) -> impl Future<Output = Result<LineConnection<Self::Stream>, ChatError>> + Send;
}

/// Plain TCP, the only transport the chat service speaks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        connect_timeout: Duration,
    ) -> Result<LineConnection<TcpStream>, ChatError> {
        connect(endpoint, connect_timeout).await
    }
}

pub async fn connect(
    endpoint: &Endpoint,
    connect_timeout: Duration,
) -> Result<LineConnection<TcpStream>, ChatError> {
    let attempt = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
    match timeout(connect_timeout, attempt).await {
        Ok(Ok(stream)) => {
            debug!(%endpoint, "connected");
            Ok(LineConnection::new(stream))
        }
        Ok(Err(source)) => Err(ChatError::Connect {
            endpoint: endpoint.to_string(),
            source,
        }),
        Err(_) => Err(ChatError::ConnectTimeout {
            endpoint: endpoint.to_string(),
            timeout: connect_timeout,
        }),
    }
}

/// A newline-framed text connection.
///
/// The underlying stream is released when the value is dropped; [`close`]
/// additionally shuts the write side down so the peer sees EOF.
///
/// [`close`]: LineConnection::close
pub struct LineConnection<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    closed: bool,
}

impl<S> LineConnection<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(stream: S) -> Self {
        let (reader, writer) = split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
            closed: false,
        }
    }

    /// Writes `text` followed by a single `\n` and flushes.
    pub async fn send_line(&mut self, text: &str) -> Result<(), ChatError> {
        if self.closed {
            return Err(ChatError::Write(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection already closed",
            )));
        }
        if text.contains('\n') {
            return Err(ChatError::Write(io::Error::new(
                io::ErrorKind::InvalidInput,
                "line must not contain a newline",
            )));
        }

        let mut encoded = Vec::with_capacity(text.len() + 1);
        encoded.extend_from_slice(text.as_bytes());
        encoded.push(b'\n');
        self.writer
            .write_all(&encoded)
            .await
            .map_err(ChatError::Write)?;
        self.writer.flush().await.map_err(ChatError::Write)
    }

    /// Waits for the next complete line and returns it without its terminator.
    ///
    /// A trailing fragment cut off by EOF is never returned; it surfaces as
    /// [`ChatError::Closed`] like a clean EOF does. A line longer than
    /// [`MAX_LINE_BYTES`] is a [`ChatError::Read`].
    pub async fn receive_line(&mut self) -> Result<String, ChatError> {
        if self.closed {
            return Err(ChatError::Closed);
        }

        let mut buf = Vec::new();
        let bytes = (&mut self.reader)
            .take(MAX_LINE_BYTES as u64)
            .read_until(b'\n', &mut buf)
            .await
            .map_err(ChatError::Read)?;
        if bytes == 0 {
            return Err(ChatError::Closed);
        }
        if bytes == MAX_LINE_BYTES && buf.last() != Some(&b'\n') {
            return Err(ChatError::Read(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds {MAX_LINE_BYTES} bytes"),
            )));
        }
        if buf.last() != Some(&b'\n') {
            debug!(bytes, "discarding partial line cut off by disconnect");
            return Err(ChatError::Closed);
        }

        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }

        match String::from_utf8(buf) {
            Ok(line) => Ok(line),
            Err(err) => {
                warn!("received line is not valid UTF-8, replacing invalid bytes");
                Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
            }
        }
    }

    /// Shuts the connection down. Calling it again does nothing.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(error) = self.writer.shutdown().await {
            debug!(?error, "failed to shut down chat connection cleanly");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
