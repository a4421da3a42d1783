use std::{io, time::Duration};

use thiserror::Error;

/// Failures surfaced by the connection and protocol layer.
///
/// Transport variants are recovered by the reconnecting session. A rejected
/// token and a broken transcript sink are terminal.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("failed to connect to {endpoint}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out after {timeout:?} connecting to {endpoint}")]
    ConnectTimeout { endpoint: String, timeout: Duration },

    #[error("failed to write to the chat connection")]
    Write(#[source] io::Error),

    #[error("failed to read from the chat connection")]
    Read(#[source] io::Error),

    #[error("chat connection closed by peer")]
    Closed,

    #[error("unexpected handshake response: {0}")]
    Handshake(String),

    #[error("token was not recognized by the chat server")]
    InvalidToken,

    #[error("failed to deliver event to the transcript")]
    Sink(#[source] io::Error),
}

impl ChatError {
    /// Whether a fresh connection and handshake may succeed where this one failed.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, ChatError::InvalidToken | ChatError::Sink(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_retriable() {
        let retriable = [
            ChatError::Connect {
                endpoint: "localhost:5050".into(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            },
            ChatError::ConnectTimeout {
                endpoint: "localhost:5050".into(),
                timeout: Duration::from_secs(1),
            },
            ChatError::Write(io::Error::from(io::ErrorKind::BrokenPipe)),
            ChatError::Read(io::Error::from(io::ErrorKind::ConnectionReset)),
            ChatError::Closed,
            ChatError::Handshake("garbage".into()),
        ];
        for error in retriable {
            assert!(error.is_retriable(), "{error} should be retriable");
        }
        assert!(!ChatError::InvalidToken.is_retriable());
        assert!(!ChatError::Sink(io::Error::from(io::ErrorKind::BrokenPipe)).is_retriable());
    }
}
