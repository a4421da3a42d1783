//! Plain configuration values handed to the client by its caller.
//!
//! Nothing here reads the environment; [`crate::cli`] resolves flags, env
//! variables and defaults into these structs.

use std::{fmt, path::PathBuf, time::Duration};

pub const DEFAULT_HOST: &str = "minechat.dvmn.org";
pub const DEFAULT_SEND_PORT: u16 = 5050;
pub const DEFAULT_LISTEN_PORT: u16 = 5000;
pub const DEFAULT_NICKNAME: &str = "Anonymous";
pub const DEFAULT_HISTORY_FILE: &str = "minechat.history";
pub const DEFAULT_CREDS_FILE: &str = "minechat.creds";

/// Host and port of one chat service port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Shape of the delay between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound for the exponential part of the delay.
    pub max_delay: Duration,
    /// Random jitter is drawn from `[0, jitter)` and added on top.
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(500),
        }
    }
}

/// Everything a reconnecting session needs to reach the server.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: Endpoint,
    pub connect_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl SessionConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Fully resolved client settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub send_port: u16,
    pub listen_port: u16,
    pub nickname: String,
    pub token: Option<String>,
    pub history: PathBuf,
    pub creds: PathBuf,
    pub connect_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            send_port: DEFAULT_SEND_PORT,
            listen_port: DEFAULT_LISTEN_PORT,
            nickname: DEFAULT_NICKNAME.to_string(),
            token: None,
            history: PathBuf::from(DEFAULT_HISTORY_FILE),
            creds: PathBuf::from(DEFAULT_CREDS_FILE),
            connect_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl Settings {
    pub fn send_session(&self) -> SessionConfig {
        self.session_for(self.send_port)
    }

    pub fn listen_session(&self) -> SessionConfig {
        self.session_for(self.listen_port)
    }

    /// The configured token, with an empty value treated as absent.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.trim().is_empty())
    }

    fn session_for(&self, port: u16) -> SessionConfig {
        SessionConfig {
            endpoint: Endpoint::new(self.host.clone(), port),
            connect_timeout: self.connect_timeout,
            backoff: self.backoff,
        }
    }
}
