use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::config::{
    BackoffPolicy, DEFAULT_CREDS_FILE, DEFAULT_HISTORY_FILE, DEFAULT_HOST, DEFAULT_LISTEN_PORT,
    DEFAULT_NICKNAME, DEFAULT_SEND_PORT, Settings,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Listen to the chat and append every message to the history file.
    Listen(ListenArgs),
    /// Post a message, registering a new account first if no token is known.
    Send(SendArgs),
    /// Register a new account and save its credentials.
    Register(RegisterArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Hostname of the chat server.
    #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port that streams chat messages.
    #[arg(long, env = "LISTEN_PORT", default_value_t = DEFAULT_LISTEN_PORT)]
    pub listen_port: u16,

    /// Port that accepts logins and messages.
    #[arg(long, env = "SEND_PORT", default_value_t = DEFAULT_SEND_PORT)]
    pub send_port: u16,

    #[arg(long, default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Delay before the first reconnect attempt.
    #[arg(long, default_value_t = 1_000, value_parser = clap::value_parser!(u64).range(1..))]
    pub retry_base_ms: u64,

    /// Upper bound for the reconnect delay, before jitter.
    #[arg(long, default_value_t = 30_000)]
    pub retry_max_ms: u64,

    #[arg(long, default_value_t = 500)]
    pub retry_jitter_ms: u64,
}

impl ConnectionArgs {
    fn settings(&self) -> Settings {
        Settings {
            host: self.host.clone(),
            listen_port: self.listen_port,
            send_port: self.send_port,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            backoff: BackoffPolicy {
                base: Duration::from_millis(self.retry_base_ms),
                max_delay: Duration::from_millis(self.retry_max_ms),
                jitter: Duration::from_millis(self.retry_jitter_ms),
            },
            ..Settings::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AccountArgs {
    /// Nickname for a new account. Ignored when a token is known.
    #[arg(long, env = "NICKNAME", default_value = DEFAULT_NICKNAME)]
    pub nickname: String,

    /// Token of an existing account.
    #[arg(long, env = "TOKEN")]
    pub token: Option<String>,

    /// File holding the saved account.
    #[arg(long, env = "CREDS_FILE", default_value = DEFAULT_CREDS_FILE)]
    pub creds: PathBuf,
}

impl AccountArgs {
    fn apply(&self, settings: Settings) -> Settings {
        Settings {
            nickname: self.nickname.clone(),
            token: self.token.clone(),
            creds: self.creds.clone(),
            ..settings
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ListenArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// File where the chat history is appended.
    #[arg(long, env = "HISTORY_FILE", default_value = DEFAULT_HISTORY_FILE)]
    pub history: PathBuf,
}

impl ListenArgs {
    pub fn settings(&self) -> Settings {
        Settings {
            history: self.history.clone(),
            ..self.connection.settings()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    /// Text to post. Each line is sent as a separate message.
    #[arg(long)]
    pub message: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub account: AccountArgs,
}

impl SendArgs {
    pub fn settings(&self) -> Settings {
        self.account.apply(self.connection.settings())
    }
}

#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub account: AccountArgs,
}

impl RegisterArgs {
    pub fn settings(&self) -> Settings {
        self.account.apply(self.connection.settings())
    }
}
