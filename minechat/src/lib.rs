//! Reconnecting client for the minechat line-based chat service.
//!
//! The service exposes two TCP ports: one streams chat lines to anyone who
//! connects, the other accepts a token login (or registers a new account)
//! and then takes messages. Each module focuses on one layer:
//!
//! - [`transport`] opens connections and frames newline-terminated lines.
//! - [`message`] decodes server lines into [`message::ChatEvent`]s and
//!   encodes the few lines a client may send.
//! - [`handshake`] implements token login and registration.
//! - [`backoff`] and [`session`] keep a logged-in connection alive, retrying
//!   network failures with exponential backoff and stopping on a rejected
//!   token.
//! - [`listener`] and [`sender`] are the two things a client does with a
//!   session.
//! - [`credentials`] and [`transcript`] persist accounts and chat history;
//!   [`cli`] and [`config`] turn flags and env variables into settings.
//!
//! Integration tests drive these modules against an in-process fake server.

pub mod backoff;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod handshake;
pub mod listener;
pub mod message;
pub mod sender;
pub mod session;
pub mod transcript;
pub mod transport;

pub use error::ChatError;
