//! Connection lifecycle with automatic reconnection.
//!
//! [`ReconnectingSession`] owns the backoff state and at most one live
//! connection. Transport failures are retried indefinitely with exponential
//! backoff; a rejected token ends the loop immediately.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, info, warn};

use crate::{
    backoff::{Backoff, Sleeper, TokioSleeper},
    config::SessionConfig,
    error::ChatError,
    handshake::{authenticate, register},
    message::Account,
    transport::{Connector, LineConnection},
};

/// How a fresh connection identifies itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// The listen port streams chat without any login.
    Anonymous,
    Token(String),
    Register { nickname: String },
}

impl Handshake {
    /// Token login when a non-empty token is known, registration otherwise.
    pub fn from_credentials(token: Option<&str>, nickname: &str) -> Self {
        match token.map(str::trim).filter(|token| !token.is_empty()) {
            Some(token) => Handshake::Token(token.to_string()),
            None => Handshake::Register {
                nickname: nickname.to_string(),
            },
        }
    }
}

/// A connection that has completed its handshake.
pub struct Session<S> {
    conn: LineConnection<S>,
    account: Option<Account>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// The logged-in account; `None` for anonymous sessions.
    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub fn connection(&mut self) -> &mut LineConnection<S> {
        &mut self.conn
    }

    pub async fn close(&mut self) {
        self.conn.close().await;
    }
}

/// Work performed over an established session.
///
/// An error returned here discards the session; retriable errors lead to a
/// reconnect and a fresh call.
pub trait SessionOp<S> {
    type Output;

    fn run(
        &mut self,
        session: &mut Session<S>,
    ) -> impl Future<Output = Result<Self::Output, ChatError>> + Send;
}

pub struct ReconnectingSession<C, Sl = TokioSleeper> {
    connector: C,
    sleeper: Sl,
    config: SessionConfig,
    handshake: Handshake,
    backoff: Backoff,
    registered: Option<Account>,
}

impl<C> ReconnectingSession<C, TokioSleeper>
where
    C: Connector,
{
    pub fn new(connector: C, config: SessionConfig, handshake: Handshake) -> Self {
        Self::with_sleeper(connector, TokioSleeper, config, handshake)
    }
}

impl<C, Sl> ReconnectingSession<C, Sl>
where
    C: Connector,
    Sl: Sleeper,
{
    pub fn with_sleeper(
        connector: C,
        sleeper: Sl,
        config: SessionConfig,
        handshake: Handshake,
    ) -> Self {
        let backoff = Backoff::new(config.backoff);
        Self {
            connector,
            sleeper,
            config,
            handshake,
            backoff,
            registered: None,
        }
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// Account created by a registration during this session, if any.
    pub fn registered_account(&self) -> Option<&Account> {
        self.registered.as_ref()
    }

    /// Connects and handshakes, retrying transport failures until it works.
    pub async fn establish(&mut self) -> Result<Session<C::Stream>, ChatError> {
        loop {
            match self.try_establish().await {
                Ok(session) => {
                    self.backoff.reset();
                    return Ok(session);
                }
                Err(err) => self.recover(err).await?,
            }
        }
    }

    /// Runs `op` over an established session, reconnecting whenever the
    /// connection drops underneath it.
    pub async fn run<O>(&mut self, op: &mut O) -> Result<O::Output, ChatError>
    where
        O: SessionOp<C::Stream> + Send,
    {
        loop {
            let mut session = self.establish().await?;
            let result = op.run(&mut session).await;
            session.close().await;
            match result {
                Ok(output) => return Ok(output),
                Err(err) => self.recover(err).await?,
            }
        }
    }

    /// One connect and handshake, no retries.
    pub async fn try_establish(&mut self) -> Result<Session<C::Stream>, ChatError> {
        let token = match self.handshake.clone() {
            Handshake::Anonymous => {
                let conn = self.open().await?;
                return Ok(Session {
                    conn,
                    account: None,
                });
            }
            Handshake::Token(token) => token,
            Handshake::Register { nickname } => self.register_account(&nickname).await?.token,
        };

        let mut conn = self.open().await?;
        match authenticate(&mut conn, &token).await {
            Ok(account) => Ok(Session {
                conn,
                account: Some(account),
            }),
            Err(err) => {
                conn.close().await;
                Err(err)
            }
        }
    }

    /// Registers on a dedicated connection and switches later handshakes
    /// to the issued token, so a reconnect never creates a second account.
    async fn register_account(&mut self, nickname: &str) -> Result<Account, ChatError> {
        let mut conn = self.open().await?;
        let result = register(&mut conn, nickname).await;
        conn.close().await;

        let account = result?;
        self.handshake = Handshake::Token(account.token.clone());
        self.registered = Some(account.clone());
        Ok(account)
    }

    async fn open(&self) -> Result<LineConnection<C::Stream>, ChatError> {
        self.connector
            .connect(&self.config.endpoint, self.config.connect_timeout)
            .await
    }

    async fn recover(&mut self, err: ChatError) -> Result<(), ChatError> {
        if !err.is_retriable() {
            error!(error = %err, endpoint = %self.config.endpoint, "giving up on chat session");
            return Err(err);
        }

        let delay = self.backoff.next_delay();
        warn!(
            error = %err,
            endpoint = %self.config.endpoint,
            attempt = self.backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "chat connection failed, retrying"
        );
        self.sleeper.sleep(delay).await;
        info!(endpoint = %self.config.endpoint, "reconnecting");
        Ok(())
    }
}
