use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::{
    backoff::Sleeper,
    error::ChatError,
    message::{Account, Outbound, encode_line},
    session::{Handshake, ReconnectingSession, Session, SessionOp},
    transport::Connector,
};

struct SendOp {
    lines: Vec<Outbound>,
    acknowledged: usize,
}

impl<S> SessionOp<S> for SendOp
where
    S: AsyncRead + AsyncWrite + Send,
{
    type Output = Account;

    async fn run(&mut self, session: &mut Session<S>) -> Result<Account, ChatError> {
        let account = session
            .account()
            .cloned()
            .ok_or_else(|| ChatError::Handshake("session is not logged in".to_string()))?;
        let conn = session.connection();

        // Resume after the last acknowledged line when a retry lands here.
        for line in &self.lines[self.acknowledged..] {
            conn.send_line(&encode_line(line)).await?;
            conn.send_line(&encode_line(&Outbound::EndOfMessage)).await?;
            let reply = conn.receive_line().await?;
            debug!(%reply, "message acknowledged");
            self.acknowledged += 1;
        }

        Ok(account)
    }
}

/// Splits `message` into protocol lines; blank lines are dropped because an
/// empty line terminates a message on the wire.
pub fn message_lines(message: &str) -> Vec<Outbound> {
    message
        .split('\n')
        .map(|line| Outbound::message(line.trim_end_matches('\r')))
        .filter(|line| *line != Outbound::Message(String::new()))
        .collect()
}

/// Logs in, posts `message`, and closes the connection.
///
/// Returns the account the message was posted under. When the session had to
/// register first, [`ReconnectingSession::registered_account`] holds the new
/// credentials for the caller to persist.
pub async fn run<C, Sl>(
    session: &mut ReconnectingSession<C, Sl>,
    message: &str,
) -> Result<Account, ChatError>
where
    C: Connector,
    Sl: Sleeper,
{
    if *session.handshake() == Handshake::Anonymous {
        return Err(ChatError::Handshake(
            "sending requires a token or a nickname to register".to_string(),
        ));
    }

    let mut op = SendOp {
        lines: message_lines(message),
        acknowledged: 0,
    };
    let account = session.run(&mut op).await?;
    info!(nickname = %account.nickname, lines = op.acknowledged, "message sent");
    Ok(account)
}
