//! Token login and account registration on the send port.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::{
    error::ChatError,
    message::{Account, ChatEvent, Outbound, decode_line, encode_line},
    transport::LineConnection,
};

/// Logs in with an existing token.
///
/// An unknown token yields [`ChatError::InvalidToken`]; retrying it cannot help.
pub async fn authenticate<S>(conn: &mut LineConnection<S>, token: &str) -> Result<Account, ChatError>
where
    S: AsyncRead + AsyncWrite,
{
    let token = Outbound::token(token);
    if token == Outbound::Token(String::new()) {
        // An empty line would be read as a registration request.
        return Err(ChatError::InvalidToken);
    }

    let prompt = conn.receive_line().await?;
    debug!(%prompt, "received token prompt");
    conn.send_line(&encode_line(&token)).await?;

    let account = match decode_line(&conn.receive_line().await?) {
        ChatEvent::AuthResult {
            success: true,
            account: Some(account),
        } => account,
        ChatEvent::AuthResult { .. } => return Err(ChatError::InvalidToken),
        other => return Err(ChatError::Handshake(format!("{other:?}"))),
    };

    let welcome = conn.receive_line().await?;
    debug!(%welcome, "received welcome");
    info!(nickname = %account.nickname, "authenticated");
    Ok(account)
}

/// Asks the server for a fresh account under `nickname`.
///
/// Line breaks in the nickname are flattened so it stays one field; no other
/// validation is applied.
pub async fn register<S>(conn: &mut LineConnection<S>, nickname: &str) -> Result<Account, ChatError>
where
    S: AsyncRead + AsyncWrite,
{
    let prompt = conn.receive_line().await?;
    debug!(%prompt, "received token prompt");
    conn.send_line(&encode_line(&Outbound::RegisterRequest)).await?;

    let prompt = conn.receive_line().await?;
    debug!(%prompt, "received nickname prompt");
    conn.send_line(&encode_line(&Outbound::nickname(nickname))).await?;

    match decode_line(&conn.receive_line().await?) {
        ChatEvent::AuthResult {
            success: true,
            account: Some(account),
        } => {
            info!(nickname = %account.nickname, "registered new account");
            Ok(account)
        }
        other => Err(ChatError::Handshake(format!("{other:?}"))),
    }
}
