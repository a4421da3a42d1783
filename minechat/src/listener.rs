//! Receives chat lines forever and hands the decoded events to a sink.

use std::{convert::Infallible, future::Future, io};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    select,
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{
    backoff::Sleeper,
    error::ChatError,
    message::{ChatEvent, decode_line},
    session::{ReconnectingSession, Session, SessionOp},
    transport::Connector,
};

/// Append-only consumer of received events.
pub trait TranscriptSink: Send {
    fn append(&mut self, event: &ChatEvent) -> impl Future<Output = io::Result<()>> + Send;
}

impl TranscriptSink for mpsc::Sender<ChatEvent> {
    async fn append(&mut self, event: &ChatEvent) -> io::Result<()> {
        self.send(event.clone())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "event receiver dropped"))
    }
}

struct ListenOp<'a, K> {
    sink: &'a mut K,
}

impl<S, K> SessionOp<S> for ListenOp<'_, K>
where
    S: AsyncRead + AsyncWrite + Send,
    K: TranscriptSink,
{
    type Output = Infallible;

    async fn run(&mut self, session: &mut Session<S>) -> Result<Infallible, ChatError> {
        loop {
            let line = session.connection().receive_line().await?;
            match decode_line(&line) {
                ChatEvent::ProtocolError { reason } => {
                    debug!(%reason, %line, "skipping server line");
                }
                event => self.sink.append(&event).await.map_err(ChatError::Sink)?,
            }
        }
    }
}

/// Delivers every received event to `sink` until `shutdown` resolves.
///
/// Connection loss is handled inside by reconnecting; this only returns early
/// for a rejected token or a failing sink. Resolving `shutdown` drops the
/// in-flight read or backoff sleep together with its connection.
pub async fn run_until<C, Sl, K, F>(
    session: &mut ReconnectingSession<C, Sl>,
    sink: &mut K,
    shutdown: F,
) -> Result<(), ChatError>
where
    C: Connector,
    Sl: Sleeper,
    K: TranscriptSink,
    F: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);
    let mut op = ListenOp { sink };

    select! {
        _ = &mut shutdown => {
            info!("listener shutting down");
            Ok(())
        }
        result = session.run(&mut op) => result.map(|never| match never {}),
    }
}

/// Runs the listener on its own task and exposes the events as a channel.
///
/// Dropping the receiver stops the task.
pub fn spawn_events<C, Sl>(
    mut session: ReconnectingSession<C, Sl>,
    buffer: usize,
) -> (mpsc::Receiver<ChatEvent>, JoinHandle<Result<(), ChatError>>)
where
    C: Connector + 'static,
    Sl: Sleeper + 'static,
{
    let (tx, rx) = mpsc::channel(buffer);
    let handle = tokio::spawn(async move {
        let mut sink = tx.clone();
        run_until(&mut session, &mut sink, async move { tx.closed().await }).await
    });
    (rx, handle)
}
