//! In-process stand-in for the minechat server.
//!
//! The send port speaks the real login/registration dialogue and records what
//! clients post; the listen port broadcasts every posted line.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    future::Future,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, bail};
use minechat::{
    config::{BackoffPolicy, Endpoint, SessionConfig},
    message::{Account, Outbound, ServerPhase, decode_client_line},
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    select,
    sync::broadcast,
};
use tracing::debug;

pub const GREETING: &str =
    "Hello %username%! Enter your personal hash or leave it empty to create new account.";
pub const NICKNAME_PROMPT: &str = "Enter preferred nickname below:";
pub const WELCOME: &str = "Welcome to chat! Post your message below. End it with an empty line.";
pub const ACK: &str = "Message send. Write more, end message with an empty line.";

pub struct FakeChat {
    send_listener: TcpListener,
    listen_listener: TcpListener,
    state: Arc<ChatState>,
}

/// Shared view of the fake server for assertions.
#[derive(Clone)]
pub struct ChatHandle {
    state: Arc<ChatState>,
    pub send_addr: SocketAddr,
    pub listen_addr: SocketAddr,
}

#[derive(Default)]
struct ChatState {
    accounts: Mutex<HashMap<String, String>>,
    next_token: AtomicU64,
    send_connections: AtomicUsize,
    posted: Mutex<Vec<String>>,
    chat_lines: Mutex<Vec<String>>,
    broadcaster: Mutex<Option<broadcast::Sender<String>>>,
}

impl ChatState {
    fn issue_account(&self, nickname: &str) -> Account {
        let token = format!("token-{:04}", self.next_token.fetch_add(1, Ordering::Relaxed));
        self.accounts
            .lock()
            .expect("accounts lock")
            .insert(token.clone(), nickname.to_string());
        Account {
            nickname: nickname.to_string(),
            token,
        }
    }

    fn lookup(&self, token: &str) -> Option<Account> {
        self.accounts
            .lock()
            .expect("accounts lock")
            .get(token)
            .map(|nickname| Account {
                nickname: nickname.clone(),
                token: token.to_string(),
            })
    }

    fn broadcast(&self, line: String) {
        if let Some(tx) = self.broadcaster.lock().expect("broadcaster lock").as_ref() {
            let _ = tx.send(line);
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<String>> {
        self.broadcaster
            .lock()
            .expect("broadcaster lock")
            .as_ref()
            .map(broadcast::Sender::subscribe)
    }
}

impl FakeChat {
    pub async fn bind() -> Result<Self> {
        let (broadcaster, _) = broadcast::channel(128);
        let state = ChatState {
            broadcaster: Mutex::new(Some(broadcaster)),
            ..ChatState::default()
        };
        Ok(Self {
            send_listener: TcpListener::bind("127.0.0.1:0").await?,
            listen_listener: TcpListener::bind("127.0.0.1:0").await?,
            state: Arc::new(state),
        })
    }

    pub fn handle(&self) -> Result<ChatHandle> {
        Ok(ChatHandle {
            state: Arc::clone(&self.state),
            send_addr: self.send_listener.local_addr()?,
            listen_addr: self.listen_listener.local_addr()?,
        })
    }

    /// Starts serving on a background task; returns a guard that stops it.
    pub fn spawn(self) -> Result<(ChatHandle, tokio::sync::oneshot::Sender<()>)> {
        let handle = self.handle()?;
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            self.run_until(shutdown).await;
        });
        Ok((handle, shutdown_tx))
    }

    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let FakeChat {
            send_listener,
            listen_listener,
            state,
        } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    // Dropping the sender ends every listen-port subscriber.
                    state.broadcaster.lock().expect("broadcaster lock").take();
                    break;
                }
                accepted = send_listener.accept() => {
                    if let Ok((stream, _)) = accepted {
                        state.send_connections.fetch_add(1, Ordering::SeqCst);
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            if let Err(err) = serve_send_port(stream, state).await {
                                debug!(error = ?err, "send-port client finished");
                            }
                        });
                    }
                }
                accepted = listen_listener.accept() => {
                    if let Ok((stream, _)) = accepted {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            let _ = serve_listen_port(stream, state).await;
                        });
                    }
                }
            }
        }
    }
}

impl ChatHandle {
    pub fn register_existing(&self, nickname: &str) -> Account {
        self.state.issue_account(nickname)
    }

    /// Message lines clients posted on the send port, terminators excluded.
    pub fn posted(&self) -> Vec<String> {
        self.state.posted.lock().expect("posted lock").clone()
    }

    /// Every line read in the chatting phase, including empty terminators.
    pub fn chat_lines(&self) -> Vec<String> {
        self.state.chat_lines.lock().expect("chat lines lock").clone()
    }

    pub fn send_connections(&self) -> usize {
        self.state.send_connections.load(Ordering::SeqCst)
    }

    pub fn broadcast(&self, line: &str) {
        self.state.broadcast(line.to_string());
    }

    pub fn send_session(&self) -> SessionConfig {
        session_config(self.send_addr)
    }

    pub fn listen_session(&self) -> SessionConfig {
        session_config(self.listen_addr)
    }
}

/// Short, jitter-free retries so failing tests fail fast.
pub fn session_config(addr: SocketAddr) -> SessionConfig {
    SessionConfig {
        endpoint: Endpoint::new(addr.ip().to_string(), addr.port()),
        connect_timeout: Duration::from_secs(1),
        backoff: BackoffPolicy {
            base: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            jitter: Duration::ZERO,
        },
    }
}

async fn serve_send_port(stream: TcpStream, state: Arc<ChatState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    write_line(&mut writer, GREETING).await?;
    let first = read_line(&mut reader).await?;
    let account = match decode_client_line(ServerPhase::AwaitingToken, &first) {
        Outbound::RegisterRequest => {
            write_line(&mut writer, NICKNAME_PROMPT).await?;
            let line = read_line(&mut reader).await?;
            let Outbound::Nickname(nickname) =
                decode_client_line(ServerPhase::AwaitingNickname, &line)
            else {
                bail!("expected a nickname");
            };
            let account = state.issue_account(&nickname);
            write_line(&mut writer, &serde_json::to_string(&account)?).await?;
            account
        }
        Outbound::Token(token) => match state.lookup(&token) {
            Some(account) => {
                write_line(&mut writer, &serde_json::to_string(&account)?).await?;
                account
            }
            None => {
                write_line(&mut writer, "null").await?;
                return Ok(());
            }
        },
        other => bail!("unexpected first line {other:?}"),
    };

    write_line(&mut writer, WELCOME).await?;
    loop {
        let line = read_line(&mut reader).await?;
        state
            .chat_lines
            .lock()
            .expect("chat lines lock")
            .push(line.clone());
        match decode_client_line(ServerPhase::Chatting, &line) {
            Outbound::Message(text) => {
                state.posted.lock().expect("posted lock").push(text.clone());
                state.broadcast(format!("{}: {text}", account.nickname));
            }
            Outbound::EndOfMessage => write_line(&mut writer, ACK).await?,
            other => bail!("unexpected chat line {other:?}"),
        }
    }
}

async fn serve_listen_port(stream: TcpStream, state: Arc<ChatState>) -> Result<()> {
    let Some(mut inbox) = state.subscribe() else {
        return Ok(());
    };
    let (_reader, mut writer) = stream.into_split();
    while let Ok(line) = inbox.recv().await {
        write_line(&mut writer, &line).await?;
    }
    Ok(())
}

async fn read_line<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        bail!("client closed the connection");
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn write_line<W>(writer: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
