use anyhow::{Result, bail};
use clap::Parser;
use tracing::{info, warn};

use minechat::{
    ChatError,
    cli::{Cli, Command},
    config::Settings,
    credentials::{CredentialStore, JsonFileStore},
    listener,
    sender,
    session::{Handshake, ReconnectingSession},
    transcript::HistoryFile,
    transport::TcpConnector,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is the normal case.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Listen(args) => listen(args.settings()).await,
        Command::Send(args) => send(args.settings(), &args.message).await,
        Command::Register(args) => register(args.settings()).await,
    }
}

async fn listen(settings: Settings) -> Result<()> {
    let config = settings.listen_session();
    info!(endpoint = %config.endpoint, history = %settings.history.display(), "listening started");

    let mut session = ReconnectingSession::new(TcpConnector, config, Handshake::Anonymous);
    let mut history = HistoryFile::new(&settings.history);
    listener::run_until(&mut session, &mut history, shutdown_signal()).await?;

    info!("listening stopped");
    Ok(())
}

async fn send(settings: Settings, message: &str) -> Result<()> {
    let store = JsonFileStore::new(&settings.creds);
    let token = match settings.token() {
        Some(token) => Some(token.to_string()),
        None => store.load().await?.map(|account| account.token),
    };

    let handshake = Handshake::from_credentials(token.as_deref(), &settings.nickname);
    let mut session = ReconnectingSession::new(TcpConnector, settings.send_session(), handshake);
    let result = sender::run(&mut session, message).await;

    // Keep a freshly registered account even if the send itself failed.
    if let Some(account) = session.registered_account() {
        store.save(account).await?;
    }

    let account = explain(result, &settings)?;
    info!(nickname = %account.nickname, "done");
    Ok(())
}

async fn register(settings: Settings) -> Result<()> {
    let store = JsonFileStore::new(&settings.creds);
    let handshake = Handshake::Register {
        nickname: settings.nickname.clone(),
    };
    let mut session = ReconnectingSession::new(TcpConnector, settings.send_session(), handshake);
    let mut established = session.establish().await?;
    established.close().await;

    if let Some(account) = session.registered_account() {
        store.save(account).await?;
        info!(nickname = %account.nickname, "registered");
    }
    Ok(())
}

fn explain<T>(result: Result<T, ChatError>, settings: &Settings) -> Result<T> {
    match result {
        Err(ChatError::InvalidToken) => bail!(
            "the chat server did not recognize the token; pass a valid --token or remove {}",
            settings.creds.display()
        ),
        other => Ok(other?),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
}
