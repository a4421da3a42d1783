use std::{io, path::PathBuf};

use chrono::{Local, NaiveDateTime};
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::info;

use crate::{
    listener::TranscriptSink,
    message::{ChatEvent, TIMESTAMP_FORMAT},
};

/// Renders one transcript line, stamped with the event's own time if it
/// carries one and with `received_at` otherwise.
pub fn format_event(event: &ChatEvent, received_at: NaiveDateTime) -> String {
    let (stamp, text) = match event {
        ChatEvent::TextMessage {
            timestamp,
            sender,
            body,
        } => {
            let text = match sender {
                Some(sender) => format!("{sender}: {body}"),
                None => body.clone(),
            };
            (timestamp.unwrap_or(received_at), text)
        }
        ChatEvent::AuthResult {
            account: Some(account),
            ..
        } => (received_at, format!("logged in as {}", account.nickname)),
        ChatEvent::AuthResult { account: None, .. } => (received_at, "token rejected".to_string()),
        ChatEvent::ProtocolError { reason } => (received_at, format!("protocol error: {reason}")),
    };
    format!("[{}] {text}", stamp.format(TIMESTAMP_FORMAT))
}

/// Chat history file, one line per event, opened lazily in append mode.
pub struct HistoryFile {
    path: PathBuf,
    file: Option<File>,
}

impl HistoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    async fn open(&self) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
    }
}

impl TranscriptSink for HistoryFile {
    async fn append(&mut self, event: &ChatEvent) -> io::Result<()> {
        let line = format_event(event, Local::now().naive_local());
        info!("{line}");

        let file = match self.file.take() {
            Some(file) => file,
            None => self.open().await?,
        };
        let file = self.file.insert(file);
        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.flush().await
    }
}
