use std::{future::Future, io, path::PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::info;

use crate::message::Account;

/// Where issued accounts are kept between runs.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> impl Future<Output = Result<Option<Account>>> + Send;

    fn save(&self, account: &Account) -> impl Future<Output = Result<()>> + Send;
}

/// Stores the account as the JSON object the server issued.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialStore for JsonFileStore {
    async fn load(&self) -> Result<Option<Account>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read credentials from {}", self.path.display())
                });
            }
        };

        let account = serde_json::from_str(&contents)
            .with_context(|| format!("corrupt credentials file {}", self.path.display()))?;
        Ok(Some(account))
    }

    async fn save(&self, account: &Account) -> Result<()> {
        let encoded = serde_json::to_string(account).context("failed to encode credentials")?;
        fs::write(&self.path, encoded)
            .await
            .with_context(|| format!("failed to write credentials to {}", self.path.display()))?;
        info!(path = %self.path.display(), nickname = %account.nickname, "saved credentials");
        Ok(())
    }
}
