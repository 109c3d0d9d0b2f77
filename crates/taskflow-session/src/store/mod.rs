//! Persisted token store.
//!
//! [`TokenStore`] is the only owner of the persisted credential. It sits on a
//! [`KeyValueStore`] addressed by two fixed keys: one for the raw token and
//! one for the serialized session snapshot.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::StorageConfig;
use crate::error::StoreError;
use crate::models::{Token, User};

/// Key-value persistence medium.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one. Returns once the value is durable.
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Session snapshot as persisted under the session key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub token: Option<Token>,
}

/// Persisted holder of the current session token and profile snapshot.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
    token_key: String,
    session_key: String,
    /// Serializes writes so the last `set`/`clear` to start is the last to land.
    write_lock: Arc<Mutex<()>>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, config: &StorageConfig) -> Self {
        Self {
            backend,
            token_key: config.token_key.clone(),
            session_key: config.session_key.clone(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Token store backed by an in-process map with default keys.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), &StorageConfig::default())
    }

    /// Current token. Read failures are logged and reported as absent.
    pub async fn get(&self) -> Option<Token> {
        match self.backend.get(&self.token_key).await {
            Ok(Some(raw)) if !raw.trim().is_empty() => Some(Token::new(raw.trim())),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(key = %self.token_key, error = %e, "Token read failed, treating as logged out");
                None
            }
        }
    }

    /// Replace the current token.
    pub async fn set(&self, token: &Token) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.backend.put(&self.token_key, token.as_str()).await?;
        tracing::debug!(token = %token.preview(), "Token stored");
        Ok(())
    }

    /// Remove the token and the session snapshot.
    ///
    /// Both keys are attempted even if the first removal fails.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let token_result = self.backend.remove(&self.token_key).await;
        let session_result = self.backend.remove(&self.session_key).await;
        tracing::debug!("Token store cleared");
        token_result.and(session_result)
    }

    /// Persist the session snapshot.
    pub async fn save_snapshot(&self, snapshot: &PersistedSession) -> Result<(), StoreError> {
        let data = serde_json::to_string(snapshot)?;
        let _guard = self.write_lock.lock().await;
        self.backend.put(&self.session_key, &data).await
    }

    /// Persisted session snapshot, if any. Unreadable snapshots are treated as absent.
    pub async fn load_snapshot(&self) -> Option<PersistedSession> {
        match self.backend.get(&self.session_key).await {
            Ok(Some(raw)) => match serde_json::from_str::<PersistedSession>(&raw) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!(key = %self.session_key, error = %e, "Discarding unreadable session snapshot");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %self.session_key, error = %e, "Session snapshot read failed");
                None
            }
        }
    }
}
