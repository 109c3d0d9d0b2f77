//! Session state.
//!
//! [`Session`] holds the in-memory authentication status and publishes every
//! change through a watch channel. It is the only writer of the
//! [`TokenStore`]; callers go through the [`SessionContext`] capability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::models::{Token, User};
use crate::store::{PersistedSession, TokenStore};

/// Observable session fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub token: Option<Token>,
    /// True only for a token the server accepted since it was loaded.
    pub is_authenticated: bool,
    pub is_loading: bool,
    /// When the current token was last accepted by the server.
    pub validated_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    pub fn is_logged_out(&self) -> bool {
        self.user.is_none() && self.token.is_none() && !self.is_authenticated
    }
}

/// Read access plus the only permitted session mutators.
#[async_trait]
pub trait SessionContext: Send + Sync {
    fn snapshot(&self) -> SessionSnapshot;

    /// Install a server-accepted user and token.
    async fn login(&self, user: User, token: Token);

    /// Install a refreshed user and token, but only while `expected` is
    /// still the stored token. Returns false and changes nothing otherwise.
    async fn renew(&self, expected: &Token, user: User, token: Token) -> bool;

    /// Clear the session and the persisted token. Safe to repeat.
    async fn logout(&self);

    /// Replace the profile of an existing session; no-op without one.
    async fn update_user(&self, user: User);

    fn set_loading(&self, _loading: bool) {}
}

#[derive(Clone)]
pub struct Session {
    tokens: TokenStore,
    state: Arc<watch::Sender<SessionSnapshot>>,
    /// Serializes mutations so memory and storage change in the same order.
    mutate: Arc<Mutex<()>>,
}

impl Session {
    /// Empty session over the given token store.
    pub fn new(tokens: TokenStore) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            tokens,
            state: Arc::new(state),
            mutate: Arc::new(Mutex::new(())),
        }
    }

    /// Receive every subsequent snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    /// Profile from the persisted snapshot, for display before validation.
    /// Never marks the session authenticated.
    pub async fn cached_user(&self) -> Option<User> {
        self.tokens.load_snapshot().await.and_then(|s| s.user)
    }

    /// Callers hold `mutate`.
    async fn install(&self, user: User, token: Token) {
        if let Err(e) = self.tokens.set(&token).await {
            tracing::warn!(error = %e, "Failed to persist token, session will not survive restart");
        }
        self.persist_snapshot(&user, &token).await;

        tracing::info!(user_id = %user.id, token = %token.preview(), "Session established");
        self.state.send_modify(|state| {
            let same_token = state.is_authenticated && state.token.as_ref() == Some(&token);
            if !same_token {
                state.validated_at = Some(Utc::now());
            }
            state.user = Some(user);
            state.token = Some(token);
            state.is_authenticated = true;
            state.is_loading = false;
        });
    }

    async fn persist_snapshot(&self, user: &User, token: &Token) {
        let snapshot = PersistedSession {
            user: Some(user.clone()),
            token: Some(token.clone()),
        };
        if let Err(e) = self.tokens.save_snapshot(&snapshot).await {
            tracing::warn!(error = %e, "Failed to persist session snapshot");
        }
    }
}

#[async_trait]
impl SessionContext for Session {
    fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    async fn login(&self, user: User, token: Token) {
        let _guard = self.mutate.lock().await;
        self.install(user, token).await;
    }

    async fn renew(&self, expected: &Token, user: User, token: Token) -> bool {
        let _guard = self.mutate.lock().await;

        if self.tokens.get().await.as_ref() != Some(expected) {
            tracing::info!(token = %expected.preview(), "Stored token changed, refreshed token discarded");
            return false;
        }
        self.install(user, token).await;
        true
    }

    async fn logout(&self) {
        let _guard = self.mutate.lock().await;

        self.state.send_if_modified(|state| {
            let cleared = SessionSnapshot::default();
            if *state == cleared {
                return false;
            }
            *state = cleared;
            true
        });

        if let Err(e) = self.tokens.clear().await {
            tracing::warn!(error = %e, "Failed to clear persisted session");
        }
        tracing::info!("Session cleared");
    }

    async fn update_user(&self, user: User) {
        let _guard = self.mutate.lock().await;

        let token = {
            let state = self.state.borrow();
            match (&state.token, state.is_authenticated) {
                (Some(token), true) => token.clone(),
                _ => {
                    tracing::debug!("update_user without a session, ignoring");
                    return;
                }
            }
        };

        self.persist_snapshot(&user, &token).await;
        self.state.send_modify(|state| state.user = Some(user));
    }

    fn set_loading(&self, loading: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.is_loading != loading;
            state.is_loading = loading;
            changed
        });
    }
}
