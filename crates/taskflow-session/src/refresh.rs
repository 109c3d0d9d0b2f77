//! Token refresh coordination.
//!
//! Refreshes are single-flight: callers serialize on one async lock, and a
//! caller that gets the lock after another refresh already replaced the token
//! it failed with takes that token instead of issuing a second refresh. So
//! N requests rejected together cost one refresh call and all retry with the
//! same token.
//!
//! Recovery is one-shot. A failed refresh clears the whole session. A refresh
//! only installs its token if the session still holds the token it started
//! from, so a logout during the call stays in effect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::api::AuthApi;
use crate::error::{RefreshError, SessionError};
use crate::models::Token;
use crate::session::SessionContext;
use crate::store::TokenStore;

#[derive(Clone)]
pub struct RefreshCoordinator {
    tokens: TokenStore,
    session: Arc<dyn SessionContext>,
    api: AuthApi,
    in_flight: Arc<Mutex<()>>,
    refreshes: Arc<AtomicU64>,
}

impl RefreshCoordinator {
    pub fn new(tokens: TokenStore, session: Arc<dyn SessionContext>, api: AuthApi) -> Self {
        Self {
            tokens,
            session,
            api,
            in_flight: Arc::new(Mutex::new(())),
            refreshes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Refresh the current token unconditionally.
    pub async fn refresh(&self) -> Result<Token, RefreshError> {
        let _guard = self.in_flight.lock().await;
        match self.tokens.get().await {
            Some(current) => self.run_refresh(current).await,
            None => self.fail(RefreshError::NoToken).await,
        }
    }

    /// Refresh after a request carrying `failed_with` was rejected.
    ///
    /// Returns the token the request should be retried with. If the stored
    /// token is no longer the one the request carried, that newer token is
    /// returned without contacting the server.
    pub async fn refresh_after_failure(&self, failed_with: Option<&Token>) -> Result<Token, RefreshError> {
        let _guard = self.in_flight.lock().await;

        let Some(current) = self.tokens.get().await else {
            return self.fail(RefreshError::NoToken).await;
        };

        if failed_with != Some(&current) {
            tracing::debug!(token = %current.preview(), "Token already replaced, reusing it");
            return Ok(current);
        }

        self.run_refresh(current).await
    }

    /// Number of refresh calls issued to the server.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    async fn run_refresh(&self, current: Token) -> Result<Token, RefreshError> {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        tracing::info!(token = %current.preview(), "Refreshing session token");

        match self.api.refresh(&current).await {
            Ok(payload) => {
                let token = payload.token.clone();
                if self.session.renew(&current, payload.user, payload.token).await {
                    tracing::info!(token = %token.preview(), "Session token refreshed");
                    return Ok(token);
                }
                // Logged out or logged in again while the call was in flight
                match self.tokens.get().await {
                    Some(newer) => Ok(newer),
                    None => Err(RefreshError::NoToken),
                }
            }
            Err(SessionError::Transport(e)) => self.fail(RefreshError::Transport(e.to_string())).await,
            Err(e) => self.fail(RefreshError::Rejected(e.to_string())).await,
        }
    }

    async fn fail(&self, err: RefreshError) -> Result<Token, RefreshError> {
        tracing::warn!(error = %err, "Token refresh failed, clearing session");
        self.session.logout().await;
        Err(err)
    }
}
