//! Startup validation of a persisted token.
//!
//! A token found in storage is not trusted until the server confirms it with
//! the current profile. Until the validator reaches [`BootstrapState::Valid`]
//! or [`BootstrapState::Invalid`], protected screens must stay locked.

use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::api::AuthApi;
use crate::session::SessionContext;
use crate::store::TokenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapState {
    #[default]
    Uninitialized,
    Validating,
    Valid,
    Invalid,
}

impl BootstrapState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BootstrapState::Valid | BootstrapState::Invalid)
    }

    pub fn can_transition_to(self, next: BootstrapState) -> bool {
        use BootstrapState::*;
        matches!(
            (self, next),
            (Uninitialized, Validating) | (Uninitialized, Invalid) | (Validating, Valid) | (Validating, Invalid)
        )
    }
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapState::Uninitialized => "uninitialized",
            BootstrapState::Validating => "validating",
            BootstrapState::Valid => "valid",
            BootstrapState::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

pub struct BootstrapValidator {
    tokens: TokenStore,
    session: Arc<dyn SessionContext>,
    api: AuthApi,
    state: watch::Sender<BootstrapState>,
    run_lock: Mutex<()>,
}

impl BootstrapValidator {
    pub fn new(tokens: TokenStore, session: Arc<dyn SessionContext>, api: AuthApi) -> Self {
        let (state, _) = watch::channel(BootstrapState::Uninitialized);
        Self {
            tokens,
            session,
            api,
            state,
            run_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> BootstrapState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BootstrapState> {
        self.state.subscribe()
    }

    /// Drive the validator to a terminal state and return it.
    ///
    /// Concurrent and repeated calls share the first run's result.
    pub async fn run(&self) -> BootstrapState {
        let _guard = self.run_lock.lock().await;

        let current = self.state();
        if current.is_terminal() {
            return current;
        }

        let Some(token) = self.tokens.get().await else {
            tracing::info!("No stored token, bootstrap skipped");
            self.transition(BootstrapState::Invalid);
            return BootstrapState::Invalid;
        };

        self.transition(BootstrapState::Validating);
        self.session.set_loading(true);
        tracing::debug!(token = %token.preview(), "Validating stored token");

        let outcome = match self.api.me(&token).await {
            Ok(Some(user)) => {
                tracing::info!(user_id = %user.id, "Stored token accepted");
                self.session.login(user, token).await;
                BootstrapState::Valid
            }
            Ok(None) => {
                tracing::info!("Server returned no user for stored token");
                self.session.logout().await;
                BootstrapState::Invalid
            }
            Err(e) => {
                tracing::info!(error = %e, "Stored token rejected");
                self.session.logout().await;
                BootstrapState::Invalid
            }
        };

        self.session.set_loading(false);
        self.transition(outcome);
        outcome
    }

    fn transition(&self, next: BootstrapState) {
        self.state.send_modify(|state| {
            debug_assert!(state.can_transition_to(next), "{} -> {}", state, next);
            tracing::debug!(from = %state, to = %next, "Bootstrap transition");
            *state = next;
        });
    }
}
