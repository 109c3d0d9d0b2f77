//! Authentication calls against the server contract.
//!
//! These bypass the request pipeline: login and register run without a
//! credential, while `me` and `refreshToken` carry an explicit token and must
//! never trigger a refresh themselves.

use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::classify::AuthFailureClassifier;
use crate::error::{SessionError, SessionResult};
use crate::models::{AuthPayload, LoginInput, RegisterInput, Token, User};
use crate::operations::Operation;
use crate::pipeline::{decode, inspect, Outcome, PendingRequest};
use crate::transport::Transport;

#[derive(Clone)]
pub struct AuthApi {
    transport: Arc<dyn Transport>,
    classifier: AuthFailureClassifier,
}

impl AuthApi {
    pub fn new(transport: Arc<dyn Transport>, classifier: AuthFailureClassifier) -> Self {
        Self {
            transport,
            classifier,
        }
    }

    /// `login(input)` -> `{token, user}`
    pub async fn login(&self, input: &LoginInput) -> SessionResult<AuthPayload> {
        self.call(Operation::login(input), None).await
    }

    /// `register(input)` -> `{token, user}`
    pub async fn register(&self, input: &RegisterInput) -> SessionResult<AuthPayload> {
        self.call(Operation::register(input), None).await
    }

    /// `me` with the given bearer token. `Ok(None)` when the server answers
    /// with a null user.
    pub async fn me(&self, token: &Token) -> SessionResult<Option<User>> {
        self.call(Operation::me(), Some(token)).await
    }

    /// `refreshToken` carrying the current (possibly expired) token.
    pub async fn refresh(&self, token: &Token) -> SessionResult<AuthPayload> {
        self.call(Operation::refresh_token(), Some(token)).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: Operation,
        credential: Option<&Token>,
    ) -> SessionResult<T> {
        let request = PendingRequest::new(operation).with_credential(credential.cloned());
        let response = self.transport.send(&request).await?;

        match inspect(&self.classifier, &request.operation, response) {
            Outcome::Data(value) => decode(&request.operation, value),
            Outcome::AuthRejected(reason) => Err(SessionError::Authentication(reason)),
            Outcome::Failed(err) => Err(err),
        }
    }
}
