//! Request pipeline.
//!
//! Every outgoing call passes through three stages, closest to the caller
//! first:
//!
//! 1. error detection ([`RequestPipeline::execute`]) - classifies the outcome
//!    and hands authentication failures to the [`RefreshCoordinator`]
//! 2. auth header injection ([`AuthHeaderLink`]) - attaches the bearer token
//! 3. transport ([`TransportLink`]) - the network exchange
//!
//! Stages 2 and 3 are [`Link`]s and compose by wrapping one another.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::classify::{AuthFailureClassifier, FailureKind};
use crate::error::{SessionError, SessionResult, TransportError};
use crate::models::Token;
use crate::operations::Operation;
use crate::refresh::RefreshCoordinator;
use crate::store::TokenStore;
use crate::transport::{Transport, TransportResponse};

pub const AUTHORIZATION: &str = "authorization";

/// Per-call context, alive until the call completes or is abandoned.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Request identifier for log correlation.
    pub id: String,
    pub operation: Operation,
    pub headers: BTreeMap<String, String>,
    /// Credential attached to the current attempt.
    pub credential: Option<Token>,
    /// 0 for the original call, 1 for the retry after a refresh.
    pub attempt: u32,
}

impl PendingRequest {
    pub fn new(operation: Operation) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation,
            headers: BTreeMap::new(),
            credential: None,
            attempt: 0,
        }
    }

    /// Attach (or detach) the bearer credential.
    pub fn set_credential(&mut self, token: Option<Token>) {
        match &token {
            Some(t) => {
                self.headers.insert(AUTHORIZATION.to_string(), t.bearer());
            }
            None => {
                self.headers.remove(AUTHORIZATION);
            }
        }
        self.credential = token;
    }

    pub fn with_credential(mut self, token: Option<Token>) -> Self {
        self.set_credential(token);
        self
    }
}

/// A composable inner stage of the pipeline.
#[async_trait]
pub trait Link: Send + Sync {
    async fn forward(&self, request: &mut PendingRequest) -> Result<TransportResponse, TransportError>;
}

/// Terminal stage: hands the request to a [`Transport`].
pub struct TransportLink {
    transport: Arc<dyn Transport>,
}

impl TransportLink {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Link for TransportLink {
    async fn forward(&self, request: &mut PendingRequest) -> Result<TransportResponse, TransportError> {
        self.transport.send(request).await
    }
}

/// Reads the token store right before transport and attaches the bearer
/// credential. A credential already set on the request (the retry after a
/// refresh) is kept. No token means the call goes out unauthenticated.
pub struct AuthHeaderLink {
    tokens: TokenStore,
    next: Arc<dyn Link>,
}

impl AuthHeaderLink {
    pub fn new(tokens: TokenStore, next: Arc<dyn Link>) -> Self {
        Self { tokens, next }
    }
}

#[async_trait]
impl Link for AuthHeaderLink {
    async fn forward(&self, request: &mut PendingRequest) -> Result<TransportResponse, TransportError> {
        if request.credential.is_none() {
            let token = self.tokens.get().await;
            if token.is_none() {
                tracing::debug!(
                    request_id = %request.id,
                    operation = %request.operation.name,
                    "No token stored, sending unauthenticated"
                );
            }
            request.set_credential(token);
        }
        self.next.forward(request).await
    }
}

/// What the error-detection stage made of a server answer.
#[derive(Debug)]
pub(crate) enum Outcome {
    Data(Value),
    AuthRejected(String),
    Failed(SessionError),
}

/// Classify a server answer for `operation`.
pub(crate) fn inspect(
    classifier: &AuthFailureClassifier,
    operation: &Operation,
    response: TransportResponse,
) -> Outcome {
    let status = response.status;
    let Some(body) = response.body else {
        if classifier.is_authentication_failure(Some(status), &[]) {
            return Outcome::AuthRejected(format!("HTTP {}", status));
        }
        return Outcome::Failed(SessionError::InvalidResponse(format!(
            "HTTP {} without a GraphQL body",
            status
        )));
    };

    let errors = body.errors();
    if !errors.is_empty() || !response_ok(status) {
        for error in errors {
            tracing::warn!(
                operation = %operation.name,
                message = %error.message,
                path = ?error.path,
                "GraphQL error"
            );
        }
        return match classifier.classify(Some(status), errors) {
            FailureKind::Authentication => Outcome::AuthRejected(
                errors
                    .first()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| format!("HTTP {}", status)),
            ),
            _ if errors.is_empty() => Outcome::Failed(SessionError::Transport(TransportError::Status {
                status,
                body: "GraphQL response without data or errors".to_string(),
            })),
            _ => Outcome::Failed(SessionError::Application(errors.to_vec())),
        };
    }

    let Some(data) = body.data else {
        return Outcome::Failed(SessionError::InvalidResponse(format!(
            "{}: response has no data",
            operation.name
        )));
    };

    match &operation.root_field {
        Some(field) => match data.get(field) {
            Some(value) => Outcome::Data(value.clone()),
            None => Outcome::Failed(SessionError::InvalidResponse(format!(
                "{}: missing field '{}'",
                operation.name, field
            ))),
        },
        None => Outcome::Data(data),
    }
}

fn response_ok(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Deserialize an operation result.
pub(crate) fn decode<T: DeserializeOwned>(operation: &Operation, value: Value) -> SessionResult<T> {
    serde_json::from_value(value)
        .map_err(|e| SessionError::InvalidResponse(format!("{}: {}", operation.name, e)))
}

/// The pipeline head: error detection plus the inner link chain.
#[derive(Clone)]
pub struct RequestPipeline {
    head: Arc<dyn Link>,
    classifier: AuthFailureClassifier,
    refresher: Option<RefreshCoordinator>,
}

impl RequestPipeline {
    /// Standard chain: auth header injection over the given transport.
    pub fn new(
        tokens: TokenStore,
        transport: Arc<dyn Transport>,
        classifier: AuthFailureClassifier,
        refresher: Option<RefreshCoordinator>,
    ) -> Self {
        let transport_link: Arc<dyn Link> = Arc::new(TransportLink::new(transport));
        let head: Arc<dyn Link> = Arc::new(AuthHeaderLink::new(tokens, transport_link));
        Self::with_head(head, classifier, refresher)
    }

    /// Pipeline over a custom link chain.
    pub fn with_head(
        head: Arc<dyn Link>,
        classifier: AuthFailureClassifier,
        refresher: Option<RefreshCoordinator>,
    ) -> Self {
        Self {
            head,
            classifier,
            refresher,
        }
    }

    /// Execute an operation and return its result value.
    ///
    /// An authentication failure triggers the shared refresh and at most one
    /// retry with the refreshed token. Every other failure is returned as is.
    pub async fn execute(&self, operation: Operation) -> SessionResult<Value> {
        let mut request = PendingRequest::new(operation);

        let reason = match self.attempt(&mut request).await {
            Outcome::Data(value) => return Ok(value),
            Outcome::Failed(err) => return Err(err),
            Outcome::AuthRejected(reason) => reason,
        };

        let Some(refresher) = &self.refresher else {
            return Err(SessionError::Authentication(reason));
        };

        tracing::info!(
            request_id = %request.id,
            operation = %request.operation.name,
            reason = %reason,
            "Authentication failure, refreshing token"
        );

        let stale = request.credential.clone();
        let token = refresher.refresh_after_failure(stale.as_ref()).await?;

        request.set_credential(Some(token));
        request.attempt += 1;

        match self.attempt(&mut request).await {
            Outcome::Data(value) => Ok(value),
            Outcome::Failed(err) => Err(err),
            Outcome::AuthRejected(reason) => {
                tracing::warn!(
                    request_id = %request.id,
                    operation = %request.operation.name,
                    "Retried request rejected after refresh"
                );
                Err(SessionError::Authentication(reason))
            }
        }
    }

    /// Execute an operation and deserialize its result.
    pub async fn execute_as<T: DeserializeOwned>(&self, operation: Operation) -> SessionResult<T> {
        let op = operation.clone();
        let value = self.execute(operation).await?;
        decode(&op, value)
    }

    async fn attempt(&self, request: &mut PendingRequest) -> Outcome {
        match self.head.forward(request).await {
            Ok(response) => inspect(&self.classifier, &request.operation, response),
            Err(e) => {
                tracing::warn!(
                    request_id = %request.id,
                    operation = %request.operation.name,
                    error = %e,
                    "Transport failure"
                );
                Outcome::Failed(SessionError::Transport(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GraphQlError, GraphQlResponse};

    fn response(data: Option<Value>, errors: Vec<GraphQlError>) -> TransportResponse {
        TransportResponse::ok(GraphQlResponse {
            data,
            errors: if errors.is_empty() { None } else { Some(errors) },
        })
    }

    #[test]
    fn test_set_credential_updates_header() {
        let mut request = PendingRequest::new(Operation::me());
        request.set_credential(Some(Token::new("tok-a")));
        assert_eq!(request.headers.get(AUTHORIZATION).map(String::as_str), Some("Bearer tok-a"));

        request.set_credential(None);
        assert!(request.headers.get(AUTHORIZATION).is_none());
        assert!(request.credential.is_none());
    }

    #[test]
    fn test_inspect_extracts_root_field() {
        let classifier = AuthFailureClassifier::default();
        let op = Operation::projects();
        let outcome = inspect(
            &classifier,
            &op,
            response(Some(serde_json::json!({"projects": [{"id": "p-1", "name": "Alpha"}]})), vec![]),
        );
        match outcome {
            Outcome::Data(value) => assert_eq!(value[0]["name"], "Alpha"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_inspect_missing_root_field() {
        let classifier = AuthFailureClassifier::default();
        let outcome = inspect(
            &classifier,
            &Operation::projects(),
            response(Some(serde_json::json!({})), vec![]),
        );
        assert!(matches!(outcome, Outcome::Failed(SessionError::InvalidResponse(_))));
    }

    #[test]
    fn test_inspect_auth_rejection() {
        let classifier = AuthFailureClassifier::default();
        let outcome = inspect(
            &classifier,
            &Operation::projects(),
            response(None, vec![GraphQlError::new("Not authenticated")]),
        );
        assert!(matches!(outcome, Outcome::AuthRejected(reason) if reason == "Not authenticated"));

        let outcome = inspect(
            &classifier,
            &Operation::projects(),
            TransportResponse { status: 401, body: None },
        );
        assert!(matches!(outcome, Outcome::AuthRejected(_)));
    }

    #[test]
    fn test_inspect_application_error_verbatim() {
        let classifier = AuthFailureClassifier::default();
        let mut error = GraphQlError::new("Project name already exists");
        error.path = Some(vec![serde_json::json!("createProject")]);

        let outcome = inspect(
            &classifier,
            &Operation::projects(),
            response(Some(serde_json::json!({"createProject": null})), vec![error.clone()]),
        );
        match outcome {
            Outcome::Failed(SessionError::Application(errors)) => assert_eq!(errors, vec![error]),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_inspect_non_json_success() {
        let classifier = AuthFailureClassifier::default();
        let outcome = inspect(
            &classifier,
            &Operation::me(),
            TransportResponse { status: 200, body: None },
        );
        assert!(matches!(outcome, Outcome::Failed(SessionError::InvalidResponse(_))));
    }
}
