//! Transport stage: the actual network exchange with the GraphQL server.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::TransportError;
use crate::models::GraphQlResponse;
use crate::pipeline::PendingRequest;

/// Raw server answer, before classification.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed GraphQL body, when the server sent one.
    pub body: Option<GraphQlResponse>,
}

impl TransportResponse {
    pub fn ok(body: GraphQlResponse) -> Self {
        Self {
            status: 200,
            body: Some(body),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a pending request to the server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &PendingRequest) -> Result<TransportResponse, TransportError>;
}

/// HTTP transport for the GraphQL endpoint.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new(config: &ApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_default();

        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &PendingRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .json(&request.operation.to_request());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        tracing::debug!(
            request_id = %request.id,
            operation = %request.operation.name,
            attempt = request.attempt,
            authenticated = request.credential.is_some(),
            "Sending GraphQL request"
        );

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str::<GraphQlResponse>(&text) {
            Ok(body) => Ok(TransportResponse {
                status: status.as_u16(),
                body: Some(body),
            }),
            // A bare 401 still needs to reach the error-detection stage
            Err(_) if status == StatusCode::UNAUTHORIZED => Ok(TransportResponse {
                status: status.as_u16(),
                body: None,
            }),
            Err(_) if !status.is_success() => Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate(&text, 512),
            }),
            Err(_) => Ok(TransportResponse {
                status: status.as_u16(),
                body: None,
            }),
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
