//! Error types for the session core.
//!
//! The taxonomy follows how failures are handled: only authentication
//! failures are intercepted (one shared refresh, one retry); everything else
//! reaches the caller.

use thiserror::Error;

use crate::models::GraphQlError;

/// Errors surfaced to callers of the session core.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    /// No response reached the server (network down, timeout).
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The server rejected the credential for this call but the session was
    /// left in place: the rejection came back on the retried call, refresh is
    /// disabled, or a direct auth call was refused.
    #[error("Authentication failure: {0}")]
    Authentication(String),

    /// The refresh after an authentication failure did not succeed. The
    /// session has been cleared and the user must log in again.
    #[error("Session expired, please log in again: {0}")]
    SessionExpired(String),

    /// Well-formed business error reported by the server, passed through verbatim.
    #[error("Application error: {}", join_messages(.0))]
    Application(Vec<GraphQlError>),

    /// Persistence medium failure on a write path.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// The server answered with something that is not a usable GraphQL payload.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The operation requires a session and none exists.
    #[error("Not authenticated")]
    NotAuthenticated,
}

impl SessionError {
    /// Messages of an application error, in server order.
    pub fn application_messages(&self) -> Vec<&str> {
        match self {
            SessionError::Application(errors) => errors.iter().map(|e| e.message.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// True when the session is gone and the UI should route the user back
    /// to the login screen.
    pub fn requires_login(&self) -> bool {
        matches!(self, SessionError::SessionExpired(_) | SessionError::NotAuthenticated)
    }
}

/// Result type alias using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;

/// Transport-level failures.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Connection could not be established or was dropped.
    #[error("Connection error: {0}")]
    Connect(String),

    /// Request exceeded the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// Server answered with a non-success status and no GraphQL body.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Any other client-side failure while building or sending the request.
    #[error("Request error: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// Persistence failures of the key-value store.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Stored value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Why a token refresh did not produce a new token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// Nothing to refresh from.
    #[error("no token available to refresh")]
    NoToken,

    /// The server rejected the refresh call.
    #[error("refresh rejected: {0}")]
    Rejected(String),

    /// The refresh call never reached the server.
    #[error("refresh transport failure: {0}")]
    Transport(String),
}

impl From<RefreshError> for SessionError {
    fn from(err: RefreshError) -> Self {
        SessionError::SessionExpired(err.to_string())
    }
}

fn join_messages(errors: &[GraphQlError]) -> String {
    if errors.is_empty() {
        return "unknown error".to_string();
    }
    errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_error_display() {
        let err = SessionError::Application(vec![
            GraphQlError::new("Project name already exists"),
            GraphQlError::new("Description too long"),
        ]);
        assert_eq!(
            err.to_string(),
            "Application error: Project name already exists; Description too long"
        );
        assert_eq!(
            err.application_messages(),
            vec!["Project name already exists", "Description too long"]
        );
        assert!(!err.requires_login());
    }

    #[test]
    fn test_refresh_error_escalates_to_session_expired() {
        let err: SessionError = RefreshError::NoToken.into();
        assert!(matches!(err, SessionError::SessionExpired(_)));
        assert!(err.requires_login());
    }

    #[test]
    fn test_call_rejection_keeps_session() {
        let err = SessionError::Authentication("Not authenticated".to_string());
        assert!(!err.requires_login());
        assert!(SessionError::NotAuthenticated.requires_login());
    }

    #[test]
    fn test_transport_status_display() {
        let err = SessionError::from(TransportError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        });
        assert_eq!(err.to_string(), "Transport failure: HTTP 502: bad gateway");
    }
}
