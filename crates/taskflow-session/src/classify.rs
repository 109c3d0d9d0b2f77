//! Failure classification for the error-detection stage.
//!
//! Recognizing a rejected credential depends on a contract with the backend:
//! a structured error code where the server provides one, otherwise the
//! wording of its error messages. All of that lives in
//! [`AuthFailureClassifier::is_authentication_failure`].

use crate::config::AuthConfig;
use crate::models::GraphQlError;

/// Messages the TaskFlow backend uses when it rejects a credential.
pub const DEFAULT_AUTH_FAILURE_MESSAGES: &[&str] = &[
    "Not authenticated",
    "Could not validate credentials",
    "Authentication required",
];

const HTTP_UNAUTHORIZED: u16 = 401;

/// Classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No response reached the server.
    Transport,
    /// The server rejected the credential.
    Authentication,
    /// Well-formed business error.
    Application,
}

/// Decides whether a server response means "credential rejected".
#[derive(Debug, Clone)]
pub struct AuthFailureClassifier {
    code: Option<String>,
    /// Lowercased message substrings.
    messages: Vec<String>,
}

impl Default for AuthFailureClassifier {
    fn default() -> Self {
        Self::from_config(&AuthConfig::default())
    }
}

impl AuthFailureClassifier {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            code: Some(config.failure_code.clone()).filter(|c| !c.is_empty()),
            messages: config
                .failure_messages
                .iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// True when the HTTP status or any GraphQL error marks the credential
    /// as rejected.
    pub fn is_authentication_failure(&self, status: Option<u16>, errors: &[GraphQlError]) -> bool {
        if status == Some(HTTP_UNAUTHORIZED) {
            return true;
        }
        errors.iter().any(|error| self.is_auth_error(error))
    }

    /// Classify a response that carried GraphQL errors.
    pub fn classify(&self, status: Option<u16>, errors: &[GraphQlError]) -> FailureKind {
        if self.is_authentication_failure(status, errors) {
            FailureKind::Authentication
        } else {
            FailureKind::Application
        }
    }

    fn is_auth_error(&self, error: &GraphQlError) -> bool {
        if let (Some(expected), Some(code)) = (self.code.as_deref(), error.code()) {
            if code.eq_ignore_ascii_case(expected) {
                return true;
            }
        }
        let message = error.message.to_lowercase();
        self.messages.iter().any(|needle| message.contains(needle.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_code(message: &str, code: &str) -> GraphQlError {
        let mut error = GraphQlError::new(message);
        error.extensions = Some(serde_json::json!({ "code": code }));
        error
    }

    #[test]
    fn test_unauthorized_status() {
        let classifier = AuthFailureClassifier::default();
        assert!(classifier.is_authentication_failure(Some(401), &[]));
        assert!(!classifier.is_authentication_failure(Some(403), &[]));
        assert!(!classifier.is_authentication_failure(None, &[]));
    }

    #[test]
    fn test_backend_messages() {
        let classifier = AuthFailureClassifier::default();
        for message in [
            "Not authenticated",
            "401: Could not validate credentials",
            "authentication required",
        ] {
            assert!(
                classifier.is_authentication_failure(Some(200), &[GraphQlError::new(message)]),
                "expected auth failure for {}",
                message
            );
        }
    }

    #[test]
    fn test_structured_code_wins_over_wording() {
        let classifier = AuthFailureClassifier::default();
        let error = with_code("Session is no longer valid", "UNAUTHENTICATED");
        assert!(classifier.is_authentication_failure(Some(200), &[error]));

        let error = with_code("Project name already exists", "BAD_USER_INPUT");
        assert!(!classifier.is_authentication_failure(Some(200), &[error]));
    }

    #[test]
    fn test_application_errors_pass_through() {
        let classifier = AuthFailureClassifier::default();
        let errors = vec![
            GraphQlError::new("Project name already exists"),
            GraphQlError::new("Access denied"),
        ];
        assert_eq!(classifier.classify(Some(200), &errors), FailureKind::Application);
    }

    #[test]
    fn test_any_error_in_batch_marks_auth_failure() {
        let classifier = AuthFailureClassifier::default();
        let errors = vec![
            GraphQlError::new("Task not found"),
            GraphQlError::new("Not authenticated"),
        ];
        assert_eq!(classifier.classify(Some(200), &errors), FailureKind::Authentication);
    }

    #[test]
    fn test_custom_messages() {
        let config = AuthConfig {
            failure_messages: vec!["Signature has expired".to_string(), "  ".to_string()],
            failure_code: String::new(),
            refresh_on_failure: true,
        };
        let classifier = AuthFailureClassifier::from_config(&config);

        assert!(classifier.is_authentication_failure(None, &[GraphQlError::new("signature has expired")]));
        assert!(!classifier.is_authentication_failure(None, &[GraphQlError::new("Not authenticated")]));
        assert!(!classifier.is_authentication_failure(None, &[with_code("x", "UNAUTHENTICATED")]));
    }
}
