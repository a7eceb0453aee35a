//! Error types for the request forwarder.

use thiserror::Error;

/// Result type alias for the forwarder.
pub type Result<T> = std::result::Result<T, ForwarderError>;

/// Errors that stop the forwarder.
#[derive(Error, Debug)]
pub enum ForwarderError {
    /// Invalid or missing command-line configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The service account file could not be read or parsed.
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// The token endpoint rejected the service account.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Transport-level failure talking to Firestore or the token endpoint.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Firestore answered with a non-success status.
    #[error("Firestore API error: {status} - {message}")]
    FirestoreApi { status: u16, message: String },

    /// A document carried a value the decoder does not understand.
    #[error("Invalid Firestore value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A forward failed without a response from the target.
    #[error("Forward of {doc_id} failed: {source}")]
    Forward {
        doc_id: String,
        #[source]
        source: ForwardError
    }
}

/// Failures of a single outbound forward.
#[derive(Error, Debug)]
pub enum ForwardError {
    /// The target answered with a non-success status.
    #[error("Request failed with status code {status}")]
    Status { status: u16, body: String },

    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Invalid target URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// No response was received.
    #[error("{0}")]
    Transport(#[from] reqwest::Error)
}

impl ForwardError {
    /// Whether the failure terminates the process.
    ///
    /// Only a failure that carried a response is survivable; everything else
    /// means the request never reached the target.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Status { .. })
    }

    /// Response body of the failed request, if one was received.
    pub fn response_body(&self) -> Option<&str> {
        if let Self::Status { body, .. } = self {
            Some(body)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = ForwarderError::Configuration("No Forwarder URL provided".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: No Forwarder URL provided"
        );
    }

    #[test]
    fn test_firestore_api_error_display() {
        let err = ForwarderError::FirestoreApi {
            status: 403,
            message: "PERMISSION_DENIED".to_string()
        };
        assert_eq!(err.to_string(), "Firestore API error: 403 - PERMISSION_DENIED");
    }

    #[test]
    fn test_status_failure_is_not_fatal() {
        let err = ForwardError::Status {
            status: 500,
            body: "boom".to_string()
        };
        assert!(!err.is_fatal());
        assert_eq!(err.response_body(), Some("boom"));
        assert_eq!(err.to_string(), "Request failed with status code 500");
    }

    #[test]
    fn test_request_construction_failures_are_fatal() {
        let err = ForwardError::InvalidMethod("GE T".to_string());
        assert!(err.is_fatal());
        assert_eq!(err.response_body(), None);

        let err = ForwardError::InvalidHeader {
            name: "bad header".to_string(),
            reason: "invalid HTTP header name".to_string()
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn test_forward_error_names_document() {
        let err = ForwarderError::Forward {
            doc_id: "abc".to_string(),
            source: ForwardError::InvalidMethod("GE T".to_string())
        };
        assert_eq!(err.to_string(), "Forward of abc failed: Invalid method: GE T");
    }
}
