//! Error types for v3io operations.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

/// HTTP status code the service uses to reject a failed condition expression.
const STATUS_PRECONDITION_FAILED: u16 = 412;

/// Snapshot of an HTTP response carried inside a status error.
///
/// When a caller sets `include_response_in_error`, ownership of the response
/// buffer transfers into the error value instead of returning to the pool;
/// the caller then owns its release (dropping it is sufficient).
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    /// HTTP status code of the failed response.
    pub status: u16,
    /// Response headers as received.
    pub headers: Vec<(String, String)>,
    /// The raw response body.
    pub body: Bytes,
}

/// The main error type for v3io operations.
///
/// Covers input validation, transport failures, HTTP status errors and
/// decode failures, plus the consumer-group session-loss condition.
#[derive(Debug, Error, Clone)]
pub enum V3ioError {
    /// The container name was empty; rejected before any network I/O.
    #[error("container name must not be empty")]
    EmptyContainer,

    /// An attribute value or envelope had an unsupported shape.
    #[error("malformed attribute: {0}")]
    MalformedAttribute(String),

    /// A network-level failure other than the retryable connection-closed class.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer closed the connection between requests.
    ///
    /// This is the single transient class the dispatcher retries in place.
    #[error("connection closed by peer between requests")]
    ConnectionClosed,

    /// The per-call timeout elapsed during the HTTP round-trip.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The service answered with a non-2xx status.
    ///
    /// The message has the session-key header redacted. The response buffer
    /// is attached only when the input requested response-in-error.
    #[error("unexpected status {status}: {message}")]
    HttpStatus {
        /// Numeric HTTP status code.
        status: u16,
        /// Human-readable description with credentials redacted.
        message: String,
        /// The response, when ownership was transferred into the error.
        response: Option<Box<ErrorResponse>>,
    },

    /// A JSON or binary-frame payload failed to parse.
    #[error("decode error: {0}")]
    Decode(String),

    /// The caller's cancellation token fired before or during the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The consumer-group session is no longer usable.
    ///
    /// Raised when state CAS retries are exhausted; terminates all claims.
    #[error("consumer session lost: {0}")]
    SessionLost(String),

    /// I/O errors from the standard library (wrapped in `Arc` for `Clone`).
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),
}

impl From<io::Error> for V3ioError {
    fn from(err: io::Error) -> Self {
        V3ioError::Io(Arc::new(err))
    }
}

impl V3ioError {
    /// Creates a status error without an attached response.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            message: message.into(),
            response: None,
        }
    }

    /// Returns the HTTP status code if this is a status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` for the connection-closed transient class.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }

    /// Returns `true` if the service rejected a condition expression.
    pub fn is_precondition_failed(&self) -> bool {
        self.status_code() == Some(STATUS_PRECONDITION_FAILED)
    }

    /// Takes the attached response out of a status error, if any.
    pub fn take_response(&mut self) -> Option<Box<ErrorResponse>> {
        match self {
            Self::HttpStatus { response, .. } => response.take(),
            _ => None,
        }
    }
}

/// A specialized `Result` type for v3io operations.
pub type Result<T> = std::result::Result<T, V3ioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_container_display() {
        let err = V3ioError::EmptyContainer;
        assert_eq!(err.to_string(), "container name must not be empty");
    }

    #[test]
    fn test_status_error_display() {
        let err = V3ioError::status(502, "bad gateway");
        assert_eq!(err.to_string(), "unexpected status 502: bad gateway");
        assert_eq!(err.status_code(), Some(502));
    }

    #[test]
    fn test_precondition_detection() {
        assert!(V3ioError::status(412, "condition rejected").is_precondition_failed());
        assert!(!V3ioError::status(400, "bad request").is_precondition_failed());
        assert!(!V3ioError::Cancelled.is_precondition_failed());
    }

    #[test]
    fn test_connection_closed_class() {
        assert!(V3ioError::ConnectionClosed.is_connection_closed());
        assert!(!V3ioError::Transport("reset".into()).is_connection_closed());
        assert!(!V3ioError::Timeout("5s".into()).is_connection_closed());
    }

    #[test]
    fn test_take_response_transfers_ownership() {
        let mut err = V3ioError::HttpStatus {
            status: 409,
            message: "conflict".into(),
            response: Some(Box::new(ErrorResponse {
                status: 409,
                headers: vec![],
                body: Bytes::from_static(b"details"),
            })),
        };

        let response = err.take_response().expect("response attached");
        assert_eq!(response.status, 409);
        assert_eq!(&response.body[..], b"details");
        assert!(err.take_response().is_none());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        let err: V3ioError = io_err.into();
        assert!(matches!(err, V3ioError::Io(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_error_is_send_sync_clone() {
        fn assert_send_sync_clone<T: Send + Sync + Clone>() {}
        assert_send_sync_clone::<V3ioError>();
    }
}
