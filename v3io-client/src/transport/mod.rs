//! Pluggable HTTP transport.
//!
//! The dispatcher is transport-agnostic: anything that can perform a single
//! HTTP round-trip with a per-call timeout plugs in through the [`Transport`]
//! trait. Connection pooling, TLS and dial timeouts are the transport's own
//! business.

mod http;

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use v3io_core::V3ioError;

pub use http::{HttpTransport, HttpTransportBuilder};

/// HTTP methods used by the operation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// PUT
    Put,
    /// POST
    Post,
    /// DELETE
    Delete,
    /// HEAD
    Head,
}

impl HttpMethod {
    /// Returns the method name as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute request URI.
    pub uri: String,
    /// Request headers in send order.
    pub headers: Vec<(String, String)>,
    /// Request body; empty for body-less methods.
    pub body: Bytes,
}

/// A received HTTP response.
///
/// Instances are pooled; [`clear`](TransportResponse::clear) resets one for
/// reuse without giving back its buffer capacity.
#[derive(Debug, Default)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers as received.
    pub headers: Vec<(String, String)>,
    /// Response body buffer.
    pub body: BytesMut,
}

impl TransportResponse {
    /// Returns the first header with the given name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header_name, _)| header_name.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Resets this response for reuse.
    pub fn clear(&mut self) {
        self.status = 0;
        self.headers.clear();
        self.body.clear();
    }
}

/// Transport-level failures.
///
/// `ConnectionClosed` is the single class the dispatcher retries in place;
/// everything else surfaces immediately.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// The peer closed the connection between requests.
    ConnectionClosed,
    /// The per-call timeout elapsed.
    Timeout(Duration),
    /// Any other network-level failure.
    Other(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::ConnectionClosed => write!(f, "connection closed by peer"),
            TransportError::Timeout(d) => write!(f, "round-trip timed out after {d:?}"),
            TransportError::Other(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for V3ioError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionClosed => V3ioError::ConnectionClosed,
            TransportError::Timeout(d) => V3ioError::Timeout(format!("{d:?}")),
            TransportError::Other(message) => V3ioError::Transport(message),
        }
    }
}

/// A pluggable HTTP transport performing one round-trip per call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a single HTTP round-trip.
    ///
    /// When `timeout` is set it bounds the whole round-trip; it is
    /// independent of any cancellation the caller layers on top.
    async fn round_trip(
        &self,
        request: &TransportRequest,
        timeout: Option<Duration>,
    ) -> Result<TransportResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = TransportResponse {
            status: 200,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: BytesMut::new(),
        };
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("X-Missing"), None);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut response = TransportResponse {
            status: 200,
            headers: vec![("a".to_string(), "b".to_string())],
            body: BytesMut::from(&b"payload"[..]),
        };
        response.clear();
        assert_eq!(response.status, 0);
        assert!(response.headers.is_empty());
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_transport_error_mapping() {
        assert!(matches!(
            V3ioError::from(TransportError::ConnectionClosed),
            V3ioError::ConnectionClosed
        ));
        assert!(matches!(
            V3ioError::from(TransportError::Timeout(Duration::from_secs(1))),
            V3ioError::Timeout(_)
        ));
        assert!(matches!(
            V3ioError::from(TransportError::Other("boom".into())),
            V3ioError::Transport(_)
        ));
    }
}
