//! Default HTTP transport backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;

use super::{HttpMethod, Transport, TransportError, TransportRequest, TransportResponse};

/// Marker hyper emits when the peer closes an idle connection mid-request.
const CONNECTION_CLOSED_MARKER: &str = "connection closed before message completed";

/// The default transport: a shared `reqwest` client with keep-alive
/// connections. TLS verification and dial timeouts are configured at build
/// time; per-call timeouts ride on each request.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with default settings.
    pub fn new() -> Result<Self, TransportError> {
        HttpTransportBuilder::new().build()
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    fn classify(err: reqwest::Error, timeout: Option<Duration>) -> TransportError {
        if err.is_timeout() {
            return TransportError::Timeout(timeout.unwrap_or_default());
        }

        let rendered = err.to_string();
        if rendered.contains(CONNECTION_CLOSED_MARKER) {
            return TransportError::ConnectionClosed;
        }

        TransportError::Other(rendered)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn round_trip(
        &self,
        request: &TransportRequest,
        timeout: Option<Duration>,
    ) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(Self::method(request.method), &request.uri)
            .body(request.body.clone());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::classify(e, timeout))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::classify(e, timeout))?;

        Ok(TransportResponse {
            status,
            headers,
            body: BytesMut::from(&body[..]),
        })
    }
}

/// Builder for [`HttpTransport`].
#[derive(Debug, Clone, Default)]
pub struct HttpTransportBuilder {
    dial_timeout: Option<Duration>,
    max_conns_per_host: Option<usize>,
    accept_invalid_certs: bool,
}

impl HttpTransportBuilder {
    /// Creates a new transport builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the TCP connect timeout.
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = Some(timeout);
        self
    }

    /// Caps idle connections kept per host.
    ///
    /// This is the transport's own pool limit, independent of the
    /// dispatcher's advisory connection semaphore.
    pub fn max_conns_per_host(mut self, max: usize) -> Self {
        self.max_conns_per_host = Some(max);
        self
    }

    /// Skips TLS certificate verification (clusters with self-signed certs).
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Builds the transport.
    pub fn build(self) -> Result<HttpTransport, TransportError> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = self.dial_timeout {
            builder = builder.connect_timeout(timeout);
        }

        if let Some(max) = self.max_conns_per_host {
            builder = builder.pool_max_idle_per_host(max);
        }

        if self.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(HttpTransport { client })
    }
}
