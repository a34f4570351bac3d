//! The typed operation surface.
//!
//! `DataPlane` owns the transport, the advisory connection semaphore and the
//! response pool, and exposes one method per operation. Each method fixes the
//! HTTP method, path, headers and body encoding of its request; everything
//! funnels through [`DataPlane::send_request`].

mod container;
mod item;
mod object;
mod stream;

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Semaphore;
use v3io_core::{ErrorResponse, Result, V3ioError};

use crate::request::OperationInput;
use crate::response::{Response, ResponsePool};
use crate::transport::{HttpMethod, Transport, TransportError, TransportRequest, TransportResponse};
use crate::types::DataPlaneInput;
use crate::uri::build_request_uri;

/// Header naming the service function an envelope addresses.
pub(crate) const FUNCTION_HEADER: &str = "X-v3io-function";
/// Header carrying the tenant access key. Redacted from every error message.
pub(crate) const SESSION_KEY_HEADER: &str = "X-v3io-session-key";
/// Content type selecting the framed binary envelope for bulk reads.
pub(crate) const CONTENT_TYPE_CAPNP: &str = "application/octet-capnp";
/// Header carrying the item modification time on write responses.
pub(crate) const TRANSACTION_VERIFIER_HEADER: &str = "X-v3io-transaction-verifier";

/// Attempts for the connection-closed transient class, retried in place.
const MAX_CONNECTION_CLOSED_ATTEMPTS: u32 = 8;

/// Standard headers for an envelope addressed to a service function.
pub(crate) fn function_headers(function: &str) -> Vec<(String, String)> {
    vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        (FUNCTION_HEADER.to_string(), function.to_string()),
    ]
}

/// The synchronous operation layer.
pub struct DataPlane {
    transport: Arc<dyn Transport>,
    conn_semaphore: Option<Semaphore>,
    pool: ResponsePool,
}

impl DataPlane {
    /// Creates an operation layer over the given transport.
    ///
    /// `max_connections`, when set, bounds in-flight round-trips across all
    /// callers with a counting semaphore. The bound is advisory and
    /// independent of the transport's own per-host connection cap.
    pub fn new(transport: Arc<dyn Transport>, max_connections: Option<usize>) -> Self {
        Self {
            transport,
            conn_semaphore: max_connections.map(Semaphore::new),
            pool: ResponsePool::default(),
        }
    }

    /// The response pool backing this operation layer.
    pub fn pool(&self) -> &ResponsePool {
        &self.pool
    }

    /// Runs the operation matching the input variant.
    ///
    /// Body-less operations yield `None`; everything else yields the
    /// response the caller must release.
    pub async fn execute(&self, input: &OperationInput) -> Result<Option<Response>> {
        match input {
            OperationInput::GetContainers(input) => self.get_containers(input).await.map(Some),
            OperationInput::GetClusterMd(input) => self.get_cluster_md(input).await.map(Some),
            OperationInput::GetContainerContents(input) => {
                self.get_container_contents(input).await.map(Some)
            }
            OperationInput::GetObject(input) => self.get_object(input).await.map(Some),
            OperationInput::PutObject(input) => self.put_object(input).await.map(|_| None),
            OperationInput::UpdateObject(input) => self.update_object(input).await.map(|_| None),
            OperationInput::DeleteObject(input) => self.delete_object(input).await.map(|_| None),
            OperationInput::CheckPathExists(input) => {
                self.check_path_exists(input).await.map(|_| None)
            }
            OperationInput::PutOosObject(input) => self.put_oos_object(input).await.map(|_| None),
            OperationInput::GetItem(input) => self.get_item(input).await.map(Some),
            OperationInput::GetItems(input) => self.get_items(input).await.map(Some),
            OperationInput::PutItem(input) => self.put_item(input).await.map(Some),
            OperationInput::PutItems(input) => self.put_items(input).await.map(Some),
            OperationInput::UpdateItem(input) => self.update_item(input).await.map(Some),
            OperationInput::CreateStream(input) => self.create_stream(input).await.map(|_| None),
            OperationInput::DescribeStream(input) => self.describe_stream(input).await.map(Some),
            OperationInput::DeleteStream(input) => self.delete_stream(input).await.map(|_| None),
            OperationInput::SeekShard(input) => self.seek_shard(input).await.map(Some),
            OperationInput::PutRecords(input) => self.put_records(input).await.map(Some),
            OperationInput::GetRecords(input) => self.get_records(input).await.map(Some),
            OperationInput::PutChunk(input) => self.put_chunk(input).await.map(|_| None),
        }
    }

    /// Performs one operation round-trip.
    ///
    /// Validates the container name before any I/O, short-circuits on an
    /// already-cancelled token, holds a connection permit around the
    /// transport call, retries the connection-closed class in place, and
    /// maps non-2xx statuses into status errors with the session key
    /// redacted.
    pub(crate) async fn send_request(
        &self,
        input: &DataPlaneInput,
        method: HttpMethod,
        path: &str,
        query: &str,
        headers: Vec<(String, String)>,
        body: Bytes,
    ) -> Result<Response> {
        if input.container_name.is_empty() {
            return Err(V3ioError::EmptyContainer);
        }
        if input.cancel.is_cancelled() {
            return Err(V3ioError::Cancelled);
        }

        let uri = build_request_uri(&input.url, &input.container_name, query, path)?;

        let mut request_headers = Vec::with_capacity(headers.len() + 2);
        if let Some(token) = &input.authentication_token {
            request_headers.push(("Authorization".to_string(), token.clone()));
        }
        if let Some(access_key) = &input.access_key {
            request_headers.push((SESSION_KEY_HEADER.to_string(), access_key.clone()));
        }
        request_headers.extend(headers);

        let request = TransportRequest {
            method,
            uri: uri.to_string(),
            headers: request_headers,
            body,
        };

        let outcome = {
            let _permit = match &self.conn_semaphore {
                Some(semaphore) => Some(semaphore.acquire().await.map_err(|_| {
                    V3ioError::Transport("connection semaphore closed".to_string())
                })?),
                None => None,
            };

            let mut attempt = 1;
            loop {
                let round_trip = self.transport.round_trip(&request, input.timeout);
                let result = tokio::select! {
                    biased;
                    _ = input.cancel.cancelled() => return Err(V3ioError::Cancelled),
                    result = round_trip => result,
                };

                match result {
                    Err(TransportError::ConnectionClosed)
                        if attempt < MAX_CONNECTION_CLOSED_ATTEMPTS =>
                    {
                        tracing::debug!(attempt, uri = %request.uri, "connection closed by peer, retrying");
                        attempt += 1;
                    }
                    other => break other,
                }
            }
        };

        let http = outcome.map_err(V3ioError::from)?;

        if !(200..300).contains(&http.status) {
            return Err(self.status_error(input, &request, http));
        }

        Ok(self.pool.wrap(http))
    }

    fn status_error(
        &self,
        input: &DataPlaneInput,
        request: &TransportRequest,
        http: TransportResponse,
    ) -> V3ioError {
        let status = http.status;
        let message = format!(
            "expected a 2xx response status code, got {status}\nresponse: {}\nrequest details:\n{}",
            String::from_utf8_lossy(&http.body),
            sanitized_request(request),
        );

        if input.include_response_in_error {
            V3ioError::HttpStatus {
                status,
                message,
                response: Some(Box::new(ErrorResponse {
                    status,
                    headers: http.headers,
                    body: http.body.freeze(),
                })),
            }
        } else {
            self.pool.release_shell(http);
            V3ioError::HttpStatus {
                status,
                message,
                response: None,
            }
        }
    }
}

/// Renders a request for inclusion in an error message, with the session
/// key replaced by a placeholder.
fn sanitized_request(request: &TransportRequest) -> String {
    let mut rendered = format!("{} {}", request.method, request.uri);
    for (name, value) in &request.headers {
        let value = if name.eq_ignore_ascii_case(SESSION_KEY_HEADER) {
            "SANITIZED"
        } else {
            value.as_str()
        };
        rendered.push('\n');
        rendered.push_str(name);
        rendered.push_str(": ");
        rendered.push_str(value);
    }
    rendered
}
