//! Pooled response containers.
//!
//! A [`Response`] owns the transport buffer it wraps. Dropping the response
//! returns the buffer to the pool, so release happens exactly once on every
//! exit path. A status error that carries the response never wraps it here
//! at all: its buffer stays out of pool management and the caller owns that
//! release.

use std::sync::{Arc, Mutex};

use v3io_core::V3ioError;

use crate::request::CallerContext;
use crate::transport::TransportResponse;
use crate::types::Output;

/// Upper bound of retained idle shells.
const DEFAULT_MAX_POOLED: usize = 1024;

/// A pool of reusable response shells.
#[derive(Debug, Clone)]
pub struct ResponsePool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    shells: Mutex<Vec<TransportResponse>>,
    max_pooled: usize,
}

impl ResponsePool {
    /// Creates a pool retaining at most `max_pooled` idle shells.
    pub fn new(max_pooled: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                shells: Mutex::new(Vec::new()),
                max_pooled,
            }),
        }
    }

    /// Number of idle shells currently pooled.
    pub fn idle(&self) -> usize {
        self.inner.shells.lock().expect("response pool poisoned").len()
    }

    /// Wraps a transport response into a pooled [`Response`].
    pub(crate) fn wrap(&self, http: TransportResponse) -> Response {
        Response {
            id: 0,
            context: None,
            error: None,
            output: None,
            http: Some(http),
            pool: self.clone(),
        }
    }

    /// Creates a response with no underlying buffer (body-less outcomes).
    pub(crate) fn empty(&self) -> Response {
        Response {
            id: 0,
            context: None,
            error: None,
            output: None,
            http: None,
            pool: self.clone(),
        }
    }

    pub(crate) fn release_shell(&self, mut shell: TransportResponse) {
        shell.clear();
        let mut shells = self.inner.shells.lock().expect("response pool poisoned");
        if shells.len() < self.inner.max_pooled {
            shells.push(shell);
        }
    }
}

impl Default for ResponsePool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POOLED)
    }
}

/// The outcome of one operation.
///
/// Synchronous operations return a `Response` directly; asynchronous ones
/// deliver it on the caller's response channel with `id`, `context` and
/// possibly `error` stamped by the dispatcher.
#[derive(Debug)]
pub struct Response {
    id: u64,
    context: Option<CallerContext>,
    error: Option<V3ioError>,
    output: Option<Output>,
    http: Option<TransportResponse>,
    pool: ResponsePool,
}

impl Response {
    /// The request ID this response answers; zero for direct calls.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The opaque context the caller attached at submission.
    pub fn context(&self) -> Option<&CallerContext> {
        self.context.as_ref()
    }

    /// The error of the operation, for responses delivered asynchronously.
    pub fn error(&self) -> Option<&V3ioError> {
        self.error.as_ref()
    }

    /// The parsed output, when the operation produces one.
    pub fn output(&self) -> Option<&Output> {
        self.output.as_ref()
    }

    /// Takes the parsed output out of the response.
    pub fn take_output(&mut self) -> Option<Output> {
        self.output.take()
    }

    /// HTTP status code of the underlying response.
    pub fn status(&self) -> Option<u16> {
        self.http.as_ref().map(|http| http.status)
    }

    /// The raw response body.
    pub fn body(&self) -> &[u8] {
        self.http.as_ref().map(|http| &http.body[..]).unwrap_or(&[])
    }

    /// Returns a response header, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.http.as_ref().and_then(|http| http.header(name))
    }

    /// Converts an asynchronously delivered response into a result.
    pub fn into_result(mut self) -> Result<Response, V3ioError> {
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }

    /// Releases the response buffer back to the pool.
    ///
    /// Dropping the response has the same effect; this method exists to make
    /// the release point explicit at call sites.
    pub fn release(self) {}

    pub(crate) fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    pub(crate) fn set_context(&mut self, context: Option<CallerContext>) {
        self.context = context;
    }

    pub(crate) fn set_error(&mut self, error: V3ioError) {
        self.error = Some(error);
    }

    pub(crate) fn set_output(&mut self, output: Output) {
        self.output = Some(output);
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        if let Some(shell) = self.http.take() {
            self.pool.release_shell(shell);
        }
    }
}
