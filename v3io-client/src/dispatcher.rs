//! Request dispatcher: a bounded worker pool over the operation layer.
//!
//! Callers have two families of calls for every operation. The direct family
//! lives on [`DataPlane`] and runs on the caller's task. The asynchronous
//! family enqueues an [`OperationInput`] here and returns a handle
//! immediately; a worker later runs the matching direct operation and
//! delivers the outcome on the caller-provided response channel.
//!
//! Workers are long-lived tasks consuming a shared queue. Completions are
//! unordered: callers needing ordering must serialise at submission.
//! Dropping the dispatcher closes the queue, which is the signal for
//! workers to exit.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use v3io_core::{Result, V3ioError};

use crate::config::ClientConfig;
use crate::ops::DataPlane;
use crate::request::{next_request_id, CallerContext, OperationInput, Request, RequestHandle};
use crate::response::Response;
use crate::transport::Transport;
use crate::types::{
    CheckPathExistsInput, CreateStreamInput, DeleteObjectInput, DeleteStreamInput,
    DescribeStreamInput, GetClusterMdInput, GetContainerContentsInput, GetContainersInput,
    GetItemInput, GetItemsInput, GetObjectInput, GetRecordsInput, PutChunkInput, PutItemInput,
    PutItemsInput, PutObjectInput, PutOosObjectInput, PutRecordsInput, SeekShardInput,
    UpdateItemInput, UpdateObjectInput,
};

macro_rules! submit_op {
    ($(#[$doc:meta])* $fn_name:ident, $variant:ident, $input:ty) => {
        $(#[$doc])*
        pub async fn $fn_name(
            &self,
            input: $input,
            context: Option<CallerContext>,
            response_tx: mpsc::Sender<Response>,
        ) -> Result<RequestHandle> {
            self.submit(OperationInput::$variant(input), context, response_tx)
                .await
        }
    };
}

/// The request dispatcher.
pub struct Dispatcher {
    data_plane: Arc<DataPlane>,
    request_tx: mpsc::Sender<Request>,
}

impl Dispatcher {
    /// Creates a dispatcher and spawns its workers.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let data_plane = Arc::new(DataPlane::new(transport, config.max_connections()));

        let (request_tx, request_rx) = mpsc::channel(config.request_queue_capacity());
        let request_rx = Arc::new(Mutex::new(request_rx));

        for worker_index in 0..config.num_workers() {
            tokio::spawn(worker_entry(
                worker_index,
                Arc::clone(&request_rx),
                Arc::clone(&data_plane),
            ));
        }

        Self {
            data_plane,
            request_tx,
        }
    }

    /// The operation layer, for the direct call family.
    pub fn data_plane(&self) -> &Arc<DataPlane> {
        &self.data_plane
    }

    /// Enqueues an operation and returns immediately with its handle.
    ///
    /// Blocks only when the request queue is full. An already-cancelled
    /// input short-circuits before enqueue.
    pub async fn submit(
        &self,
        input: OperationInput,
        context: Option<CallerContext>,
        response_tx: mpsc::Sender<Response>,
    ) -> Result<RequestHandle> {
        if input.data_plane().cancel.is_cancelled() {
            return Err(V3ioError::Cancelled);
        }

        let id = next_request_id();
        let submitted_at = Instant::now();
        let request = Request {
            id,
            input,
            context,
            response_tx,
            submitted_at,
        };

        self.request_tx
            .send(request)
            .await
            .map_err(|_| V3ioError::Transport("request queue is closed".to_string()))?;

        Ok(RequestHandle { id, submitted_at })
    }

    submit_op!(
        /// Enqueues a container listing.
        submit_get_containers, GetContainers, GetContainersInput);
    submit_op!(
        /// Enqueues a cluster metadata fetch.
        submit_get_cluster_md, GetClusterMd, GetClusterMdInput);
    submit_op!(
        /// Enqueues a container-contents listing.
        submit_get_container_contents, GetContainerContents, GetContainerContentsInput);
    submit_op!(
        /// Enqueues an object read.
        submit_get_object, GetObject, GetObjectInput);
    submit_op!(
        /// Enqueues an object write.
        submit_put_object, PutObject, PutObjectInput);
    submit_op!(
        /// Enqueues a directory metadata update.
        submit_update_object, UpdateObject, UpdateObjectInput);
    submit_op!(
        /// Enqueues an object delete.
        submit_delete_object, DeleteObject, DeleteObjectInput);
    submit_op!(
        /// Enqueues an existence check.
        submit_check_path_exists, CheckPathExists, CheckPathExistsInput);
    submit_op!(
        /// Enqueues an out-of-band object write.
        submit_put_oos_object, PutOosObject, PutOosObjectInput);
    submit_op!(
        /// Enqueues a single-item read.
        submit_get_item, GetItem, GetItemInput);
    submit_op!(
        /// Enqueues an item scan.
        submit_get_items, GetItems, GetItemsInput);
    submit_op!(
        /// Enqueues a single-item write.
        submit_put_item, PutItem, PutItemInput);
    submit_op!(
        /// Enqueues a batch item write.
        submit_put_items, PutItems, PutItemsInput);
    submit_op!(
        /// Enqueues a single-item update.
        submit_update_item, UpdateItem, UpdateItemInput);
    submit_op!(
        /// Enqueues a stream creation.
        submit_create_stream, CreateStream, CreateStreamInput);
    submit_op!(
        /// Enqueues a stream description.
        submit_describe_stream, DescribeStream, DescribeStreamInput);
    submit_op!(
        /// Enqueues a composite stream delete.
        submit_delete_stream, DeleteStream, DeleteStreamInput);
    submit_op!(
        /// Enqueues a shard seek.
        submit_seek_shard, SeekShard, SeekShardInput);
    submit_op!(
        /// Enqueues a record append.
        submit_put_records, PutRecords, PutRecordsInput);
    submit_op!(
        /// Enqueues a record fetch.
        submit_get_records, GetRecords, GetRecordsInput);
    submit_op!(
        /// Enqueues a chunk write.
        submit_put_chunk, PutChunk, PutChunkInput);
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

async fn worker_entry(
    worker_index: usize,
    request_rx: Arc<Mutex<mpsc::Receiver<Request>>>,
    data_plane: Arc<DataPlane>,
) {
    tracing::debug!(worker_index, "dispatcher worker started");

    loop {
        // hold the lock only for the dequeue so workers consume in parallel
        let request = {
            let mut receiver = request_rx.lock().await;
            receiver.recv().await
        };

        let Some(request) = request else {
            tracing::debug!(worker_index, "request queue closed, worker exiting");
            break;
        };

        let mut response = match data_plane.execute(&request.input).await {
            Ok(Some(response)) => response,
            Ok(None) => data_plane.pool().empty(),
            Err(error) => {
                tracing::debug!(
                    worker_index,
                    operation = request.input.name(),
                    error = %error,
                    "operation failed"
                );
                let mut response = data_plane.pool().empty();
                response.set_error(error);
                response
            }
        };

        response.set_id(request.id);
        response.set_context(request.context);

        if request.response_tx.send(response).await.is_err() {
            tracing::warn!(
                worker_index,
                request_id = request.id,
                elapsed = ?request.submitted_at.elapsed(),
                "response receiver dropped before delivery"
            );
        }
    }
}
