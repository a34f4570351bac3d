//! Asynchronous request envelope.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::response::Response;
use crate::types::{
    CheckPathExistsInput, CreateStreamInput, DataPlaneInput, DeleteObjectInput, DeleteStreamInput,
    DescribeStreamInput, GetClusterMdInput, GetContainerContentsInput, GetContainersInput,
    GetItemInput, GetItemsInput, GetObjectInput, GetRecordsInput, PutChunkInput, PutItemInput,
    PutItemsInput, PutObjectInput, PutOosObjectInput, PutRecordsInput, SeekShardInput,
    UpdateItemInput, UpdateObjectInput,
};

/// Opaque caller context carried through to the response.
pub type CallerContext = Arc<dyn Any + Send + Sync>;

/// One variant per operation; adding an operation extends this enum and the
/// dispatch match in one place each.
#[derive(Debug, Clone)]
pub enum OperationInput {
    /// List containers.
    GetContainers(GetContainersInput),
    /// Fetch cluster metadata.
    GetClusterMd(GetClusterMdInput),
    /// List container contents.
    GetContainerContents(GetContainerContentsInput),
    /// Ranged object read.
    GetObject(GetObjectInput),
    /// Object write.
    PutObject(PutObjectInput),
    /// Directory metadata update.
    UpdateObject(UpdateObjectInput),
    /// Object delete.
    DeleteObject(DeleteObjectInput),
    /// Existence check.
    CheckPathExists(CheckPathExistsInput),
    /// Out-of-band object write.
    PutOosObject(PutOosObjectInput),
    /// Single-item read.
    GetItem(GetItemInput),
    /// Item scan.
    GetItems(GetItemsInput),
    /// Single-item write.
    PutItem(PutItemInput),
    /// Batch item write.
    PutItems(PutItemsInput),
    /// Single-item update.
    UpdateItem(UpdateItemInput),
    /// Stream creation.
    CreateStream(CreateStreamInput),
    /// Stream description.
    DescribeStream(DescribeStreamInput),
    /// Composite stream delete.
    DeleteStream(DeleteStreamInput),
    /// Shard seek.
    SeekShard(SeekShardInput),
    /// Record append.
    PutRecords(PutRecordsInput),
    /// Record fetch.
    GetRecords(GetRecordsInput),
    /// Chunk write.
    PutChunk(PutChunkInput),
}

impl OperationInput {
    /// Operation name, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            OperationInput::GetContainers(_) => "GetContainers",
            OperationInput::GetClusterMd(_) => "GetClusterMD",
            OperationInput::GetContainerContents(_) => "GetContainerContents",
            OperationInput::GetObject(_) => "GetObject",
            OperationInput::PutObject(_) => "PutObject",
            OperationInput::UpdateObject(_) => "UpdateObject",
            OperationInput::DeleteObject(_) => "DeleteObject",
            OperationInput::CheckPathExists(_) => "CheckPathExists",
            OperationInput::PutOosObject(_) => "PutOOSObject",
            OperationInput::GetItem(_) => "GetItem",
            OperationInput::GetItems(_) => "GetItems",
            OperationInput::PutItem(_) => "PutItem",
            OperationInput::PutItems(_) => "PutItems",
            OperationInput::UpdateItem(_) => "UpdateItem",
            OperationInput::CreateStream(_) => "CreateStream",
            OperationInput::DescribeStream(_) => "DescribeStream",
            OperationInput::DeleteStream(_) => "DeleteStream",
            OperationInput::SeekShard(_) => "SeekShard",
            OperationInput::PutRecords(_) => "PutRecords",
            OperationInput::GetRecords(_) => "GetRecords",
            OperationInput::PutChunk(_) => "PutChunk",
        }
    }

    /// The operation's cross-cutting parameters.
    pub fn data_plane(&self) -> &DataPlaneInput {
        match self {
            OperationInput::GetContainers(input) => &input.data_plane,
            OperationInput::GetClusterMd(input) => &input.data_plane,
            OperationInput::GetContainerContents(input) => &input.data_plane,
            OperationInput::GetObject(input) => &input.data_plane,
            OperationInput::PutObject(input) => &input.data_plane,
            OperationInput::UpdateObject(input) => &input.data_plane,
            OperationInput::DeleteObject(input) => &input.data_plane,
            OperationInput::CheckPathExists(input) => &input.data_plane,
            OperationInput::PutOosObject(input) => &input.data_plane,
            OperationInput::GetItem(input) => &input.data_plane,
            OperationInput::GetItems(input) => &input.data_plane,
            OperationInput::PutItem(input) => &input.data_plane,
            OperationInput::PutItems(input) => &input.data_plane,
            OperationInput::UpdateItem(input) => &input.data_plane,
            OperationInput::CreateStream(input) => &input.data_plane,
            OperationInput::DescribeStream(input) => &input.data_plane,
            OperationInput::DeleteStream(input) => &input.data_plane,
            OperationInput::SeekShard(input) => &input.data_plane,
            OperationInput::PutRecords(input) => &input.data_plane,
            OperationInput::GetRecords(input) => &input.data_plane,
            OperationInput::PutChunk(input) => &input.data_plane,
        }
    }
}

/// An enqueued asynchronous request.
#[derive(Debug)]
pub struct Request {
    pub(crate) id: u64,
    pub(crate) input: OperationInput,
    pub(crate) context: Option<CallerContext>,
    pub(crate) response_tx: mpsc::Sender<Response>,
    pub(crate) submitted_at: Instant,
}

/// Handle returned by an asynchronous submission.
#[derive(Debug, Clone, Copy)]
pub struct RequestHandle {
    /// Process-unique request ID; matches the delivered response.
    pub id: u64,
    /// When the request entered the queue.
    pub submitted_at: Instant,
}

/// Allocates the next process-unique request ID.
///
/// 64-bit monotonic counter; wrap is not a practical concern.
pub(crate) fn next_request_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}
