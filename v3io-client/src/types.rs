//! Typed inputs and outputs of the operation surface.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use v3io_core::{decode_file_mode, FileMode, Item, Result, V3ioError};

/// Cross-cutting parameters attached to every data-plane operation.
#[derive(Debug, Clone, Default)]
pub struct DataPlaneInput {
    /// Cancellation token; an already-cancelled token short-circuits before
    /// any I/O.
    pub cancel: CancellationToken,
    /// Cluster endpoint URL.
    pub url: String,
    /// Target container; must not be empty.
    pub container_name: String,
    /// Value for the `Authorization` header, when using bearer/basic auth.
    pub authentication_token: Option<String>,
    /// Access key sent as `X-v3io-session-key`.
    pub access_key: Option<String>,
    /// Precondition modification time, seconds part.
    pub mtime_secs: Option<String>,
    /// Precondition modification time, nanoseconds part.
    pub mtime_nsecs: Option<String>,
    /// Per-call timeout bounding the transport round-trip only.
    pub timeout: Option<Duration>,
    /// When set, a status error keeps ownership of the response buffer.
    pub include_response_in_error: bool,
}

//
// Container
//

/// Input for listing the tenant's containers.
#[derive(Debug, Clone, Default)]
pub struct GetContainersInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
}

/// A single container in a listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerInfo {
    /// Container name.
    #[serde(rename = "Name")]
    pub name: String,
    /// Creation date as reported by the service.
    #[serde(rename = "CreationDate", default)]
    pub creation_date: String,
    /// Numeric container ID.
    #[serde(rename = "Id", default)]
    pub id: i64,
}

/// Output of a container listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetContainersOutput {
    /// The tenant's containers.
    #[serde(rename = "Buckets", default)]
    pub containers: Vec<ContainerInfo>,
}

/// Input for fetching cluster metadata.
#[derive(Debug, Clone, Default)]
pub struct GetClusterMdInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
}

/// Cluster metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetClusterMdOutput {
    /// Number of virtual nodes in the cluster.
    #[serde(rename = "NumberOfVNs", default)]
    pub number_of_vns: i64,
}

/// Input for listing a container's contents.
#[derive(Debug, Clone, Default)]
pub struct GetContainerContentsInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Prefix to list under.
    pub path: String,
    /// Return all available attributes per entry.
    pub get_all_attributes: bool,
    /// Return directory entries only.
    pub directories_only: bool,
    /// Maximum number of entries per request.
    pub limit: Option<usize>,
    /// Opaque pagination marker from a previous listing.
    pub marker: Option<String>,
}

/// A file entry in a container listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Content {
    /// Object key.
    #[serde(rename = "Key")]
    pub key: String,
    /// File size in bytes.
    #[serde(rename = "Size", default)]
    pub size: Option<u64>,
    /// Greater than zero for shard files.
    #[serde(rename = "LastSequenceId", default)]
    pub last_sequence_id: Option<u64>,
    /// Last-modified date, RFC 3339.
    #[serde(rename = "LastModified", default)]
    pub last_modified: Option<String>,
    /// File mode; octal or decimal base depending on the producing API.
    #[serde(rename = "Mode", default)]
    pub mode: Option<String>,
    /// Access time, RFC 3339.
    #[serde(rename = "AccessTime", default)]
    pub access_time: Option<String>,
    /// Creation time, RFC 3339.
    #[serde(rename = "CreatingTime", default)]
    pub creating_time: Option<String>,
    /// Hexadecimal GID.
    #[serde(rename = "GID", default)]
    pub gid: Option<String>,
    /// Hexadecimal UID.
    #[serde(rename = "UID", default)]
    pub uid: Option<String>,
    /// Inode number.
    #[serde(rename = "InodeNumber", default)]
    pub inode_number: Option<u64>,
}

impl Content {
    /// Decodes the entry's file mode.
    pub fn file_mode(&self) -> Result<FileMode> {
        let mode = self
            .mode
            .as_deref()
            .ok_or_else(|| V3ioError::Decode("entry carries no mode".to_string()))?;
        decode_file_mode(mode)
    }
}

/// A directory entry in a container listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommonPrefix {
    /// Directory name.
    #[serde(rename = "Prefix")]
    pub prefix: String,
    /// Last-modified date, RFC 3339.
    #[serde(rename = "LastModified", default)]
    pub last_modified: Option<String>,
    /// Access time, RFC 3339.
    #[serde(rename = "AccessTime", default)]
    pub access_time: Option<String>,
    /// Creation time, RFC 3339.
    #[serde(rename = "CreatingTime", default)]
    pub creating_time: Option<String>,
    /// File mode in octal base.
    #[serde(rename = "Mode", default)]
    pub mode: Option<String>,
    /// Hexadecimal GID.
    #[serde(rename = "GID", default)]
    pub gid: Option<String>,
    /// Hexadecimal UID.
    #[serde(rename = "UID", default)]
    pub uid: Option<String>,
    /// Inode number.
    #[serde(rename = "InodeNumber", default)]
    pub inode_number: Option<u64>,
    /// For stream directories, the number of shards.
    #[serde(rename = "ShardCount", default)]
    pub shard_count: Option<u32>,
    /// For stream directories, the retention period in hours.
    #[serde(rename = "RetentionPeriodHours", default)]
    pub retention_period_hours: Option<u32>,
    /// For stream directories, the retention period in seconds.
    #[serde(rename = "RetentionPeriodSec", default)]
    pub retention_period_seconds: Option<u64>,
}

/// Output of a container-contents listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetContainerContentsOutput {
    /// Container name.
    #[serde(rename = "Name", default)]
    pub name: String,
    /// Marker to pass into the next listing while `is_truncated` holds.
    #[serde(rename = "NextMarker", default)]
    pub next_marker: String,
    /// Maximum number of entries in a single batch.
    #[serde(rename = "MaxKeys", default)]
    pub max_keys: String,
    /// File entries.
    #[serde(rename = "Contents", default)]
    pub contents: Vec<Content>,
    /// Directory entries.
    #[serde(rename = "CommonPrefixes", default)]
    pub common_prefixes: Vec<CommonPrefix>,
    /// More entries remain; `next_marker` is non-empty when set.
    #[serde(rename = "IsTruncated", default)]
    pub is_truncated: bool,
}

//
// Object
//

/// Input for a ranged object read.
#[derive(Debug, Clone, Default)]
pub struct GetObjectInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Object path inside the container.
    pub path: String,
    /// Byte offset of the read.
    pub offset: u64,
    /// Number of bytes to read; zero with a zero offset reads everything.
    pub num_bytes: u64,
    /// Creation-time precondition, seconds part.
    pub ctime_sec: i64,
    /// Creation-time precondition, nanoseconds part.
    pub ctime_nsec: i64,
}

/// Input for an object write.
#[derive(Debug, Clone, Default)]
pub struct PutObjectInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Object path inside the container.
    pub path: String,
    /// The object body.
    pub body: Vec<u8>,
    /// Append to the end of the object instead of overwriting.
    pub append: bool,
}

/// Input for deleting an object.
#[derive(Debug, Clone, Default)]
pub struct DeleteObjectInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Object path inside the container.
    pub path: String,
}

/// Directory metadata for an update.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DirAttributes {
    /// File mode.
    #[serde(rename = "mode", skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    /// Owner UID.
    #[serde(rename = "uid")]
    pub uid: i64,
    /// Owner GID.
    #[serde(rename = "gid")]
    pub gid: i64,
    /// Access time, seconds part.
    #[serde(rename = "atime.sec", skip_serializing_if = "Option::is_none")]
    pub atime_sec: Option<i64>,
    /// Access time, nanoseconds part.
    #[serde(rename = "atime.nsec")]
    pub atime_nsec: i64,
    /// Creation time, seconds part.
    #[serde(rename = "ctime.sec", skip_serializing_if = "Option::is_none")]
    pub ctime_sec: Option<i64>,
    /// Creation time, nanoseconds part.
    #[serde(rename = "ctime.nsec")]
    pub ctime_nsec: i64,
    /// Modification time, seconds part.
    #[serde(rename = "mtime.sec", skip_serializing_if = "Option::is_none")]
    pub mtime_sec: Option<i64>,
    /// Modification time, nanoseconds part.
    #[serde(rename = "mtime.nsec")]
    pub mtime_nsec: i64,
}

/// Input for updating directory metadata.
#[derive(Debug, Clone, Default)]
pub struct UpdateObjectInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Directory path inside the container.
    pub path: String,
    /// The attributes to set.
    pub dir_attributes: DirAttributes,
}

/// Input for an existence check.
#[derive(Debug, Clone, Default)]
pub struct CheckPathExistsInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Path inside the container.
    pub path: String,
}

/// Input for an out-of-band object write from scattered buffers.
#[derive(Debug, Clone, Default)]
pub struct PutOosObjectInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Object path inside the container.
    pub path: String,
    /// The header iovec, sent first.
    pub header: Vec<u8>,
    /// The payload iovecs, concatenated after the header.
    pub data: Vec<Vec<u8>>,
}

//
// KV
//

/// Input for reading a single item.
#[derive(Debug, Clone, Default)]
pub struct GetItemInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Item path inside the container.
    pub path: String,
    /// Attributes to fetch.
    pub attribute_names: Vec<String>,
}

/// Output of a single-item read.
#[derive(Debug, Clone, Default)]
pub struct GetItemOutput {
    /// The decoded attributes.
    pub item: Item,
}

/// Input for scanning items.
#[derive(Debug, Clone, Default)]
pub struct GetItemsInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Table path inside the container.
    pub path: String,
    /// Explicit table name, when different from the path.
    pub table_name: Option<String>,
    /// Attributes to fetch; `*`/`**` also yield a synthetic `__name`.
    pub attribute_names: Vec<String>,
    /// Filter expression, forwarded verbatim.
    pub filter: Option<String>,
    /// Opaque pagination marker from a previous scan.
    pub marker: Option<String>,
    /// Sharding key restricting the scan.
    pub sharding_key: Option<String>,
    /// Maximum number of items per request.
    pub limit: Option<u64>,
    /// Segment index when scanning in parallel.
    pub segment: u64,
    /// Total number of parallel segments.
    pub total_segments: Option<u64>,
    /// Sort-key range start.
    pub sort_key_range_start: Option<String>,
    /// Sort-key range end.
    pub sort_key_range_end: Option<String>,
    /// Allow the server to scatter large objects.
    pub allow_object_scatter: Option<String>,
    /// Ask the server to return item data.
    pub return_data: Option<String>,
    /// Cap on returned data size.
    pub data_max_size: Option<u64>,
    /// Request a JSON response instead of the framed binary envelope.
    pub request_json_response: bool,
}

/// Output of an item scan.
#[derive(Debug, Clone, Default)]
pub struct GetItemsOutput {
    /// No more items remain.
    pub last: bool,
    /// Marker to pass into the next scan while `last` is false.
    pub next_marker: String,
    /// The server scattered a large object across responses.
    pub scattered: bool,
    /// The decoded items.
    pub items: Vec<Item>,
}

/// Input for writing a single item.
#[derive(Debug, Clone, Default)]
pub struct PutItemInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Item path inside the container.
    pub path: String,
    /// Condition expression, forwarded verbatim.
    pub condition: Option<String>,
    /// The attributes to write.
    pub attributes: Item,
    /// Update mode override.
    pub update_mode: Option<String>,
}

/// Output of a single-item write.
#[derive(Debug, Clone, Copy, Default)]
pub struct PutItemOutput {
    /// Server-assigned modification time, seconds part.
    pub mtime_secs: i64,
    /// Server-assigned modification time, nanoseconds part.
    pub mtime_nsecs: i64,
}

/// Input for a client-side batch item write.
#[derive(Debug, Clone, Default)]
pub struct PutItemsInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Base path; each item lands at `<path>/<key>`.
    pub path: String,
    /// Condition expression applied to every item.
    pub condition: Option<String>,
    /// The items to write, keyed by item name.
    pub items: HashMap<String, Item>,
}

/// Output of a batch item write. There is no transactional rollback:
/// success simply means no per-key errors were collected.
#[derive(Debug, Clone, Default)]
pub struct PutItemsOutput {
    /// True when every item was written.
    pub success: bool,
    /// Per-key errors for the items that failed.
    pub errors: HashMap<String, V3ioError>,
}

/// Input for updating a single item.
#[derive(Debug, Clone, Default)]
pub struct UpdateItemInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Item path inside the container.
    pub path: String,
    /// Attributes to merge, for the attribute form.
    pub attributes: Option<Item>,
    /// Update expression, for the expression form.
    pub expression: Option<String>,
    /// Condition expression, forwarded verbatim.
    pub condition: Option<String>,
    /// Update mode override.
    pub update_mode: Option<String>,
}

/// Output of a single-item update.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateItemOutput {
    /// Server-assigned modification time, seconds part.
    pub mtime_secs: i64,
    /// Server-assigned modification time, nanoseconds part.
    pub mtime_nsecs: i64,
}

//
// Stream
//

/// A record to append to a stream.
#[derive(Debug, Clone, Default)]
pub struct StreamRecord {
    /// Explicit target shard; otherwise the server routes by partition key.
    pub shard_id: Option<u32>,
    /// The record payload.
    pub data: Vec<u8>,
    /// Opaque client info stored alongside the payload.
    pub client_info: Option<Vec<u8>>,
    /// Partition key routing the record to a shard.
    pub partition_key: Option<String>,
}

/// Where a shard seek positions its cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekShardType {
    /// At the first record at or after a timestamp.
    Time,
    /// At an explicit sequence number.
    Sequence,
    /// After the newest record.
    Latest,
    /// At the oldest retained record.
    #[default]
    Earliest,
}

impl SeekShardType {
    /// Returns the wire rendering of this seek type.
    pub fn as_str(self) -> &'static str {
        match self {
            SeekShardType::Time => "TIME",
            SeekShardType::Sequence => "SEQUENCE",
            SeekShardType::Latest => "LATEST",
            SeekShardType::Earliest => "EARLIEST",
        }
    }
}

/// Input for creating a stream.
#[derive(Debug, Clone, Default)]
pub struct CreateStreamInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Stream path inside the container.
    pub path: String,
    /// Number of shards; fixed for the stream's lifetime.
    pub shard_count: u32,
    /// Retention period in hours.
    pub retention_period_hours: u32,
}

/// Input for describing a stream.
#[derive(Debug, Clone, Default)]
pub struct DescribeStreamInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Stream path inside the container.
    pub path: String,
}

/// Output of a stream description.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DescribeStreamOutput {
    /// Number of shards.
    #[serde(rename = "ShardCount", default)]
    pub shard_count: u32,
    /// Retention period in hours.
    #[serde(rename = "RetentionPeriodHours", default)]
    pub retention_period_hours: u32,
}

/// Input for deleting a stream and its shards.
#[derive(Debug, Clone, Default)]
pub struct DeleteStreamInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Stream path inside the container.
    pub path: String,
}

/// Input for positioning a cursor inside a shard.
#[derive(Debug, Clone, Default)]
pub struct SeekShardInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Shard path inside the container.
    pub path: String,
    /// Seek target kind.
    pub seek_type: SeekShardType,
    /// Sequence number for [`SeekShardType::Sequence`].
    pub starting_sequence_number: u64,
    /// Timestamp in seconds for [`SeekShardType::Time`].
    pub timestamp_sec: i64,
}

/// Output of a shard seek.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeekShardOutput {
    /// Opaque cursor consumed by the next fetch.
    #[serde(rename = "Location")]
    pub location: String,
}

/// Input for appending records to a stream.
#[derive(Debug, Clone, Default)]
pub struct PutRecordsInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Stream path inside the container.
    pub path: String,
    /// The records to append.
    pub records: Vec<StreamRecord>,
}

/// Per-record result of an append.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PutRecordResult {
    /// Server-assigned sequence number.
    #[serde(rename = "SequenceNumber", default)]
    pub sequence_number: u64,
    /// Shard the record landed in.
    #[serde(rename = "ShardId", default)]
    pub shard_id: u32,
    /// Non-zero when the record failed.
    #[serde(rename = "ErrorCode", default)]
    pub error_code: i32,
    /// Failure description, when any.
    #[serde(rename = "ErrorMessage", default)]
    pub error_message: String,
}

/// Output of a record append.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PutRecordsOutput {
    /// Number of records the server rejected.
    #[serde(rename = "FailedRecordCount", default)]
    pub failed_record_count: u64,
    /// Per-record results, in submission order.
    #[serde(rename = "Records", default)]
    pub records: Vec<PutRecordResult>,
}

/// Input for fetching records from a shard.
#[derive(Debug, Clone, Default)]
pub struct GetRecordsInput {
    /// Common data-plane parameters.
    pub data_plane: DataPlaneInput,
    /// Shard path inside the container.
    pub path: String,
    /// Cursor from a seek or a previous fetch.
    pub location: String,
    /// Maximum number of records to return.
    pub limit: u64,
}

/// A single fetched record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetRecordsResult {
    /// Arrival time, seconds part.
    #[serde(rename = "ArrivalTimeSec", default)]
    pub arrival_time_sec: i64,
    /// Arrival time, nanoseconds part.
    #[serde(rename = "ArrivalTimeNSec", default)]
    pub arrival_time_nsec: i64,
    /// Server-assigned sequence number.
    #[serde(rename = "SequenceNumber", default)]
    pub sequence_number: u64,
    /// Opaque client info stored with the record.
    #[serde(rename = "ClientInfo", default, with = "base64_opt")]
    pub client_info: Option<Vec<u8>>,
    /// Partition key the record was routed by.
    #[serde(rename = "PartitionKey", default)]
    pub partition_key: String,
    /// The record payload.
    #[serde(rename = "Data", default, with = "base64_vec")]
    pub data: Vec<u8>,
}

/// Output of a record fetch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetRecordsOutput {
    /// Cursor for the next fetch.
    #[serde(rename = "NextLocation", default)]
    pub next_location: String,
    /// Milliseconds this cursor lags behind the newest record.
    #[serde(rename = "MSecBehindLatest", default)]
    pub msec_behind_latest: i64,
    /// Records this cursor lags behind the newest record.
    #[serde(rename = "RecordsBehindLatest", default)]
    pub records_behind_latest: i64,
    /// The fetched records, in sequence order.
    #[serde(rename = "Records", default)]
    pub records: Vec<GetRecordsResult>,
}

/// Metadata for one stored chunk.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ChunkMetadata {
    /// Chunk sequence number.
    #[serde(rename = "ChunkSequenceNumber")]
    pub chunk_seq_number: u64,
    /// Chunk length in bytes.
    #[serde(rename = "LengthInBytes")]
    pub length_in_bytes: u64,
    /// Sequence number of the chunk's first record.
    #[serde(rename = "FirstRecordSequenceNumber")]
    pub first_record_seq_number: u64,
    /// First record arrival time, seconds part.
    #[serde(rename = "FirstRecordTimeSec")]
    pub first_record_time_secs: u64,
    /// First record arrival time, nanoseconds part.
    #[serde(rename = "FirstRecordTimeNSec")]
    pub first_record_time_nsecs: u64,
}

/// Metadata for the chunk currently being written.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CurrentChunkMetadata {
    /// Chunk sequence number.
    #[serde(rename = "ChunkSequenceNumber")]
    pub chunk_seq_number: u32,
    /// Write offset after the job completes.
    #[serde(rename = "OffsetAfterJob")]
    pub offset_after_job: u64,
    /// Record sequence number after the job completes.
    #[serde(rename = "SequenceNumberAfterJob")]
    pub seq_number_after_job: u64,
    /// First record arrival time, seconds part.
    #[serde(rename = "FirstRecordTimeSec")]
    pub first_record_time_sec: u32,
    /// Latest record arrival time, seconds part.
    #[serde(rename = "LatestRecordTimeSec")]
    pub latest_record_time_sec: u64,
    /// Latest record arrival time, nanoseconds part.
    #[serde(rename = "LatestRecordTimeNSec")]
    pub latest_record_time_nsec: u64,
}

/// Input for writing a chunk with its metadata.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PutChunkInput {
    /// Common data-plane parameters.
    #[serde(skip)]
    pub data_plane: DataPlaneInput,
    /// Shard path inside the container.
    #[serde(skip)]
    pub path: String,
    /// Chunk sequence number.
    #[serde(rename = "ChunkSequenceNumber", skip_serializing_if = "Option::is_none")]
    pub chunk_seq_number: Option<u64>,
    /// Write offset of the chunk data.
    #[serde(rename = "Offset", skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    /// The chunk data.
    #[serde(rename = "Data", skip_serializing_if = "Option::is_none", with = "base64_ser_opt")]
    pub data: Option<Vec<u8>>,
    /// Metadata for previously stored chunks.
    #[serde(rename = "Metadata", skip_serializing_if = "Vec::is_empty")]
    pub chunks_metadata: Vec<ChunkMetadata>,
    /// Metadata for the chunk being written.
    #[serde(rename = "CurrentMetadata", skip_serializing_if = "Option::is_none")]
    pub current_chunk_metadata: Option<CurrentChunkMetadata>,
}

mod base64_vec {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

mod base64_opt {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Option::<String>::deserialize(deserializer)?;
        match encoded {
            Some(encoded) => BASE64
                .decode(encoded.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

mod base64_ser_opt {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde::Serializer;

    pub fn serialize<S>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match data {
            Some(data) => serializer.serialize_str(&BASE64.encode(data)),
            None => serializer.serialize_none(),
        }
    }
}

/// A parsed operation output.
///
/// Body-less operations produce no output; every other operation maps to
/// exactly one variant.
#[derive(Debug, Clone)]
pub enum Output {
    /// Container listing.
    GetContainers(GetContainersOutput),
    /// Cluster metadata.
    GetClusterMd(GetClusterMdOutput),
    /// Container contents.
    GetContainerContents(GetContainerContentsOutput),
    /// Single-item read.
    GetItem(GetItemOutput),
    /// Item scan.
    GetItems(GetItemsOutput),
    /// Single-item write.
    PutItem(PutItemOutput),
    /// Batch item write.
    PutItems(PutItemsOutput),
    /// Single-item update.
    UpdateItem(UpdateItemOutput),
    /// Stream description.
    DescribeStream(DescribeStreamOutput),
    /// Shard seek.
    SeekShard(SeekShardOutput),
    /// Record append.
    PutRecords(PutRecordsOutput),
    /// Record fetch.
    GetRecords(GetRecordsOutput),
}

macro_rules! output_accessor {
    ($fn_name:ident, $variant:ident, $output:ty) => {
        /// Returns the inner output when this is the matching variant.
        pub fn $fn_name(&self) -> Option<&$output> {
            match self {
                Output::$variant(output) => Some(output),
                _ => None,
            }
        }
    };
}

impl Output {
    output_accessor!(as_get_containers, GetContainers, GetContainersOutput);
    output_accessor!(as_get_cluster_md, GetClusterMd, GetClusterMdOutput);
    output_accessor!(
        as_get_container_contents,
        GetContainerContents,
        GetContainerContentsOutput
    );
    output_accessor!(as_get_item, GetItem, GetItemOutput);
    output_accessor!(as_get_items, GetItems, GetItemsOutput);
    output_accessor!(as_put_item, PutItem, PutItemOutput);
    output_accessor!(as_put_items, PutItems, PutItemsOutput);
    output_accessor!(as_update_item, UpdateItem, UpdateItemOutput);
    output_accessor!(as_describe_stream, DescribeStream, DescribeStreamOutput);
    output_accessor!(as_seek_shard, SeekShard, SeekShardOutput);
    output_accessor!(as_put_records, PutRecords, PutRecordsOutput);
    output_accessor!(as_get_records, GetRecords, GetRecordsOutput);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_decode_base64_payloads() {
        let body = serde_json::json!({
            "NextLocation": "loc-2",
            "MSecBehindLatest": 12,
            "Records": [
                {"SequenceNumber": 1, "Data": "QQ==", "PartitionKey": "k"},
                {"SequenceNumber": 2, "Data": "QkM=", "ClientInfo": "aW5mbw=="}
            ]
        });
        let output: GetRecordsOutput = serde_json::from_value(body).unwrap();
        assert_eq!(output.records.len(), 2);
        assert_eq!(output.records[0].data, b"A");
        assert_eq!(output.records[1].data, b"BC");
        assert_eq!(output.records[1].client_info.as_deref(), Some(&b"info"[..]));
    }

    #[test]
    fn test_put_chunk_serialization_shape() {
        let input = PutChunkInput {
            chunk_seq_number: Some(3),
            offset: Some(100),
            data: Some(vec![1, 2, 3]),
            ..Default::default()
        };
        let body = serde_json::to_value(&input).unwrap();
        assert_eq!(body["ChunkSequenceNumber"], 3);
        assert_eq!(body["Offset"], 100);
        assert_eq!(body["Data"], "AQID");
        assert!(body.get("Metadata").is_none());
        assert!(body.get("path").is_none());
    }

    #[test]
    fn test_seek_type_wire_names() {
        assert_eq!(SeekShardType::Earliest.as_str(), "EARLIEST");
        assert_eq!(SeekShardType::Latest.as_str(), "LATEST");
        assert_eq!(SeekShardType::Sequence.as_str(), "SEQUENCE");
        assert_eq!(SeekShardType::Time.as_str(), "TIME");
    }
}
