//! Stream operations: lifecycle, seeks, record appends and fetches.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Map, Value};
use v3io_core::{Result, V3ioError};

use super::{function_headers, DataPlane};
use crate::response::Response;
use crate::transport::HttpMethod;
use crate::types::{
    CreateStreamInput, DeleteObjectInput, DeleteStreamInput, DescribeStreamInput,
    DescribeStreamOutput, GetContainerContentsInput, GetRecordsInput, GetRecordsOutput, Output,
    PutChunkInput, PutRecordsInput, PutRecordsOutput, SeekShardInput, SeekShardOutput,
    SeekShardType,
};

#[derive(Serialize)]
struct WireRecord<'a> {
    #[serde(rename = "Data")]
    data: String,
    #[serde(rename = "ClientInfo", skip_serializing_if = "Option::is_none")]
    client_info: Option<String>,
    #[serde(rename = "ShardId", skip_serializing_if = "Option::is_none")]
    shard_id: Option<u32>,
    #[serde(rename = "PartitionKey", skip_serializing_if = "Option::is_none")]
    partition_key: Option<&'a str>,
}

impl DataPlane {
    /// Creates a stream with a fixed shard count and retention period.
    pub async fn create_stream(&self, input: &CreateStreamInput) -> Result<()> {
        let body = json!({
            "ShardCount": input.shard_count,
            "RetentionPeriodHours": input.retention_period_hours,
        });

        self.send_request(
            &input.data_plane,
            HttpMethod::Post,
            &input.path,
            "",
            function_headers("CreateStream"),
            Bytes::from(body.to_string()),
        )
        .await?
        .release();

        Ok(())
    }

    /// Describes a stream's shard count and retention.
    pub async fn describe_stream(&self, input: &DescribeStreamInput) -> Result<Response> {
        let mut response = self
            .send_request(
                &input.data_plane,
                HttpMethod::Put,
                &input.path,
                "",
                function_headers("DescribeStream"),
                Bytes::new(),
            )
            .await?;

        let output: DescribeStreamOutput = serde_json::from_slice(response.body())
            .map_err(|e| V3ioError::Decode(format!("stream description: {e}")))?;
        response.set_output(Output::DescribeStream(output));
        Ok(response)
    }

    /// Deletes a stream: lists its shard children, deletes each, then
    /// deletes the stream directory itself.
    ///
    /// Child failures do not stop the sweep; the last error wins.
    pub async fn delete_stream(&self, input: &DeleteStreamInput) -> Result<()> {
        let listing = self
            .get_container_contents(&GetContainerContentsInput {
                data_plane: input.data_plane.clone(),
                path: input.path.clone(),
                ..Default::default()
            })
            .await?;

        let shard_keys: Vec<String> = listing
            .output()
            .and_then(Output::as_get_container_contents)
            .map(|output| {
                output
                    .contents
                    .iter()
                    .map(|content| content.key.clone())
                    .collect()
            })
            .unwrap_or_default();
        listing.release();

        let mut last_error = None;
        for key in shard_keys {
            let result = self
                .delete_object(&DeleteObjectInput {
                    data_plane: input.data_plane.clone(),
                    path: format!("/{key}"),
                })
                .await;

            if let Err(error) = result {
                tracing::warn!(key = %key, error = %error, "failed to delete stream shard");
                last_error = Some(error);
            }
        }

        let stream_dir = format!("/{}/", input.path.trim_matches('/'));
        self.delete_object(&DeleteObjectInput {
            data_plane: input.data_plane.clone(),
            path: stream_dir,
        })
        .await?;

        match last_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Positions a cursor inside a shard.
    pub async fn seek_shard(&self, input: &SeekShardInput) -> Result<Response> {
        let mut body = Map::new();
        body.insert("Type".to_string(), json!(input.seek_type.as_str()));

        match input.seek_type {
            SeekShardType::Sequence => {
                body.insert(
                    "StartingSequenceNumber".to_string(),
                    json!(input.starting_sequence_number),
                );
            }
            SeekShardType::Time => {
                body.insert("TimestampSec".to_string(), json!(input.timestamp_sec));
                body.insert("TimestampNSec".to_string(), json!(0));
            }
            SeekShardType::Latest | SeekShardType::Earliest => {}
        }

        let mut response = self
            .send_request(
                &input.data_plane,
                HttpMethod::Put,
                &input.path,
                "",
                function_headers("Seek"),
                Bytes::from(Value::Object(body).to_string()),
            )
            .await?;

        let output: SeekShardOutput = serde_json::from_slice(response.body())
            .map_err(|e| V3ioError::Decode(format!("seek result: {e}")))?;
        response.set_output(Output::SeekShard(output));
        Ok(response)
    }

    /// Appends records to a stream.
    pub async fn put_records(&self, input: &PutRecordsInput) -> Result<Response> {
        let records: Vec<WireRecord<'_>> = input
            .records
            .iter()
            .map(|record| WireRecord {
                data: BASE64.encode(&record.data),
                client_info: record
                    .client_info
                    .as_deref()
                    .map(|client_info| BASE64.encode(client_info)),
                shard_id: record.shard_id,
                partition_key: record
                    .partition_key
                    .as_deref()
                    .filter(|key| !key.is_empty()),
            })
            .collect();

        let body = serde_json::to_vec(&json!({ "Records": records }))
            .map_err(|e| V3ioError::Decode(format!("record batch: {e}")))?;

        let mut response = self
            .send_request(
                &input.data_plane,
                HttpMethod::Post,
                &input.path,
                "",
                function_headers("PutRecords"),
                Bytes::from(body),
            )
            .await?;

        let output: PutRecordsOutput = serde_json::from_slice(response.body())
            .map_err(|e| V3ioError::Decode(format!("append result: {e}")))?;
        response.set_output(Output::PutRecords(output));
        Ok(response)
    }

    /// Fetches records from a shard, starting at a cursor.
    pub async fn get_records(&self, input: &GetRecordsInput) -> Result<Response> {
        let body = json!({
            "Location": input.location,
            "Limit": input.limit,
        });

        let mut response = self
            .send_request(
                &input.data_plane,
                HttpMethod::Put,
                &input.path,
                "",
                function_headers("GetRecords"),
                Bytes::from(body.to_string()),
            )
            .await?;

        let output: GetRecordsOutput = serde_json::from_slice(response.body())
            .map_err(|e| V3ioError::Decode(format!("record fetch: {e}")))?;
        response.set_output(Output::GetRecords(output));
        Ok(response)
    }

    /// Writes a chunk together with its metadata.
    pub async fn put_chunk(&self, input: &PutChunkInput) -> Result<()> {
        let body = serde_json::to_vec(input)
            .map_err(|e| V3ioError::Decode(format!("chunk envelope: {e}")))?;

        self.send_request(
            &input.data_plane,
            HttpMethod::Post,
            &input.path,
            "",
            function_headers("PutChunk"),
            Bytes::from(body),
        )
        .await?
        .release();

        Ok(())
    }
}
