//! Shared test doubles: an in-memory service speaking the wire protocol
//! behind the `Transport` trait, plus scripted transports for failure
//! injection.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use serde_json::{json, Map, Value};
use url::Url;
use v3io_client::transport::{
    Transport, TransportError, TransportRequest, TransportResponse,
};

pub fn json_response(status: u16, body: Value) -> TransportResponse {
    TransportResponse {
        status,
        headers: vec![(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )],
        body: BytesMut::from(body.to_string().as_bytes()),
    }
}

pub fn status_response(status: u16) -> TransportResponse {
    TransportResponse {
        status,
        headers: Vec::new(),
        body: BytesMut::new(),
    }
}

#[derive(Debug, Clone)]
struct StoredItem {
    attributes: Map<String, Value>,
    mtime: (i64, i64),
}

#[derive(Debug, Clone, Default)]
struct StoredRecord {
    sequence_number: u64,
    data: String,
    client_info: Option<String>,
    partition_key: Option<String>,
    arrival_sec: i64,
}

#[derive(Debug, Clone)]
struct MockStream {
    shard_count: u32,
    retention_hours: u32,
    shards: Vec<Vec<StoredRecord>>,
}

#[derive(Debug, Default)]
struct ServiceState {
    entries: BTreeSet<String>,
    objects: HashMap<String, Vec<u8>>,
    items: HashMap<String, StoredItem>,
    streams: HashMap<String, MockStream>,
    mtime_counter: i64,
}

/// An in-memory rendition of the service: items with mtime-conditional
/// writes, streams with shards and cursors, objects and prefix listings.
#[derive(Debug, Default)]
pub struct MockService {
    state: Mutex<ServiceState>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently in a shard.
    pub fn shard_len(&self, stream: &str, shard: usize) -> usize {
        let state = self.state.lock().unwrap();
        state
            .streams
            .get(stream)
            .and_then(|s| s.shards.get(shard))
            .map(|records| records.len())
            .unwrap_or(0)
    }

    pub fn has_entry(&self, key: &str) -> bool {
        self.state.lock().unwrap().entries.contains(key)
    }

    fn next_mtime(state: &mut ServiceState) -> (i64, i64) {
        state.mtime_counter += 1;
        (1_700_000_000 + state.mtime_counter, (state.mtime_counter * 131) % 1_000_000_000)
    }

    fn handle(&self, request: &TransportRequest) -> TransportResponse {
        let url = match Url::parse(&request.uri) {
            Ok(url) => url,
            Err(_) => return status_response(400),
        };
        let raw_path = url.path().trim_start_matches('/');
        let (_container, key) = raw_path.split_once('/').unwrap_or((raw_path, ""));
        let key = key.to_string();

        let function = request
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("X-v3io-function"))
            .map(|(_, value)| value.as_str())
            .unwrap_or("");

        let method = request.method.as_str();
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);

        let mut state = self.state.lock().unwrap();

        match (method, function) {
            ("PUT", "GetItem") => self.get_item(&state, &key, &body),
            ("PUT", "PutItem") => self.put_item(&mut state, &key, &body),
            ("POST", "UpdateItem") => self.update_item(&mut state, &key),
            ("POST", "CreateStream") => self.create_stream(&mut state, &key, &body),
            ("PUT", "DescribeStream") => self.describe_stream(&state, &key),
            ("PUT", "Seek") => self.seek_shard(&state, &key, &body),
            ("PUT", "GetRecords") => self.get_records(&state, &key, &body),
            ("POST", "PutRecords") => self.put_records(&mut state, &key, &body),
            ("GET", _) if url.query().is_some() || key.is_empty() => {
                self.list_contents(&state, &url)
            }
            ("GET", _) => match state.objects.get(key.trim_matches('/')) {
                Some(body) => TransportResponse {
                    status: 200,
                    headers: Vec::new(),
                    body: BytesMut::from(&body[..]),
                },
                None => status_response(404),
            },
            ("PUT", _) => {
                let trimmed = key.trim_matches('/').to_string();
                state.entries.insert(trimmed.clone());
                let append = request
                    .headers
                    .iter()
                    .any(|(name, value)| name == "Range" && value == "-1");
                let object = state.objects.entry(trimmed).or_default();
                if append {
                    object.extend_from_slice(&request.body);
                } else {
                    *object = request.body.to_vec();
                }
                status_response(200)
            }
            ("DELETE", _) => {
                let trimmed = key.trim_matches('/').to_string();
                if key.ends_with('/') && state.streams.remove(&trimmed).is_some() {
                    return status_response(204);
                }
                state.entries.remove(&trimmed);
                state.objects.remove(&trimmed);
                state.items.remove(&trimmed);
                status_response(204)
            }
            ("HEAD", _) => {
                let trimmed = key.trim_matches('/');
                if state.entries.contains(trimmed) || state.streams.contains_key(trimmed) {
                    status_response(200)
                } else {
                    status_response(404)
                }
            }
            _ => status_response(400),
        }
    }

    fn get_item(&self, state: &ServiceState, key: &str, _body: &Value) -> TransportResponse {
        let Some(stored) = state.items.get(key) else {
            return status_response(404);
        };

        let mut attributes = stored.attributes.clone();
        attributes.insert(
            "__mtime_secs".to_string(),
            json!({ "N": stored.mtime.0.to_string() }),
        );
        attributes.insert(
            "__mtime_nsecs".to_string(),
            json!({ "N": stored.mtime.1.to_string() }),
        );

        json_response(200, json!({ "Item": attributes }))
    }

    fn put_item(&self, state: &mut ServiceState, key: &str, body: &Value) -> TransportResponse {
        let condition = body
            .get("ConditionExpression")
            .and_then(Value::as_str)
            .unwrap_or("");
        if !condition.is_empty() && !eval_condition(condition, state.items.get(key)) {
            return status_response(412);
        }

        let new_attributes = body
            .get("Item")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mtime = Self::next_mtime(state);
        let stored = state.items.entry(key.to_string()).or_insert(StoredItem {
            attributes: Map::new(),
            mtime,
        });
        stored.attributes.extend(new_attributes);
        stored.mtime = mtime;
        state.entries.insert(key.to_string());

        let mut response = status_response(200);
        response.headers.push((
            "X-v3io-transaction-verifier".to_string(),
            format!("__mtime_secs=={} and __mtime_nsecs=={}", mtime.0, mtime.1),
        ));
        response
    }

    fn update_item(&self, state: &mut ServiceState, key: &str) -> TransportResponse {
        let mtime = Self::next_mtime(state);
        if let Some(stored) = state.items.get_mut(key) {
            stored.mtime = mtime;
        }
        let mut response = status_response(200);
        response.headers.push((
            "X-v3io-transaction-verifier".to_string(),
            format!("__mtime_secs=={} and __mtime_nsecs=={}", mtime.0, mtime.1),
        ));
        response
    }

    fn create_stream(
        &self,
        state: &mut ServiceState,
        key: &str,
        body: &Value,
    ) -> TransportResponse {
        let shard_count = body.get("ShardCount").and_then(Value::as_u64).unwrap_or(1) as u32;
        let retention_hours = body
            .get("RetentionPeriodHours")
            .and_then(Value::as_u64)
            .unwrap_or(1) as u32;

        let stream_key = key.trim_matches('/').to_string();
        for shard in 0..shard_count {
            state.entries.insert(format!("{stream_key}/{shard}"));
        }
        state.streams.insert(
            stream_key,
            MockStream {
                shard_count,
                retention_hours,
                shards: (0..shard_count).map(|_| Vec::new()).collect(),
            },
        );
        status_response(200)
    }

    fn describe_stream(&self, state: &ServiceState, key: &str) -> TransportResponse {
        let Some(stream) = state.streams.get(key.trim_matches('/')) else {
            return status_response(404);
        };
        json_response(
            200,
            json!({
                "ShardCount": stream.shard_count,
                "RetentionPeriodHours": stream.retention_hours,
            }),
        )
    }

    fn split_shard_key(key: &str) -> Option<(String, usize)> {
        let trimmed = key.trim_matches('/');
        let (stream, shard) = trimmed.rsplit_once('/')?;
        Some((stream.to_string(), shard.parse().ok()?))
    }

    fn seek_shard(&self, state: &ServiceState, key: &str, body: &Value) -> TransportResponse {
        let Some((stream_key, shard_index)) = Self::split_shard_key(key) else {
            return status_response(400);
        };
        let Some(records) = state
            .streams
            .get(&stream_key)
            .and_then(|stream| stream.shards.get(shard_index))
        else {
            return status_response(404);
        };

        let seek_type = body.get("Type").and_then(Value::as_str).unwrap_or("");
        let index = match seek_type {
            "EARLIEST" => 0,
            "LATEST" => records.len(),
            "SEQUENCE" => {
                let target = body
                    .get("StartingSequenceNumber")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                records
                    .iter()
                    .position(|record| record.sequence_number >= target)
                    .unwrap_or(records.len())
            }
            "TIME" => {
                let target = body.get("TimestampSec").and_then(Value::as_i64).unwrap_or(0);
                records
                    .iter()
                    .position(|record| record.arrival_sec >= target)
                    .unwrap_or(records.len())
            }
            _ => return status_response(400),
        };

        json_response(200, json!({ "Location": index.to_string() }))
    }

    fn get_records(&self, state: &ServiceState, key: &str, body: &Value) -> TransportResponse {
        let Some((stream_key, shard_index)) = Self::split_shard_key(key) else {
            return status_response(400);
        };
        let Some(records) = state
            .streams
            .get(&stream_key)
            .and_then(|stream| stream.shards.get(shard_index))
        else {
            return status_response(404);
        };

        let location: usize = body
            .get("Location")
            .and_then(Value::as_str)
            .and_then(|location| location.parse().ok())
            .unwrap_or(0);
        let limit = body.get("Limit").and_then(Value::as_u64).unwrap_or(10) as usize;

        let page: Vec<Value> = records
            .iter()
            .skip(location)
            .take(limit)
            .map(|record| {
                let mut wire = json!({
                    "ArrivalTimeSec": record.arrival_sec,
                    "ArrivalTimeNSec": 0,
                    "SequenceNumber": record.sequence_number,
                    "PartitionKey": record.partition_key.clone().unwrap_or_default(),
                    "Data": record.data,
                });
                if let Some(client_info) = &record.client_info {
                    wire["ClientInfo"] = json!(client_info);
                }
                wire
            })
            .collect();

        let next_location = location + page.len();
        json_response(
            200,
            json!({
                "NextLocation": next_location.to_string(),
                "MSecBehindLatest": 0,
                "RecordsBehindLatest": records.len().saturating_sub(next_location),
                "Records": page,
            }),
        )
    }

    fn put_records(&self, state: &mut ServiceState, key: &str, body: &Value) -> TransportResponse {
        let stream_key = key.trim_matches('/').to_string();
        let Some(stream) = state.streams.get_mut(&stream_key) else {
            return status_response(404);
        };

        let empty = Vec::new();
        let records = body
            .get("Records")
            .and_then(Value::as_array)
            .unwrap_or(&empty);

        let mut results = Vec::with_capacity(records.len());
        for record in records {
            let shard_index = record
                .get("ShardId")
                .and_then(Value::as_u64)
                .map(|shard| shard as u32)
                .unwrap_or_else(|| {
                    let partition_key = record
                        .get("PartitionKey")
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    let digest: u32 = partition_key.bytes().map(u32::from).sum();
                    digest % stream.shard_count
                });

            let shard = &mut stream.shards[shard_index as usize];
            let sequence_number = shard.len() as u64 + 1;
            shard.push(StoredRecord {
                sequence_number,
                data: record
                    .get("Data")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                client_info: record
                    .get("ClientInfo")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                partition_key: record
                    .get("PartitionKey")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                arrival_sec: 1_700_000_000,
            });

            results.push(json!({
                "SequenceNumber": sequence_number,
                "ShardId": shard_index,
                "ErrorCode": 0,
                "ErrorMessage": "",
            }));
        }

        json_response(
            200,
            json!({ "FailedRecordCount": 0, "Records": results }),
        )
    }

    fn list_contents(&self, state: &ServiceState, url: &Url) -> TransportResponse {
        let mut prefix = String::new();
        let mut marker = String::new();
        let mut max_keys = 1000usize;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "prefix" => prefix = value.trim_matches('/').to_string(),
                "marker" => marker = value.to_string(),
                "max-keys" => max_keys = value.parse().unwrap_or(1000),
                _ => {}
            }
        }

        let matching: Vec<&String> = state
            .entries
            .iter()
            .filter(|key| key.starts_with(&prefix))
            .filter(|key| marker.is_empty() || key.as_str() > marker.as_str())
            .collect();

        let page: Vec<&String> = matching.iter().take(max_keys).copied().collect();
        let is_truncated = matching.len() > page.len();
        let next_marker = if is_truncated {
            page.last().map(|key| key.to_string()).unwrap_or_default()
        } else {
            String::new()
        };

        let contents: Vec<Value> = page
            .iter()
            .map(|key| json!({ "Key": key, "Size": 0, "Mode": "0100664" }))
            .collect();

        json_response(
            200,
            json!({
                "Name": "mock",
                "Contents": contents,
                "CommonPrefixes": [],
                "IsTruncated": is_truncated,
                "NextMarker": next_marker,
                "MaxKeys": max_keys.to_string(),
            }),
        )
    }
}

fn envelope_scalar(envelope: &Value) -> Option<String> {
    let envelope = envelope.as_object()?;
    envelope.values().next().map(|value| match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    })
}

fn eval_condition(condition: &str, stored: Option<&StoredItem>) -> bool {
    for clause in condition.split(" and ") {
        let Some((lhs, rhs)) = clause.split_once("==") else {
            return false;
        };
        let lhs = lhs.trim();
        let rhs = rhs.trim().trim_matches('"');

        let actual = match stored {
            None => None,
            Some(item) => match lhs {
                "__mtime_secs" => Some(item.mtime.0.to_string()),
                "__mtime_nsecs" => Some(item.mtime.1.to_string()),
                attribute => item.attributes.get(attribute).and_then(envelope_scalar),
            },
        };

        if actual.as_deref() != Some(rhs) {
            return false;
        }
    }
    true
}

#[async_trait]
impl Transport for MockService {
    async fn round_trip(
        &self,
        request: &TransportRequest,
        _timeout: Option<Duration>,
    ) -> Result<TransportResponse, TransportError> {
        Ok(self.handle(request))
    }
}

/// Fails with the connection-closed class a fixed number of times, then
/// answers 200 with an empty body.
#[derive(Debug, Default)]
pub struct FlakyTransport {
    pub failures: AtomicU32,
    pub calls: AtomicU32,
}

impl FlakyTransport {
    pub fn failing(times: u32) -> Self {
        Self {
            failures: AtomicU32::new(times),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn round_trip(
        &self,
        _request: &TransportRequest,
        _timeout: Option<Duration>,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::ConnectionClosed);
        }
        Ok(status_response(200))
    }
}

/// Replays a scripted sequence of outcomes, one per round-trip.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    outcomes: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: TransportResponse) {
        self.outcomes.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_error(&self, error: TransportError) {
        self.outcomes.lock().unwrap().push_back(Err(error));
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn round_trip(
        &self,
        _request: &TransportRequest,
        _timeout: Option<Duration>,
    ) -> Result<TransportResponse, TransportError> {
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("script exhausted".to_string())))
    }
}
