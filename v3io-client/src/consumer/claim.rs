//! Per-shard claims.
//!
//! The supervisor diffs the member's assigned shards against its running
//! claims on every state change. Each claim is a dedicated task walking one
//! shard: obtain a starting location, then fetch record batches at the
//! configured interval and hand them to the consumer over the bounded batch
//! channel. A claim moves through `unowned → owned-starting →
//! owned-streaming → owned-draining → released`; losing ownership or losing
//! the session drives it through the draining tail.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::committer::SequenceTracker;
use super::config::{ClaimConfig, InitialLocation, RetryPolicy};
use super::state::ConsumerGroupState;
use crate::ops::DataPlane;
use crate::types::{
    DataPlaneInput, GetRecordsInput, GetRecordsResult, Output, SeekShardInput, SeekShardType,
};

/// A batch of records fetched from one shard.
#[derive(Debug)]
pub struct RecordBatch {
    /// The shard the batch came from.
    pub shard_id: u32,
    /// The records, in sequence order.
    pub records: Vec<GetRecordsResult>,
}

impl RecordBatch {
    /// Sequence number of the last record in the batch.
    ///
    /// Passing it to [`Member::ack`](super::Member::ack) marks the whole
    /// batch as processed.
    pub fn last_sequence_number(&self) -> Option<u64> {
        self.records.last().map(|record| record.sequence_number)
    }
}

pub(crate) struct SupervisorContext {
    pub member_id: String,
    pub data_plane: Arc<DataPlane>,
    pub input: DataPlaneInput,
    pub stream_path: String,
    pub claim_config: ClaimConfig,
    pub state_rx: watch::Receiver<ConsumerGroupState>,
    pub batch_tx: mpsc::Sender<RecordBatch>,
    pub tracker: Arc<SequenceTracker>,
    pub session_cancel: CancellationToken,
}

struct ClaimHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Reconciles running claims with the assignment snapshot.
pub(crate) async fn run_claim_supervisor(mut ctx: SupervisorContext) {
    let mut claims: HashMap<u32, ClaimHandle> = HashMap::new();

    loop {
        let (owned, offsets) = {
            let snapshot = ctx.state_rx.borrow();
            (
                snapshot.shards_of(&ctx.member_id),
                snapshot.shard_offsets.clone(),
            )
        };

        // release claims for shards we no longer own
        claims.retain(|shard_id, handle| {
            if owned.contains(shard_id) {
                true
            } else {
                tracing::info!(member_id = %ctx.member_id, shard_id, "shard ownership lost, draining claim");
                handle.cancel.cancel();
                false
            }
        });

        // start claims for newly owned shards
        for shard_id in owned {
            if claims.contains_key(&shard_id) {
                continue;
            }

            let cancel = ctx.session_cancel.child_token();
            let task = tokio::spawn(run_claim(ClaimContext {
                member_id: ctx.member_id.clone(),
                data_plane: Arc::clone(&ctx.data_plane),
                input: ctx.input.clone(),
                stream_path: ctx.stream_path.clone(),
                shard_id,
                committed: offsets.get(&shard_id).copied(),
                initial_location: ctx.claim_config.record_batch_fetch.initial_location,
                fetch_interval: ctx.claim_config.record_batch_fetch.interval,
                batch_limit: ctx.claim_config.record_batch_fetch.num_records_in_batch,
                location_retry: ctx.claim_config.get_shard_location_retry,
                batch_tx: ctx.batch_tx.clone(),
                tracker: Arc::clone(&ctx.tracker),
                cancel: cancel.clone(),
            }));

            claims.insert(shard_id, ClaimHandle { cancel, task });
        }

        tokio::select! {
            _ = ctx.session_cancel.cancelled() => break,
            changed = ctx.state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    for (shard_id, handle) in claims {
        tracing::debug!(shard_id, "cancelling claim at session end");
        handle.cancel.cancel();
        let _ = handle.task.await;
    }
}

struct ClaimContext {
    member_id: String,
    data_plane: Arc<DataPlane>,
    input: DataPlaneInput,
    stream_path: String,
    shard_id: u32,
    committed: Option<u64>,
    initial_location: InitialLocation,
    fetch_interval: std::time::Duration,
    batch_limit: u64,
    location_retry: RetryPolicy,
    batch_tx: mpsc::Sender<RecordBatch>,
    tracker: Arc<SequenceTracker>,
    cancel: CancellationToken,
}

/// Walks one shard until cancelled.
async fn run_claim(ctx: ClaimContext) {
    tracing::debug!(
        member_id = %ctx.member_id,
        shard_id = ctx.shard_id,
        "claim owned-starting"
    );

    let shard_path = format!(
        "{}/{}",
        ctx.stream_path.trim_end_matches('/'),
        ctx.shard_id
    );

    let Some(mut location) = start_location(&ctx, &shard_path).await else {
        tracing::debug!(shard_id = ctx.shard_id, "claim released before streaming");
        return;
    };

    tracing::debug!(shard_id = ctx.shard_id, "claim owned-streaming");

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                tracing::debug!(shard_id = ctx.shard_id, "claim owned-draining");
                break;
            }
            _ = tokio::time::sleep(ctx.fetch_interval) => {}
        }

        let fetch = GetRecordsInput {
            data_plane: ctx.input.clone(),
            path: shard_path.clone(),
            location: location.clone(),
            limit: ctx.batch_limit,
        };

        match ctx.data_plane.get_records(&fetch).await {
            Ok(mut response) => {
                let output = match response.take_output() {
                    Some(Output::GetRecords(output)) => output,
                    _ => continue,
                };
                response.release();

                location = output.next_location.clone();
                if output.records.is_empty() {
                    continue;
                }

                if let Some(last) = output.records.last() {
                    ctx.tracker
                        .record_in_flight(ctx.shard_id, last.sequence_number);
                }

                let batch = RecordBatch {
                    shard_id: ctx.shard_id,
                    records: output.records,
                };

                tokio::select! {
                    _ = ctx.cancel.cancelled() => {
                        tracing::debug!(shard_id = ctx.shard_id, "claim owned-draining");
                        break;
                    }
                    sent = ctx.batch_tx.send(batch) => {
                        if sent.is_err() {
                            // consumer dropped the batch channel
                            break;
                        }
                    }
                }
            }
            Err(error) => {
                // fetch errors never propagate; the claim keeps retrying
                // at the fetch interval until the session ends
                tracing::warn!(
                    shard_id = ctx.shard_id,
                    error = %error,
                    "record fetch failed, will retry"
                );
            }
        }
    }

    tracing::debug!(shard_id = ctx.shard_id, "claim released");
}

/// Obtains the claim's starting location: resume after the committed
/// sequence number when one exists, else the configured initial location.
/// Seek failures retry under the configured policy.
async fn start_location(ctx: &ClaimContext, shard_path: &str) -> Option<String> {
    let mut seek = SeekShardInput {
        data_plane: ctx.input.clone(),
        path: shard_path.to_string(),
        ..Default::default()
    };

    match ctx.committed {
        Some(sequence_number) => {
            seek.seek_type = SeekShardType::Sequence;
            seek.starting_sequence_number = sequence_number + 1;
        }
        None => match ctx.initial_location {
            InitialLocation::Earliest => seek.seek_type = SeekShardType::Earliest,
            InitialLocation::Latest => seek.seek_type = SeekShardType::Latest,
            InitialLocation::Time(timestamp) => {
                seek.seek_type = SeekShardType::Time;
                seek.timestamp_sec = timestamp as i64;
            }
            InitialLocation::Sequence(sequence_number) => {
                seek.seek_type = SeekShardType::Sequence;
                seek.starting_sequence_number = sequence_number;
            }
        },
    }

    for attempt in 0..ctx.location_retry.attempts {
        if ctx.cancel.is_cancelled() {
            return None;
        }

        match ctx.data_plane.seek_shard(&seek).await {
            Ok(mut response) => {
                let location = match response.take_output() {
                    Some(Output::SeekShard(output)) => output.location,
                    _ => continue,
                };
                response.release();
                return Some(location);
            }
            Err(error) => {
                tracing::warn!(
                    shard_id = ctx.shard_id,
                    attempt,
                    error = %error,
                    "shard seek failed"
                );
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return None,
                    _ = tokio::time::sleep(ctx.location_retry.backoff.delay(attempt)) => {}
                }
            }
        }
    }

    tracing::error!(
        shard_id = ctx.shard_id,
        "could not obtain shard starting location"
    );
    None
}
