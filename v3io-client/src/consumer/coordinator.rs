//! Consumer-group session lifecycle.
//!
//! A [`ConsumerGroup`] describes the stream once, then members join it. Each
//! member runs three background tasks exchanging updates through typed
//! channels: a heartbeat task refreshing liveness (and seizing stale peers),
//! a claim supervisor reacting to assignment changes, and a commit timer
//! flushing acknowledged sequence numbers. The only shared mutable state is
//! the server-side document; locally each member holds one state snapshot
//! replaced atomically through a watch channel on every successful mutation.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use v3io_core::{AttrValue, Item, Result, V3ioError};

use super::claim::{run_claim_supervisor, RecordBatch, SupervisorContext};
use super::committer::{run_committer, CommitterContext, SequenceTracker};
use super::config::{ConsumerGroupConfig, RetryPolicy};
use super::state::{now_unix_millis, ConsumerGroupState, MemberState, STATE_SCHEMA_VERSION};
use crate::ops::DataPlane;
use crate::types::{
    DataPlaneInput, DescribeStreamInput, GetItemInput, Output, PutItemInput,
};

/// Item attribute the state document is stored under.
const STATE_ATTRIBUTE: &str = "state";
/// System attributes carrying the item's modification time.
const MTIME_SECS_ATTRIBUTE: &str = "__mtime_secs";
const MTIME_NSECS_ATTRIBUTE: &str = "__mtime_nsecs";
/// Consecutive heartbeat failures that constitute loss of session.
const MAX_MISSED_HEARTBEATS: u32 = 3;

/// Reads and mutates the persisted state document under mtime CAS.
pub(crate) struct StateAccessor {
    data_plane: Arc<DataPlane>,
    input: DataPlaneInput,
    state_path: String,
    retry: RetryPolicy,
}

impl StateAccessor {
    /// Reads the current document with its modification time, or `None`
    /// when it does not exist yet.
    async fn read(&self) -> Result<Option<(ConsumerGroupState, (i64, i64))>> {
        let get = GetItemInput {
            data_plane: self.input.clone(),
            path: self.state_path.clone(),
            attribute_names: vec![
                STATE_ATTRIBUTE.to_string(),
                MTIME_SECS_ATTRIBUTE.to_string(),
                MTIME_NSECS_ATTRIBUTE.to_string(),
            ],
        };

        let mut response = match self.data_plane.get_item(&get).await {
            Ok(response) => response,
            Err(error) if error.status_code() == Some(404) => return Ok(None),
            Err(error) => return Err(error),
        };

        let item = match response.take_output() {
            Some(Output::GetItem(output)) => output.item,
            _ => return Err(V3ioError::Decode("state item carried no output".to_string())),
        };
        response.release();

        let document = match item.get(STATE_ATTRIBUTE) {
            Some(AttrValue::Str(document)) => document.clone(),
            _ => {
                return Err(V3ioError::Decode(
                    "state item carries no state attribute".to_string(),
                ))
            }
        };
        let state: ConsumerGroupState = serde_json::from_str(&document)
            .map_err(|e| V3ioError::Decode(format!("state document: {e}")))?;

        let mtime_secs = match item.get(MTIME_SECS_ATTRIBUTE) {
            Some(AttrValue::Int(secs)) => *secs,
            _ => 0,
        };
        let mtime_nsecs = match item.get(MTIME_NSECS_ATTRIBUTE) {
            Some(AttrValue::Int(nsecs)) => *nsecs,
            _ => 0,
        };

        Ok(Some((state, (mtime_secs, mtime_nsecs))))
    }

    /// Applies a mutation to the document under optimistic concurrency.
    ///
    /// Each attempt reads the document, mutates a copy and writes it back
    /// conditioned on the observed modification time. A rejected condition
    /// retries under the configured backoff; exhausting the attempts is a
    /// session-fatal error.
    pub(crate) async fn modify<F>(&self, mut mutate: F) -> Result<ConsumerGroupState>
    where
        F: FnMut(&mut ConsumerGroupState),
    {
        for attempt in 0..self.retry.attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry.backoff.delay(attempt - 1)).await;
            }

            let (mut state, mtime) = match self.read().await? {
                Some((state, mtime)) => (state, Some(mtime)),
                None => (
                    ConsumerGroupState {
                        schema_version: STATE_SCHEMA_VERSION,
                        ..Default::default()
                    },
                    None,
                ),
            };

            mutate(&mut state);

            let document = serde_json::to_string(&state)
                .map_err(|e| V3ioError::Decode(format!("state document: {e}")))?;

            let mut attributes = Item::new();
            attributes.insert(STATE_ATTRIBUTE.to_string(), AttrValue::Str(document));

            let condition = mtime.map(|(secs, nsecs)| {
                format!("__mtime_secs == {secs} and __mtime_nsecs == {nsecs}")
            });

            let put = PutItemInput {
                data_plane: self.input.clone(),
                path: self.state_path.clone(),
                condition,
                attributes,
                update_mode: None,
            };

            match self.data_plane.put_item(&put).await {
                Ok(response) => {
                    response.release();
                    return Ok(state);
                }
                Err(error) if error.is_precondition_failed() => {
                    tracing::debug!(attempt, path = %self.state_path, "state write raced, retrying");
                }
                Err(error) => return Err(error),
            }
        }

        Err(V3ioError::SessionLost(format!(
            "state modification retries exhausted after {} attempts",
            self.retry.attempts
        )))
    }
}

/// A consumer group over one stream.
pub struct ConsumerGroup {
    data_plane: Arc<DataPlane>,
    input: DataPlaneInput,
    stream_path: String,
    name: String,
    shard_count: u32,
    config: ConsumerGroupConfig,
}

impl ConsumerGroup {
    /// Binds a consumer group to a stream, describing it to learn the
    /// shard count.
    pub async fn new(
        data_plane: Arc<DataPlane>,
        input: DataPlaneInput,
        stream_path: impl Into<String>,
        name: impl Into<String>,
        config: ConsumerGroupConfig,
    ) -> Result<Self> {
        let stream_path = stream_path.into();

        let describe = DescribeStreamInput {
            data_plane: input.clone(),
            path: stream_path.clone(),
        };
        let mut response = data_plane.describe_stream(&describe).await?;
        let shard_count = match response.take_output() {
            Some(Output::DescribeStream(output)) => output.shard_count,
            _ => return Err(V3ioError::Decode("stream description carried no output".to_string())),
        };
        response.release();

        Ok(Self {
            data_plane,
            input,
            stream_path,
            name: name.into(),
            shard_count,
            config,
        })
    }

    /// Number of shards in the underlying stream.
    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    /// Joins the group, spawning the member's session tasks.
    ///
    /// A `None` member ID gets a fresh UUID.
    pub async fn join(&self, member_id: Option<String>) -> Result<Member> {
        let member_id = member_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let accessor = Arc::new(StateAccessor {
            data_plane: Arc::clone(&self.data_plane),
            input: self.input.clone(),
            state_path: format!(
                "{}/{}-state",
                self.stream_path.trim_end_matches('/'),
                self.name
            ),
            retry: self.config.state.modify_retry,
        });

        let shard_count = self.shard_count;
        let session_timeout = self.config.session.timeout;

        // join: append ourselves and rebalance
        let id = member_id.clone();
        let initial_state = accessor
            .modify(|state| {
                let now = now_unix_millis();
                match state.member_mut(&id) {
                    Some(member) => member.last_heartbeat = now,
                    None => state.members.push(MemberState {
                        id: id.clone(),
                        last_heartbeat: now,
                    }),
                }
                state.rebalance(shard_count, now, session_timeout);
            })
            .await?;

        tracing::info!(
            member_id = %member_id,
            group = %self.name,
            shards = ?initial_state.shards_of(&member_id),
            "joined consumer group"
        );

        let (state_tx, state_rx) = watch::channel(initial_state);
        let (batch_tx, batch_rx) = mpsc::channel(self.config.claim.record_batch_chan_size);
        let tracker = Arc::new(SequenceTracker::default());
        let session_cancel = CancellationToken::new();

        let heartbeat = tokio::spawn(run_heartbeat(HeartbeatContext {
            member_id: member_id.clone(),
            accessor: Arc::clone(&accessor),
            state_tx: state_tx.clone(),
            interval: self.config.session.heartbeat_interval,
            session_timeout,
            shard_count,
            cancel: session_cancel.clone(),
        }));

        let supervisor = tokio::spawn(run_claim_supervisor(SupervisorContext {
            member_id: member_id.clone(),
            data_plane: Arc::clone(&self.data_plane),
            input: self.input.clone(),
            stream_path: self.stream_path.clone(),
            claim_config: self.config.claim,
            state_rx: state_rx.clone(),
            batch_tx,
            tracker: Arc::clone(&tracker),
            session_cancel: session_cancel.clone(),
        }));

        let committer = tokio::spawn(run_committer(CommitterContext {
            accessor: Arc::clone(&accessor),
            tracker: Arc::clone(&tracker),
            state_tx,
            interval: self.config.sequence_number.commit_interval,
            cancel: session_cancel.clone(),
        }));

        Ok(Member {
            id: member_id,
            accessor,
            tracker,
            state_rx,
            batch_rx: Some(batch_rx),
            session_cancel,
            shard_count,
            session_timeout,
            tasks: vec![heartbeat, supervisor, committer],
        })
    }
}

/// One member of a consumer group: a live session with claims, heartbeat
/// and offset commits.
pub struct Member {
    id: String,
    accessor: Arc<StateAccessor>,
    tracker: Arc<SequenceTracker>,
    state_rx: watch::Receiver<ConsumerGroupState>,
    batch_rx: Option<mpsc::Receiver<RecordBatch>>,
    session_cancel: CancellationToken,
    shard_count: u32,
    session_timeout: std::time::Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl Member {
    /// This member's unique ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Takes the record-batch channel. Yields `None` on a second call.
    pub fn take_batches(&mut self) -> Option<mpsc::Receiver<RecordBatch>> {
        self.batch_rx.take()
    }

    /// Acknowledges processing of a batch up to a sequence number.
    ///
    /// Only acknowledged sequence numbers are ever committed.
    pub fn ack(&self, shard_id: u32, sequence_number: u64) {
        self.tracker.ack(shard_id, sequence_number);
    }

    /// Shards currently assigned to this member.
    pub fn shards(&self) -> Vec<u32> {
        self.state_rx.borrow().shards_of(&self.id)
    }

    /// The member's current state snapshot.
    pub fn state(&self) -> ConsumerGroupState {
        self.state_rx.borrow().clone()
    }

    /// False once the session was torn down (CAS exhaustion or lost
    /// heartbeats).
    pub fn is_session_alive(&self) -> bool {
        !self.session_cancel.is_cancelled()
    }

    /// Leaves the group: stops all tasks (flushing acknowledged offsets),
    /// removes this member from the state and rebalances.
    pub async fn leave(mut self) -> Result<()> {
        self.session_cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }

        let id = self.id.clone();
        let shard_count = self.shard_count;
        let session_timeout = self.session_timeout;
        self.accessor
            .modify(|state| {
                state.members.retain(|member| member.id != id);
                state.rebalance(shard_count, now_unix_millis(), session_timeout);
            })
            .await?;

        tracing::info!(member_id = %self.id, "left consumer group");
        Ok(())
    }
}

impl Drop for Member {
    fn drop(&mut self) {
        // stop heartbeating without touching the state document; peers
        // seize our shards once the session timeout passes, exactly as if
        // the process had died
        self.session_cancel.cancel();
    }
}

struct HeartbeatContext {
    member_id: String,
    accessor: Arc<StateAccessor>,
    state_tx: watch::Sender<ConsumerGroupState>,
    interval: std::time::Duration,
    session_timeout: std::time::Duration,
    shard_count: u32,
    cancel: CancellationToken,
}

/// Refreshes this member's heartbeat at the configured interval.
///
/// The same pass seizes peers whose heartbeat is older than the session
/// timeout: they are deleted from the member list and a rebalance follows.
/// Three consecutive failed refreshes end the session.
async fn run_heartbeat(ctx: HeartbeatContext) {
    let mut consecutive_failures = 0u32;

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = tokio::time::sleep(ctx.interval) => {}
        }

        let member_id = &ctx.member_id;
        let timeout_millis = ctx.session_timeout.as_millis() as u64;
        let result = ctx
            .accessor
            .modify(|state| {
                let now = now_unix_millis();

                match state.member_mut(member_id) {
                    Some(member) => member.last_heartbeat = now,
                    // we were seized while actually alive; rejoin
                    None => state.members.push(MemberState {
                        id: member_id.clone(),
                        last_heartbeat: now,
                    }),
                }

                let before = state.members.len();
                state.members.retain(|member| {
                    member.id == *member_id
                        || now.saturating_sub(member.last_heartbeat) <= timeout_millis
                });
                if state.members.len() != before {
                    tracing::info!(
                        member_id = %member_id,
                        seized = before - state.members.len(),
                        "seized stale members"
                    );
                }

                state.rebalance(ctx.shard_count, now, ctx.session_timeout);
            })
            .await;

        match result {
            Ok(state) => {
                consecutive_failures = 0;
                let _ = ctx.state_tx.send(state);
            }
            Err(error) => {
                consecutive_failures += 1;
                tracing::warn!(
                    member_id = %ctx.member_id,
                    consecutive_failures,
                    error = %error,
                    "heartbeat refresh failed"
                );

                let fatal = matches!(error, V3ioError::SessionLost(_))
                    || consecutive_failures >= MAX_MISSED_HEARTBEATS;
                if fatal {
                    tracing::error!(
                        member_id = %ctx.member_id,
                        "session lost, tearing down claims"
                    );
                    ctx.cancel.cancel();
                    break;
                }
            }
        }
    }
}
