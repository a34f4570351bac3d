//! Cooperative stream consumption.
//!
//! Multiple processes share a stream's shards with exactly one active owner
//! per shard and resumable offsets. Membership, assignments and committed
//! offsets live in one JSON document on the stream root, mutated only by
//! compare-and-swap on its modification time; everything else is derived
//! from that document.

mod claim;
mod committer;
mod config;
mod coordinator;
mod state;

pub use claim::RecordBatch;
pub use committer::SequenceTracker;
pub use config::{
    Backoff, ClaimConfig, ConsumerGroupConfig, FetchConfig, InitialLocation, RetryPolicy,
    SequenceNumberConfig, SessionConfig, StateConfig,
};
pub use coordinator::{ConsumerGroup, Member};
pub use state::{
    assign_shards, ConsumerGroupState, MemberState, ShardAssignment, STATE_SCHEMA_VERSION,
};
