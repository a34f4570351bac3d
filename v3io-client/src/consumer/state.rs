//! The persisted consumer-group state document.
//!
//! One JSON document lives as a single item attribute on the stream root.
//! It is only ever mutated through a read-modify-write guarded by the item's
//! modification time; every writer recomputes shard assignments from the
//! live member list, so the document is always internally consistent.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Version stamped into newly created state documents.
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// One member of the consumer group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberState {
    /// Unique member ID.
    #[serde(rename = "id")]
    pub id: String,
    /// Unix timestamp (milliseconds) of the member's last heartbeat.
    #[serde(rename = "lastHeartbeat")]
    pub last_heartbeat: u64,
}

/// Ownership of one shard by one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardAssignment {
    /// The shard.
    #[serde(rename = "shardID")]
    pub shard_id: u32,
    /// The owning member.
    #[serde(rename = "memberID")]
    pub member_id: String,
}

/// The state document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsumerGroupState {
    /// Document schema version.
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    /// Current members with their last heartbeats.
    #[serde(rename = "members", default)]
    pub members: Vec<MemberState>,
    /// Current shard-to-member assignment; every shard appears at most once.
    #[serde(rename = "shardAssignments", default)]
    pub shard_assignments: Vec<ShardAssignment>,
    /// Highest committed sequence number per shard. Never decreases except
    /// by explicit operator reset.
    #[serde(rename = "shardOffsets", default)]
    pub shard_offsets: BTreeMap<u32, u64>,
}

impl ConsumerGroupState {
    /// Looks up a member by ID.
    pub fn member(&self, id: &str) -> Option<&MemberState> {
        self.members.iter().find(|member| member.id == id)
    }

    /// Looks up a member by ID, mutably.
    pub fn member_mut(&mut self, id: &str) -> Option<&mut MemberState> {
        self.members.iter_mut().find(|member| member.id == id)
    }

    /// IDs of members whose heartbeat is not older than the session
    /// timeout, sorted lexicographically.
    pub fn live_member_ids(&self, now: u64, session_timeout: Duration) -> Vec<String> {
        let timeout_millis = session_timeout.as_millis() as u64;
        let mut ids: Vec<String> = self
            .members
            .iter()
            .filter(|member| now.saturating_sub(member.last_heartbeat) <= timeout_millis)
            .map(|member| member.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Shards currently assigned to a member, ascending.
    pub fn shards_of(&self, member_id: &str) -> Vec<u32> {
        let mut shards: Vec<u32> = self
            .shard_assignments
            .iter()
            .filter(|assignment| assignment.member_id == member_id)
            .map(|assignment| assignment.shard_id)
            .collect();
        shards.sort_unstable();
        shards
    }

    /// The committed sequence number of a shard, if any.
    pub fn committed_offset(&self, shard_id: u32) -> Option<u64> {
        self.shard_offsets.get(&shard_id).copied()
    }

    /// Recomputes shard assignments from the live member list.
    pub fn rebalance(&mut self, shard_count: u32, now: u64, session_timeout: Duration) {
        let live = self.live_member_ids(now, session_timeout);
        self.shard_assignments = assign_shards(shard_count, &live);
    }
}

/// Partitions shards across members: shard ID modulo member count, with
/// members ordered lexicographically by ID. Deterministic, so every writer
/// computes the same assignment from the same member list.
pub fn assign_shards(shard_count: u32, sorted_member_ids: &[String]) -> Vec<ShardAssignment> {
    if sorted_member_ids.is_empty() {
        return Vec::new();
    }

    (0..shard_count)
        .map(|shard_id| ShardAssignment {
            shard_id,
            member_id: sorted_member_ids[shard_id as usize % sorted_member_ids.len()].clone(),
        })
        .collect()
}

/// Current Unix time in milliseconds.
pub(crate) fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
