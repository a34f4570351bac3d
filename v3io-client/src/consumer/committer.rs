//! Periodic offset commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use v3io_core::V3ioError;

use super::coordinator::StateAccessor;
use super::state::ConsumerGroupState;

/// Tracks per-shard sequence numbers: the highest handed to the consumer
/// (in flight) and the highest the consumer acknowledged.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    acked: Mutex<HashMap<u32, u64>>,
    in_flight: Mutex<HashMap<u32, u64>>,
}

impl SequenceTracker {
    /// Marks a sequence number as acknowledged; keeps the maximum.
    pub fn ack(&self, shard_id: u32, sequence_number: u64) {
        let mut acked = self.acked.lock().expect("sequence tracker poisoned");
        let entry = acked.entry(shard_id).or_insert(0);
        if sequence_number > *entry {
            *entry = sequence_number;
        }
    }

    /// The highest acknowledged sequence number of a shard.
    pub fn acked(&self, shard_id: u32) -> Option<u64> {
        self.acked
            .lock()
            .expect("sequence tracker poisoned")
            .get(&shard_id)
            .copied()
    }

    /// The highest sequence number handed to the consumer for a shard.
    pub fn highest_in_flight(&self, shard_id: u32) -> Option<u64> {
        self.in_flight
            .lock()
            .expect("sequence tracker poisoned")
            .get(&shard_id)
            .copied()
    }

    pub(crate) fn record_in_flight(&self, shard_id: u32, sequence_number: u64) {
        let mut in_flight = self.in_flight.lock().expect("sequence tracker poisoned");
        let entry = in_flight.entry(shard_id).or_insert(0);
        if sequence_number > *entry {
            *entry = sequence_number;
        }
    }

    fn acked_snapshot(&self) -> HashMap<u32, u64> {
        self.acked
            .lock()
            .expect("sequence tracker poisoned")
            .clone()
    }
}

pub(crate) struct CommitterContext {
    pub accessor: Arc<StateAccessor>,
    pub tracker: Arc<SequenceTracker>,
    pub state_tx: watch::Sender<ConsumerGroupState>,
    pub interval: std::time::Duration,
    pub cancel: CancellationToken,
}

/// Flushes acknowledged sequence numbers at the commit interval.
///
/// Commits only move offsets forward; a final flush runs when the session
/// ends so acknowledged work is not lost on leave.
pub(crate) async fn run_committer(ctx: CommitterContext) {
    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                flush(&ctx).await;
                break;
            }
            _ = tokio::time::sleep(ctx.interval) => {
                flush(&ctx).await;
            }
        }
    }
}

async fn flush(ctx: &CommitterContext) {
    let acked = ctx.tracker.acked_snapshot();
    if acked.is_empty() {
        return;
    }

    let result = ctx
        .accessor
        .modify(|state| {
            for (shard_id, sequence_number) in &acked {
                let entry = state.shard_offsets.entry(*shard_id).or_insert(0);
                // committed sequence numbers never decrease
                if *sequence_number > *entry {
                    *entry = *sequence_number;
                }
            }
        })
        .await;

    match result {
        Ok(state) => {
            tracing::debug!(shards = acked.len(), "committed shard offsets");
            let _ = ctx.state_tx.send(state);
        }
        Err(error) => {
            tracing::warn!(error = %error, "offset commit failed");
            if matches!(error, V3ioError::SessionLost(_)) {
                ctx.cancel.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_keeps_maximum() {
        let tracker = SequenceTracker::default();
        tracker.ack(0, 5);
        tracker.ack(0, 3);
        assert_eq!(tracker.acked(0), Some(5));
        tracker.ack(0, 9);
        assert_eq!(tracker.acked(0), Some(9));
    }

    #[test]
    fn test_in_flight_tracked_per_shard() {
        let tracker = SequenceTracker::default();
        tracker.record_in_flight(0, 4);
        tracker.record_in_flight(1, 7);
        assert_eq!(tracker.highest_in_flight(0), Some(4));
        assert_eq!(tracker.highest_in_flight(1), Some(7));
        assert_eq!(tracker.highest_in_flight(2), None);
    }
}
