//! Consumer-group scenarios: deterministic assignment, record flow with
//! offset commits, and shard migration after a member dies.

mod common;

use std::sync::Arc;
use std::time::Duration;

use v3io_client::consumer::{ConsumerGroup, ConsumerGroupConfig, Member};
use v3io_client::types::{CreateStreamInput, DataPlaneInput, PutRecordsInput, StreamRecord};
use v3io_client::DataPlane;

use crate::common::MockService;

const STREAM: &str = "events";
const GROUP: &str = "workers";

fn input_for() -> DataPlaneInput {
    DataPlaneInput {
        url: "http://mock".to_string(),
        container_name: "c".to_string(),
        ..Default::default()
    }
}

fn fast_config() -> ConsumerGroupConfig {
    let mut config = ConsumerGroupConfig::default();
    config.session.timeout = Duration::from_millis(1500);
    config.session.heartbeat_interval = Duration::from_millis(100);
    config.sequence_number.commit_interval = Duration::from_millis(200);
    config.claim.record_batch_fetch.interval = Duration::from_millis(50);
    config.state.modify_retry.attempts = 30;
    config
}

async fn stream_data_plane(shard_count: u32) -> Arc<DataPlane> {
    let data_plane = Arc::new(DataPlane::new(Arc::new(MockService::new()), None));
    data_plane
        .create_stream(&CreateStreamInput {
            data_plane: input_for(),
            path: STREAM.to_string(),
            shard_count,
            retention_period_hours: 1,
        })
        .await
        .unwrap();
    data_plane
}

async fn put_record(data_plane: &DataPlane, shard_id: u32, payload: &[u8]) {
    data_plane
        .put_records(&PutRecordsInput {
            data_plane: input_for(),
            path: STREAM.to_string(),
            records: vec![StreamRecord {
                shard_id: Some(shard_id),
                data: payload.to_vec(),
                ..Default::default()
            }],
        })
        .await
        .unwrap()
        .release();
}

async fn wait_for<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_members_split_four_shards_deterministically() {
    let data_plane = stream_data_plane(4).await;
    let group = ConsumerGroup::new(
        Arc::clone(&data_plane),
        input_for(),
        STREAM,
        GROUP,
        fast_config(),
    )
    .await
    .unwrap();

    let member_a = group.join(Some("member-a".to_string())).await.unwrap();
    let member_b = group.join(Some("member-b".to_string())).await.unwrap();

    wait_for("deterministic shard split", || {
        member_a.shards() == vec![0, 2] && member_b.shards() == vec![1, 3]
    })
    .await;

    // every shard has exactly one owner
    let state = member_a.state();
    assert_eq!(state.shard_assignments.len(), 4);
    for shard in 0..4 {
        let owners: Vec<_> = state
            .shard_assignments
            .iter()
            .filter(|assignment| assignment.shard_id == shard)
            .collect();
        assert_eq!(owners.len(), 1, "shard {shard} has {} owners", owners.len());
    }

    member_a.leave().await.unwrap();
    member_b.leave().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_records_flow_acks_commit_and_resume() {
    let data_plane = stream_data_plane(2).await;
    let group = ConsumerGroup::new(
        Arc::clone(&data_plane),
        input_for(),
        STREAM,
        GROUP,
        fast_config(),
    )
    .await
    .unwrap();

    put_record(&data_plane, 0, b"one").await;
    put_record(&data_plane, 0, b"two").await;
    put_record(&data_plane, 1, b"three").await;

    let mut member: Member = group.join(Some("reader".to_string())).await.unwrap();
    let mut batches = member.take_batches().unwrap();
    assert!(member.take_batches().is_none());

    let mut received = 0usize;
    while received < 3 {
        let batch = tokio::time::timeout(Duration::from_secs(10), batches.recv())
            .await
            .expect("batches keep flowing")
            .expect("channel open");
        received += batch.records.len();
        if let Some(last) = batch.last_sequence_number() {
            member.ack(batch.shard_id, last);
        }
    }

    // committed offsets surface in the persisted state within a commit tick
    wait_for("offsets committed", || {
        let state = member.state();
        state.committed_offset(0) == Some(2) && state.committed_offset(1) == Some(1)
    })
    .await;

    member.leave().await.unwrap();

    // a new member resumes after the committed offsets: only new records flow
    put_record(&data_plane, 0, b"four").await;

    let mut resumed = group.join(Some("reader-2".to_string())).await.unwrap();
    let mut batches = resumed.take_batches().unwrap();

    let batch = tokio::time::timeout(Duration::from_secs(10), batches.recv())
        .await
        .expect("resumed member receives the new record")
        .expect("channel open");
    assert_eq!(batch.shard_id, 0);
    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.records[0].sequence_number, 3);
    assert_eq!(batch.records[0].data, b"four");

    resumed.leave().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dead_member_shards_migrate_within_session_timeout() {
    let data_plane = stream_data_plane(4).await;
    let group = ConsumerGroup::new(
        Arc::clone(&data_plane),
        input_for(),
        STREAM,
        GROUP,
        fast_config(),
    )
    .await
    .unwrap();

    let member_a = group.join(Some("member-a".to_string())).await.unwrap();
    let member_b = group.join(Some("member-b".to_string())).await.unwrap();

    wait_for("initial split", || {
        member_a.shards() == vec![0, 2] && member_b.shards() == vec![1, 3]
    })
    .await;

    // simulate a crash: tasks stop, no leave is written
    drop(member_b);

    wait_for("survivor seizes the dead member's shards", || {
        member_a.shards() == vec![0, 1, 2, 3]
    })
    .await;

    let state = member_a.state();
    assert_eq!(state.members.len(), 1);
    assert_eq!(state.members[0].id, "member-a");

    member_a.leave().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leave_rebalances_remaining_member() {
    let data_plane = stream_data_plane(2).await;
    let group = ConsumerGroup::new(
        Arc::clone(&data_plane),
        input_for(),
        STREAM,
        GROUP,
        fast_config(),
    )
    .await
    .unwrap();

    let member_a = group.join(Some("member-a".to_string())).await.unwrap();
    let member_b = group.join(Some("member-b".to_string())).await.unwrap();

    wait_for("initial split", || {
        member_a.shards() == vec![0] && member_b.shards() == vec![1]
    })
    .await;

    member_b.leave().await.unwrap();

    wait_for("remaining member owns everything", || {
        member_a.shards() == vec![0, 1]
    })
    .await;

    assert!(member_a.is_session_alive());
    member_a.leave().await.unwrap();
}
