//! Dispatcher behavior: retry policy, submit/complete accounting and
//! lifecycle.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use v3io_client::types::{DataPlaneInput, GetItemInput, PutObjectInput};
use v3io_client::{ClientConfig, Dispatcher};

use crate::common::{FlakyTransport, MockService};

fn input_for(container: &str) -> DataPlaneInput {
    DataPlaneInput {
        url: "http://mock".to_string(),
        container_name: container.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_connection_closed_retried_up_to_seven_failures() {
    let transport = Arc::new(FlakyTransport::failing(7));
    let dispatcher = Dispatcher::new(ClientConfig::default(), transport.clone());

    let put = PutObjectInput {
        data_plane: input_for("c"),
        path: "obj".to_string(),
        body: b"payload".to_vec(),
        ..Default::default()
    };

    dispatcher
        .data_plane()
        .put_object(&put)
        .await
        .expect("seven connection-closed failures then success is one logical success");
    assert_eq!(transport.calls.load(std::sync::atomic::Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_connection_closed_surfaces_after_eight_failures() {
    let transport = Arc::new(FlakyTransport::failing(8));
    let dispatcher = Dispatcher::new(ClientConfig::default(), transport.clone());

    let put = PutObjectInput {
        data_plane: input_for("c"),
        path: "obj".to_string(),
        body: b"payload".to_vec(),
        ..Default::default()
    };

    let error = dispatcher.data_plane().put_object(&put).await.unwrap_err();
    assert!(error.is_connection_closed());
    assert_eq!(transport.calls.load(std::sync::atomic::Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_empty_container_rejected_before_io() {
    let transport = Arc::new(FlakyTransport::failing(0));
    let dispatcher = Dispatcher::new(ClientConfig::default(), transport.clone());

    let put = PutObjectInput {
        data_plane: input_for(""),
        path: "obj".to_string(),
        ..Default::default()
    };

    let error = dispatcher.data_plane().put_object(&put).await.unwrap_err();
    assert!(matches!(error, v3io_core::V3ioError::EmptyContainer));
    assert_eq!(transport.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancelled_token_short_circuits_submit() {
    let dispatcher = Dispatcher::new(ClientConfig::default(), Arc::new(MockService::new()));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut input = GetItemInput {
        data_plane: input_for("c"),
        path: "it".to_string(),
        attribute_names: vec!["a".to_string()],
    };
    input.data_plane.cancel = cancel;

    let (response_tx, _response_rx) = mpsc::channel(1);
    let error = dispatcher
        .submit_get_item(input, None, response_tx)
        .await
        .unwrap_err();
    assert!(matches!(error, v3io_core::V3ioError::Cancelled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stress_all_submissions_complete_exactly_once() {
    const TOTAL_OPS: usize = 10_000;

    let service = Arc::new(MockService::new());
    let dispatcher = Arc::new(Dispatcher::new(
        ClientConfig::builder()
            .num_workers(8)
            .max_connections(16)
            .build()
            .unwrap(),
        service,
    ));

    let (response_tx, mut response_rx) = mpsc::channel(256);

    let submitter = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            let mut handles = Vec::with_capacity(TOTAL_OPS);
            for index in 0..TOTAL_OPS {
                let put = PutObjectInput {
                    data_plane: input_for("c"),
                    path: format!("objects/{index}"),
                    body: vec![0u8; 64],
                    ..Default::default()
                };
                let handle = dispatcher
                    .submit_put_object(put, None, response_tx.clone())
                    .await
                    .expect("queue accepts submission");
                handles.push(handle.id);
            }
            handles
        })
    };

    let mut seen = HashSet::new();
    for _ in 0..TOTAL_OPS {
        let response = response_rx
            .recv()
            .await
            .expect("every submission completes");
        assert!(response.error().is_none(), "op failed: {:?}", response.error());
        assert!(seen.insert(response.id()), "duplicate completion");
        response.release();
    }

    let submitted = submitter.await.unwrap();
    assert_eq!(submitted.len(), TOTAL_OPS);
    let submitted: HashSet<u64> = submitted.into_iter().collect();
    assert_eq!(submitted, seen);

    // the pool must not grow without bound under repeated stress
    assert!(dispatcher.data_plane().pool().idle() <= 1024);
}

#[tokio::test]
async fn test_async_response_carries_context_and_error() {
    let dispatcher = Dispatcher::new(ClientConfig::default(), Arc::new(MockService::new()));

    let get = GetItemInput {
        data_plane: input_for("c"),
        path: "missing/item".to_string(),
        attribute_names: vec!["a".to_string()],
    };

    let (response_tx, mut response_rx) = mpsc::channel(1);
    let context: v3io_client::CallerContext = Arc::new("marker".to_string());
    let handle = dispatcher
        .submit_get_item(get, Some(context), response_tx)
        .await
        .unwrap();

    let response = response_rx.recv().await.unwrap();
    assert_eq!(response.id(), handle.id);
    assert_eq!(
        response
            .context()
            .and_then(|context| context.downcast_ref::<String>())
            .map(String::as_str),
        Some("marker")
    );
    let error = response.into_result().unwrap_err();
    assert_eq!(error.status_code(), Some(404));
}
