//! Event handling: heights, precommits, latency and disconnects.

mod common;

use common::*;

use tm_monitor_block_store::BlockStore;
use tm_monitor_node::{DeliveryMode, NodeOptions, NodeState};
use tokio::sync::mpsc;

#[tokio::test]
async fn test_header_then_signed_block() {
    let Harness {
        node,
        meter,
        client,
        ..
    } = harness();
    set_validators(&client, &[own_key()]);
    node.start().await.unwrap();
    assert!(node.is_validator());

    assert!(meter.emit(header(100)).await);
    assert!(meter.emit(block(100, &[own_key()])).await);

    assert_eq!(node.precommit_sum(), 1);
    assert_eq!(node.precommit_miss(), 0);
    assert_eq!(node.height(), 100);
    assert_eq!(node.voting_power(), 10);

    node.stop().await;
}

#[tokio::test]
async fn test_unsigned_block_is_a_miss() {
    let Harness {
        node,
        meter,
        client,
        ..
    } = harness();
    set_validators(&client, &[own_key(), other_key()]);
    node.start().await.unwrap();

    meter.emit(block(5, &[other_key()])).await;
    meter.emit(block(6, &[])).await;

    assert_eq!(node.precommit_sum(), 0);
    assert_eq!(node.precommit_miss(), 2);

    node.stop().await;
}

#[tokio::test]
async fn test_duplicate_signature_counts_once() {
    let Harness {
        node,
        meter,
        client,
        ..
    } = harness();
    set_validators(&client, &[own_key()]);
    node.start().await.unwrap();

    meter.emit(block(5, &[own_key(), own_key()])).await;

    assert_eq!(node.precommit_sum(), 1);
    assert_eq!(node.precommit_miss(), 0);

    node.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_precommits_counted_only_once_validator() {
    let Harness {
        node,
        meter,
        client,
        ..
    } = harness();
    node.start().await.unwrap();

    meter.emit(block(1, &[own_key()])).await;
    meter.emit(block(2, &[])).await;
    assert_eq!(node.precommit_sum() + node.precommit_miss(), 0);

    set_validators(&client, &[own_key()]);
    tokio::time::sleep(CHECK_INTERVAL + std::time::Duration::from_millis(100)).await;
    assert!(node.is_validator());

    let blocks = [
        block(3, &[own_key()]),
        block(4, &[]),
        block(5, &[other_key(), own_key()]),
        block(6, &[other_key()]),
        block(7, &[own_key()]),
    ];
    let count = blocks.len() as u64;
    for event in blocks {
        meter.emit(event).await;
    }

    assert_eq!(node.precommit_sum() + node.precommit_miss(), count);
    assert_eq!(node.precommit_sum(), 3);

    node.stop().await;
}

#[tokio::test]
async fn test_header_height_never_decreases() {
    let Harness { node, meter, .. } = harness();
    let (tx, mut rx) = mpsc::channel(10);
    node.send_blocks_to(tx);
    node.start().await.unwrap();

    let mut last = 0;
    for height in [5, 7, 6, 7, 9, 1] {
        meter.emit(header(height)).await;
        assert!(node.height() >= last);
        last = node.height();
    }

    assert_eq!(node.height(), 9);
    assert_eq!(rx.recv().await.unwrap().height, 5);

    node.stop().await;
}

#[tokio::test]
async fn test_full_block_updates_height() {
    let Harness { node, meter, .. } = harness();
    node.start().await.unwrap();

    meter.emit(block(12, &[])).await;
    meter.emit(header(11)).await;

    assert_eq!(node.height(), 12);

    node.stop().await;
}

#[tokio::test]
async fn test_full_blocks_forwarded_and_saved() {
    let Harness {
        node, meter, store, ..
    } = harness();
    let (tx, mut rx) = mpsc::channel(10);
    node.send_full_blocks_to(tx);
    node.start().await.unwrap();
    assert!(!node.is_validator());

    meter.emit(block(42, &[])).await;

    assert_eq!(rx.recv().await.unwrap().height(), 42);

    node.stop().await;
    node.wait().await;

    assert_eq!(store.get(42).await.unwrap().unwrap().height(), 42);
}

#[tokio::test]
async fn test_latency_without_queue() {
    let Harness { node, meter, .. } = harness();
    node.start().await.unwrap();

    assert!(meter.emit_latency(2_500_000_000.0).await);

    assert!((node.block_latency_ms() - 2500.0).abs() < f64::EPSILON);

    node.stop().await;
}

#[tokio::test]
async fn test_latency_forwarded_in_millis() {
    let Harness { node, meter, .. } = harness();
    let (tx, mut rx) = mpsc::channel(10);
    node.send_block_latencies_to(tx);
    node.start().await.unwrap();

    meter.emit_latency(1_000_000.0).await;

    let latency = rx.recv().await.unwrap();
    assert!((latency - 1.0).abs() < f64::EPSILON);

    node.stop().await;
}

#[tokio::test]
async fn test_disconnect() {
    let Harness { node, meter, .. } = harness();
    let (tx, mut rx) = mpsc::channel(10);
    node.notify_about_disconnects(tx);
    node.start().await.unwrap();
    meter.emit(header(10)).await;

    assert!(meter.disconnect().await);

    assert!(!node.is_online());
    assert_eq!(node.state(), NodeState::Offline);
    assert_eq!(rx.recv().await, Some(true));
    assert!(rx.try_recv().is_err());

    assert!(!meter.emit(header(11)).await);
    assert_eq!(node.height(), 10);

    node.stop().await;
}

#[tokio::test]
async fn test_drop_newest_does_not_block() {
    let Harness { node, meter, .. } = harness_with(NodeOptions {
        delivery_mode: DeliveryMode::DropNewest,
        ..NodeOptions::default()
    });
    let (tx, mut rx) = mpsc::channel(1);
    node.send_blocks_to(tx);
    node.start().await.unwrap();

    meter.emit(header(1)).await;
    meter.emit(header(2)).await;

    assert_eq!(rx.recv().await.unwrap().height, 1);
    assert!(rx.try_recv().is_err());
    assert_eq!(node.height(), 2);

    node.stop().await;
}

#[tokio::test]
async fn test_status_snapshot() {
    let Harness {
        node,
        meter,
        client,
        ..
    } = harness();
    set_validators(&client, &[own_key()]);
    node.start().await.unwrap();
    meter.emit(block(3, &[own_key()])).await;

    let json = serde_json::to_value(node.status()).unwrap();

    assert_eq!(json["name"], node.address());
    assert_eq!(json["online"], true);
    assert_eq!(json["height"], 3);
    assert_eq!(json["is_validator"], true);
    assert_eq!(json["power"], 10);
    assert_eq!(json["pc_sum"], 1);
    assert_eq!(json["pc_miss"], 0);
    assert_eq!(json["pub_key"]["type"], "tendermint/PubKeyEd25519");

    node.stop().await;
}
