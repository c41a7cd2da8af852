//! Fleet aggregation over mock nodes.

use std::time::Duration;

use assert_matches::assert_matches;
use tm_monitor::{Error, Health, Monitor, MonitorOptions};
use tm_monitor_block_store_memory::MemoryBlockStore;
use tm_monitor_event_meter::Event;
use tm_monitor_event_meter_mock::MockEventMeter;
use tm_monitor_node::{Node, NodeOptions};
use tm_monitor_rpc_client_mock::MockRpcClient;
use tm_monitor_types::{Header, PubKey, Validator};

type TestMonitor = Monitor<MockEventMeter, MockRpcClient, MemoryBlockStore>;
type TestNode = Node<MockEventMeter, MockRpcClient, MemoryBlockStore>;

fn init_test_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn new_monitor() -> TestMonitor {
    init_test_logging();
    Monitor::new(MonitorOptions::default())
}

fn new_node(name: &str, seed: u8) -> (TestNode, MockEventMeter, MockRpcClient) {
    let meter = MockEventMeter::new();
    let client = MockRpcClient::new(PubKey::ed25519(&[seed; 32]));
    let node = Node::new(
        name,
        meter.clone(),
        client.clone(),
        MemoryBlockStore::new(),
        NodeOptions::default(),
    );

    (node, meter, client)
}

fn header(height: i64) -> Event {
    Event::NewBlockHeader(Header {
        height,
        ..Header::default()
    })
}

/// Polls `check` until it holds, advancing time in small steps.
async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held");
}

#[tokio::test]
async fn test_monitor_adds_and_starts_node() {
    let monitor = new_monitor();
    let (node, meter, _) = new_node("a", 1);

    monitor.monitor(node).await.unwrap();

    assert!(meter.is_running());
    assert!(monitor.node_by_name("a").is_some());
    let network = monitor.network();
    assert_eq!(network.num_nodes, 1);
    assert_eq!(network.num_nodes_online, 1);
    assert_eq!(network.health, Health::Full);

    monitor.stop().await;
}

#[tokio::test]
async fn test_duplicate_name_is_refused() {
    let monitor = new_monitor();
    let (first, _, _) = new_node("a", 1);
    let (second, second_meter, _) = new_node("a", 2);

    monitor.monitor(first).await.unwrap();

    assert_matches!(monitor.monitor(second).await, Err(Error::AlreadyMonitored(_)));
    assert_eq!(second_meter.start_calls(), 0);

    monitor.stop().await;
}

#[tokio::test]
async fn test_failed_start_keeps_node_offline() {
    let monitor = new_monitor();
    let (good, _, _) = new_node("a", 1);
    let (bad, bad_meter, _) = new_node("b", 2);
    bad_meter.fail_all_starts();

    monitor.monitor(good).await.unwrap();
    assert_matches!(monitor.monitor(bad).await, Err(Error::Node(_)));

    let network = monitor.network();
    assert_eq!(network.num_nodes, 2);
    assert_eq!(network.num_nodes_online, 1);
    assert_eq!(network.health_string(), "moderate");
    assert!(!monitor.node_by_name("b").unwrap().is_online());

    monitor.stop().await;
}

#[tokio::test]
async fn test_headers_and_latencies_feed_network() {
    let monitor = new_monitor();
    let (a, a_meter, _) = new_node("a", 1);
    let (b, b_meter, _) = new_node("b", 2);
    monitor.monitor(a).await.unwrap();
    monitor.monitor(b).await.unwrap();

    a_meter.emit(header(10)).await;
    b_meter.emit(header(12)).await;
    a_meter.emit_latency(1_000_000_000.0).await;
    b_meter.emit_latency(3_000_000_000.0).await;

    eventually(|| {
        let network = monitor.network();
        network.height == 12 && (network.avg_block_latency_ms - 2000.0).abs() < 1e-6
    })
    .await;

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_triggers_restart() {
    let monitor = new_monitor();
    let (node, meter, _) = new_node("a", 1);
    monitor.monitor(node).await.unwrap();

    meter.disconnect().await;

    eventually(|| monitor.network().total_disconnects == 1).await;
    eventually(|| monitor.network().health == Health::Full).await;
    assert_eq!(meter.start_calls(), 2);
    assert!(monitor.node_by_name("a").unwrap().is_online());

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_marks_network_dead_until_restart() {
    let monitor = new_monitor();
    let (node, meter, _) = new_node("a", 1);
    monitor.monitor(node).await.unwrap();
    meter.fail_starts(3);

    meter.disconnect().await;

    eventually(|| monitor.network().health == Health::Dead).await;
    eventually(|| monitor.network().health == Health::Full).await;
    assert_eq!(meter.start_calls(), 1 + 4);

    monitor.stop().await;
}

#[tokio::test]
async fn test_unmonitor_stops_and_removes() {
    let monitor = new_monitor();
    let (node, meter, _) = new_node("a", 1);
    monitor.monitor(node).await.unwrap();

    monitor.unmonitor("a").await.unwrap();

    assert!(monitor.node_by_name("a").is_none());
    assert!(!meter.is_running());
    assert_eq!(monitor.network().num_nodes, 0);
    assert_eq!(monitor.network().health, Health::Dead);
    assert_matches!(monitor.unmonitor("a").await, Err(Error::UnknownNode(_)));
}

#[tokio::test]
async fn test_start_all_counts_successes() {
    let monitor = new_monitor();
    let (a, _, _) = new_node("a", 1);
    let (b, b_meter, _) = new_node("b", 2);
    let (c, _, _) = new_node("c", 3);
    b_meter.fail_all_starts();

    let started = monitor.start_all(vec![a, b, c]).await;

    assert_eq!(started, 2);
    assert_eq!(monitor.nodes().len(), 3);
    assert_eq!(monitor.node_statuses().len(), 3);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_update_loop_counts_validators() {
    let monitor = new_monitor();
    let key = PubKey::ed25519(&[1; 32]);
    let (node, _, client) = new_node("a", 1);
    client.set_validators(
        7,
        vec![
            Validator {
                address: key.address().unwrap(),
                pub_key: key,
                voting_power: 5,
            },
            Validator {
                address: String::new(),
                pub_key: PubKey::ed25519(&[9; 32]),
                voting_power: 5,
            },
        ],
    );
    monitor.monitor(node).await.unwrap();

    monitor.start();

    eventually(|| monitor.network().num_validators == 2).await;
    assert_eq!(monitor.network().num_validators_online, 1);

    monitor.stop().await;
}

#[tokio::test]
async fn test_stop_stops_every_node() {
    let monitor = new_monitor();
    let (a, a_meter, _) = new_node("a", 1);
    let (b, b_meter, _) = new_node("b", 2);
    monitor.monitor(a).await.unwrap();
    monitor.monitor(b).await.unwrap();
    monitor.start();

    monitor.stop().await;

    assert!(!a_meter.is_running());
    assert!(!b_meter.is_running());
    assert_eq!(monitor.network().health, Health::Dead);
}
