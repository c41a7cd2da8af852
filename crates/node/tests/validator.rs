//! Periodic validator membership checks.

mod common;

use common::*;

use std::time::Duration;

use assert_matches::assert_matches;
use tm_monitor_node::Error;

const TICK_SLACK: Duration = Duration::from_millis(500);

#[tokio::test(start_paused = true)]
async fn test_status_fetched_once_across_ticks() {
    let Harness { node, client, .. } = harness();
    set_validators(&client, &[own_key()]);
    node.start().await.unwrap();

    tokio::time::sleep(CHECK_INTERVAL * 3 + TICK_SLACK).await;

    assert_eq!(client.validators_calls(), 1 + 3);
    assert_eq!(client.status_calls(), 1);
    assert_eq!(node.public_key(), Some(own_key()));

    node.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_status_is_retried_next_tick() {
    let Harness { node, client, .. } = harness();
    set_validators(&client, &[own_key()]);
    client.fail_status(true);
    node.start().await.unwrap();

    assert!(!node.is_validator());
    assert!(node.public_key().is_none());

    client.fail_status(false);
    tokio::time::sleep(CHECK_INTERVAL + TICK_SLACK).await;

    assert_eq!(client.status_calls(), 2);
    assert!(node.is_validator());
    assert_eq!(node.public_key(), Some(own_key()));

    node.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_query_is_not_fatal() {
    let Harness { node, client, .. } = harness();
    set_validators(&client, &[own_key()]);
    client.fail_validators(true);
    node.start().await.unwrap();

    tokio::time::sleep(CHECK_INTERVAL * 2 + TICK_SLACK).await;
    assert_eq!(client.validators_calls(), 3);
    assert!(!node.is_validator());
    assert!(node.is_online());

    client.fail_validators(false);
    tokio::time::sleep(CHECK_INTERVAL).await;
    assert!(node.is_validator());

    node.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_public_key_never_refetched() {
    let Harness { node, client, .. } = harness();
    node.start().await.unwrap();

    client.set_pub_key(other_key());
    set_validators(&client, &[other_key()]);
    tokio::time::sleep(CHECK_INTERVAL * 2 + TICK_SLACK).await;

    assert_eq!(node.public_key(), Some(own_key()));
    assert!(!node.is_validator());
    assert_eq!(client.status_calls(), 1);

    node.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_validator_flag_is_sticky() {
    let Harness { node, client, .. } = harness();
    set_validators(&client, &[own_key()]);
    node.start().await.unwrap();
    assert!(node.is_validator());

    set_validators(&client, &[other_key()]);
    tokio::time::sleep(CHECK_INTERVAL + TICK_SLACK).await;

    assert!(node.is_validator());
    assert_eq!(node.voting_power(), 10);

    node.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_ticks_after_stop() {
    let Harness { node, client, .. } = harness();
    node.start().await.unwrap();

    node.stop().await;
    tokio::time::sleep(CHECK_INTERVAL * 3).await;

    assert_eq!(client.validators_calls(), 1);
}

#[tokio::test]
async fn test_on_demand_queries() {
    let Harness { node, client, .. } = harness();
    set_validators(&client, &[own_key(), other_key()]);

    assert_eq!(node.num_validators().await.unwrap(), (1, 2));
    assert_eq!(node.total_voting_power().await.unwrap(), 20);

    client.fail_validators(true);
    assert_matches!(node.num_validators().await, Err(Error::Query(_)));
    assert_matches!(node.total_voting_power().await, Err(Error::Query(_)));
}
