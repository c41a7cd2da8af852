//! Shared setup for node integration tests.
#![allow(dead_code)]

use std::time::Duration;

use tm_monitor_block_store_memory::MemoryBlockStore;
use tm_monitor_event_meter::Event;
use tm_monitor_event_meter_mock::MockEventMeter;
use tm_monitor_node::{Node, NodeOptions};
use tm_monitor_rpc_client_mock::MockRpcClient;
use tm_monitor_types::{Block, Commit, Header, PubKey, Validator, Vote};

pub type TestNode = Node<MockEventMeter, MockRpcClient, MemoryBlockStore>;

pub const CHECK_INTERVAL: Duration = Duration::from_secs(5);

pub struct Harness {
    pub node: TestNode,
    pub meter: MockEventMeter,
    pub client: MockRpcClient,
    pub store: MemoryBlockStore,
}

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn own_key() -> PubKey {
    PubKey::ed25519(&[1; 32])
}

pub fn other_key() -> PubKey {
    PubKey::ed25519(&[2; 32])
}

pub fn harness() -> Harness {
    harness_with(NodeOptions::default())
}

pub fn harness_with(options: NodeOptions) -> Harness {
    init_test_logging();

    let meter = MockEventMeter::new();
    let client = MockRpcClient::new(own_key());
    let store = MemoryBlockStore::new();
    let node = Node::new(
        "tcp://127.0.0.1:26657",
        meter.clone(),
        client.clone(),
        store.clone(),
        options,
    );

    Harness {
        node,
        meter,
        client,
        store,
    }
}

/// Puts `keys` in the client's validator set with power 10 each.
pub fn set_validators(client: &MockRpcClient, keys: &[PubKey]) {
    let validators = keys
        .iter()
        .map(|key| Validator {
            address: key.address().unwrap(),
            pub_key: key.clone(),
            voting_power: 10,
        })
        .collect();

    client.set_validators(1, validators);
}

pub fn header(height: i64) -> Event {
    Event::NewBlockHeader(Header {
        chain_id: "test-chain".to_string(),
        height,
        num_txs: 1,
        ..Header::default()
    })
}

/// A full block whose last commit carries a precommit from each of `signers`,
/// plus one nil entry.
pub fn block(height: i64, signers: &[PubKey]) -> Event {
    let mut precommits: Vec<Option<Vote>> = signers
        .iter()
        .enumerate()
        .map(|(index, key)| {
            Some(Vote {
                validator_address: key.address().unwrap(),
                validator_index: i64::try_from(index).unwrap(),
                height: height - 1,
                ..Vote::default()
            })
        })
        .collect();
    precommits.push(None);

    Event::NewBlock(Block {
        header: Header {
            chain_id: "test-chain".to_string(),
            height,
            ..Header::default()
        },
        last_commit: Commit {
            precommits,
            ..Commit::default()
        },
        ..Block::default()
    })
}
