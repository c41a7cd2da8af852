//! Mock implementation of the RPC client interface for testing purposes.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tm_monitor_rpc_client::RpcClient;
use tm_monitor_types::{
    NodeInfo, PubKey, Status, SyncInfo, Validator, ValidatorInfo, ValidatorSet,
};

struct Inner {
    fail_status: AtomicBool,
    fail_validators: AtomicBool,
    pub_key: Mutex<PubKey>,
    status_calls: AtomicUsize,
    validator_set: Mutex<ValidatorSet>,
    validators_calls: AtomicUsize,
    validators_delay: Mutex<Duration>,
}

/// Scriptable RPC client that answers from memory and counts calls.
#[derive(Clone)]
pub struct MockRpcClient {
    inner: Arc<Inner>,
}

impl MockRpcClient {
    /// Creates a client whose `status` reports `pub_key` and whose validator
    /// set is empty.
    #[must_use]
    pub fn new(pub_key: PubKey) -> Self {
        Self {
            inner: Arc::new(Inner {
                fail_status: AtomicBool::new(false),
                fail_validators: AtomicBool::new(false),
                pub_key: Mutex::new(pub_key),
                status_calls: AtomicUsize::new(0),
                validator_set: Mutex::new(ValidatorSet::default()),
                validators_calls: AtomicUsize::new(0),
                validators_delay: Mutex::new(Duration::ZERO),
            }),
        }
    }

    /// Replaces the validator set returned by `validators`.
    pub fn set_validators(&self, block_height: i64, validators: Vec<Validator>) {
        *self.inner.validator_set.lock() = ValidatorSet {
            block_height,
            validators,
        };
    }

    /// Changes the key `status` reports from now on.
    pub fn set_pub_key(&self, pub_key: PubKey) {
        *self.inner.pub_key.lock() = pub_key;
    }

    /// Makes `validators` fail while `fail` is set.
    pub fn fail_validators(&self, fail: bool) {
        self.inner.fail_validators.store(fail, Ordering::SeqCst);
    }

    /// Makes every `validators` call take `delay` before answering.
    pub fn delay_validators(&self, delay: Duration) {
        *self.inner.validators_delay.lock() = delay;
    }

    /// Makes `status` fail while `fail` is set.
    pub fn fail_status(&self, fail: bool) {
        self.inner.fail_status.store(fail, Ordering::SeqCst);
    }

    /// Number of `validators` calls so far, failed ones included.
    #[must_use]
    pub fn validators_calls(&self) -> usize {
        self.inner.validators_calls.load(Ordering::SeqCst)
    }

    /// Number of `status` calls so far, failed ones included.
    #[must_use]
    pub fn status_calls(&self) -> usize {
        self.inner.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcClient for MockRpcClient {
    type Error = Error;

    async fn validators(&self) -> Result<ValidatorSet, Self::Error> {
        self.inner.validators_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.inner.validators_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.inner.fail_validators.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("validators"));
        }

        Ok(self.inner.validator_set.lock().clone())
    }

    async fn status(&self) -> Result<Status, Self::Error> {
        self.inner.status_calls.fetch_add(1, Ordering::SeqCst);

        if self.inner.fail_status.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("status"));
        }

        let pub_key = self.inner.pub_key.lock().clone();
        let height = self.inner.validator_set.lock().block_height;

        Ok(Status {
            node_info: NodeInfo {
                moniker: "mock".to_string(),
                ..NodeInfo::default()
            },
            sync_info: SyncInfo {
                latest_block_height: height,
                catching_up: false,
            },
            validator_info: ValidatorInfo {
                address: pub_key.address().unwrap_or_default(),
                pub_key,
                voting_power: 0,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_calls_and_failures() {
        let client = MockRpcClient::new(PubKey::ed25519(&[7; 32]));

        client.validators().await.unwrap();
        client.fail_validators(true);
        assert!(client.validators().await.is_err());

        assert_eq!(client.validators_calls(), 2);
        assert_eq!(client.status_calls(), 0);
    }

    #[tokio::test]
    async fn test_status_reports_configured_key() {
        let key = PubKey::ed25519(&[7; 32]);
        let client = MockRpcClient::new(key.clone());

        let status = client.status().await.unwrap();

        assert_eq!(status.validator_info.pub_key, key);
        assert_eq!(status.validator_info.address, key.address().unwrap());
    }
}
