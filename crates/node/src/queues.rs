//! Downstream delivery of observations.

use crate::DeliveryMode;

use tm_monitor_types::{Block, Header};
use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Queues supplied by the node's owner. Absent queues drop observations.
#[derive(Default)]
pub struct Queues {
    pub headers: Option<Sender<Header>>,
    pub blocks: Option<Sender<Block>>,
    pub latencies: Option<Sender<f64>>,
    pub disconnects: Option<Sender<bool>>,
}

/// Hands `value` to `sender` according to `mode`.
pub async fn deliver<T: Send>(
    mode: DeliveryMode,
    node: &str,
    kind: &'static str,
    sender: Option<Sender<T>>,
    value: T,
) {
    let Some(sender) = sender else {
        return;
    };

    match mode {
        DeliveryMode::Block => {
            if sender.send(value).await.is_err() {
                debug!(node, kind, "queue closed, dropping observation");
            }
        }
        DeliveryMode::DropNewest => match sender.try_send(value) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(node, kind, "queue full, dropping observation");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(node, kind, "queue closed, dropping observation");
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_absent_queue_is_a_no_op() {
        deliver::<f64>(DeliveryMode::Block, "n", "latency", None, 1.0).await;
    }

    #[tokio::test]
    async fn test_drop_newest_never_waits() {
        let (tx, mut rx) = mpsc::channel(1);

        deliver(DeliveryMode::DropNewest, "n", "latency", Some(tx.clone()), 1.0).await;
        deliver(DeliveryMode::DropNewest, "n", "latency", Some(tx), 2.0).await;

        assert_eq!(rx.recv().await, Some(1.0));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_queue_is_ignored() {
        let (tx, rx) = mpsc::channel::<bool>(1);
        drop(rx);

        deliver(DeliveryMode::Block, "n", "disconnect", Some(tx.clone()), true).await;
        deliver(DeliveryMode::DropNewest, "n", "disconnect", Some(tx), true).await;
    }
}
