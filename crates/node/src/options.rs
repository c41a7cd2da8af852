use std::time::Duration;

/// How observations are handed to a downstream queue that is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Wait for room in the queue. A slow consumer stalls the callback that
    /// is delivering to it.
    #[default]
    Block,

    /// Drop the observation and log a warning.
    DropNewest,
}

/// Options for configuring a `Node`.
#[derive(Clone, Debug)]
pub struct NodeOptions {
    /// Display name. Defaults to the node's address.
    pub name: Option<String>,

    /// How often validator membership is re-checked.
    pub validator_check_interval: Duration,

    /// Failed reconnect attempts tolerated before giving up.
    pub max_restarts: usize,

    /// Behaviour when a downstream queue is full.
    pub delivery_mode: DeliveryMode,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            name: None,
            validator_check_interval: Duration::from_secs(5),
            max_restarts: 25,
            delivery_mode: DeliveryMode::Block,
        }
    }
}
