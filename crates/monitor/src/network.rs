use serde::{Deserialize, Serialize};

/// Overall health of the monitored network.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// Every monitored node is online.
    Full,

    /// Some monitored nodes are online.
    Moderate,

    /// No monitored node is online, or nothing is monitored.
    #[default]
    Dead,
}

impl Health {
    fn from_counts(num_nodes: usize, num_nodes_online: usize) -> Self {
        if num_nodes_online == 0 {
            Self::Dead
        } else if num_nodes_online == num_nodes {
            Self::Full
        } else {
            Self::Moderate
        }
    }
}

/// Aggregate statistics across all monitored nodes.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Network {
    /// Highest block height seen from any node.
    pub height: i64,

    /// Running mean of reported block latencies, in milliseconds.
    pub avg_block_latency_ms: f64,

    /// Nodes under monitoring.
    pub num_nodes: usize,

    /// Monitored nodes currently online.
    pub num_nodes_online: usize,

    /// Size of the validator set, as reported by the network.
    pub num_validators: usize,

    /// Monitored validators currently online.
    pub num_validators_online: usize,

    /// Disconnects seen since the monitor started.
    pub total_disconnects: u64,

    /// Derived health.
    pub health: Health,

    #[serde(skip)]
    latency_samples: u64,
}

impl Network {
    /// Health as a lowercase word: `full`, `moderate` or `dead`.
    #[must_use]
    pub const fn health_string(&self) -> &'static str {
        match self.health {
            Health::Full => "full",
            Health::Moderate => "moderate",
            Health::Dead => "dead",
        }
    }

    pub(crate) fn new_block(&mut self, height: i64) {
        if height > self.height {
            self.height = height;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn new_block_latency(&mut self, latency_ms: f64) {
        self.latency_samples += 1;
        self.avg_block_latency_ms +=
            (latency_ms - self.avg_block_latency_ms) / self.latency_samples as f64;
    }

    /// Recounts nodes from `(online, is_validator)` pairs and rederives health.
    pub(crate) fn recount(&mut self, nodes: impl IntoIterator<Item = (bool, bool)>) {
        let mut num_nodes = 0;
        let mut num_nodes_online = 0;
        let mut num_validators_online = 0;

        for (online, is_validator) in nodes {
            num_nodes += 1;
            if online {
                num_nodes_online += 1;
                if is_validator {
                    num_validators_online += 1;
                }
            }
        }

        self.num_nodes = num_nodes;
        self.num_nodes_online = num_nodes_online;
        self.num_validators_online = num_validators_online;
        self.health = Health::from_counts(num_nodes, num_nodes_online);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_rule() {
        let mut network = Network::default();

        network.recount(std::iter::empty());
        assert_eq!(network.health_string(), "dead");

        network.recount([(true, true), (true, false)]);
        assert_eq!(network.health, Health::Full);

        network.recount([(true, true), (false, true)]);
        assert_eq!(network.health, Health::Moderate);
        assert_eq!(network.num_validators_online, 1);

        network.recount([(false, true)]);
        assert_eq!(network.health, Health::Dead);
    }

    #[test]
    fn test_height_is_maximum() {
        let mut network = Network::default();

        network.new_block(5);
        network.new_block(3);

        assert_eq!(network.height, 5);
    }

    #[test]
    fn test_latency_running_mean() {
        let mut network = Network::default();

        network.new_block_latency(100.0);
        network.new_block_latency(200.0);
        network.new_block_latency(300.0);

        assert!((network.avg_block_latency_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_serializes_health_as_word() {
        let json = serde_json::to_value(Network::default()).unwrap();

        assert_eq!(json["health"], "dead");
        assert!(json.get("latency_samples").is_none());
    }
}
