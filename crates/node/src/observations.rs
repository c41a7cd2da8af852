use crate::NodeState;

/// Everything the node's callbacks and periodic task mutate. Guarded by one
/// mutex that is never held across an await point.
#[derive(Debug, Default)]
pub struct Observations {
    pub state: NodeState,
    pub online: bool,
    pub height: i64,
    /// Set after a reconnect: the next height starts a fresh sequence.
    pub resync: bool,
    pub is_validator: bool,
    pub voting_power: i64,
    pub block_latency_ms: f64,
    pub precommit_sum: u64,
    pub precommit_miss: u64,
    pub last_error: Option<String>,
}

impl Observations {
    /// Records a block height. Heights only move forward, except for the
    /// first height seen after a reconnect.
    pub fn observe_height(&mut self, height: i64) -> i64 {
        if self.resync {
            self.resync = false;
            self.height = height;
        } else if height > self.height {
            self.height = height;
        }

        self.height
    }

    /// Counts one block's precommit outcome. Only validators are counted.
    pub const fn count_precommit(&mut self, signed: bool) {
        if !self.is_validator {
            return;
        }

        if signed {
            self.precommit_sum += 1;
        } else {
            self.precommit_miss += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_height_never_decreases() {
        let mut observations = Observations::default();

        assert_eq!(observations.observe_height(10), 10);
        assert_eq!(observations.observe_height(9), 10);
        assert_eq!(observations.observe_height(11), 11);
    }

    #[test]
    fn test_resync_accepts_lower_height_once() {
        let mut observations = Observations::default();
        observations.observe_height(10);
        observations.resync = true;

        assert_eq!(observations.observe_height(4), 4);
        assert_eq!(observations.observe_height(3), 4);
    }

    #[test]
    fn test_precommits_only_counted_for_validators() {
        let mut observations = Observations::default();

        observations.count_precommit(true);
        assert_eq!(observations.precommit_sum + observations.precommit_miss, 0);

        observations.is_validator = true;
        observations.count_precommit(true);
        observations.count_precommit(false);
        observations.count_precommit(false);

        assert_eq!(observations.precommit_sum, 1);
        assert_eq!(observations.precommit_miss, 2);
    }
}
