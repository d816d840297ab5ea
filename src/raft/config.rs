use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::RaftError;

/// The poll interval may be at most this fraction of the minimum election timeout.
const MIN_TIMEOUT_TO_POLL_RATIO: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftConfig {
    pub node_id: String,
    pub election_timeout_min: u64, // in milliseconds
    pub election_timeout_max: u64, // in milliseconds
    pub poll_interval: u64,        // in milliseconds
    /// Seed for the election jitter. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl RaftConfig {
    pub fn new(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            ..Self::default()
        }
    }

    pub fn with_timeouts(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.election_timeout_min = min_ms;
        self.election_timeout_max = max_ms;
        self
    }

    pub fn with_poll_interval(mut self, poll_ms: u64) -> Self {
        self.poll_interval = poll_ms;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    /// Rejects ranges and poll intervals the election timer cannot honour.
    /// Nothing is clamped.
    pub fn validate(&self) -> Result<(), RaftError> {
        if self.election_timeout_min >= self.election_timeout_max {
            return Err(RaftError::InvalidTimeoutRange {
                min: self.election_timeout_min,
                max: self.election_timeout_max,
            });
        }

        if self.poll_interval == 0
            || self.poll_interval.saturating_mul(MIN_TIMEOUT_TO_POLL_RATIO)
                > self.election_timeout_min
        {
            return Err(RaftError::InvalidPollInterval {
                poll: self.poll_interval,
                min: self.election_timeout_min,
            });
        }

        Ok(())
    }
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            node_id: "node1".to_string(),
            election_timeout_min: 150,
            election_timeout_max: 300,
            poll_interval: 10,
            seed: None,
        }
    }
}
