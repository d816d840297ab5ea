use thiserror::Error;

use super::NodeRole;

#[derive(Error, Debug)]
pub enum RaftError {
    #[error("Invalid election timeout range: min {min}ms must be below max {max}ms")]
    InvalidTimeoutRange { min: u64, max: u64 },

    #[error("Invalid poll interval {poll}ms: must be non-zero and at most a fifth of the minimum timeout ({min}ms)")]
    InvalidPollInterval { poll: u64, min: u64 },

    #[error("No tokio runtime available to drive election timers")]
    NoRuntime,

    #[error("Node is already started")]
    AlreadyStarted,

    #[error("Not a candidate (role is {0})")]
    NotCandidate(NodeRole),

    #[error("Invalid term: {0}")]
    InvalidTerm(u64),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for RaftError {
    fn from(err: serde_json::Error) -> Self {
        RaftError::SerializationError(err.to_string())
    }
}
