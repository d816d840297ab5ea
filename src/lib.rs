pub mod config;
pub mod raft;

// Public exports
pub use config::Config;
pub use raft::{CandidacyHandler, CandidacyNotice, RaftConfig, RaftError, RaftNode};
