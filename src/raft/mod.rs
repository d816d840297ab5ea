//! Election-timeout core of a Raft node.
//!
//! A follower or candidate runs one election timer at a time. The timer polls
//! [`NodeState`] under its lock and, once no heartbeat or vote has reset the clock
//! for a randomized timeout, promotes the node to candidate. Timers are never
//! cancelled: each one captures the term and arm generation it was started with
//! and exits on its own once the term or role moves on or a later timer is armed.

mod config;
mod election;
mod error;
mod jitter;
mod node;
mod state;
mod timer;

pub use self::config::RaftConfig;
pub use self::election::{CandidacyHandler, CandidacyNotice};
pub use self::error::RaftError;
pub use self::jitter::ElectionJitter;
pub use self::node::{NodeBuilder, RaftNode};
pub use self::state::{NodeRole, NodeState, StateSnapshot, Transition};
pub use self::timer::TimerExit;
