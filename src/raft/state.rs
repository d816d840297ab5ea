use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::RaftError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Follower,
    Candidate,
    Leader,
}

impl NodeRole {
    /// Whether a node in this role runs an election timer.
    pub fn awaits_leader(self) -> bool {
        matches!(self, NodeRole::Follower | NodeRole::Candidate)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeRole::Follower => "Follower",
            NodeRole::Candidate => "Candidate",
            NodeRole::Leader => "Leader",
        };
        f.write_str(name)
    }
}

/// Result of applying an inbound signal to [`NodeState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Stale term, or a signal the current role cannot accept. Nothing changed.
    Rejected,
    /// Valid signal that does not touch the election clock.
    Unchanged,
    /// The election clock was reset; the live timer for this term stays valid.
    Refreshed,
    /// The node moved to a new term as Follower and needs a fresh timer bound to it.
    Rearm { term: u64 },
}

/// Identity of one armed timer: the term it fences on plus the arm generation.
/// Arming again, even within the same term, retires every earlier token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimerToken {
    pub(crate) epoch: u64,
    pub(crate) generation: u64,
}

/// A consistent view of the election-relevant fields, taken under one lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSnapshot {
    pub term: u64,
    pub role: NodeRole,
    pub since_reset: Duration,
}

#[derive(Debug, Clone)]
pub struct NodeState {
    current_term: u64,
    role: NodeRole,
    last_reset_at: Instant,
    // Lifecycle of the election core; only touched under the same lock as the term.
    started: bool,
    armed: bool,
    timer_generation: u64,
}

impl NodeState {
    pub fn new(current_term: u64, now: Instant) -> Self {
        Self {
            current_term,
            role: NodeRole::Follower,
            last_reset_at: now,
            started: false,
            armed: false,
            timer_generation: 0,
        }
    }

    pub fn current_term(&self) -> u64 {
        self.current_term
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn last_reset_at(&self) -> Instant {
        self.last_reset_at
    }

    pub fn elapsed_since_reset(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_reset_at)
    }

    pub fn reset_election_clock(&mut self, now: Instant) {
        self.last_reset_at = now;
    }

    pub fn snapshot(&self, now: Instant) -> StateSnapshot {
        StateSnapshot {
            term: self.current_term,
            role: self.role,
            since_reset: self.elapsed_since_reset(now),
        }
    }

    /// Marks `start()` as done. Returns `false` if it already was.
    pub(crate) fn mark_started(&mut self) -> bool {
        !std::mem::replace(&mut self.started, true)
    }

    /// Whether timers are being driven, by `start()` or by an earlier election.
    pub(crate) fn is_armed(&self) -> bool {
        self.armed
    }

    pub(crate) fn timer_generation(&self) -> u64 {
        self.timer_generation
    }

    /// Issues the token for a new timer bound to the current term.
    pub(crate) fn arm_timer(&mut self) -> TimerToken {
        self.armed = true;
        self.timer_generation += 1;
        TimerToken {
            epoch: self.current_term,
            generation: self.timer_generation,
        }
    }

    /// Whether `token` still belongs to the one live timer of a waiting node.
    pub(crate) fn holds(&self, token: TimerToken) -> bool {
        self.role.awaits_leader()
            && self.current_term == token.epoch
            && self.timer_generation == token.generation
    }

    /// Declares candidacy for the next term and returns it.
    pub fn become_candidate(&mut self, now: Instant) -> u64 {
        self.current_term += 1;
        self.role = NodeRole::Candidate;
        self.last_reset_at = now;
        self.current_term
    }

    pub fn become_leader(&mut self, term: u64) -> Result<(), RaftError> {
        if self.role != NodeRole::Candidate {
            return Err(RaftError::NotCandidate(self.role));
        }
        if term != self.current_term {
            return Err(RaftError::InvalidTerm(term));
        }
        self.role = NodeRole::Leader;
        Ok(())
    }

    /// Applies a term seen in any peer message. A higher term demotes the node to
    /// Follower and resets the clock; anything else leaves the state untouched.
    pub fn observe_term(&mut self, term: u64, now: Instant) -> Transition {
        if term <= self.current_term {
            return Transition::Unchanged;
        }
        self.current_term = term;
        self.role = NodeRole::Follower;
        self.last_reset_at = now;
        Transition::Rearm { term }
    }

    pub fn accept_heartbeat(&mut self, term: u64, now: Instant) -> Transition {
        if term < self.current_term {
            return Transition::Rejected;
        }
        if term > self.current_term {
            return self.observe_term(term, now);
        }

        match self.role {
            // Two leaders in one term cannot both be legitimate.
            NodeRole::Leader => Transition::Rejected,
            NodeRole::Candidate | NodeRole::Follower => {
                self.role = NodeRole::Follower;
                self.last_reset_at = now;
                Transition::Refreshed
            }
        }
    }

    pub fn accept_vote_grant(&mut self, term: u64, now: Instant) -> Transition {
        if term < self.current_term {
            return Transition::Rejected;
        }
        if term > self.current_term {
            return self.observe_term(term, now);
        }

        match self.role {
            NodeRole::Follower => {
                self.last_reset_at = now;
                Transition::Refreshed
            }
            // Candidates and leaders already voted for themselves in this term.
            NodeRole::Candidate | NodeRole::Leader => Transition::Rejected,
        }
    }
}

/// The single lock guarding [`NodeState`]. Every read and write goes through
/// [`SharedState::with`], so each observation is one consistent snapshot.
#[derive(Debug)]
pub(crate) struct SharedState {
    inner: Mutex<NodeState>,
}

impl SharedState {
    pub(crate) fn new(state: NodeState) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut NodeState) -> R) -> R {
        // Mutations are plain field stores, so a poisoned guard still holds a
        // consistent state.
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
