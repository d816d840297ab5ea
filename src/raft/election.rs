use log::{info, warn};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::state::TimerToken;
use super::RaftNode;

/// Receives every candidacy this node declares. Implementations own the vote
/// fan-out, quorum counting and reporting the outcome back through
/// [`RaftNode::become_leader`] or [`RaftNode::observe_term`].
pub trait CandidacyHandler: Send + Sync + 'static {
    fn on_become_candidate(&self, term: u64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidacyNotice {
    pub term: u64,
}

impl CandidacyHandler for mpsc::UnboundedSender<CandidacyNotice> {
    fn on_become_candidate(&self, term: u64) {
        if self.send(CandidacyNotice { term }).is_err() {
            warn!("Candidacy for term {term} dropped: receiver closed");
        }
    }
}

impl RaftNode {
    /// Promotes this node to candidate for the next term, arms a timer for that
    /// term and hands the term to the candidacy handler. Returns the new term.
    pub fn start_election(&self) -> u64 {
        let token = self.inner.state.with(|s| {
            s.become_candidate(Instant::now());
            s.arm_timer()
        });
        self.declare_candidacy(token);
        token.epoch
    }

    /// The timer's path into an election. Declines if `token` was retired after
    /// the timer let go of the lock: the term moved, the node left
    /// Follower/Candidate, or a later timer was armed.
    pub(super) fn start_election_for(&self, token: TimerToken) -> Option<u64> {
        let next = self.inner.state.with(|s| {
            if !s.holds(token) {
                return None;
            }
            s.become_candidate(Instant::now());
            Some(s.arm_timer())
        })?;
        self.declare_candidacy(next);
        Some(next.epoch)
    }

    fn declare_candidacy(&self, token: TimerToken) {
        let term = token.epoch;
        info!("[{}] Starting election for term {term}", self.inner.id);
        self.spawn_timer(token);
        self.inner.candidacy.on_become_candidate(term);
    }
}
