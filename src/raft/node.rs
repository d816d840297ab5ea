use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::state::{SharedState, TimerToken};
use super::timer::ElectionTimer;
use super::{
    CandidacyHandler, ElectionJitter, NodeRole, NodeState, RaftConfig, RaftError,
    StateSnapshot, TimerExit, Transition,
};

/// Handle to one consensus node's election core. Clones share the same state.
#[derive(Clone)]
pub struct RaftNode {
    pub(super) inner: Arc<NodeInner>,
}

pub(super) struct NodeInner {
    pub(super) id: String,
    pub(super) state: SharedState,
    jitter: ElectionJitter,
    poll_interval: Duration,
    pub(super) candidacy: Box<dyn CandidacyHandler>,
    runtime: Handle,
}

pub struct NodeBuilder {
    config: RaftConfig,
    initial_term: u64,
    jitter: Option<ElectionJitter>,
}

impl NodeBuilder {
    /// Term restored from persistent storage.
    pub fn initial_term(mut self, term: u64) -> Self {
        self.initial_term = term;
        self
    }

    /// Replaces the jitter derived from the configured timeout range.
    pub fn jitter(mut self, jitter: ElectionJitter) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Validates the configuration and binds the node to the current tokio runtime.
    pub fn build<H: CandidacyHandler>(self, candidacy: H) -> Result<RaftNode, RaftError> {
        self.config.validate()?;

        let jitter = match self.jitter {
            Some(jitter) => jitter,
            None => ElectionJitter::from_config(&self.config)?,
        };
        let runtime = Handle::try_current().map_err(|_| RaftError::NoRuntime)?;

        let (min, max) = jitter.bounds();
        debug!(
            "[{}] election timeout range {:?}..={:?}, poll interval {}ms, term {}",
            self.config.node_id, min, max, self.config.poll_interval, self.initial_term
        );

        Ok(RaftNode {
            inner: Arc::new(NodeInner {
                id: self.config.node_id.clone(),
                state: SharedState::new(NodeState::new(self.initial_term, Instant::now())),
                jitter,
                poll_interval: self.config.poll_interval(),
                candidacy: Box::new(candidacy),
                runtime,
            }),
        })
    }
}

impl RaftNode {
    pub fn builder(config: RaftConfig) -> NodeBuilder {
        NodeBuilder {
            config,
            initial_term: 0,
            jitter: None,
        }
    }

    pub fn new<H: CandidacyHandler>(config: RaftConfig, candidacy: H) -> Result<Self, RaftError> {
        Self::builder(config).build(candidacy)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.inner.state.with(|s| s.snapshot(Instant::now()))
    }

    pub fn is_leader(&self) -> bool {
        self.snapshot().role == NodeRole::Leader
    }

    /// Resets the election clock and arms the first timer. Any timer armed
    /// earlier by a manual election is retired.
    pub fn start(&self) -> Result<JoinHandle<TimerExit>, RaftError> {
        let token = self.inner.state.with(|s| {
            if !s.mark_started() {
                return Err(RaftError::AlreadyStarted);
            }
            s.reset_election_clock(Instant::now());
            Ok(s.arm_timer())
        })?;
        info!(
            "[{}] Starting election core in term {}",
            self.inner.id, token.epoch
        );
        Ok(self.spawn_timer(token))
    }

    /// Arms a timer bound to whatever term is current right now. The previously
    /// armed timer, if still running, exits with [`TimerExit::Superseded`].
    pub fn arm_election_timer(&self) -> JoinHandle<TimerExit> {
        let token = self.inner.state.with(|s| s.arm_timer());
        self.spawn_timer(token)
    }

    /// A valid AppendEntries from the leader of `term`. Returns `false` if rejected.
    pub fn record_heartbeat(&self, term: u64) -> bool {
        let outcome = self.apply("heartbeat", |s, now| s.accept_heartbeat(term, now));
        outcome != Transition::Rejected
    }

    /// This node granted its vote to a candidate of `term`. Returns `false` if rejected.
    pub fn record_vote_granted(&self, term: u64) -> bool {
        let outcome = self.apply("vote grant", |s, now| s.accept_vote_grant(term, now));
        outcome != Transition::Rejected
    }

    /// A term carried by any peer message. Returns `true` if the node stepped down.
    pub fn observe_term(&self, term: u64) -> bool {
        let outcome = self.apply("term", |s, now| s.observe_term(term, now));
        matches!(outcome, Transition::Rearm { .. })
    }

    /// Reported by the candidacy handler once a quorum granted votes for `term`.
    pub fn become_leader(&self, term: u64) -> Result<(), RaftError> {
        self.inner.state.with(|s| s.become_leader(term))?;
        info!("[{}] Became leader for term {term}", self.inner.id);
        Ok(())
    }

    fn apply<F>(&self, signal: &str, f: F) -> Transition
    where
        F: FnOnce(&mut NodeState, Instant) -> Transition,
    {
        // The re-arm decision is taken under the same lock as the transition.
        let (outcome, snap, token) = self.inner.state.with(|s| {
            let now = Instant::now();
            let outcome = f(&mut *s, now);
            let token = match outcome {
                Transition::Rearm { .. } if s.is_armed() => Some(s.arm_timer()),
                _ => None,
            };
            (outcome, s.snapshot(now), token)
        });

        match outcome {
            Transition::Rejected => {
                warn!(
                    "[{}] Rejected {signal} (term {}, role {})",
                    self.inner.id, snap.term, snap.role
                );
            }
            Transition::Unchanged => {}
            Transition::Refreshed => {
                debug!(
                    "[{}] Election clock reset by {signal} (term {}, role {})",
                    self.inner.id, snap.term, snap.role
                );
            }
            Transition::Rearm { term } => {
                info!(
                    "[{}] Stepping down to follower for term {term} on {signal}",
                    self.inner.id
                );
                if let Some(token) = token {
                    self.spawn_timer(token);
                }
            }
        }

        outcome
    }

    pub(super) fn spawn_timer(&self, token: TimerToken) -> JoinHandle<TimerExit> {
        let timer = ElectionTimer::new(token, self.inner.jitter.sample(), self.inner.poll_interval);
        let node = self.clone();

        self.inner.runtime.spawn(async move {
            timer
                .run(&node.inner.id, &node.inner.state, || {
                    node.start_election_for(token)
                })
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft::CandidacyNotice;
    use tokio::sync::mpsc;

    fn node(term: u64) -> (RaftNode, mpsc::UnboundedReceiver<CandidacyNotice>) {
        let (tx, rx) = mpsc::unbounded_channel::<CandidacyNotice>();
        let node = RaftNode::builder(RaftConfig::new("n1"))
            .initial_term(term)
            .jitter(ElectionJitter::fixed(Duration::from_millis(150)))
            .build(tx)
            .expect("build node");
        (node, rx)
    }

    #[test]
    fn build_outside_runtime_fails() {
        let (tx, _rx) = mpsc::unbounded_channel::<CandidacyNotice>();
        let result = RaftNode::new(RaftConfig::new("n1"), tx);
        assert!(matches!(result, Err(RaftError::NoRuntime)));
    }

    #[tokio::test]
    async fn build_rejects_invalid_config_before_spawning() {
        let (tx, _rx) = mpsc::unbounded_channel::<CandidacyNotice>();
        let cfg = RaftConfig::new("n1").with_timeouts(300, 150);
        assert!(matches!(
            RaftNode::new(cfg, tx),
            Err(RaftError::InvalidTimeoutRange { min: 300, max: 150 })
        ));
    }

    #[tokio::test]
    async fn start_twice_is_an_error() {
        let (node, _rx) = node(0);
        let handle = node.start().expect("first start");
        assert!(matches!(node.start(), Err(RaftError::AlreadyStarted)));
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn start_after_manual_election_retires_its_timer() {
        let (node, mut rx) = node(4);
        assert_eq!(node.start_election(), 5);
        assert_eq!(rx.recv().await, Some(CandidacyNotice { term: 5 }));

        let timer = node.start().expect("start after manual election");
        assert!(matches!(node.start(), Err(RaftError::AlreadyStarted)));

        let exit = timer.await.expect("timer task");
        assert_eq!(exit, TimerExit::Triggered { term: 6 });
        // The election's own timer for term 5 was retired by start(); only one
        // candidacy follows.
        assert_eq!(rx.recv().await, Some(CandidacyNotice { term: 6 }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_in_same_term_supersedes_the_live_timer() {
        let (node, _rx) = node(3);
        let first = node.start().expect("start");
        let second = node.arm_election_timer();

        assert_eq!(first.await.expect("timer task"), TimerExit::Superseded);
        assert_eq!(
            second.await.expect("timer task"),
            TimerExit::Triggered { term: 4 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn step_down_before_start_leaves_exactly_one_timer() {
        let (node, mut rx) = node(1);
        assert!(node.observe_term(4));
        let timer = node.start().expect("start");

        assert_eq!(
            timer.await.expect("timer task"),
            TimerExit::Triggered { term: 5 }
        );
        assert_eq!(rx.recv().await, Some(CandidacyNotice { term: 5 }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn inbound_signals_before_start_do_not_arm_timers() {
        let (node, mut rx) = node(1);
        assert!(node.observe_term(4));
        assert!(!node.record_heartbeat(3));
        assert!(node.record_vote_granted(4));

        let snap = node.snapshot();
        assert_eq!(snap.term, 4);
        assert_eq!(snap.role, NodeRole::Follower);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn leader_timer_exits_on_first_check() {
        let (node, _rx) = node(2);
        let term = node.start_election();
        node.become_leader(term).expect("become leader");
        assert!(node.is_leader());

        let armed_at = Instant::now();
        let exit = node.arm_election_timer().await.expect("timer task");
        assert_eq!(
            exit,
            TimerExit::RoleChanged {
                role: NodeRole::Leader
            }
        );
        assert_eq!(armed_at.elapsed(), Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn stepping_down_rearms_for_new_term() {
        let (node, mut rx) = node(2);
        let term = node.start_election();
        assert_eq!(rx.recv().await, Some(CandidacyNotice { term }));
        node.become_leader(term).expect("become leader");

        // A higher term demotes the leader; a new timer must eventually fire.
        assert!(node.observe_term(9));
        let notice = rx.recv().await.expect("candidacy after step-down");
        assert_eq!(notice.term, 10);
    }
}
