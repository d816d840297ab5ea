use std::time::Duration;

use log::{debug, info};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::state::{NodeState, SharedState, TimerToken};
use super::NodeRole;

/// Why an election timer instance stopped. Every variant is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerExit {
    /// The node left Follower/Candidate (became leader).
    RoleChanged { role: NodeRole },
    /// The term moved past the timer's epoch through some other path.
    TermChanged { epoch: u64, current: u64 },
    /// A later timer was armed for the same term.
    Superseded,
    /// The timeout elapsed and candidacy was declared for `term`.
    Triggered { term: u64 },
    /// The timeout elapsed, but the epoch was superseded before the trigger took the lock.
    Preempted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Wait,
    Exit(TimerExit),
    Fire,
}

/// One watchdog instance bound to the term that was current when it was armed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ElectionTimer {
    token: TimerToken,
    timeout: Duration,
    poll_interval: Duration,
}

impl ElectionTimer {
    pub(crate) fn new(token: TimerToken, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            token,
            timeout,
            poll_interval,
        }
    }

    /// Role, then epoch, then arm generation, then elapsed time. A leader never
    /// reaches the timestamp comparison.
    pub(crate) fn check(&self, state: &NodeState, now: Instant) -> Verdict {
        let role = state.role();
        if !role.awaits_leader() {
            return Verdict::Exit(TimerExit::RoleChanged { role });
        }

        let current = state.current_term();
        if current != self.token.epoch {
            return Verdict::Exit(TimerExit::TermChanged {
                epoch: self.token.epoch,
                current,
            });
        }

        if state.timer_generation() != self.token.generation {
            return Verdict::Exit(TimerExit::Superseded);
        }

        if state.elapsed_since_reset(now) >= self.timeout {
            Verdict::Fire
        } else {
            Verdict::Wait
        }
    }

    /// Polls `state` until this instance goes stale or times out. On timeout the
    /// lock is released before `trigger` runs; `trigger` returns the new term, or
    /// `None` if the token was retired in the meantime.
    pub(crate) async fn run<F>(self, node_id: &str, state: &SharedState, trigger: F) -> TimerExit
    where
        F: FnOnce() -> Option<u64>,
    {
        debug!(
            "[{node_id}] election timer started (timeout {:?}), term={}",
            self.timeout, self.token.epoch
        );

        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            // Logging happens after the guard is dropped.
            let (verdict, snap) = state.with(|s| {
                let now = Instant::now();
                (self.check(s, now), s.snapshot(now))
            });

            match verdict {
                Verdict::Wait => continue,
                Verdict::Exit(exit) => {
                    debug!(
                        "[{node_id}] election timer for term {} bailing out: {exit:?}",
                        self.token.epoch
                    );
                    return exit;
                }
                Verdict::Fire => {
                    info!(
                        "[{node_id}] no leader for {:?} (timeout {:?}) in term {}, role {}",
                        snap.since_reset, self.timeout, snap.term, snap.role
                    );
                    break;
                }
            }
        }

        match trigger() {
            Some(term) => TimerExit::Triggered { term },
            None => {
                debug!(
                    "[{node_id}] election timer for term {} preempted before triggering",
                    self.token.epoch
                );
                TimerExit::Preempted
            }
        }
    }
}
