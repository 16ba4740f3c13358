//! Timers and Event Queue
//!
//! All time-driven work in the engine is expressed as [`TimerKind`] events
//! on one [`TimerQueue`]. Each kind has at most one armed deadline.
//! Restarting or stopping a kind bumps its generation, so entries left in
//! the queue from an earlier arming are discarded when they surface rather
//! than being searched for and removed.
//!
//! The advertisement schedule is a [`TrickleTimer`]; responses that must be
//! sent after a random delay wait in a [`DelayedQueue`].

mod delayed;
mod trickle;

pub use delayed::DelayedQueue;
pub use trickle::TrickleTimer;

use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Independent timer duties of the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// Attach cycle steps: parent request escalation, child ID timeouts.
    Attach,
    /// Child side: deferred update, retransmission, keepalive.
    ChildUpdate,
    /// Router/REED advertisement schedule.
    Advertise,
    /// One-second maintenance tick (child timeouts, leader upkeep,
    /// role transition countdown).
    StateUpdate,
    /// Flush of the delayed response queue.
    DelayedResponse,
    /// Link Request retransmission and timeout.
    LinkRequest,
    /// Outstanding Address Solicit timeout.
    AddressSolicit,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimerKind::Attach => "attach",
            TimerKind::ChildUpdate => "child-update",
            TimerKind::Advertise => "advertise",
            TimerKind::StateUpdate => "state-update",
            TimerKind::DelayedResponse => "delayed-response",
            TimerKind::LinkRequest => "link-request",
            TimerKind::AddressSolicit => "address-solicit",
        };
        write!(f, "{}", s)
    }
}

/// Uniform random delay in `0..=max_ms`.
pub fn jitter<R: Rng + ?Sized>(rng: &mut R, max_ms: u64) -> u64 {
    if max_ms == 0 {
        0
    } else {
        rng.random_range(0..=max_ms)
    }
}

/// Deadline-ordered timer events with generation-checked cancellation.
#[derive(Clone, Debug, Default)]
pub struct TimerQueue {
    /// `(deadline, insertion seq)` -> `(kind, generation at arming)`.
    queue: BTreeMap<(u64, u64), (TimerKind, u32)>,
    generations: HashMap<TimerKind, u32>,
    armed: HashMap<TimerKind, u64>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` to fire at `deadline_ms`, replacing any earlier arming.
    pub fn start_at(&mut self, kind: TimerKind, deadline_ms: u64) {
        let generation = self.bump(kind);
        self.queue
            .insert((deadline_ms, self.next_seq), (kind, generation));
        self.next_seq += 1;
        self.armed.insert(kind, deadline_ms);
    }

    /// Arm `kind` to fire `delay_ms` after `now_ms`.
    pub fn start(&mut self, kind: TimerKind, now_ms: u64, delay_ms: u64) {
        self.start_at(kind, now_ms.saturating_add(delay_ms));
    }

    pub fn stop(&mut self, kind: TimerKind) {
        if self.armed.remove(&kind).is_some() {
            self.bump(kind);
        }
    }

    pub fn stop_all(&mut self) {
        let kinds: Vec<TimerKind> = self.armed.keys().copied().collect();
        for kind in kinds {
            self.stop(kind);
        }
        self.queue.clear();
    }

    pub fn is_running(&self, kind: TimerKind) -> bool {
        self.armed.contains_key(&kind)
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<u64> {
        self.armed.get(&kind).copied()
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.armed.values().min().copied()
    }

    /// Remove and return the next live timer due at or before `now_ms`.
    /// Stale entries encountered on the way are dropped.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<TimerKind> {
        loop {
            let (&key, &(kind, generation)) = self.queue.first_key_value()?;
            if key.0 > now_ms {
                return None;
            }
            self.queue.remove(&key);
            let current = self.generations.get(&kind).copied().unwrap_or(0);
            if generation == current && self.armed.get(&kind) == Some(&key.0) {
                self.armed.remove(&kind);
                return Some(kind);
            }
        }
    }

    fn bump(&mut self, kind: TimerKind) -> u32 {
        let generation = self.generations.entry(kind).or_insert(0);
        *generation = generation.wrapping_add(1);
        *generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_in_deadline_order() {
        let mut timers = TimerQueue::new();
        timers.start(TimerKind::Advertise, 0, 300);
        timers.start(TimerKind::Attach, 0, 100);
        timers.start(TimerKind::StateUpdate, 0, 200);

        assert_eq!(timers.next_deadline(), Some(100));
        assert_eq!(timers.pop_due(50), None);
        assert_eq!(timers.pop_due(1000), Some(TimerKind::Attach));
        assert_eq!(timers.pop_due(1000), Some(TimerKind::StateUpdate));
        assert_eq!(timers.pop_due(1000), Some(TimerKind::Advertise));
        assert_eq!(timers.pop_due(1000), None);
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn test_restart_drops_stale_entry() {
        let mut timers = TimerQueue::new();
        timers.start(TimerKind::Attach, 0, 100);
        timers.start(TimerKind::Attach, 0, 500);

        assert_eq!(timers.pop_due(200), None);
        assert!(timers.is_running(TimerKind::Attach));
        assert_eq!(timers.pop_due(500), Some(TimerKind::Attach));
        assert!(!timers.is_running(TimerKind::Attach));
    }

    #[test]
    fn test_stop_cancels() {
        let mut timers = TimerQueue::new();
        timers.start(TimerKind::LinkRequest, 0, 100);
        timers.stop(TimerKind::LinkRequest);
        assert_eq!(timers.pop_due(1000), None);

        // Re-arming after stop at the same deadline still fires once.
        timers.start(TimerKind::LinkRequest, 0, 100);
        assert_eq!(timers.pop_due(100), Some(TimerKind::LinkRequest));
        assert_eq!(timers.pop_due(100), None);
    }

    #[test]
    fn test_stop_all() {
        let mut timers = TimerQueue::new();
        timers.start(TimerKind::Attach, 0, 10);
        timers.start(TimerKind::ChildUpdate, 0, 20);
        timers.stop_all();
        assert_eq!(timers.next_deadline(), None);
        assert_eq!(timers.pop_due(u64::MAX), None);
    }

    #[test]
    fn test_jitter_bounds() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        assert_eq!(jitter(&mut rng, 0), 0);
        for _ in 0..100 {
            assert!(jitter(&mut rng, 50) <= 50);
        }
    }
}
