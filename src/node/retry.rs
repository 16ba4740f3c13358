//! Attach retry backoff.
//!
//! When an attach cycle in "any partition" mode finds no parent and the
//! device cannot lead its own partition, the next cycle is delayed with
//! exponential backoff plus jitter so that many devices powering up
//! together do not retry in lockstep.

use rand::Rng;

use crate::timer::jitter;

/// Retry state across consecutive failed attach cycles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct AttachBackoff {
    /// Failed attach cycles since the last success.
    pub retry_count: u32,
}

impl AttachBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no attach cycle has failed yet.
    pub fn is_first_attempt(&self) -> bool {
        self.retry_count == 0
    }

    /// Exponential delay for the current retry count:
    /// `base_ms * 2^retry_count`, capped at `max_ms`.
    pub fn backoff_ms(&self, base_ms: u64, max_ms: u64) -> u64 {
        let multiplier = 1u64.checked_shl(self.retry_count).unwrap_or(u64::MAX);
        base_ms.saturating_mul(multiplier).min(max_ms)
    }

    /// Record a failed cycle and return the delay before the next one.
    pub fn next_delay<R: Rng + ?Sized>(&mut self, rng: &mut R, base_ms: u64, max_ms: u64) -> u64 {
        let delay = self.backoff_ms(base_ms, max_ms);
        self.retry_count = self.retry_count.saturating_add(1);
        delay.saturating_add(jitter(rng, base_ms))
    }

    pub fn reset(&mut self) {
        self.retry_count = 0;
    }
}
