//! Trickle schedule for router advertisements.

use rand::Rng;

/// Trickle timer with no redundancy suppression: every interval transmits
/// once at a random point in its second half, and the interval doubles up
/// to `imax_ms`.
#[derive(Clone, Debug)]
pub struct TrickleTimer {
    imin_ms: u64,
    imax_ms: u64,
    interval_ms: u64,
    interval_start_ms: u64,
    /// Pending transmit point of the current interval.
    fire_at_ms: Option<u64>,
    running: bool,
}

impl TrickleTimer {
    pub fn new(imin_ms: u64, imax_ms: u64) -> Self {
        Self {
            imin_ms,
            imax_ms: imax_ms.max(imin_ms),
            interval_ms: imin_ms,
            interval_start_ms: 0,
            fire_at_ms: None,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Start from the minimum interval. Returns the next deadline.
    pub fn start<R: Rng + ?Sized>(&mut self, now_ms: u64, rng: &mut R) -> u64 {
        self.running = true;
        self.interval_ms = self.imin_ms;
        self.begin_interval(now_ms, rng)
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.fire_at_ms = None;
    }

    /// Inconsistency heard: shrink back to the minimum interval unless
    /// already there. Returns the new deadline if the schedule changed.
    pub fn reset<R: Rng + ?Sized>(&mut self, now_ms: u64, rng: &mut R) -> Option<u64> {
        if !self.running || self.interval_ms == self.imin_ms {
            return None;
        }
        Some(self.start(now_ms, rng))
    }

    /// Handle a deadline. Returns whether to transmit now and the next
    /// deadline.
    pub fn fire<R: Rng + ?Sized>(&mut self, now_ms: u64, rng: &mut R) -> (bool, u64) {
        if let Some(at) = self.fire_at_ms
            && now_ms >= at
        {
            self.fire_at_ms = None;
            return (true, self.interval_start_ms + self.interval_ms);
        }
        self.interval_ms = self.interval_ms.saturating_mul(2).min(self.imax_ms);
        (false, self.begin_interval(now_ms, rng))
    }

    fn begin_interval<R: Rng + ?Sized>(&mut self, now_ms: u64, rng: &mut R) -> u64 {
        self.interval_start_ms = now_ms;
        let half = self.interval_ms / 2;
        let offset = if half == self.interval_ms {
            half
        } else {
            rng.random_range(half..self.interval_ms)
        };
        let at = now_ms + offset;
        self.fire_at_ms = Some(at);
        at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_interval_doubles_to_max() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut trickle = TrickleTimer::new(1000, 32_000);
        let mut deadline = trickle.start(0, &mut rng);
        assert!((500..1000).contains(&deadline));

        let mut transmissions = 0;
        for _ in 0..20 {
            let (send, next) = trickle.fire(deadline, &mut rng);
            if send {
                transmissions += 1;
            }
            assert!(next >= deadline);
            deadline = next;
        }
        assert_eq!(trickle.interval_ms(), 32_000);
        assert_eq!(transmissions, 10);
    }

    #[test]
    fn test_reset_returns_to_min() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut trickle = TrickleTimer::new(1000, 32_000);
        assert_eq!(trickle.reset(0, &mut rng), None);

        let d = trickle.start(0, &mut rng);
        assert_eq!(trickle.reset(0, &mut rng), None);
        let (_, end) = trickle.fire(d, &mut rng);
        let (_, _) = trickle.fire(end, &mut rng);
        assert_eq!(trickle.interval_ms(), 2000);

        let next = trickle.reset(end, &mut rng).unwrap();
        assert_eq!(trickle.interval_ms(), 1000);
        assert!(next < end + 1000);
    }
}
