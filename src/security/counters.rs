//! Per-neighbor key sequence and frame counter tracking.

use super::SecurityError;

/// Security state kept for one neighbor.
///
/// `mle_frame_counter` and `link_frame_counter` hold the next value we are
/// willing to accept at `key_sequence`. Anything lower at the same key
/// sequence is a replay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameCounters {
    pub key_sequence: u32,
    pub link_frame_counter: u32,
    pub mle_frame_counter: u32,
}

impl FrameCounters {
    /// Initialise from counters the neighbor advertised in a handshake.
    pub fn from_advertised(key_sequence: u32, link_frame_counter: u32, mle_frame_counter: u32) -> Self {
        Self {
            key_sequence,
            link_frame_counter,
            mle_frame_counter,
        }
    }

    /// Last MLE frame counter accepted at the current key sequence.
    pub fn last_accepted(&self) -> Option<u32> {
        self.mle_frame_counter.checked_sub(1)
    }

    /// Validate and record an inbound MLE frame.
    ///
    /// A newer key sequence resets both counters; an older key sequence is
    /// rejected. Nothing is recorded on rejection.
    pub fn accept_mle_frame(&mut self, key_sequence: u32, counter: u32) -> Result<(), SecurityError> {
        if key_sequence < self.key_sequence {
            return Err(SecurityError::StaleKeySequence {
                received: key_sequence,
                current: self.key_sequence,
            });
        }
        if key_sequence == self.key_sequence && counter < self.mle_frame_counter {
            return Err(SecurityError::Replay {
                key_sequence,
                counter,
                expected: self.mle_frame_counter,
            });
        }
        let next = counter.checked_add(1).ok_or(SecurityError::CounterExhausted)?;
        if key_sequence > self.key_sequence {
            self.key_sequence = key_sequence;
            self.link_frame_counter = 0;
        }
        self.mle_frame_counter = next;
        Ok(())
    }

    /// Adopt counters advertised in a handshake TLV, never moving backwards
    /// past a frame already accepted at the same key sequence.
    pub fn adopt_advertised(&mut self, key_sequence: u32, link_frame_counter: u32, mle_frame_counter: u32) {
        if key_sequence != self.key_sequence {
            *self = Self::from_advertised(key_sequence, link_frame_counter, mle_frame_counter);
            return;
        }
        self.link_frame_counter = self.link_frame_counter.max(link_frame_counter);
        self.mle_frame_counter = self.mle_frame_counter.max(mle_frame_counter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(key_sequence: u32, last_accepted: u32) -> FrameCounters {
        FrameCounters::from_advertised(key_sequence, 0, last_accepted + 1)
    }

    #[test]
    fn test_replay_at_or_below_last_accepted() {
        let mut c = at(3, 100);
        for counter in [0, 50, 99, 100] {
            assert!(matches!(
                c.accept_mle_frame(3, counter),
                Err(SecurityError::Replay { .. })
            ));
        }
        assert_eq!(c.last_accepted(), Some(100));
    }

    #[test]
    fn test_next_counter_accepted_and_recorded() {
        let mut c = at(3, 100);
        c.accept_mle_frame(3, 101).unwrap();
        assert_eq!(c.last_accepted(), Some(101));
        // The same frame again is now a replay.
        assert!(c.accept_mle_frame(3, 101).is_err());
        // Gaps are fine.
        c.accept_mle_frame(3, 500).unwrap();
        assert_eq!(c.last_accepted(), Some(500));
    }

    #[test]
    fn test_newer_key_sequence_resets() {
        let mut c = at(3, 100);
        c.link_frame_counter = 77;
        c.accept_mle_frame(4, 0).unwrap();
        assert_eq!(c.key_sequence, 4);
        assert_eq!(c.link_frame_counter, 0);
        assert_eq!(c.last_accepted(), Some(0));
    }

    #[test]
    fn test_older_key_sequence_rejected() {
        let mut c = at(3, 100);
        assert_eq!(
            c.accept_mle_frame(2, 1000),
            Err(SecurityError::StaleKeySequence {
                received: 2,
                current: 3
            })
        );
        assert_eq!(c.key_sequence, 3);
    }

    #[test]
    fn test_counter_exhaustion() {
        let mut c = at(0, 10);
        assert_eq!(c.accept_mle_frame(0, u32::MAX), Err(SecurityError::CounterExhausted));
        assert_eq!(c.last_accepted(), Some(10));
    }

    #[test]
    fn test_adopt_never_rewinds() {
        let mut c = at(1, 20);
        c.adopt_advertised(1, 5, 3);
        assert_eq!(c.last_accepted(), Some(20));
        c.adopt_advertised(2, 5, 3);
        assert_eq!(c.key_sequence, 2);
        assert_eq!(c.mle_frame_counter, 3);
    }
}
