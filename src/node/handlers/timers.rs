//! Timer dispatch.

use tracing::debug;

use crate::node::{Mle, MleError, STATE_UPDATE_PERIOD_MS};
use crate::timer::TimerKind;

impl Mle {
    pub(in crate::node) fn handle_timer(&mut self, kind: TimerKind, now_ms: u64) -> Result<(), MleError> {
        match kind {
            TimerKind::Attach => self.handle_attach_timer(now_ms),
            TimerKind::ChildUpdate => self.handle_child_update_timer(now_ms),
            TimerKind::Advertise => self.handle_advertise_timer(now_ms),
            TimerKind::StateUpdate => {
                self.timers
                    .start(TimerKind::StateUpdate, now_ms, STATE_UPDATE_PERIOD_MS);
                self.handle_state_update(now_ms)
            }
            TimerKind::DelayedResponse => {
                self.flush_delayed(now_ms);
                Ok(())
            }
            TimerKind::LinkRequest => self.handle_link_request_timer(now_ms),
            TimerKind::AddressSolicit => self.handle_solicit_timeout(now_ms),
        }
    }

    /// Send every delayed message that is due and rearm for the rest.
    fn flush_delayed(&mut self, now_ms: u64) {
        for pending in self.delayed.pop_due(now_ms) {
            let command = pending.message.command;
            if let Err(e) = self.send_mle(pending.destination, pending.message) {
                debug!(command = %command, error = %e, "Delayed send failed");
            }
        }
        if let Some(deadline) = self.delayed.next_deadline() {
            self.timers.start_at(TimerKind::DelayedResponse, deadline);
        }
    }
}
