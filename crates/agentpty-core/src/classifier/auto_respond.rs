use crate::timer::{cancel_slot, claim_slot, ScheduledTask};

/// Debounce and cooldown timers of the trust-dialog auto-responder.
///
/// A keystroke is written when the delay timer fires, then the cooldown
/// timer suppresses further triggers while the dialog redraws and closes.
#[derive(Debug, Default)]
pub(crate) struct AutoResponder {
    delay: Option<ScheduledTask>,
    cooldown: Option<ScheduledTask>,
}

impl AutoResponder {
    /// A response is pending or cooling down
    pub(crate) fn is_busy(&self) -> bool {
        self.delay.is_some() || self.cooldown.is_some()
    }

    pub(crate) fn arm_delay(&mut self, task: ScheduledTask) {
        cancel_slot(&mut self.delay);
        self.delay = Some(task);
    }

    pub(crate) fn arm_cooldown(&mut self, task: ScheduledTask) {
        cancel_slot(&mut self.cooldown);
        self.cooldown = Some(task);
    }

    /// Delay fire; true when the keystroke should be written now
    pub(crate) fn on_delay(&mut self, token: u64) -> bool {
        claim_slot(&mut self.delay, token)
    }

    /// Cooldown fire
    pub(crate) fn on_cooldown(&mut self, token: u64) -> bool {
        claim_slot(&mut self.cooldown, token)
    }

    pub(crate) fn cancel(&mut self) {
        cancel_slot(&mut self.delay);
        cancel_slot(&mut self.cooldown);
    }

    pub(crate) fn pending_timers(&self) -> usize {
        usize::from(self.delay.is_some()) + usize::from(self.cooldown.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::tests::dummy_task;

    #[tokio::test]
    async fn test_busy_through_delay_and_cooldown() {
        let mut responder = AutoResponder::default();
        assert!(!responder.is_busy());

        responder.arm_delay(dummy_task(1));
        assert!(responder.is_busy());
        assert!(!responder.on_delay(2));
        assert!(responder.on_delay(1));
        assert!(!responder.is_busy());

        responder.arm_cooldown(dummy_task(3));
        assert!(responder.is_busy());
        assert!(responder.on_cooldown(3));
        assert!(!responder.is_busy());
    }

    #[tokio::test]
    async fn test_cancel_clears_everything() {
        let mut responder = AutoResponder::default();
        responder.arm_delay(dummy_task(1));
        responder.arm_cooldown(dummy_task(2));
        assert_eq!(responder.pending_timers(), 2);
        responder.cancel();
        assert_eq!(responder.pending_timers(), 0);
        assert!(!responder.on_delay(1));
    }
}
