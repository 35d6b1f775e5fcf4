//! Cancellable scheduled work.
//!
//! Every timer is a tokio task that sleeps and then re-enters the manager
//! with its token. Anything that may block (the auto-respond keystroke) is
//! done after the manager lock is released. Teardown aborts the task, and the manager additionally
//! ignores any fire whose token no longer matches the stored slot, so a
//! timer that already woke up before it was aborted is still harmless.

use std::sync::Weak;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::session::manager::ManagerInner;

/// Which per-session timer fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// Output batch coalescing window elapsed
    Flush,
    /// No qualifying output for the idle timeout
    Idle,
    /// Trailing run of the throttled question scan
    Analysis,
    /// Auto-respond keystroke is due
    RespondDelay,
    /// Auto-respond cooldown is over
    RespondCooldown,
}

/// Handle to one scheduled timer
#[derive(Debug)]
pub(crate) struct ScheduledTask {
    token: u64,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub(crate) fn token(&self) -> u64 {
        self.token
    }

    /// Abort the timer task
    pub(crate) fn cancel(self) {
        self.handle.abort();
    }
}

/// Cancel the timer held in `slot`, if any
pub(crate) fn cancel_slot(slot: &mut Option<ScheduledTask>) {
    if let Some(task) = slot.take() {
        task.cancel();
    }
}

/// Take the timer out of `slot` if it is the one identified by `token`.
///
/// Returns false for stale fires (slot empty or holding a newer timer).
pub(crate) fn claim_slot(slot: &mut Option<ScheduledTask>, token: u64) -> bool {
    match slot {
        Some(task) if task.token() == token => {
            slot.take();
            true
        }
        _ => false,
    }
}

/// Spawns timer tasks that call back into the manager
pub(crate) struct Scheduler {
    target: Weak<Mutex<ManagerInner>>,
    next_token: u64,
}

impl Scheduler {
    pub(crate) fn new(target: Weak<Mutex<ManagerInner>>) -> Self {
        Self {
            target,
            next_token: 0,
        }
    }

    /// Schedule `kind` for `session_id` after `delay`.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn schedule(
        &mut self,
        delay: Duration,
        session_id: &str,
        kind: TimerKind,
    ) -> ScheduledTask {
        self.next_token += 1;
        let token = self.next_token;
        let target = self.target.clone();
        let session_id = session_id.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = target.upgrade() else {
                return;
            };
            let keystroke = inner.lock().on_timer(&session_id, kind, token);
            drop(inner);
            // the child may not be reading; keep the write off the runtime
            if let Some(keystroke) = keystroke {
                let _ = tokio::task::spawn_blocking(move || keystroke.deliver()).await;
            }
        });

        ScheduledTask { token, handle }
    }
}
