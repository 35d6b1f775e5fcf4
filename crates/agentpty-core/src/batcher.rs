//! Output batching.
//!
//! Turns an arbitrarily chunked, bursty byte stream into few transport
//! frames. Three thresholds apply: a size cap that flushes bulk output
//! immediately, an interactive threshold that flushes small writes (echoes,
//! prompt lines) immediately, and a short coalescing delay for everything
//! in between.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::config::BatchPolicy;
use crate::session::OutputFrame;
use crate::timer::{cancel_slot, claim_slot, ScheduledTask};

/// What the caller must do after a chunk was appended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    /// Flush right away
    FlushNow,
    /// Arm the coalescing timer
    ScheduleFlush,
    /// A timer is already pending; it will pick this chunk up
    AwaitTimer,
}

/// Pending output of one session
#[derive(Debug, Default)]
pub struct OutputBatch {
    pending: Vec<u8>,
    timer: Option<ScheduledTask>,
}

impl OutputBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and decide when it should be flushed
    pub fn push(&mut self, chunk: &[u8], policy: &BatchPolicy) -> BatchAction {
        self.pending.extend_from_slice(chunk);

        if self.pending.len() >= policy.batch_max || chunk.len() < policy.interactive_max {
            BatchAction::FlushNow
        } else if self.timer.is_some() {
            BatchAction::AwaitTimer
        } else {
            BatchAction::ScheduleFlush
        }
    }

    pub(crate) fn arm(&mut self, task: ScheduledTask) {
        cancel_slot(&mut self.timer);
        self.timer = Some(task);
    }

    /// Drain the batch into a `Data` frame, cancelling any pending timer.
    ///
    /// Returns `None` when nothing is buffered.
    pub fn flush(&mut self) -> Option<OutputFrame> {
        cancel_slot(&mut self.timer);
        if self.pending.is_empty() {
            return None;
        }
        let frame = OutputFrame::Data(STANDARD.encode(&self.pending));
        self.pending.clear();
        Some(frame)
    }

    /// Timer fire: flush only if `token` is still the armed timer
    pub(crate) fn on_timer(&mut self, token: u64) -> Option<OutputFrame> {
        if !claim_slot(&mut self.timer, token) {
            return None;
        }
        self.flush()
    }

    /// Drop the pending timer without flushing
    pub fn cancel(&mut self) {
        cancel_slot(&mut self.timer);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }
}
