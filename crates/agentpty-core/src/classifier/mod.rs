//! Liveness classifier.
//!
//! Infers from the output stream alone whether a session is busy, idle at a
//! prompt, or showing a question. Two passes run at different costs:
//!
//! - a cheap, synchronous prompt check on every chunk that drives the active
//!   set and the idle timer;
//! - a throttled scan of the recent screen for question/confirmation dialogs
//!   (leading edge, with a guaranteed trailing run) that also drives the
//!   auto-responder and the one-shot ready notifier.

pub mod ansi;
mod auto_respond;
pub mod decoder;
pub mod patterns;

use std::collections::{HashMap, HashSet};

use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;

use crate::agents::AgentKind;
use crate::config::{AutoRespondPolicy, ClassifierPolicy};
use crate::error::{Result, SessionError};
use crate::events::SessionEvent;
use crate::timer::{cancel_slot, claim_slot, ScheduledTask, Scheduler, TimerKind};

use self::ansi::strip_ansi;
use self::auto_respond::AutoResponder;
use self::decoder::StreamDecoder;
use self::patterns::{is_prompt_line, is_question_line, is_trust_line};

/// Result of a question scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scan {
    /// Some line looks like a question or confirmation
    pub question: bool,
    /// The question is a workspace trust dialog
    pub trust: bool,
}

/// Per-session classifier state
pub struct ClassifierState {
    decoder: StreamDecoder,
    /// Recent decoded text, bounded by `text_tail_cap` bytes
    tail: String,
    ready_signature: String,
    last_analysis: Option<Instant>,
    trailing: Option<ScheduledTask>,
    idle: Option<ScheduledTask>,
    idle_reset_at: Option<Instant>,
    question: bool,
    ready: Option<oneshot::Sender<()>>,
    responder: AutoResponder,
}

impl ClassifierState {
    pub fn new(ready_signature: impl Into<String>) -> Self {
        Self {
            decoder: StreamDecoder::new(),
            tail: String::new(),
            ready_signature: ready_signature.into(),
            last_analysis: None,
            trailing: None,
            idle: None,
            idle_reset_at: None,
            question: false,
            ready: None,
            responder: AutoResponder::default(),
        }
    }

    /// Decode a chunk and append it to the text tail
    pub fn ingest(&mut self, chunk: &[u8], cap: usize) {
        let text = self.decoder.decode(chunk);
        self.tail.push_str(&text);
        if self.tail.len() > cap {
            let start = ceil_char_boundary(&self.tail, self.tail.len() - cap);
            self.tail.drain(..start);
        }
    }

    pub fn tail(&self) -> &str {
        &self.tail
    }

    pub fn question(&self) -> bool {
        self.question
    }

    /// Whether the last visible line of the recent output is a prompt
    pub fn prompt_visible(&self, window: usize) -> bool {
        let recent = tail_chars(&self.tail, window);
        recent
            .split('\n')
            .rev()
            .map(|line| strip_ansi(line.trim_end_matches('\r')))
            .find(|line| !line.trim().is_empty())
            .is_some_and(|line| is_prompt_line(&line))
    }

    /// Scan every recent line for questions.
    ///
    /// Multi-line dialogs render the question above a list of options, so
    /// checking only the last line would miss them.
    pub fn scan(&self, window: usize) -> Scan {
        let recent = strip_ansi(tail_chars(&self.tail, window));
        let mut scan = Scan::default();
        for line in recent
            .split('\n')
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty())
        {
            scan.question |= is_question_line(line);
            scan.trust |= is_trust_line(line);
        }
        scan.trust &= scan.question;
        scan
    }

    /// Whether the main prompt signature is in the last `window` characters.
    ///
    /// Selection UIs reuse the same glyph as a cursor higher up the screen,
    /// hence the narrow window.
    pub fn ready_visible(&self, scan_window: usize, window: usize) -> bool {
        let stripped = strip_ansi(tail_chars(&self.tail, scan_window));
        tail_chars(&stripped, window).contains(self.ready_signature.as_str())
    }

    /// Cancel every timer and drop the ready notifier
    fn cancel_all(&mut self) {
        cancel_slot(&mut self.trailing);
        cancel_slot(&mut self.idle);
        self.responder.cancel();
        self.ready = None;
    }

    fn pending_timers(&self) -> usize {
        usize::from(self.trailing.is_some())
            + usize::from(self.idle.is_some())
            + self.responder.pending_timers()
    }
}

/// Classifier states of all sessions plus the active set
pub(crate) struct Liveness {
    policy: ClassifierPolicy,
    respond: AutoRespondPolicy,
    states: HashMap<String, ClassifierState>,
    active: HashSet<String>,
    events: broadcast::Sender<SessionEvent>,
}

impl Liveness {
    pub(crate) fn new(
        policy: ClassifierPolicy,
        respond: AutoRespondPolicy,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            policy,
            respond,
            states: HashMap::new(),
            active: HashSet::new(),
            events,
        }
    }

    /// Start tracking a freshly spawned session.
    ///
    /// Any previous state under the same id is discarded; decoder and buffer
    /// contents of an old process mean nothing for the new one.
    pub(crate) fn insert(&mut self, id: &str, kind: AgentKind, sched: &mut Scheduler) {
        self.remove(id);
        let signature = self
            .policy
            .ready_signature
            .clone()
            .unwrap_or_else(|| kind.ready_signature().to_string());
        let mut state = ClassifierState::new(signature);
        state.idle = Some(sched.schedule(self.policy.idle_timeout(), id, TimerKind::Idle));
        state.idle_reset_at = Some(Instant::now());
        self.states.insert(id.to_string(), state);
        self.set_active(id, true);
    }

    /// Stop tracking a session, cancelling all of its timers
    pub(crate) fn remove(&mut self, id: &str) {
        if let Some(mut state) = self.states.remove(id) {
            state.cancel_all();
        }
        self.active.remove(id);
    }

    pub(crate) fn on_chunk(&mut self, id: &str, chunk: &[u8], sched: &mut Scheduler) {
        let now = Instant::now();
        let Some(state) = self.states.get_mut(id) else {
            return;
        };
        state.ingest(chunk, self.policy.text_tail_cap);

        let at_prompt = state.prompt_visible(self.policy.prompt_window);
        if at_prompt {
            cancel_slot(&mut state.idle);
            state.idle_reset_at = None;
            // analysis scheduled against pre-prompt content is stale now
            cancel_slot(&mut state.trailing);
        } else {
            let due = match (&state.idle, state.idle_reset_at) {
                (Some(_), Some(at)) => now.duration_since(at) >= self.policy.throttle(),
                _ => true,
            };
            if due {
                cancel_slot(&mut state.idle);
                state.idle = Some(sched.schedule(self.policy.idle_timeout(), id, TimerKind::Idle));
                state.idle_reset_at = Some(now);
            }
        }

        let interval = self.policy.analysis_interval();
        let run_now = match state.last_analysis {
            Some(at) if now.duration_since(at) < interval => {
                // at a prompt only the leading edge may run
                if !at_prompt && state.trailing.is_none() {
                    let wait = interval - now.duration_since(at);
                    state.trailing = Some(sched.schedule(wait, id, TimerKind::Analysis));
                }
                false
            }
            _ => true,
        };

        self.set_active(id, !at_prompt);
        if run_now {
            self.analyze(id, sched);
        } else if at_prompt {
            self.fire_ready_if_visible(id);
        }
    }

    pub(crate) fn on_idle_timer(&mut self, id: &str, token: u64) {
        let Some(state) = self.states.get_mut(id) else {
            return;
        };
        if !claim_slot(&mut state.idle, token) {
            return;
        }
        state.idle_reset_at = None;
        cancel_slot(&mut state.trailing);
        self.set_active(id, false);
    }

    pub(crate) fn on_analysis_timer(&mut self, id: &str, token: u64, sched: &mut Scheduler) {
        let claimed = self
            .states
            .get_mut(id)
            .is_some_and(|state| claim_slot(&mut state.trailing, token));
        if claimed {
            self.analyze(id, sched);
        }
    }

    /// Delay fire: returns the keystroke to write and starts the cooldown
    pub(crate) fn on_respond_timer(
        &mut self,
        id: &str,
        token: u64,
        sched: &mut Scheduler,
    ) -> Option<String> {
        let state = self.states.get_mut(id)?;
        if !state.responder.on_delay(token) {
            return None;
        }
        state.responder.arm_cooldown(sched.schedule(
            self.respond.cooldown(),
            id,
            TimerKind::RespondCooldown,
        ));
        Some(self.respond.keystroke.clone())
    }

    pub(crate) fn on_cooldown_timer(&mut self, id: &str, token: u64) {
        if let Some(state) = self.states.get_mut(id) {
            state.responder.on_cooldown(token);
        }
    }

    /// Register the one-shot ready notifier, replacing any previous one
    pub(crate) fn register_ready(&mut self, id: &str) -> Result<oneshot::Receiver<()>> {
        let state = self
            .states
            .get_mut(id)
            .ok_or_else(|| SessionError::not_found(id))?;
        let (tx, rx) = oneshot::channel();
        state.ready = Some(tx);
        self.fire_ready_if_visible(id);
        Ok(rx)
    }

    pub(crate) fn is_active(&self, id: &str) -> bool {
        self.active.contains(id)
    }

    pub(crate) fn has_question(&self, id: &str) -> bool {
        self.states.get(id).is_some_and(|s| s.question)
    }

    pub(crate) fn pending_timers(&self, id: &str) -> usize {
        self.states.get(id).map_or(0, |s| s.pending_timers())
    }

    #[cfg(test)]
    pub(crate) fn state(&self, id: &str) -> Option<&ClassifierState> {
        self.states.get(id)
    }

    /// Throttled pass: question scan, auto-respond gate, ready check
    fn analyze(&mut self, id: &str, sched: &mut Scheduler) {
        let Some(state) = self.states.get_mut(id) else {
            return;
        };
        state.last_analysis = Some(Instant::now());
        cancel_slot(&mut state.trailing);

        let scan = state.scan(self.policy.question_window);
        let mut question = scan.question;
        if scan.trust && self.respond.enabled {
            if !state.responder.is_busy() {
                tracing::debug!(session_id = %id, "Trust dialog detected, scheduling auto-response");
                state.responder.arm_delay(sched.schedule(
                    self.respond.delay(),
                    id,
                    TimerKind::RespondDelay,
                ));
            }
            // being handled automatically
            question = false;
        }

        if state.question != question {
            state.question = question;
            let _ = self.events.send(SessionEvent::QuestionChanged {
                session_id: id.to_string(),
                question,
            });
        }

        self.fire_ready_if_visible(id);
    }

    fn fire_ready_if_visible(&mut self, id: &str) {
        let Some(state) = self.states.get_mut(id) else {
            return;
        };
        if state.ready.is_none()
            || state.question
            || !state.ready_visible(self.policy.question_window, self.policy.ready_window)
        {
            return;
        }
        if let Some(tx) = state.ready.take() {
            tracing::debug!(session_id = %id, "Ready signature detected");
            let _ = tx.send(());
            let _ = self.events.send(SessionEvent::Ready {
                session_id: id.to_string(),
            });
        }
    }

    fn set_active(&mut self, id: &str, active: bool) {
        let changed = if active {
            self.active.insert(id.to_string())
        } else {
            self.active.remove(id)
        };
        if changed {
            let _ = self.events.send(SessionEvent::ActivityChanged {
                session_id: id.to_string(),
                active,
            });
        }
    }
}

/// Last `n` characters of `s`
fn tail_chars(s: &str, n: usize) -> &str {
    match s.char_indices().rev().nth(n.saturating_sub(1)) {
        Some((idx, _)) if n > 0 => &s[idx..],
        Some(_) => "",
        None => s,
    }
}

/// First char boundary at or after `idx`
fn ceil_char_boundary(s: &str, idx: usize) -> usize {
    (idx..=s.len())
        .find(|&i| s.is_char_boundary(i))
        .unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(text: &str) -> ClassifierState {
        let mut state = ClassifierState::new("❯");
        state.ingest(text.as_bytes(), 4096);
        state
    }

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("hello", 3), "llo");
        assert_eq!(tail_chars("hello", 10), "hello");
        assert_eq!(tail_chars("あいう", 2), "いう");
        assert_eq!(tail_chars("abc", 0), "");
    }

    #[test]
    fn test_ingest_bounds_tail() {
        let mut state = ClassifierState::new("❯");
        for _ in 0..100 {
            state.ingest("あいうえお 12345\n".as_bytes(), 256);
            assert!(state.tail().len() <= 256);
        }
        assert!(state.tail().ends_with("12345\n"));
    }

    #[test]
    fn test_prompt_visible_shell_endings() {
        for ending in ["$ ", "% ", "# ", "[Y/n] "] {
            let state = state_with(&format!("building...\r\ndone\r\nuser@host {ending}"));
            assert!(state.prompt_visible(200), "ending {ending:?}");
        }
    }

    #[test]
    fn test_prompt_visible_ignores_trailing_escape_only_line() {
        let state = state_with("\x1b[32m❯\x1b[0m \r\n\x1b[?25h");
        assert!(state.prompt_visible(200));
    }

    #[test]
    fn test_prompt_not_visible_while_streaming() {
        let state = state_with("$ cargo build\r\n   Compiling serde v1.0\r\n");
        assert!(!state.prompt_visible(200));
    }

    #[test]
    fn test_scan_two_line_question() {
        let state = state_with("Do you want to\r\nproceed? (y/n)\r\n");
        let scan = state.scan(500);
        assert!(scan.question);
        assert!(!scan.trust);
    }

    #[test]
    fn test_scan_question_above_options() {
        let state = state_with(
            "\x1b[1mDo you want to make this edit to main.rs?\x1b[0m\r\n\
             \x1b[36m❯ 1. Yes\x1b[0m\r\n  2. Yes, allow all edits\r\n  3. No\r\n",
        );
        assert!(state.scan(500).question);
    }

    #[test]
    fn test_scan_trust_dialog() {
        let state = state_with(
            "Do you trust the files in this folder?\r\n\r\n❯ 1. Yes, proceed\r\n  2. No, exit\r\n",
        );
        let scan = state.scan(500);
        assert!(scan.question);
        assert!(scan.trust);
    }

    #[test]
    fn test_scan_plain_output() {
        let state = state_with("Reading src/lib.rs\r\nWrote 42 lines\r\n");
        assert_eq!(state.scan(500), Scan::default());
    }

    #[test]
    fn test_ready_visible_only_at_end() {
        let selection = format!("❯ 1. Option A\r\n  2. Option B\r\n{}", "x".repeat(80));
        assert!(!state_with(&selection).ready_visible(500, 50));

        let prompt = "Done.\r\n\x1b[2m────────\x1b[0m\r\n❯ \r\n";
        assert!(state_with(prompt).ready_visible(500, 50));
    }
}
