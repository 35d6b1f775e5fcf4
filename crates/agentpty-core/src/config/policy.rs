use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable thresholds for the session engine.
///
/// The defaults are tuned for interactive AI coding CLIs rendering into an
/// xterm-compatible terminal. Other programs may need different values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnginePolicy {
    /// Output batching
    #[serde(default)]
    pub batch: BatchPolicy,

    /// Exit diagnostics capture
    #[serde(default)]
    pub diagnostics: DiagnosticsPolicy,

    /// Liveness classifier
    #[serde(default)]
    pub classifier: ClassifierPolicy,

    /// Auto-responder for trust dialogs
    #[serde(default)]
    pub auto_respond: AutoRespondPolicy,

    /// Resolve bare command names and PATH through the user's login shell
    #[serde(default = "default_use_login_path")]
    pub use_login_path: bool,
}

fn default_use_login_path() -> bool {
    true
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            batch: BatchPolicy::default(),
            diagnostics: DiagnosticsPolicy::default(),
            classifier: ClassifierPolicy::default(),
            auto_respond: AutoRespondPolicy::default(),
            use_login_path: default_use_login_path(),
        }
    }
}

/// Output batching settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPolicy {
    /// Flush as soon as the pending batch reaches this many bytes
    #[serde(default = "default_batch_max")]
    pub batch_max: usize,

    /// Chunks smaller than this are treated as interactive and flushed at once
    #[serde(default = "default_interactive_max")]
    pub interactive_max: usize,

    /// Coalescing delay for medium-sized chunks (milliseconds)
    #[serde(default = "default_flush_delay_ms")]
    pub flush_delay_ms: u64,
}

fn default_batch_max() -> usize {
    64 * 1024
}

fn default_interactive_max() -> usize {
    1024
}

fn default_flush_delay_ms() -> u64 {
    8
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            batch_max: default_batch_max(),
            interactive_max: default_interactive_max(),
            flush_delay_ms: default_flush_delay_ms(),
        }
    }
}

impl BatchPolicy {
    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }
}

/// Exit diagnostics settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsPolicy {
    /// Capacity of the raw output tail kept per session (bytes)
    #[serde(default = "default_tail_cap")]
    pub tail_cap: usize,

    /// Maximum number of lines reported in an exit frame
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
}

fn default_tail_cap() -> usize {
    8 * 1024
}

fn default_max_lines() -> usize {
    50
}

impl Default for DiagnosticsPolicy {
    fn default() -> Self {
        Self {
            tail_cap: default_tail_cap(),
            max_lines: default_max_lines(),
        }
    }
}

/// Liveness classifier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierPolicy {
    /// Capacity of the decoded text tail (bytes of UTF-8)
    #[serde(default = "default_text_tail_cap")]
    pub text_tail_cap: usize,

    /// Characters inspected by the per-chunk prompt check
    #[serde(default = "default_prompt_window")]
    pub prompt_window: usize,

    /// Characters inspected by the question scan
    #[serde(default = "default_question_window")]
    pub question_window: usize,

    /// Characters inspected for the ready signature
    #[serde(default = "default_ready_window")]
    pub ready_window: usize,

    /// Silence after which a busy session is considered idle (milliseconds)
    ///
    /// AI agents routinely go quiet for several seconds while reasoning, so
    /// this is much longer than a typical shell would need.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Minimum spacing between idle timer reschedules (milliseconds)
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Minimum spacing between question scans (milliseconds)
    #[serde(default = "default_analysis_interval_ms")]
    pub analysis_interval_ms: u64,

    /// Overrides the agent kind's ready signature when set
    #[serde(default)]
    pub ready_signature: Option<String>,
}

fn default_text_tail_cap() -> usize {
    4 * 1024
}

fn default_prompt_window() -> usize {
    200
}

fn default_question_window() -> usize {
    500
}

fn default_ready_window() -> usize {
    50
}

fn default_idle_timeout_ms() -> u64 {
    15_000
}

fn default_throttle_ms() -> u64 {
    1_000
}

fn default_analysis_interval_ms() -> u64 {
    200
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            text_tail_cap: default_text_tail_cap(),
            prompt_window: default_prompt_window(),
            question_window: default_question_window(),
            ready_window: default_ready_window(),
            idle_timeout_ms: default_idle_timeout_ms(),
            throttle_ms: default_throttle_ms(),
            analysis_interval_ms: default_analysis_interval_ms(),
            ready_signature: None,
        }
    }
}

impl ClassifierPolicy {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn analysis_interval(&self) -> Duration {
        Duration::from_millis(self.analysis_interval_ms)
    }
}

/// Auto-responder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoRespondPolicy {
    /// Answer trust dialogs automatically (off by default)
    #[serde(default)]
    pub enabled: bool,

    /// Wait before answering so the dialog can finish rendering (milliseconds)
    #[serde(default = "default_respond_delay_ms")]
    pub delay_ms: u64,

    /// Window after an answer during which trust matches are ignored (milliseconds)
    #[serde(default = "default_respond_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Keystroke written to confirm the dialog
    #[serde(default = "default_keystroke")]
    pub keystroke: String,
}

fn default_respond_delay_ms() -> u64 {
    150
}

fn default_respond_cooldown_ms() -> u64 {
    3_000
}

fn default_keystroke() -> String {
    "\r".to_string()
}

impl Default for AutoRespondPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_ms: default_respond_delay_ms(),
            cooldown_ms: default_respond_cooldown_ms(),
            keystroke: default_keystroke(),
        }
    }
}

impl AutoRespondPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl EnginePolicy {
    /// Validate and normalize policy values
    ///
    /// Zero-sized buffers and zero intervals would either drop every byte or
    /// spin timers, so they are raised to a small minimum.
    pub fn validate(&mut self) {
        const MIN_BUFFER: usize = 256;
        const MIN_INTERVAL_MS: u64 = 1;

        self.batch.batch_max = self.batch.batch_max.max(MIN_BUFFER);
        self.batch.interactive_max = self.batch.interactive_max.min(self.batch.batch_max);
        self.diagnostics.tail_cap = self.diagnostics.tail_cap.max(MIN_BUFFER);
        self.diagnostics.max_lines = self.diagnostics.max_lines.max(1);

        let c = &mut self.classifier;
        c.text_tail_cap = c.text_tail_cap.max(MIN_BUFFER);
        c.prompt_window = c.prompt_window.max(1);
        c.question_window = c.question_window.max(1);
        c.ready_window = c.ready_window.max(1);
        c.idle_timeout_ms = c.idle_timeout_ms.max(MIN_INTERVAL_MS);
        c.analysis_interval_ms = c.analysis_interval_ms.max(MIN_INTERVAL_MS);
        if matches!(c.ready_signature.as_deref(), Some("")) {
            c.ready_signature = None;
        }

        if self.auto_respond.keystroke.is_empty() {
            self.auto_respond.keystroke = default_keystroke();
        }
    }
}
