use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::agents::AgentKind;

/// Request to start a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnRequest {
    /// Owner of the session on the UI side (e.g. a task id)
    #[serde(default)]
    pub session_owner_id: String,
    #[serde(default)]
    pub agent_kind: AgentKind,
    /// Session id; a UUID is generated when empty
    #[serde(default)]
    pub agent_id: String,
    /// Executable; empty means the user's shell
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory; empty means the controller's own
    #[serde(default)]
    pub cwd: String,
    /// Environment overrides, filtered through the blocklist
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
    /// Identifier of the consumer-side channel frames are destined for
    #[serde(default)]
    pub output_channel_id: String,
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

impl SpawnRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            session_owner_id: String::new(),
            agent_kind: AgentKind::default(),
            agent_id: String::new(),
            command: command.into(),
            args: Vec::new(),
            cwd: String::new(),
            env: HashMap::new(),
            cols: default_cols(),
            rows: default_rows(),
            output_channel_id: String::new(),
        }
    }

    /// Request that launches a built-in agent kind
    pub fn for_agent(kind: AgentKind, resume: bool) -> Self {
        let def = kind.definition();
        Self {
            agent_kind: kind,
            args: def.launch_args(resume),
            ..Self::new(def.command)
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.agent_id = id.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }
}

/// Frame delivered to the consumer of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OutputFrame {
    /// Base64-encoded output bytes
    Data(String),
    /// The process exited; always the last frame of a session
    Exit(ExitReport),
}

impl OutputFrame {
    /// Raw bytes of a `Data` frame
    pub fn decode_data(&self) -> Option<Vec<u8>> {
        match self {
            OutputFrame::Data(encoded) => STANDARD.decode(encoded).ok(),
            OutputFrame::Exit(_) => None,
        }
    }
}

/// Payload of an `Exit` frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitReport {
    pub exit_code: Option<u32>,
    pub signal: Option<String>,
    /// Last non-empty output lines, oldest first
    pub last_output: Vec<String>,
}

/// How a process ended
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExitStatus {
    /// Exit code; `None` when terminated by a signal or unknown
    pub exit_code: Option<u32>,
    /// Name of the terminating signal
    pub signal: Option<String>,
}

impl ExitStatus {
    pub fn code(code: u32) -> Self {
        Self {
            exit_code: Some(code),
            signal: None,
        }
    }

    pub fn signal(name: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            signal: Some(name.into()),
        }
    }
}

impl From<portable_pty::ExitStatus> for ExitStatus {
    fn from(status: portable_pty::ExitStatus) -> Self {
        match status.signal() {
            Some(signal) => Self::signal(signal),
            None => Self::code(status.exit_code()),
        }
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registered, no output seen yet
    Spawned,
    Running,
    /// Stopped with SIGSTOP
    Paused,
    /// Process ended on its own (terminal)
    Exited,
    /// Terminated by a caller (terminal)
    Killed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Exited | SessionState::Killed)
    }
}

/// Snapshot of a registered session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub session_owner_id: String,
    pub agent_kind: AgentKind,
    pub command: String,
    pub cwd: String,
    pub output_channel_id: String,
    pub pid: Option<u32>,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
}

/// Returned by spawn: the session id and its frame stream
#[derive(Debug)]
pub struct SpawnedSession {
    pub session_id: String,
    pub pid: Option<u32>,
    /// Output frames in arrival order; closes after `Exit` or on kill
    pub frames: mpsc::UnboundedReceiver<OutputFrame>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_data_frame_json() {
        let frame = OutputFrame::Data("aGk=".to_string());
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "Data", "data": "aGk=" }));
        assert_eq!(frame.decode_data().unwrap(), b"hi");
    }

    #[test]
    fn test_exit_frame_json() {
        let frame = OutputFrame::Exit(ExitReport {
            exit_code: Some(1),
            signal: None,
            last_output: vec!["boom".to_string()],
        });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "Exit",
                "data": { "exit_code": 1, "signal": null, "last_output": ["boom"] }
            })
        );
        assert!(frame.decode_data().is_none());
    }

    #[test]
    fn test_spawn_request_from_camel_case() {
        let json = r#"{
            "sessionOwnerId": "task-1",
            "agentKind": "claude-code",
            "agentId": "a1",
            "command": "claude",
            "args": ["--debug"],
            "cwd": "/tmp",
            "env": { "FOO": "bar" },
            "cols": 120,
            "rows": 40,
            "outputChannelId": "chan-9"
        }"#;
        let req: SpawnRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.session_owner_id, "task-1");
        assert_eq!(req.agent_kind, AgentKind::ClaudeCode);
        assert_eq!(req.cols, 120);
        assert_eq!(req.env.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(req.output_channel_id, "chan-9");
    }

    #[test]
    fn test_spawn_request_defaults() {
        let req: SpawnRequest = serde_json::from_str(r#"{ "command": "bash" }"#).unwrap();
        assert_eq!(req, SpawnRequest::new("bash"));
        assert_eq!((req.cols, req.rows), (80, 24));
    }

    #[test]
    fn test_for_agent_resume() {
        let req = SpawnRequest::for_agent(AgentKind::ClaudeCode, true);
        assert_eq!(req.command, "claude");
        assert_eq!(req.args, vec!["--continue"]);
    }

    #[test]
    fn test_exit_status_constructors() {
        assert_eq!(ExitStatus::code(1).exit_code, Some(1));
        let sig = ExitStatus::signal("Killed");
        assert_eq!(sig.exit_code, None);
        assert_eq!(sig.signal.as_deref(), Some("Killed"));
    }
}
