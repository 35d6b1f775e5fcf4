//! Built-in agent kinds and their launch definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of program running inside a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    /// Anthropic's Claude Code CLI
    ClaudeCode,
    /// OpenAI's Codex CLI
    Codex,
    /// Google's Gemini CLI
    Gemini,
    /// Plain interactive shell or any other command
    #[default]
    Shell,
}

impl AgentKind {
    /// All known kinds, in display order
    pub const ALL: [AgentKind; 4] = [
        AgentKind::ClaudeCode,
        AgentKind::Codex,
        AgentKind::Gemini,
        AgentKind::Shell,
    ];

    /// Stable identifier used in requests and config files
    pub fn id(&self) -> &'static str {
        match self {
            AgentKind::ClaudeCode => "claude-code",
            AgentKind::Codex => "codex",
            AgentKind::Gemini => "gemini",
            AgentKind::Shell => "shell",
        }
    }

    /// Parse from the stable identifier
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }

    /// Text the agent renders when it is back at its main input prompt
    pub fn ready_signature(&self) -> &'static str {
        match self {
            AgentKind::ClaudeCode => "❯",
            AgentKind::Codex => "›",
            AgentKind::Gemini => ">",
            AgentKind::Shell => "$",
        }
    }

    /// Launch definition for this kind
    pub fn definition(&self) -> AgentDef {
        match self {
            AgentKind::ClaudeCode => AgentDef {
                kind: *self,
                name: "Claude Code".into(),
                command: "claude".into(),
                args: vec![],
                resume_args: vec!["--continue".into()],
                description: "Anthropic's Claude Code CLI agent".into(),
            },
            AgentKind::Codex => AgentDef {
                kind: *self,
                name: "Codex CLI".into(),
                command: "codex".into(),
                args: vec![],
                resume_args: vec!["resume".into(), "--last".into()],
                description: "OpenAI's Codex CLI agent".into(),
            },
            AgentKind::Gemini => AgentDef {
                kind: *self,
                name: "Gemini CLI".into(),
                command: "gemini".into(),
                args: vec![],
                resume_args: vec!["--resume".into(), "latest".into()],
                description: "Google's Gemini CLI agent".into(),
            },
            AgentKind::Shell => AgentDef {
                kind: *self,
                name: "Shell".into(),
                command: String::new(),
                args: vec![],
                resume_args: vec![],
                description: "The user's login shell".into(),
            },
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// How to launch an agent kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentDef {
    pub kind: AgentKind,
    pub name: String,
    /// Executable name; empty means the user's shell
    pub command: String,
    pub args: Vec<String>,
    /// Arguments that continue the previous conversation instead of starting fresh
    pub resume_args: Vec<String>,
    pub description: String,
}

impl AgentDef {
    /// Definitions for every built-in kind
    pub fn defaults() -> Vec<Self> {
        AgentKind::ALL.iter().map(|k| k.definition()).collect()
    }

    /// Arguments for a fresh or resumed launch
    pub fn launch_args(&self, resume: bool) -> Vec<String> {
        let mut args = self.args.clone();
        if resume {
            args.extend(self.resume_args.iter().cloned());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trip() {
        for kind in AgentKind::ALL {
            assert_eq!(AgentKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(AgentKind::from_id("vim"), None);
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        let json = serde_json::to_string(&AgentKind::ClaudeCode).unwrap();
        assert_eq!(json, "\"claude-code\"");
        let kind: AgentKind = serde_json::from_str("\"gemini\"").unwrap();
        assert_eq!(kind, AgentKind::Gemini);
    }

    #[test]
    fn test_defaults_cover_all_kinds() {
        let defs = AgentDef::defaults();
        assert_eq!(defs.len(), 4);
        assert_eq!(defs[0].command, "claude");
        assert!(defs[3].command.is_empty());
    }

    #[test]
    fn test_launch_args_resume() {
        let def = AgentKind::Codex.definition();
        assert!(def.launch_args(false).is_empty());
        assert_eq!(def.launch_args(true), vec!["resume", "--last"]);
    }
}
