use std::collections::HashMap;
use std::path::{Path, PathBuf};

use agentpty_core::{AgentKind, EnginePolicy};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run AI coding agents on managed pseudo-terminals"
)]
pub struct Config {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run an agent (or any command) on a PTY in this terminal
    Run(RunArgs),
    /// List built-in agent definitions
    Agents {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Arguments of `agentpty run`
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct RunArgs {
    /// Agent kind to launch (claude-code, codex, gemini, shell)
    #[arg(short, long, value_parser = parse_agent_kind)]
    pub agent: Option<AgentKind>,

    /// Continue the agent's previous conversation
    #[arg(long)]
    pub resume: bool,

    /// Confirm workspace trust dialogs automatically
    #[arg(long)]
    pub auto_accept: bool,

    /// Idle timeout in milliseconds
    #[arg(long)]
    pub idle_timeout_ms: Option<u64>,

    /// Working directory for the agent
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Explicit command and arguments (after `--`)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

fn parse_agent_kind(s: &str) -> std::result::Result<AgentKind, String> {
    AgentKind::from_id(s).ok_or_else(|| {
        let known: Vec<&str> = AgentKind::ALL.iter().map(|k| k.id()).collect();
        format!("unknown agent '{s}' (expected one of: {})", known.join(", "))
    })
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Arguments of the run subcommand, if that is what was invoked
    pub fn run_args(&self) -> Option<&RunArgs> {
        match &self.command {
            Command::Run(args) => Some(args),
            Command::Agents { .. } => None,
        }
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Agent launched by `agentpty run` without `--agent` or a command
    #[serde(default = "default_agent")]
    pub default_agent: AgentKind,

    /// Extra environment for every spawned agent (filtered like any override)
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Engine thresholds
    #[serde(default)]
    pub engine: EnginePolicy,
}

fn default_agent() -> AgentKind {
    AgentKind::ClaudeCode
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_agent: default_agent(),
            env: HashMap::new(),
            engine: EnginePolicy::default(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // Try custom path first
        if let Some(p) = path {
            if p.exists() {
                return Self::load_file(p);
            }
            tracing::warn!(path = ?p, "Config file not found, trying default locations");
        }

        let default_paths = [
            dirs::config_dir().map(|p| p.join("agentpty/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/agentpty/config.toml")),
            dirs::home_dir().map(|p| p.join(".agentpty.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                return Self::load_file(path);
            }
        }

        Ok(Self::default())
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        let Some(args) = cli.run_args() else {
            return;
        };
        if let Some(agent) = args.agent {
            self.default_agent = agent;
        }
        if args.auto_accept {
            self.engine.auto_respond.enabled = true;
        }
        if let Some(idle) = args.idle_timeout_ms {
            self.engine.classifier.idle_timeout_ms = idle;
        }
    }

    /// Validate and normalize settings values
    pub fn validate(&mut self) {
        self.engine.validate();
        self.env.retain(|key, _| !key.is_empty());
    }
}
