//! Interactive front end: proxy this terminal to an agent session.

use std::io::{IsTerminal, Read, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use agentpty_core::{
    AgentDef, AgentKind, OutputFrame, SessionEvent, SessionManager, SpawnRequest,
};
use anyhow::{Context, Result};
use crossterm::terminal;
use tokio::sync::broadcast;

use crate::config::{RunArgs, Settings};

const RESIZE_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_SIZE: (u16, u16) = (80, 24);

/// Build the spawn request for `agentpty run`.
///
/// An explicit command wins over the agent definition; its kind is taken
/// from `--agent` or guessed from the executable name.
pub fn build_request(settings: &Settings, args: &RunArgs) -> SpawnRequest {
    let mut request = match args.command.split_first() {
        Some((command, rest)) => SpawnRequest {
            agent_kind: args.agent.unwrap_or_else(|| infer_kind(command)),
            ..SpawnRequest::new(command.clone()).with_args(rest.iter().cloned())
        },
        None => SpawnRequest::for_agent(args.agent.unwrap_or(settings.default_agent), args.resume),
    };
    request.session_owner_id = "cli".to_string();
    request.env = settings.env.clone();
    if let Some(cwd) = &args.cwd {
        request.cwd = cwd.display().to_string();
    }
    request
}

/// Agent kind whose executable matches the command's file name
fn infer_kind(command: &str) -> AgentKind {
    let name = Path::new(command)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(command);
    AgentKind::ALL
        .iter()
        .copied()
        .find(|kind| !kind.definition().command.is_empty() && kind.definition().command == name)
        .unwrap_or_default()
}

/// Restores cooked mode on drop
struct RawModeGuard {
    enabled: bool,
}

impl RawModeGuard {
    fn enable() -> Result<Self> {
        if !std::io::stdin().is_terminal() {
            return Ok(Self { enabled: false });
        }
        terminal::enable_raw_mode().context("Failed to enable raw mode")?;
        Ok(Self { enabled: true })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enabled {
            let _ = terminal::disable_raw_mode();
        }
    }
}

/// Run the agent in this terminal until it exits; returns its exit code
pub async fn run_agent(settings: Settings, args: RunArgs) -> Result<i32> {
    let (cols, rows) = terminal::size().unwrap_or(DEFAULT_SIZE);
    let request = build_request(&settings, &args).with_size(cols, rows);
    let label = if request.command.is_empty() {
        "shell".to_string()
    } else {
        request.command.clone()
    };

    let manager = SessionManager::new(settings.engine.clone());
    let events = tokio::spawn(log_events(manager.subscribe()));
    // spawn blocks on login PATH resolution and process start
    let spawner = manager.clone();
    let mut session = tokio::task::spawn_blocking(move || spawner.spawn(request))
        .await
        .context("Spawn task failed")?
        .with_context(|| format!("Failed to start {label}"))?;
    let id = session.session_id.clone();

    let raw = RawModeGuard::enable()?;
    forward_stdin(manager.clone(), id.clone());
    let resize = tokio::spawn(watch_resize(manager.clone(), id.clone(), (cols, rows)));

    let mut stdout = std::io::stdout();
    let mut report = None;
    while let Some(frame) = session.frames.recv().await {
        match frame {
            OutputFrame::Data(_) => {
                if let Some(bytes) = frame.decode_data() {
                    stdout.write_all(&bytes)?;
                    stdout.flush()?;
                }
            }
            OutputFrame::Exit(exit) => {
                report = Some(exit);
                break;
            }
        }
    }

    resize.abort();
    events.abort();
    drop(raw);

    let Some(report) = report else {
        return Ok(1);
    };
    if let Some(signal) = &report.signal {
        eprintln!("\r\n{label} terminated by signal {signal}");
    }
    Ok(report.exit_code.map_or(1, |code| code as i32))
}

/// Copy stdin to the session on a plain thread; stdin reads block
fn forward_stdin(manager: SessionManager, id: String) {
    let spawned = thread::Builder::new()
        .name("stdin-forward".to_string())
        .spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut buf = [0u8; 1024];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if let Err(e) = manager.write(&id, &buf[..n]) {
                            tracing::debug!(error = %e, "Stopping stdin forwarding");
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::debug!(error = %e, "stdin read error");
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Failed to start stdin forwarding");
    }
}

/// Poll the terminal size and propagate changes; avoids a SIGWINCH handler
async fn watch_resize(manager: SessionManager, id: String, mut last: (u16, u16)) {
    let mut ticker = tokio::time::interval(RESIZE_POLL_INTERVAL);
    loop {
        ticker.tick().await;
        let Ok(current) = terminal::size() else {
            continue;
        };
        if current == last {
            continue;
        }
        if manager.resize(&id, current.0, current.1).is_err() {
            break;
        }
        last = current;
    }
}

async fn log_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => tracing::debug!(event = ?event, "Session event"),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!(skipped = n, "Event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// `agentpty agents`
pub fn print_agents(json: bool) -> Result<()> {
    let defs = AgentDef::defaults();
    if json {
        println!("{}", serde_json::to_string_pretty(&defs)?);
        return Ok(());
    }
    for def in defs {
        let command = if def.command.is_empty() {
            "$SHELL"
        } else {
            def.command.as_str()
        };
        println!("{:<12} {:<8} {}", def.kind.id(), command, def.description);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_default_agent_request() {
        let settings = Settings::default();
        let request = build_request(&settings, &RunArgs::default());
        assert_eq!(request.command, "claude");
        assert_eq!(request.agent_kind, AgentKind::ClaudeCode);
        assert!(request.args.is_empty());
        assert_eq!(request.session_owner_id, "cli");
    }

    #[test]
    fn test_resume_uses_resume_args() {
        let args = RunArgs {
            agent: Some(AgentKind::Codex),
            resume: true,
            ..RunArgs::default()
        };
        let request = build_request(&Settings::default(), &args);
        assert_eq!(request.command, "codex");
        assert_eq!(request.args, vec!["resume", "--last"]);
    }

    #[test]
    fn test_explicit_command_infers_kind() {
        let args = RunArgs {
            command: vec!["/usr/local/bin/gemini".into(), "--yolo".into()],
            cwd: Some(PathBuf::from("/tmp/project")),
            ..RunArgs::default()
        };
        let request = build_request(&Settings::default(), &args);
        assert_eq!(request.command, "/usr/local/bin/gemini");
        assert_eq!(request.args, vec!["--yolo"]);
        assert_eq!(request.agent_kind, AgentKind::Gemini);
        assert_eq!(request.cwd, "/tmp/project");
    }

    #[test]
    fn test_unknown_command_is_shell_kind() {
        let args = RunArgs {
            command: vec!["htop".into()],
            ..RunArgs::default()
        };
        assert_eq!(
            build_request(&Settings::default(), &args).agent_kind,
            AgentKind::Shell
        );
    }

    #[test]
    fn test_settings_env_is_passed_through() {
        let mut settings = Settings::default();
        settings
            .env
            .insert("ANTHROPIC_MODEL".to_string(), "opus".to_string());
        let request = build_request(&settings, &RunArgs::default());
        assert_eq!(request.env.get("ANTHROPIC_MODEL").unwrap(), "opus");
    }
}
