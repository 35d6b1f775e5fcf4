//! Login-shell PATH discovery and command resolution.
//!
//! A controller started from a desktop launcher inherits a minimal PATH that
//! misses user tool directories (nvm, Homebrew, ~/.local/bin). The user's
//! login shell knows the real one, so it is asked once and cached.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

static LOGIN_PATH: OnceCell<Option<String>> = OnceCell::new();

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);
const PATH_MARKER: &str = "AGENTPTY_PATH:";

/// The user's login-shell PATH, resolved on first use
pub fn login_path() -> Option<&'static str> {
    LOGIN_PATH
        .get_or_init(|| {
            let found: Vec<String> = [resolve_via_login_shell(), resolve_via_rc_file()]
                .into_iter()
                .flatten()
                .collect();
            if found.is_empty() {
                warn!("Could not resolve login shell PATH, using process PATH");
                return None;
            }
            let merged = merge_paths(&found);
            info!(path = %merged, "Resolved login shell PATH");
            Some(merged)
        })
        .as_deref()
}

/// Shell used when a request carries no command
pub fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string())
}

/// Resolve a bare command name to an absolute path.
///
/// Names containing `/` pass through. Bare names are searched in the login
/// PATH when `use_login_path` is set and it resolved, else in the process
/// PATH. Unresolved names come back unchanged so the spawn error names them.
pub fn resolve_command(command: &str, use_login_path: bool) -> String {
    if command.contains('/') {
        return command.to_string();
    }
    let search_path = use_login_path
        .then(login_path)
        .flatten()
        .map(str::to_string)
        .or_else(|| std::env::var("PATH").ok());

    match search_path.and_then(|p| find_in_path(command, &p)) {
        Some(resolved) => {
            let resolved = resolved.to_string_lossy().into_owned();
            debug!(command = %command, resolved = %resolved, "Resolved command");
            resolved
        }
        None => {
            warn!(command = %command, "Could not resolve command, using as-is");
            command.to_string()
        }
    }
}

/// First executable named `command` in a colon-separated search path
pub fn find_in_path(command: &str, search_path: &str) -> Option<PathBuf> {
    search_path
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(command))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Non-interactive login shell; interactive mode needs a TTY and breaks
/// with instant-prompt style plugins
fn resolve_via_login_shell() -> Option<String> {
    let shell = default_shell();
    let script = format!(r#"printf "{PATH_MARKER}%s\n" "$PATH""#);
    let stdout = run_with_timeout(&shell, &["-lc", &script])?;
    extract_path(&stdout)
}

/// Some tools only add PATH entries in rc files, which login shells skip
fn resolve_via_rc_file() -> Option<String> {
    let shell = default_shell();
    let rc = match shell.rsplit('/').next().unwrap_or_default() {
        "zsh" => "~/.zshrc",
        "bash" => "~/.bashrc",
        _ => return None,
    };
    let script = format!(
        r#"[ -f {rc} ] && . {rc} >/dev/null 2>&1; printf "{PATH_MARKER}%s\n" "$PATH""#
    );
    let stdout = run_with_timeout(&shell, &["-c", &script])?;
    extract_path(&stdout)
}

fn extract_path(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix(PATH_MARKER))
        .filter(|p| !p.is_empty() && !is_minimal_path(p))
        .map(str::to_string)
}

/// Run a program and return its stdout, giving up after [`RESOLVE_TIMEOUT`]
fn run_with_timeout(program: &str, args: &[&str]) -> Option<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| debug!(program = %program, error = %e, "Failed to spawn"))
        .ok()?;

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) if start.elapsed() < RESOLVE_TIMEOUT => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Ok(None) => {
                warn!(program = %program, "Timed out resolving PATH");
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
            Err(e) => {
                debug!(program = %program, error = %e, "Failed to wait for process");
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
        }
    }

    let output = child.wait_with_output().ok()?;
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Only system directories; tells us the login shell added nothing
pub fn is_minimal_path(path: &str) -> bool {
    let entries: Vec<&str> = path.split(':').collect();
    entries.len() <= 4
        && entries
            .iter()
            .all(|e| matches!(*e, "/usr/bin" | "/bin" | "/usr/sbin" | "/sbin"))
}

/// Join PATH strings, dropping duplicates and keeping first occurrence order
pub fn merge_paths(paths: &[String]) -> String {
    let mut seen = HashSet::new();
    paths
        .iter()
        .flat_map(|p| p.split(':'))
        .filter(|e| !e.is_empty() && seen.insert(*e))
        .collect::<Vec<_>>()
        .join(":")
}
