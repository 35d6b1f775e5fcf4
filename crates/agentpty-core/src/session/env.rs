//! Command validation and child environment construction.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, SessionError};

/// Characters a shell would interpret; commands are exec'd directly and never
/// go through a shell, so any of these means the caller meant something else.
const SHELL_METACHARACTERS: &[char] = &[
    ';', '|', '&', '$', '`', '<', '>', '(', ')', '{', '}', '[', ']', '!', '*', '?', '~', '\n',
    '\r', '\\', '\'', '"', '\0',
];

/// Loader and interpreter injection hooks, stripped from the inherited environment
const LOADER_BLOCKLIST: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "DYLD_FRAMEWORK_PATH",
    "NODE_OPTIONS",
    "PYTHONSTARTUP",
    "PYTHONPATH",
    "PERL5OPT",
    "RUBYOPT",
    "BASH_ENV",
    "ENV",
    "PROMPT_COMMAND",
    "ELECTRON_RUN_AS_NODE",
    "IFS",
];

/// Identity variables callers may not override
const IDENTITY_VARS: &[&str] = &["PATH", "HOME", "USER", "SHELL"];

/// Markers that make agent CLIs believe they run nested inside another agent
const NESTING_MARKERS: &[&str] = &[
    "CLAUDECODE",
    "CLAUDE_CODE_SESSION",
    "CLAUDE_CODE_ENTRYPOINT",
    "AGENTPTY_SESSION",
];

/// Reject commands containing shell metacharacters
pub fn validate_command(command: &str) -> Result<()> {
    if let Some(c) = command.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
        return Err(SessionError::InvalidCommand {
            command: command.to_string(),
            reason: format!("contains shell metacharacter {c:?}"),
        });
    }
    Ok(())
}

/// Whether a caller-supplied override for `key` must be dropped
pub fn is_blocked_override(key: &str) -> bool {
    key.is_empty()
        || key.contains('=')
        || key.contains('\0')
        || key.starts_with("LD_")
        || key.starts_with("DYLD_")
        || LOADER_BLOCKLIST.contains(&key)
        || IDENTITY_VARS.contains(&key)
        || NESTING_MARKERS.contains(&key)
}

/// Build the child's environment.
///
/// Layers, in order: `base` minus the loader blocklist, the login-shell PATH,
/// filtered caller overrides, forced terminal variables. Nesting markers are
/// removed last so nothing can reintroduce them.
pub fn build_env<I>(
    base: I,
    overrides: &HashMap<String, String>,
    login_path: Option<&str>,
) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: BTreeMap<String, String> = base
        .into_iter()
        .filter(|(k, _)| !LOADER_BLOCKLIST.contains(&k.as_str()))
        .collect();

    if let Some(path) = login_path {
        env.insert("PATH".to_string(), path.to_string());
    }

    for (key, value) in overrides {
        if is_blocked_override(key) || value.contains('\0') {
            tracing::debug!(key = %key, "Ignoring blocked environment override");
            continue;
        }
        env.insert(key.clone(), value.clone());
    }

    env.insert("TERM".to_string(), "xterm-256color".to_string());
    env.insert("COLORTERM".to_string(), "truecolor".to_string());

    for marker in NESTING_MARKERS {
        env.remove(*marker);
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn base() -> Vec<(String, String)> {
        [
            ("PATH", "/usr/bin:/bin"),
            ("HOME", "/home/dev"),
            ("LD_PRELOAD", "/tmp/evil.so"),
            ("NODE_OPTIONS", "--require /tmp/x.js"),
            ("CLAUDECODE", "1"),
            ("LANG", "en_US.UTF-8"),
            ("TERM", "dumb"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_validate_plain_commands() {
        assert!(validate_command("claude").is_ok());
        assert!(validate_command("/usr/local/bin/codex").is_ok());
        assert!(validate_command("my-agent_v2.sh").is_ok());
        assert!(validate_command("").is_ok());
    }

    #[test]
    fn test_validate_rejects_metacharacters() {
        for cmd in [
            "claude; rm -rf /",
            "a|b",
            "a&b",
            "$(id)",
            "`id`",
            "a>b",
            "~/bin/x",
            "a\nb",
            "a\\b",
            "'x'",
            "a\0b",
        ] {
            let err = validate_command(cmd).unwrap_err();
            assert!(
                matches!(err, SessionError::InvalidCommand { .. }),
                "{cmd:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_build_env_strips_loader_vars_and_markers() {
        let env = build_env(base(), &HashMap::new(), None);
        assert!(!env.contains_key("LD_PRELOAD"));
        assert!(!env.contains_key("NODE_OPTIONS"));
        assert!(!env.contains_key("CLAUDECODE"));
        assert_eq!(env.get("LANG").map(String::as_str), Some("en_US.UTF-8"));
        assert_eq!(env.get("PATH").map(String::as_str), Some("/usr/bin:/bin"));
    }

    #[test]
    fn test_build_env_forces_terminal_vars() {
        let mut overrides = HashMap::new();
        overrides.insert("TERM".to_string(), "vt100".to_string());
        let env = build_env(base(), &overrides, None);
        assert_eq!(env.get("TERM").map(String::as_str), Some("xterm-256color"));
        assert_eq!(env.get("COLORTERM").map(String::as_str), Some("truecolor"));
    }

    #[test]
    fn test_build_env_login_path_layered() {
        let env = build_env(base(), &HashMap::new(), Some("/opt/homebrew/bin:/usr/bin"));
        assert_eq!(
            env.get("PATH").map(String::as_str),
            Some("/opt/homebrew/bin:/usr/bin")
        );
    }

    #[test]
    fn test_build_env_filters_overrides() {
        let overrides: HashMap<String, String> = [
            ("PATH", "/tmp/evil"),
            ("HOME", "/tmp"),
            ("LD_PRELOAD", "/tmp/evil.so"),
            ("LD_BIND_NOW", "1"),
            ("DYLD_FALLBACK_LIBRARY_PATH", "/tmp"),
            ("CLAUDE_CODE_ENTRYPOINT", "cli"),
            ("ANTHROPIC_MODEL", "opus"),
            ("RUST_LOG", "debug"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let env = build_env(base(), &overrides, None);
        assert_eq!(env.get("PATH").map(String::as_str), Some("/usr/bin:/bin"));
        assert_eq!(env.get("HOME").map(String::as_str), Some("/home/dev"));
        assert!(!env.contains_key("LD_PRELOAD"));
        assert!(!env.contains_key("LD_BIND_NOW"));
        assert!(!env.contains_key("DYLD_FALLBACK_LIBRARY_PATH"));
        assert!(!env.contains_key("CLAUDE_CODE_ENTRYPOINT"));
        assert_eq!(env.get("ANTHROPIC_MODEL").map(String::as_str), Some("opus"));
        assert_eq!(env.get("RUST_LOG").map(String::as_str), Some("debug"));
    }

    #[test]
    fn test_blocked_override_keys() {
        assert!(is_blocked_override(""));
        assert!(is_blocked_override("A=B"));
        assert!(is_blocked_override("SHELL"));
        assert!(is_blocked_override("AGENTPTY_SESSION"));
        assert!(!is_blocked_override("EDITOR"));
    }
}
