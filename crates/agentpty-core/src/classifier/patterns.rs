//! Pattern sets used by the liveness classifier.

use once_cell::sync::Lazy;
use regex::Regex;

/// Last-line patterns meaning "waiting at a prompt"
static PROMPT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // shell prompts: `user@host:~$ `, `% `, `root# `
        r"[$%#]\s*$",
        // agent input glyphs
        r"[❯›]\s*$",
        r"^\s*>\s*$",
        // trailing confirmation
        r"(?i)\[y/n\]\s*$",
        r"(?i)\(y/n\)\s*$",
        r"(?i)\[yes/no\]\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid prompt pattern"))
    .collect()
});

/// Per-line patterns meaning "a question or confirmation is on screen"
static QUESTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\[y/n\]|\(y/n\)|\[yes/no\]|\(yes/no\)|\by/n\b",
        r"(?i)\b(trust|allow|proceed|overwrite|continue)\b.*\?",
        r"(?i)\bare you sure\b",
        r"(?i)\bdo you want to\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid question pattern"))
    .collect()
});

/// Narrow subset: workspace trust dialogs that may be confirmed automatically
static TRUST_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bdo you trust\b",
        r"(?i)\btrust (this|the) (folder|directory|workspace|project|files?)\b",
        r"(?i)\byes,? i trust\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid trust pattern"))
    .collect()
});

pub fn is_prompt_line(line: &str) -> bool {
    PROMPT_PATTERNS.iter().any(|re| re.is_match(line))
}

pub fn is_question_line(line: &str) -> bool {
    QUESTION_PATTERNS.iter().any(|re| re.is_match(line))
}

pub fn is_trust_line(line: &str) -> bool {
    TRUST_PATTERNS.iter().any(|re| re.is_match(line))
}
