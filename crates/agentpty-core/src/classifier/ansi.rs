use once_cell::sync::Lazy;
use regex::Regex;

static OSC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)").expect("Invalid OSC pattern"));
static CSI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?<=>]*[ -/]*[@-~]").expect("Invalid CSI pattern"));
/// Charset selection and other two/three byte escapes
static ESC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b[()#][0-9A-Za-z]|\x1b[78=>@-Z\\-_]").expect("Invalid escape pattern")
});

/// Remove OSC, CSI and short escape sequences for detection logic.
pub fn strip_ansi(input: &str) -> String {
    if !input.contains('\x1b') {
        return input.to_string();
    }
    let without_osc = OSC_RE.replace_all(input, "");
    let without_csi = CSI_RE.replace_all(&without_osc, "");
    ESC_RE.replace_all(&without_csi, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(strip_ansi("user@host:~$ "), "user@host:~$ ");
    }

    #[test]
    fn test_strip_sgr_colors() {
        assert_eq!(strip_ansi("\x1b[1;32mok\x1b[0m done"), "ok done");
    }

    #[test]
    fn test_strip_cursor_movement() {
        assert_eq!(strip_ansi("\x1b[2K\x1b[1G\x1b[?25l❯ \x1b[?25h"), "❯ ");
    }

    #[test]
    fn test_strip_osc_title() {
        assert_eq!(strip_ansi("\x1b]0;claude\x07$ "), "$ ");
        assert_eq!(strip_ansi("\x1b]2;title\x1b\\text"), "text");
    }

    #[test]
    fn test_strip_charset_and_keypad() {
        assert_eq!(strip_ansi("\x1b(Babc\x1b=\x1b>"), "abc");
    }
}
