//! Exit diagnostics capture.
//!
//! Keeps the newest raw output bytes per session and turns them into a short
//! list of lines when the process exits.

/// Fixed-capacity byte buffer keeping only the most recent bytes
#[derive(Debug, Clone)]
pub struct TailBuffer {
    buf: Vec<u8>,
    cap: usize,
}

impl TailBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap.min(64 * 1024)),
            cap,
        }
    }

    /// Append bytes, discarding the oldest ones beyond capacity
    pub fn push(&mut self, chunk: &[u8]) {
        if chunk.len() >= self.cap {
            self.buf.clear();
            self.buf.extend_from_slice(&chunk[chunk.len() - self.cap..]);
            return;
        }
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > self.cap {
            let excess = self.buf.len() - self.cap;
            self.buf.drain(..excess);
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Human-readable summary of the buffered output
    pub fn summarize(&self, max_lines: usize) -> Vec<String> {
        summarize(&self.buf, max_lines)
    }
}

/// Split raw output into at most `max_lines` non-empty lines, newest last.
///
/// Invalid UTF-8 is replaced, trailing carriage returns are stripped.
pub fn summarize(tail: &[u8], max_lines: usize) -> Vec<String> {
    let text = String::from_utf8_lossy(tail);
    let lines: Vec<&str> = text
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .collect();

    let start = lines.len().saturating_sub(max_lines);
    lines[start..].iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_keeps_newest_bytes() {
        let mut tail = TailBuffer::new(8);
        tail.push(b"hello ");
        tail.push(b"world");
        assert_eq!(tail.as_bytes(), b"lo world");
        assert_eq!(tail.len(), 8);
    }

    #[test]
    fn test_push_chunk_larger_than_capacity() {
        let mut tail = TailBuffer::new(4);
        tail.push(b"ab");
        tail.push(b"0123456789");
        assert_eq!(tail.as_bytes(), b"6789");
    }

    #[test]
    fn test_tail_never_exceeds_capacity() {
        let mut tail = TailBuffer::new(100);
        for i in 0..500 {
            tail.push(format!("line {i}\n").as_bytes());
            assert!(tail.len() <= tail.capacity());
        }
    }

    #[test]
    fn test_summarize_strips_cr_and_empty_lines() {
        let lines = summarize(b"first\r\n\r\n\nsecond\r\nthird", 10);
        assert_eq!(lines, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_summarize_keeps_last_lines() {
        let text: String = (1..=60).map(|i| format!("line {i}\r\n")).collect();
        let lines = summarize(text.as_bytes(), 50);
        assert_eq!(lines.len(), 50);
        assert_eq!(lines[0], "line 11");
        assert_eq!(lines[49], "line 60");
        assert!(lines.iter().all(|l| !l.is_empty() && !l.ends_with('\r')));
    }

    #[test]
    fn test_summarize_invalid_utf8() {
        let lines = summarize(b"ok\n\xff\xfebad\n", 10);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "ok");
        assert!(lines[1].ends_with("bad"));
    }

    #[test]
    fn test_summarize_empty() {
        assert!(summarize(b"", 50).is_empty());
        assert!(summarize(b"\r\n\n", 50).is_empty());
    }
}
