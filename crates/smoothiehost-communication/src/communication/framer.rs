//! Inbound line framing
//!
//! Bytes arrive from the transport in arbitrary chunks. The framer holds
//! the trailing partial line between reads and yields only complete,
//! newline-terminated lines with trailing whitespace removed. Blank lines
//! are dropped. A line that is not valid UTF-8 is still yielded, rendered
//! with escapes and marked as undecoded. A fragment that reaches
//! [`MAX_LINE_LEN`] without a newline is flushed as a line of its own.

/// Longest line held back waiting for a newline
pub const MAX_LINE_LEN: usize = 4096;

/// A complete inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramedLine {
    /// Decoded text
    Text(String),
    /// Bytes that were not valid UTF-8, escaped for display
    Undecoded(String),
}

impl FramedLine {
    /// The displayable text of the line
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(s) | Self::Undecoded(s) => s,
        }
    }
}

/// Splits a byte stream into lines
#[derive(Debug, Default)]
pub struct LineFramer {
    fragment: Vec<u8>,
}

impl LineFramer {
    /// Create an empty framer
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every line it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<FramedLine> {
        self.fragment.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.fragment[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            if let Some(line) = decode(&self.fragment[start..end]) {
                lines.push(line);
            }
            start = end + 1;
        }
        self.fragment.drain(..start);

        while self.fragment.len() >= MAX_LINE_LEN {
            tracing::warn!("Inbound line exceeds {} bytes, flushing it", MAX_LINE_LEN);
            let overlong: Vec<u8> = self.fragment.drain(..MAX_LINE_LEN).collect();
            if let Some(line) = decode(&overlong) {
                lines.push(line);
            }
        }
        lines
    }

    /// Bytes held back waiting for a newline
    pub fn pending(&self) -> &[u8] {
        &self.fragment
    }

    /// Discard any partial line
    pub fn reset(&mut self) {
        self.fragment.clear();
    }
}

fn decode(raw: &[u8]) -> Option<FramedLine> {
    let raw = raw.trim_ascii_end();
    if raw.is_empty() {
        return None;
    }
    match std::str::from_utf8(raw) {
        Ok(text) => {
            let text = text.trim_end();
            (!text.is_empty()).then(|| FramedLine::Text(text.to_string()))
        }
        Err(_) => Some(FramedLine::Undecoded(raw.escape_ascii().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts(lines: Vec<FramedLine>) -> Vec<String> {
        lines.into_iter().map(|l| l.as_str().to_string()).collect()
    }

    #[test]
    fn test_partial_lines_are_held() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"o").is_empty());
        assert_eq!(framer.pending(), b"o");
        assert_eq!(texts(framer.push(b"k\nT:2")), vec!["ok"]);
        assert_eq!(texts(framer.push(b"0.0 /0.0\r\n")), vec!["T:20.0 /0.0"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut framer = LineFramer::new();
        assert_eq!(texts(framer.push(b"\n\r\n  \nok\n\n")), vec!["ok"]);
    }

    #[test]
    fn test_leading_whitespace_kept() {
        let mut framer = LineFramer::new();
        assert_eq!(texts(framer.push(b"  indented \t\n")), vec!["  indented"]);
    }

    #[test]
    fn test_undecodable_line() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"ab\xffc\nok\n");
        assert_eq!(
            lines,
            vec![
                FramedLine::Undecoded("ab\\xffc".to_string()),
                FramedLine::Text("ok".to_string())
            ]
        );
    }

    #[test]
    fn test_reset_discards_fragment() {
        let mut framer = LineFramer::new();
        framer.push(b"partial");
        framer.reset();
        assert_eq!(texts(framer.push(b"ok\n")), vec!["ok"]);
    }

    #[test]
    fn test_overlong_fragment_is_flushed() {
        let mut framer = LineFramer::new();
        let noise = vec![b'x'; MAX_LINE_LEN - 1];
        assert!(framer.push(&noise).is_empty());
        assert_eq!(framer.pending().len(), MAX_LINE_LEN - 1);

        let lines = framer.push(b"yz");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_str().len(), MAX_LINE_LEN);
        assert!(lines[0].as_str().ends_with('y'));
        assert_eq!(framer.pending(), b"z");

        assert_eq!(texts(framer.push(b"\nok\n")), vec!["z", "ok"]);
    }

    #[test]
    fn test_fragment_never_exceeds_cap() {
        let mut framer = LineFramer::new();
        for _ in 0..10 {
            framer.push(&[b'a'; 1000]);
            assert!(framer.pending().len() < MAX_LINE_LEN);
        }
    }

    proptest! {
        #[test]
        fn prop_split_points_do_not_change_output(
            lines in prop::collection::vec("[a-zA-Z0-9:<>,. ]{0,20}", 0..12),
            splits in prop::collection::vec(0usize..400, 0..8),
        ) {
            let stream: Vec<u8> = lines
                .iter()
                .flat_map(|l| format!("{}\n", l).into_bytes())
                .collect();

            let mut whole = LineFramer::new();
            let expected = whole.push(&stream);

            let mut cuts: Vec<usize> = splits.into_iter().map(|s| s.min(stream.len())).collect();
            cuts.sort_unstable();
            let mut framer = LineFramer::new();
            let mut actual = Vec::new();
            let mut prev = 0;
            for cut in cuts.into_iter().chain(std::iter::once(stream.len())) {
                actual.extend(framer.push(&stream[prev..cut]));
                prev = cut;
            }

            prop_assert_eq!(actual, expected);
            prop_assert!(framer.pending().is_empty());
        }
    }
}
