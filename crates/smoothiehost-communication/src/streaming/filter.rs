//! G-code line filtering for streaming
//!
//! Decides what happens to each line read from a job file before it is
//! sent: comments are dropped or surfaced, and a few commands get special
//! treatment by the streamer.

/// What to do with one line of a job file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobLine<'a> {
    /// Blank or comment, not sent
    Skip,
    /// `(MSG ...)` comment, shown on the console
    Message(&'a str),
    /// `(NOTIFY ...)` comment, raised as a notification
    Notify(&'a str),
    /// Command to send, trimmed
    Command(&'a str),
}

/// Classify one raw line of a job file
pub fn classify_job_line(raw: &str) -> JobLine<'_> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with(';') {
        return JobLine::Skip;
    }
    if line.starts_with('(') {
        if let Some(text) = line.strip_prefix("(MSG") {
            return JobLine::Message(text.trim_end_matches(')').trim());
        }
        if let Some(text) = line.strip_prefix("(NOTIFY") {
            return JobLine::Notify(text.trim_end_matches(')').trim());
        }
        return JobLine::Skip;
    }
    JobLine::Command(line)
}

/// Lines starting with G, M, X or Y count towards progress
pub fn counts_toward_progress(command: &str) -> bool {
    matches!(command.as_bytes().first(), Some(b'G' | b'M' | b'X' | b'Y'))
}

/// `M6`/`M06` anywhere in the line
pub fn is_tool_change(command: &str) -> bool {
    command
        .split_whitespace()
        .any(|word| word.eq_ignore_ascii_case("M6") || word.eq_ignore_ascii_case("M06"))
}

/// A tool selection line (`T1`, `T2 M6`)
pub fn is_tool_select(command: &str) -> bool {
    command.starts_with('T')
}

/// Program pause `M0`
pub fn is_program_pause(command: &str) -> bool {
    command
        .split_whitespace()
        .next()
        .is_some_and(|word| word == "M0" || word == "M00")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comments_and_blanks() {
        assert_eq!(classify_job_line(""), JobLine::Skip);
        assert_eq!(classify_job_line("   \r\n"), JobLine::Skip);
        assert_eq!(classify_job_line("; header"), JobLine::Skip);
        assert_eq!(classify_job_line("(tool path 1)"), JobLine::Skip);
    }

    #[test]
    fn test_message_and_notify() {
        assert_eq!(
            classify_job_line("(MSG change to 3mm endmill)\n"),
            JobLine::Message("change to 3mm endmill")
        );
        assert_eq!(
            classify_job_line("(NOTIFY job half done)"),
            JobLine::Notify("job half done")
        );
    }

    #[test]
    fn test_command_trimmed() {
        assert_eq!(classify_job_line("  G1 X10 Y5\r\n"), JobLine::Command("G1 X10 Y5"));
    }

    #[test]
    fn test_progress_lines() {
        assert!(counts_toward_progress("G1 X1"));
        assert!(counts_toward_progress("M3 S1000"));
        assert!(counts_toward_progress("X10 Y10"));
        assert!(counts_toward_progress("Y5"));
        assert!(!counts_toward_progress("T1"));
        assert!(!counts_toward_progress("Z-1"));
    }

    #[test]
    fn test_tool_change_detection() {
        assert!(is_tool_change("M6"));
        assert!(is_tool_change("T2 M06"));
        assert!(is_tool_change("M6 T1"));
        assert!(!is_tool_change("M600"));
        assert!(!is_tool_change("M106 S255"));
        assert!(is_tool_select("T2 M6"));
        assert!(!is_tool_select("G0 X1"));
    }

    #[test]
    fn test_program_pause() {
        assert!(is_program_pause("M0"));
        assert!(is_program_pause("M00 (check part)"));
        assert!(!is_program_pause("M03"));
    }
}
