//! Up-front line counting for progress totals

use super::filter::{classify_job_line, counts_toward_progress, JobLine};
use smoothiehost_core::{Result, StreamError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Count the lines of a job file that progress is measured in
///
/// Ping-pong streams count G/M/X/Y command lines, the same lines the
/// streamer counts as they are acknowledged. Fast streams count every
/// line that is sent, since progress there follows the ack count. Bytes
/// that are not UTF-8 are replaced rather than failing the count.
pub fn get_line_count(path: &Path, fast_mode: bool) -> Result<u64> {
    let file = File::open(path).map_err(|e| StreamError::FileError {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut reader = BufReader::new(file);

    let mut count = 0;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let raw = String::from_utf8_lossy(&buf);
        if let JobLine::Command(command) = classify_job_line(&raw) {
            if fast_mode || counts_toward_progress(command) {
                count += 1;
            }
        }
    }

    tracing::debug!("{} has {} counted lines", path.display(), count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_counts_by_mode() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "; header\nG21\n(MSG hello)\nT1\nM6\nG0 X1 Y1\n\nX2 Y2\nZ-1\n"
        )
        .unwrap();

        assert_eq!(get_line_count(file.path(), false).unwrap(), 4);
        assert_eq!(get_line_count(file.path(), true).unwrap(), 6);
    }

    #[test]
    fn test_missing_file() {
        let err = get_line_count(Path::new("/nonexistent/job.nc"), false).unwrap_err();
        assert!(err.is_stream_error());
    }
}
