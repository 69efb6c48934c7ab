//! SD-card transfers
//!
//! Uploading opens a file on the controller's card with `M28`, sends the
//! job one line per `ok` and closes it with `M29`. Listing sends `M20` and
//! collects the lines between `Begin file list` and `End file list`.
//!
//! Both install an exclusive redirect for the duration of the exchange,
//! so replies never reach the normal routing and the status poller stays
//! quiet.

use super::filter::{classify_job_line, counts_toward_progress, JobLine};
use super::session::StreamSession;
use super::StreamContext;
use crate::communication::redirect::RedirectTarget;
use crate::communication::send_queue::Priority;
use smoothiehost_core::{LinkEvent, Result, StreamError};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Progress is reported less often than for streams
pub(crate) const UPLOAD_PROGRESS_EVERY: u64 = 100;

/// Longest wait for a complete file listing
pub const SD_LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Reply to an upload command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadReply {
    /// Line accepted
    Ok,
    /// Controller refused or failed
    Error(String),
}

/// Interpret a line received during an upload
///
/// Informational lines (`Writing to file:`, `Done saving file.`) and
/// anything unexpected yield `None`.
pub fn classify_upload_reply(line: &str) -> Option<UploadReply> {
    if line == "ok" {
        return Some(UploadReply::Ok);
    }
    const FAILURES: [&str; 5] = ["open failed,", "Error:", "ALARM:", "!!", "error:"];
    if FAILURES.iter().any(|prefix| line.starts_with(prefix)) {
        return Some(UploadReply::Error(line.to_string()));
    }
    if !(line.starts_with("Writing to file:") || line.starts_with("Done saving file.")) {
        tracing::warn!("Unexpected upload reply: {}", line);
    }
    None
}

/// Upload the session's file and report the outcome exactly once
pub(crate) async fn run_upload(ctx: StreamContext, session: Arc<StreamSession>) {
    let (tx, replies) = mpsc::unbounded_channel();
    let guard = ctx.redirect.install(
        RedirectTarget::all(move |line| {
            if let Some(reply) = classify_upload_reply(&line) {
                let _ = tx.send(reply);
            }
        })
        .exclusive(),
    );

    let mut uploader = Uploader {
        ctx: &ctx,
        session: &session,
        replies,
    };
    let result = uploader.upload().await;

    // close the file on the card whatever happened
    match uploader.close().await {
        Ok(true) => {}
        Ok(false) => tracing::debug!("M29 interrupted"),
        Err(e) => tracing::warn!("M29 failed: {}", e),
    }
    drop(guard);

    let ok = match result {
        Ok(completed) => completed,
        Err(e) => {
            tracing::error!("Upload of {} failed: {}", session.path().display(), e);
            ctx.events.log(format!("error: upload failed: {}", e));
            false
        }
    };
    ctx.registry.complete(&session, ok);
}

struct Uploader<'a> {
    ctx: &'a StreamContext,
    session: &'a StreamSession,
    replies: mpsc::UnboundedReceiver<UploadReply>,
}

impl Uploader<'_> {
    /// Returns false if aborted
    async fn upload(&mut self) -> Result<bool> {
        let path = self.session.path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .ok_or_else(|| StreamError::FileError {
                path: path.display().to_string(),
                reason: "no file name".to_string(),
            })?;
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| StreamError::FileError {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!("Uploading {} to /sd/{}", path.display(), name);
        if !self.command(&format!("M28 {}\n", name), true).await? {
            return Ok(false);
        }

        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        let mut counted = 0;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                return Ok(true);
            }
            let raw = String::from_utf8_lossy(&buf);
            let JobLine::Command(command) = classify_job_line(&raw) else {
                continue;
            };
            if !self.command(&format!("{}\n", command), true).await? {
                return Ok(false);
            }
            if counts_toward_progress(command) {
                counted += 1;
                self.session.advance(counted);
            }
        }
    }

    /// Close the file on the card, even after an abort
    async fn close(&mut self) -> Result<bool> {
        self.command("M29\n", false).await
    }

    /// Send one command and wait for its reply
    ///
    /// Returns false if `abortable` and the session was aborted.
    async fn command(&mut self, line: &str, abortable: bool) -> Result<bool> {
        let session = self.session;
        let aborted = || async move {
            if abortable {
                session.aborted().await
            } else {
                std::future::pending::<()>().await
            }
        };

        tokio::select! {
            queued = self.ctx.queue.enqueue_wait(line) => queued?,
            _ = aborted() => return Ok(false),
        }

        let timeout = if abortable {
            self.ctx.settings.ack_timeout()
        } else {
            Some(SD_LIST_TIMEOUT)
        };
        let replies = &mut self.replies;
        let reply = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, replies.recv()).await.ok(),
                None => Some(replies.recv().await),
            }
        };
        tokio::select! {
            reply = reply => match reply {
                Some(Some(UploadReply::Ok)) => Ok(true),
                Some(Some(UploadReply::Error(reason))) => {
                    Err(StreamError::UploadRejected { reason }.into())
                }
                Some(None) => Err(StreamError::UploadRejected {
                    reason: "redirect replaced".to_string(),
                }
                .into()),
                None => Err(StreamError::AckTimeout {
                    timeout_ms: timeout.map_or(0, |t| t.as_millis() as u64),
                    line: session.line(),
                }
                .into()),
            },
            _ = aborted() => Ok(false),
        }
    }
}

/// List the files on the controller's SD card
///
/// Returns an empty list if the listing does not complete within
/// [`SD_LIST_TIMEOUT`]. The result is also published as an event.
pub(crate) async fn list_sdcard(ctx: StreamContext) -> Vec<String> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let guard = ctx.redirect.install(
        RedirectTarget::all(move |line| {
            let _ = tx.send(line);
        })
        .exclusive(),
    );

    let files = match ctx.queue.enqueue("M20\n", Priority::Normal) {
        Ok(()) => {
            let collect = async {
                let mut files = Vec::new();
                while let Some(line) = rx.recv().await {
                    if line.starts_with("Begin file list") || line == "ok" {
                        continue;
                    }
                    if line.starts_with("End file list") {
                        return files;
                    }
                    files.push(line);
                }
                tracing::warn!("SD card listing interrupted");
                Vec::new()
            };
            tokio::time::timeout(SD_LIST_TIMEOUT, collect)
                .await
                .unwrap_or_else(|_| {
                    tracing::warn!("Timeout waiting for sd card list");
                    Vec::new()
                })
        }
        Err(e) => {
            tracing::warn!("Cannot list sd card: {}", e);
            Vec::new()
        }
    };
    drop(guard);

    ctx.events.publish(LinkEvent::SdCardListing(files.clone()));
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_replies() {
        assert_eq!(classify_upload_reply("ok"), Some(UploadReply::Ok));
        assert_eq!(
            classify_upload_reply("open failed, File: /sd/job.nc."),
            Some(UploadReply::Error("open failed, File: /sd/job.nc.".to_string()))
        );
        assert!(matches!(
            classify_upload_reply("!!"),
            Some(UploadReply::Error(_))
        ));
        assert_eq!(classify_upload_reply("Writing to file: /sd/job.nc"), None);
        assert_eq!(classify_upload_reply("Done saving file."), None);
        assert_eq!(classify_upload_reply("something else"), None);
    }
}
