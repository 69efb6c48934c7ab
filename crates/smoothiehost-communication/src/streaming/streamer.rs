//! Job file streamer
//!
//! Reads a G-code file and feeds it to the controller through the normal
//! priority queue in one of two disciplines:
//!
//! - ping-pong: each line waits for its `ok` before the next is sent
//! - fast: lines are sent as fast as the queue drains and the `ok`s are
//!   counted; at end of file the streamer waits for the count to catch up
//!
//! Both honour pause/resume between lines, manual tool change, M0 waits
//! and abort. Abort discards queued lines and sends the realtime cancel.

use super::filter::{
    classify_job_line, counts_toward_progress, is_program_pause, is_tool_change, is_tool_select,
    JobLine,
};
use super::session::{SessionKind, StreamSession};
use super::StreamContext;
use crate::communication::ack::{AckMark, AckOutcome};
use crate::communication::send_queue::Priority;
use smoothiehost_core::constants::{
    CANCEL_BYTE, RESUME_COMMAND, SUSPEND_COMMAND, WAIT_FOR_MOVES_COMMAND,
};
use smoothiehost_core::{LinkEvent, Result, StreamError, StreamMode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};

/// How a stream loop ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    /// Reached end of file
    Eof,
    /// Stopped by an abort
    Aborted,
}

/// Stream the session's file and report the outcome exactly once
pub(crate) async fn run_stream(ctx: StreamContext, session: Arc<StreamSession>) {
    let mode = match session.kind() {
        SessionKind::Stream(mode) => mode,
        SessionKind::Upload => StreamMode::PingPong,
    };
    tracing::info!(
        "Streaming {} ({:?}, {:?} lines)",
        session.path().display(),
        mode,
        session.total_lines()
    );

    let mut streamer = Streamer::new(&ctx, &session, mode);
    let ok = match streamer.run().await {
        Ok(StreamEnd::Eof) => !session.is_aborted(),
        Ok(StreamEnd::Aborted) => false,
        Err(e) => {
            tracing::error!("Stream failed: {}", e);
            ctx.events.log(format!(">>> Stream failed: {}", e));
            false
        }
    };

    if session.is_aborted() {
        cancel_pending(&ctx);
    }
    ctx.registry.complete(&session, ok);
}

/// Drop queued lines and tell the controller to stop
pub(crate) fn cancel_pending(ctx: &StreamContext) {
    let dropped = ctx.queue.flush_normal();
    tracing::debug!("Discarded {} queued lines", dropped);
    if let Err(e) = ctx.queue.enqueue(CANCEL_BYTE, Priority::High) {
        tracing::debug!("Could not send cancel: {}", e);
    }
}

struct Streamer<'a> {
    ctx: &'a StreamContext,
    session: &'a StreamSession,
    mode: StreamMode,
    /// Acks received before the first line went out
    start: AckMark,
    /// G/M/X/Y lines completed
    counted: u64,
    /// Lines handed to the queue
    sent: u64,
    last_tool: Option<String>,
}

impl<'a> Streamer<'a> {
    fn new(ctx: &'a StreamContext, session: &'a StreamSession, mode: StreamMode) -> Self {
        Self {
            ctx,
            session,
            mode,
            start: ctx.acks.mark(),
            counted: 0,
            sent: 0,
            last_tool: None,
        }
    }

    async fn run(&mut self) -> Result<StreamEnd> {
        let path = self.session.path();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| StreamError::FileError {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();

        loop {
            if !self.session.wait_runnable().await {
                return Ok(StreamEnd::Aborted);
            }
            if self.session.take_resume_command() && !self.send(RESUME_COMMAND).await? {
                return Ok(StreamEnd::Aborted);
            }

            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let raw = String::from_utf8_lossy(&buf);

            let command = match classify_job_line(&raw) {
                JobLine::Skip => continue,
                JobLine::Message(text) => {
                    self.ctx.events.log(format!("MSG: {}", text));
                    continue;
                }
                JobLine::Notify(text) => {
                    self.ctx.events.publish(LinkEvent::Notify(text.to_string()));
                    continue;
                }
                JobLine::Command(command) => command.to_string(),
            };

            if is_tool_select(&command) {
                self.last_tool = Some(command.clone());
            }

            if self.ctx.settings.wait_on_m0 && is_program_pause(&command) {
                tracing::info!("Waiting on M0");
                if !self.session.wait_m0().await {
                    return Ok(StreamEnd::Aborted);
                }
                continue;
            }

            if self.ctx.settings.manual_tool_change && is_tool_change(&command) {
                if !self.tool_change(&command).await? {
                    return Ok(StreamEnd::Aborted);
                }
            } else if !self.send(&format!("{}\n", command)).await? {
                return Ok(StreamEnd::Aborted);
            }

            if counts_toward_progress(&command) {
                self.counted += 1;
            }
            self.report_progress();
        }

        if self.mode == StreamMode::Fast {
            return self.drain_acks().await;
        }
        Ok(StreamEnd::Eof)
    }

    /// Replace an `M6` with a wait for motion, then a suspend
    ///
    /// The stream holds itself paused before the suspend goes out; the
    /// controller answers with `// action:pause` which marks it suspended.
    async fn tool_change(&mut self, command: &str) -> Result<bool> {
        tracing::info!("Manual tool change: {}", command);
        if !self.send(WAIT_FOR_MOVES_COMMAND).await? {
            return Ok(false);
        }
        self.session.hold();
        self.ctx.events.publish(LinkEvent::ToolChange {
            line: command.to_string(),
            last_tool: self.last_tool.clone(),
        });
        self.send(SUSPEND_COMMAND).await
    }

    /// Queue one line; in ping-pong mode wait for its `ok`
    ///
    /// Returns false if the session was aborted meanwhile.
    async fn send(&mut self, line: &str) -> Result<bool> {
        let mark = self.ctx.acks.mark();
        tokio::select! {
            queued = self.ctx.queue.enqueue_wait(line) => queued?,
            _ = self.session.aborted() => return Ok(false),
        }
        self.sent += 1;

        if self.mode == StreamMode::PingPong {
            let timeout = self.ctx.settings.ack_timeout();
            tokio::select! {
                outcome = self.ctx.acks.wait_after(mark, timeout) => {
                    if outcome == AckOutcome::TimedOut {
                        return Err(StreamError::AckTimeout {
                            timeout_ms: self.ctx.settings.ack_timeout_ms,
                            line: self.counted,
                        }
                        .into());
                    }
                }
                _ = self.session.aborted() => return Ok(false),
            }
        }
        Ok(!self.session.is_aborted())
    }

    fn report_progress(&self) {
        let line = match self.mode {
            StreamMode::PingPong => self.counted,
            StreamMode::Fast => self.ctx.acks.count().saturating_sub(self.start.acks),
        };
        self.session.advance(line);
    }

    /// Fast mode end of file: wait until every sent line is acknowledged
    async fn drain_acks(&mut self) -> Result<StreamEnd> {
        let target = self.start.acks + self.sent;
        tracing::debug!(
            "Waiting for acks to catch up: {} of {}",
            self.ctx.acks.count().saturating_sub(self.start.acks),
            self.sent
        );

        let mut last_count = self.ctx.acks.count();
        let mut last_change = Instant::now();
        loop {
            let count = self.ctx.acks.count();
            self.session.advance(count.saturating_sub(self.start.acks));
            if count >= target {
                return Ok(StreamEnd::Eof);
            }
            if count != last_count {
                last_count = count;
                last_change = Instant::now();
            } else if let Some(limit) = self.ctx.settings.ack_timeout() {
                if last_change.elapsed() >= limit {
                    return Err(StreamError::AckTimeout {
                        timeout_ms: self.ctx.settings.ack_timeout_ms,
                        line: count.saturating_sub(self.start.acks),
                    }
                    .into());
                }
            }

            let since = self.ctx.acks.mark();
            tokio::select! {
                _ = self.ctx.acks.wait_for_count(target, since, Some(Duration::from_secs(1))) => {}
                _ = self.session.aborted() => return Ok(StreamEnd::Aborted),
            }
        }
    }
}
