//! Periodic status poller
//!
//! While connected, queues the configured queries (temperature by
//! default) followed by the status query at high priority every period.
//! Serial links take the single-byte realtime `?`. Network links need a
//! line terminated query, and skip it while a stream is running because
//! the controller's TCP console does not treat it as realtime.
//!
//! Ticks are skipped while an exclusive redirect is installed so poll
//! replies cannot interleave with a request/response exchange.

use super::redirect::RedirectSlot;
use super::send_queue::{Priority, SendQueue};
use crate::streaming::StreamRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// What one poll tick needs
#[derive(Debug, Clone)]
pub struct PollContext {
    /// Where queries are queued
    pub queue: Arc<SendQueue>,
    /// Checked for exclusive redirects
    pub redirect: RedirectSlot,
    /// Checked for a running stream on network links
    pub registry: StreamRegistry,
    /// Extra queries sent before the status query
    pub queries: Vec<String>,
    /// Status query for serial links
    pub status_query: String,
    /// True for network endpoints
    pub network: bool,
}

impl PollContext {
    /// Queue one round of queries, returning how many were queued
    pub fn poll_once(&self) -> usize {
        if self.redirect.is_exclusive() {
            tracing::trace!("Poll skipped, exclusive redirect active");
            return 0;
        }

        let mut messages: Vec<String> = self.queries.clone();
        if !self.network {
            messages.push(self.status_query.clone());
        } else if !self.registry.is_active() {
            messages.push(format!("{}\n", self.status_query.trim_end()));
        }

        let mut queued = 0;
        for message in messages {
            match self.queue.enqueue(message, Priority::High) {
                Ok(()) => queued += 1,
                Err(e) => {
                    tracing::debug!("Poll query not queued: {}", e);
                    break;
                }
            }
        }
        queued
    }
}

/// Handle to the recurring poll task
#[derive(Debug, Default)]
pub struct StatusPoller {
    task: Option<JoinHandle<()>>,
}

impl StatusPoller {
    /// Start polling every `period`, first tick one period from now
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(period: Duration, ctx: PollContext) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                ctx.poll_once();
            }
        });
        tracing::debug!("Status poller started ({:?})", period);
        Self { task: Some(task) }
    }

    /// Stop polling
    ///
    /// Returns true the first time; later calls do nothing.
    pub fn cancel(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                tracing::debug!("Status poller cancelled");
                true
            }
            None => false,
        }
    }

    /// Check if the poll task is still scheduled
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::redirect::RedirectTarget;
    use crate::streaming::{SessionKind, StreamSession};
    use smoothiehost_core::{EventDispatcher, StreamMode};

    fn context(network: bool) -> PollContext {
        PollContext {
            queue: Arc::new(SendQueue::new(10)),
            redirect: RedirectSlot::new(),
            registry: StreamRegistry::new(),
            queries: vec!["M105\n".to_string()],
            status_query: "?".to_string(),
            network,
        }
    }

    async fn drain(queue: &SendQueue) -> Vec<String> {
        let mut out = Vec::new();
        while !queue.is_empty() {
            out.push(queue.next().await.unwrap().payload);
        }
        out
    }

    #[tokio::test]
    async fn test_serial_poll() {
        let ctx = context(false);
        assert_eq!(ctx.poll_once(), 2);
        assert_eq!(drain(&ctx.queue).await, vec!["M105\n", "?"]);
    }

    #[tokio::test]
    async fn test_network_poll_skips_status_while_streaming() {
        let ctx = context(true);
        ctx.poll_once();
        assert_eq!(drain(&ctx.queue).await, vec!["M105\n", "?\n"]);

        let (events, _rx) = EventDispatcher::channel();
        let session = Arc::new(StreamSession::new(
            "job.nc",
            SessionKind::Stream(StreamMode::PingPong),
            None,
            10,
            events,
        ));
        ctx.registry.begin(session).unwrap();
        ctx.poll_once();
        assert_eq!(drain(&ctx.queue).await, vec!["M105\n"]);
    }

    #[tokio::test]
    async fn test_exclusive_redirect_suspends_polling() {
        let ctx = context(false);
        let guard = ctx.redirect.install(RedirectTarget::all(|_| {}).exclusive());
        assert_eq!(ctx.poll_once(), 0);
        drop(guard);

        ctx.redirect.set(Some(RedirectTarget::log_only(|_| {})));
        assert_eq!(ctx.poll_once(), 2);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let ctx = context(false);
        let queue = ctx.queue.clone();
        let mut poller = StatusPoller::start(Duration::from_millis(10), ctx);
        assert!(poller.is_running());
        tokio::time::sleep(Duration::from_millis(35)).await;
        assert!(queue.len() >= 2);

        assert!(poller.cancel());
        assert!(!poller.cancel());
        assert!(!poller.is_running());
    }
}
