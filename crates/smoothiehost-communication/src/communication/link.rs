//! Link handle
//!
//! [`SmoothieLink`] is what the application holds. It owns the event
//! channel, the redirect slot and the stream registry, and starts each
//! connection on its own thread running a single-threaded tokio runtime.
//! Every method is callable from any thread, with or without a runtime.

use super::ack::AckOutcome;
use super::connection::{ConnectionShared, ConnectionTask};
use super::endpoint::Endpoint;
use super::redirect::{RedirectGuard, RedirectSlot, RedirectTarget};
use super::send_queue::Priority;
use super::transport::{Connector, DefaultConnector};
use crate::streaming::{
    get_line_count, streamer, upload, ResumeAction, SessionKind, StreamContext, StreamRegistry,
    StreamSession,
};
use smoothiehost_core::{
    thread_safe_none, ConnectionError, EventDispatcher, LinkConfig, LinkEvent, LinkEvents,
    LinkState, Result, StreamError, StreamMode, ThreadSafeOption,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::runtime::Handle;

const LINK_THREAD_NAME: &str = "smoothie-link";

struct ActiveConnection {
    shared: Arc<ConnectionShared>,
    runtime: Handle,
    thread: Option<JoinHandle<()>>,
}

/// Connection to a Smoothieware controller
pub struct SmoothieLink {
    config: LinkConfig,
    connector: Arc<dyn Connector>,
    events: EventDispatcher,
    redirect: RedirectSlot,
    registry: StreamRegistry,
    active: ThreadSafeOption<ActiveConnection>,
}

impl std::fmt::Debug for SmoothieLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmoothieLink")
            .field("state", &self.state())
            .field("streaming", &self.registry.is_active())
            .finish_non_exhaustive()
    }
}

impl SmoothieLink {
    /// Create a link that opens real serial ports and sockets
    pub fn new(config: LinkConfig) -> (Self, LinkEvents) {
        Self::with_connector(config, Arc::new(DefaultConnector))
    }

    /// Create a link with a custom transport connector
    pub fn with_connector(config: LinkConfig, connector: Arc<dyn Connector>) -> (Self, LinkEvents) {
        let (events, rx) = EventDispatcher::channel();
        let link = Self {
            config,
            connector,
            events,
            redirect: RedirectSlot::new(),
            registry: StreamRegistry::new(),
            active: thread_safe_none(),
        };
        (link, rx)
    }

    /// Configuration every connection of this link uses
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Start connecting to `endpoint` (`serial://...` or `net://...`)
    ///
    /// Returns once the connection thread is running; `Connected` or a
    /// failure log followed by `Disconnected` arrive as events.
    pub fn connect(&self, endpoint: &str) -> Result<()> {
        let mut active = self.active.lock();
        if active.is_some() {
            tracing::warn!("Already connected");
            self.events.log(">>> Already connected");
            return Err(ConnectionError::AlreadyConnected.into());
        }

        let endpoint = match Endpoint::parse(endpoint, &self.config.connection) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                tracing::error!("{}", e);
                self.events.log(format!(">>> Connect failed: {}", e));
                self.events.publish(LinkEvent::Disconnected);
                return Err(e.into());
            }
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        let shared = Arc::new(ConnectionShared::new(
            endpoint,
            self.config.queue.normal_capacity,
        ));
        let slot = self.active.clone();
        let id = shared.id();
        let task = ConnectionTask {
            shared: shared.clone(),
            connector: self.connector.clone(),
            config: self.config.clone(),
            events: self.events.clone(),
            redirect: self.redirect.clone(),
            registry: self.registry.clone(),
            on_exit: Box::new(move || {
                let mut slot = slot.lock();
                if slot.as_ref().is_some_and(|c| c.shared.id() == id) {
                    *slot = None;
                }
            }),
        };

        let thread = std::thread::Builder::new()
            .name(LINK_THREAD_NAME.to_string())
            .spawn(move || {
                runtime.block_on(task.run());
                tracing::debug!("Link thread exiting");
            })?;

        *active = Some(ActiveConnection {
            shared,
            runtime: handle,
            thread: Some(thread),
        });
        Ok(())
    }

    /// Ask the connection to close; safe to call when not connected
    pub fn disconnect(&self) {
        match self.active.lock().as_ref() {
            Some(connection) => connection.shared.request_shutdown(),
            None => tracing::debug!("Disconnect requested while not connected"),
        }
    }

    /// Close the connection and wait for its thread to exit
    pub fn stop(&self) {
        let thread = {
            let mut active = self.active.lock();
            active.as_mut().and_then(|connection| {
                connection.shared.request_shutdown();
                connection.thread.take()
            })
        };
        let Some(thread) = thread else {
            return;
        };
        if thread.thread().id() == std::thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            tracing::error!("Link thread panicked");
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LinkState {
        match self.active.lock().as_ref() {
            None => LinkState::Disconnected,
            Some(connection) if connection.shared.is_ready() => LinkState::Connected,
            Some(_) => LinkState::Connecting,
        }
    }

    /// Check if the transport is open and accepting writes
    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Queue text for the controller at normal priority
    pub fn write(&self, text: impl Into<String>) -> Result<()> {
        self.enqueue(text.into(), Priority::Normal)
    }

    /// Queue text ahead of any normal priority traffic
    pub fn write_priority(&self, text: impl Into<String>) -> Result<()> {
        self.enqueue(text.into(), Priority::High)
    }

    fn enqueue(&self, text: String, priority: Priority) -> Result<()> {
        let (shared, _) = self.ready_connection().inspect_err(|_| {
            tracing::warn!("Cannot write to closed connection: {:?}", text.trim_end());
        })?;
        shared.queue().enqueue(text, priority)?;
        Ok(())
    }

    /// Queue `command` and wait for the controller's acknowledgment
    pub async fn send_and_wait(
        &self,
        command: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<AckOutcome> {
        let (shared, _) = self.ready_connection()?;
        let mark = shared.acks().mark();
        shared.queue().enqueue(command.into(), Priority::Normal)?;
        Ok(shared.acks().wait_after(mark, timeout).await)
    }

    /// Wait for the next acknowledgment or alarm release
    pub async fn wait_for_ack(&self, timeout: Option<Duration>) -> Result<AckOutcome> {
        let (shared, _) = self.ready_connection()?;
        let mark = shared.acks().mark();
        Ok(shared.acks().wait_after(mark, timeout).await)
    }

    /// Replace the redirect target, returning the previous one
    pub fn set_redirect(&self, target: Option<RedirectTarget>) -> Option<RedirectTarget> {
        self.redirect.set(target)
    }

    /// Install a redirect target for the lifetime of the guard
    pub fn install_redirect(&self, target: RedirectTarget) -> RedirectGuard {
        self.redirect.install(target)
    }

    /// Stream a job file to the controller
    ///
    /// The stream runs on the connection thread; progress, pauses and the
    /// final `StreamDone` arrive as events.
    pub fn stream_file(&self, path: impl AsRef<Path>, mode: StreamMode) -> Result<()> {
        let path = existing_file(path.as_ref())?;
        let total = count_lines(&path, mode == StreamMode::Fast);
        let session = Arc::new(StreamSession::new(
            path,
            SessionKind::Stream(mode),
            total,
            self.config.streaming.progress_every,
            self.events.clone(),
        ));
        let (ctx, runtime) = self.begin_session(session.clone())?;
        runtime.spawn(streamer::run_stream(ctx, session));
        Ok(())
    }

    /// Upload a file to the controller's SD card
    pub fn upload_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = existing_file(path.as_ref())?;
        let total = count_lines(&path, true);
        let session = Arc::new(StreamSession::new(
            path,
            SessionKind::Upload,
            total,
            upload::UPLOAD_PROGRESS_EVERY,
            self.events.clone(),
        ));
        let (ctx, runtime) = self.begin_session(session.clone())?;
        runtime.spawn(upload::run_upload(ctx, session));
        Ok(())
    }

    /// List the controller's SD card
    ///
    /// The listing is also published as `SdCardListing`.
    pub fn list_sdcard(&self) -> Result<tokio::task::JoinHandle<Vec<String>>> {
        if self.registry.is_active() {
            return Err(StreamError::AlreadyStreaming.into());
        }
        let (shared, runtime) = self.ready_connection()?;
        let ctx = self.stream_context(&shared);
        Ok(runtime.spawn(upload::list_sdcard(ctx)))
    }

    /// The running stream or upload, if any
    pub fn current_stream(&self) -> Option<Arc<StreamSession>> {
        self.registry.current()
    }

    /// Check if a stream or upload is running
    pub fn is_streaming(&self) -> bool {
        self.registry.is_active()
    }

    /// Pause the running stream after the line in flight
    pub fn pause(&self) -> Result<()> {
        self.session()?.pause();
        Ok(())
    }

    /// Resume a paused or suspended stream
    ///
    /// A stream suspended by the controller sends `M601` before its next
    /// line.
    pub fn resume(&self) -> Result<ResumeAction> {
        Ok(self.session()?.resume())
    }

    /// Abort the running stream
    pub fn abort(&self) -> Result<()> {
        self.session()?.abort();
        Ok(())
    }

    /// Continue a stream waiting on `M0`
    pub fn release_m0(&self) -> Result<()> {
        self.session()?.release_m0();
        Ok(())
    }

    fn session(&self) -> Result<Arc<StreamSession>> {
        self.registry
            .current()
            .ok_or_else(|| StreamError::NotStreaming.into())
    }

    fn ready_connection(&self) -> Result<(Arc<ConnectionShared>, Handle)> {
        match self.active.lock().as_ref() {
            Some(connection) if connection.shared.is_ready() => {
                Ok((connection.shared.clone(), connection.runtime.clone()))
            }
            _ => Err(ConnectionError::NotConnected.into()),
        }
    }

    fn begin_session(&self, session: Arc<StreamSession>) -> Result<(StreamContext, Handle)> {
        let (shared, runtime) = self.ready_connection()?;
        self.registry.begin(session)?;
        Ok((self.stream_context(&shared), runtime))
    }

    fn stream_context(&self, shared: &ConnectionShared) -> StreamContext {
        ConnectionTask::stream_context(
            shared,
            &self.config,
            &self.events,
            &self.redirect,
            &self.registry,
        )
    }
}

impl Drop for SmoothieLink {
    fn drop(&mut self) {
        self.stop();
    }
}

fn existing_file(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(StreamError::FileError {
            path: path.display().to_string(),
            reason: "not a file".to_string(),
        }
        .into())
    }
}

fn count_lines(path: &Path, fast_mode: bool) -> Option<u64> {
    match get_line_count(path, fast_mode) {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!("Could not count lines in {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_endpoint_reports_disconnected() {
        let (link, mut events) = SmoothieLink::new(LinkConfig::default());
        assert!(link.connect("ftp://nowhere").is_err());
        assert_eq!(link.state(), LinkState::Disconnected);
        let events = events.drain();
        assert_eq!(events.last(), Some(&LinkEvent::Disconnected));
    }

    #[test]
    fn test_operations_need_a_connection() {
        let (link, _events) = SmoothieLink::new(LinkConfig::default());
        assert!(link.write("G0 X1\n").unwrap_err().is_connection_error());
        assert!(link.list_sdcard().unwrap_err().is_connection_error());
        assert!(link.pause().unwrap_err().is_stream_error());
        assert!(link.abort().unwrap_err().is_stream_error());
        link.disconnect();
        link.stop();
    }

    #[test]
    fn test_stream_missing_file() {
        let (link, _events) = SmoothieLink::new(LinkConfig::default());
        let err = link
            .stream_file("/definitely/not/here.nc", StreamMode::PingPong)
            .unwrap_err();
        assert!(err.is_stream_error());
    }
}
