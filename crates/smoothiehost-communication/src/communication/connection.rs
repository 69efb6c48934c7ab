//! Connection lifecycle
//!
//! One connection runs as a single future on the link's dedicated
//! runtime thread. It opens the transport, splits it, and drives:
//!
//! - a writer task draining the send queue onto the transport
//! - the status poller
//! - the read loop, which frames inbound bytes and routes every line
//!
//! When the read loop ends (EOF, I/O error, write failure, host action or
//! a disconnect request) the connection tears down in a fixed order so
//! that any running stream reports completion before `Disconnected` is
//! published.

use super::ack::AckTracker;
use super::endpoint::Endpoint;
use super::framer::{FramedLine, LineFramer};
use super::poller::{PollContext, StatusPoller};
use super::redirect::{RedirectScope, RedirectSlot, RedirectTarget};
use super::send_queue::{Priority, SendQueue};
use super::transport::{BoxedTransport, Connector};
use crate::firmware::smoothieware::{HostAction, SmoothiewareResponse, SmoothiewareResponseParser};
use crate::streaming::{StreamContext, StreamRegistry};
use smoothiehost_core::{ConnectionError, EventDispatcher, LinkConfig, LinkEvent, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use uuid::Uuid;

const READ_BUFFER_SIZE: usize = 1024;
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
const STREAM_WIND_DOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// State shared between a connection and the handle that started it
#[derive(Debug)]
pub struct ConnectionShared {
    id: Uuid,
    endpoint: Endpoint,
    queue: Arc<SendQueue>,
    acks: Arc<AckTracker>,
    ready: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl ConnectionShared {
    /// Create the shared state for a connection to `endpoint`
    pub fn new(endpoint: Endpoint, normal_capacity: usize) -> Self {
        let (shutdown, _rx) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            endpoint,
            queue: Arc::new(SendQueue::new(normal_capacity)),
            acks: Arc::new(AckTracker::new()),
            ready: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Identity of this connection attempt
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Endpoint this connection was opened for
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Outbound queue drained by the writer task
    pub fn queue(&self) -> &Arc<SendQueue> {
        &self.queue
    }

    /// Acknowledgment counter fed by the read loop
    pub fn acks(&self) -> &Arc<AckTracker> {
        &self.acks
    }

    /// Check if the transport is open and the queue accepts writes
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Ask the connection to close
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Check if a close has been requested
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }
}

/// Why the read loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
enum DisconnectReason {
    Requested,
    Eof,
    Error(String),
}

/// Everything one connection run needs
pub(crate) struct ConnectionTask {
    pub shared: Arc<ConnectionShared>,
    pub connector: Arc<dyn Connector>,
    pub config: LinkConfig,
    pub events: EventDispatcher,
    pub redirect: RedirectSlot,
    pub registry: StreamRegistry,
    /// Called once the connection is fully torn down, before `Disconnected`
    pub on_exit: Box<dyn FnOnce() + Send>,
}

impl ConnectionTask {
    /// Run the connection to completion
    pub async fn run(self) {
        let endpoint = self.shared.endpoint.clone();
        tracing::info!("Connecting to {}", endpoint);

        let transport = match self.open().await {
            Ok(Some(transport)) => transport,
            Ok(None) => {
                tracing::info!("Connect to {} cancelled", endpoint);
                self.finish();
                return;
            }
            Err(e) => {
                tracing::error!("Connect to {} failed: {}", endpoint, e);
                self.events.log(format!(">>> Connect failed: {}", e));
                self.finish();
                return;
            }
        };

        let (reader, writer) = tokio::io::split(transport);
        self.shared.set_ready(true);
        tracing::info!("Connected to {}", endpoint);
        self.events.publish(LinkEvent::Connected(endpoint.to_string()));

        let handshake = self.config.connection.handshake.clone();
        if !handshake.is_empty() {
            if let Err(e) = self.shared.queue.enqueue(handshake, Priority::Normal) {
                tracing::warn!("Handshake not queued: {}", e);
            }
        }

        let mut writer_task = tokio::spawn(write_loop(
            writer,
            self.shared.clone(),
            self.events.clone(),
        ));

        let mut poller = self.config.poll_interval().map(|period| {
            StatusPoller::start(
                period,
                PollContext {
                    queue: self.shared.queue.clone(),
                    redirect: self.redirect.clone(),
                    registry: self.registry.clone(),
                    queries: self.config.polling.queries.clone(),
                    status_query: self.config.polling.status_query.clone(),
                    network: endpoint.is_network(),
                },
            )
        });

        let mut router = InboundRouter::new(
            self.shared.clone(),
            self.events.clone(),
            self.redirect.clone(),
            self.registry.clone(),
        );
        let reason = read_loop(reader, &mut router, self.shared.shutdown.subscribe()).await;
        match &reason {
            DisconnectReason::Requested => tracing::info!("Disconnecting from {}", endpoint),
            DisconnectReason::Eof => {
                tracing::warn!("Connection to {} closed by peer", endpoint);
                self.events.log(">>> Connection lost: closed by peer");
            }
            DisconnectReason::Error(e) => {
                tracing::error!("Connection to {} lost: {}", endpoint, e);
                self.events.log(format!(">>> Connection lost: {}", e));
            }
        }

        self.shared.set_ready(false);
        if let Some(poller) = poller.as_mut() {
            poller.cancel();
        }

        self.wind_down_stream().await;

        self.shared.queue.close();
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task)
            .await
            .is_err()
        {
            tracing::debug!("Writer did not finish, aborting it");
            writer_task.abort();
        }

        self.finish();
    }

    /// Open the transport unless a disconnect arrives first
    async fn open(&self) -> Result<Option<BoxedTransport>> {
        let timeout = self.config.open_timeout();
        let mut shutdown = self.shared.shutdown.subscribe();
        tokio::select! {
            opened = tokio::time::timeout(timeout, self.connector.open(&self.shared.endpoint)) => {
                match opened {
                    Ok(transport) => transport.map(Some),
                    Err(_) => Err(ConnectionError::ConnectionTimeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }
                    .into()),
                }
            }
            _ = shutdown.wait_for(|stop| *stop) => Ok(None),
        }
    }

    /// Abort any running stream and give it a moment to report
    async fn wind_down_stream(&self) {
        let Some(session) = self.registry.current() else {
            return;
        };
        session.abort();

        let deadline = tokio::time::Instant::now() + STREAM_WIND_DOWN_TIMEOUT;
        while self.registry.is_active() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if self.registry.complete(&session, false) {
            tracing::warn!("Stream did not wind down, completed on disconnect");
        }
    }

    fn finish(self) {
        self.shared.set_ready(false);
        self.shared.queue.close();
        (self.on_exit)();
        tracing::info!("Disconnected from {}", self.shared.endpoint);
        self.events.publish(LinkEvent::Disconnected);
    }

    /// Streamer context bound to this connection
    pub fn stream_context(
        shared: &ConnectionShared,
        config: &LinkConfig,
        events: &EventDispatcher,
        redirect: &RedirectSlot,
        registry: &StreamRegistry,
    ) -> StreamContext {
        StreamContext {
            queue: shared.queue.clone(),
            acks: shared.acks.clone(),
            events: events.clone(),
            registry: registry.clone(),
            redirect: redirect.clone(),
            settings: config.streaming.clone(),
        }
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    shared: Arc<ConnectionShared>,
    events: EventDispatcher,
) {
    while let Some(message) = shared.queue.next().await {
        tracing::trace!("-> {:?}", message.payload);
        let written = async {
            writer.write_all(message.payload.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            tracing::error!("Write failed: {}", e);
            events.log(format!(">>> Write failed: {}", e));
            shared.request_shutdown();
            return;
        }
    }
    tracing::debug!("Writer finished");
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    router: &mut InboundRouter,
    mut shutdown: watch::Receiver<bool>,
) -> DisconnectReason {
    let mut framer = LineFramer::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => return DisconnectReason::Eof,
                Ok(n) => {
                    for line in framer.push(&buf[..n]) {
                        router.route(line);
                    }
                }
                Err(e) => return DisconnectReason::Error(e.to_string()),
            },
            _ = shutdown.wait_for(|stop| *stop) => return DisconnectReason::Requested,
        }
    }
}

/// Dispatches inbound lines to redirects, acks, sessions and events
pub(crate) struct InboundRouter {
    parser: SmoothiewareResponseParser,
    shared: Arc<ConnectionShared>,
    events: EventDispatcher,
    redirect: RedirectSlot,
    registry: StreamRegistry,
}

impl InboundRouter {
    pub fn new(
        shared: Arc<ConnectionShared>,
        events: EventDispatcher,
        redirect: RedirectSlot,
        registry: StreamRegistry,
    ) -> Self {
        Self {
            parser: SmoothiewareResponseParser::new(),
            shared,
            events,
            redirect,
            registry,
        }
    }

    /// Route one framed line
    pub fn route(&mut self, line: FramedLine) {
        let redirect = self.redirect.current();

        let text = match line {
            FramedLine::Text(text) => text,
            FramedLine::Undecoded(text) => {
                tracing::warn!("Undecodable line from controller: {}", text);
                match redirect {
                    Some(target) => target.deliver(text),
                    None => {
                        self.events.publish(LinkEvent::UndecodedLine(text));
                    }
                }
                return;
            }
        };
        tracing::trace!("<- {}", text);

        if let Some(target) = redirect.as_ref().filter(|t| t.scope() == RedirectScope::All) {
            target.deliver(text);
            return;
        }

        match self.parser.parse_line(&text) {
            SmoothiewareResponse::Ok => self.shared.acks.ack(),
            SmoothiewareResponse::Position(position) => {
                self.events.publish(LinkEvent::Position(position));
            }
            SmoothiewareResponse::Temperature(report) => {
                self.events.publish(LinkEvent::Temperature(report));
            }
            SmoothiewareResponse::Status(report) => {
                self.events.publish(LinkEvent::Status(report));
            }
            SmoothiewareResponse::Alarm {
                message,
                releases_ack,
            } => self.alarm(message, releases_ack),
            SmoothiewareResponse::Action(action) => self.host_action(action, redirect.as_ref()),
            SmoothiewareResponse::Probe(probe) => {
                self.console(redirect.as_ref(), text);
                self.events.publish(LinkEvent::Probe(probe));
            }
            SmoothiewareResponse::ParserState(words) => {
                self.events.publish(LinkEvent::ParserState(words));
            }
            SmoothiewareResponse::Firmware(info) => {
                self.console(redirect.as_ref(), text);
                self.events.publish(LinkEvent::Firmware(info));
            }
            SmoothiewareResponse::Switch { name, value } => {
                self.events.publish(LinkEvent::Switch { name, value });
            }
            SmoothiewareResponse::Progress { line, total } => {
                if let Some(session) = self.registry.current() {
                    session.report_sideband(line, total);
                }
            }
            SmoothiewareResponse::Done => {}
            SmoothiewareResponse::Log(text) => self.console(redirect.as_ref(), text),
        }
    }

    /// Console text goes to the installed redirect instead of the log
    fn console(&self, redirect: Option<&RedirectTarget>, text: String) {
        match redirect {
            Some(target) => target.deliver(text),
            None => {
                self.events.log(text);
            }
        }
    }

    fn alarm(&self, message: String, releases_ack: bool) {
        let session = self.registry.current();
        let was_printing = session.is_some();
        if let Some(session) = session {
            session.pause();
        }
        if releases_ack {
            self.shared.acks.release();
        }
        tracing::warn!("Controller alarm: {}", message);
        self.events.publish(LinkEvent::Alarm {
            message,
            was_printing,
        });
    }

    fn host_action(&self, action: HostAction, redirect: Option<&RedirectTarget>) {
        match action {
            HostAction::Pause => {
                self.console(redirect, ">>> Smoothie requested Pause".to_string());
                if let Some(session) = self.registry.current() {
                    session.suspend();
                }
            }
            HostAction::Resume => {
                self.console(redirect, ">>> Smoothie requested Resume".to_string());
                if let Some(session) = self.registry.current() {
                    session.controller_resume();
                }
            }
            HostAction::Disconnect => {
                self.console(redirect, ">>> Smoothie requested Disconnect".to_string());
                self.shared.request_shutdown();
            }
            HostAction::Unknown(action) => {
                tracing::warn!("Unknown host action: {}", action);
            }
        }
    }
}
