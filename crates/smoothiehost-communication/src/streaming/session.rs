//! Stream session state
//!
//! A session is created for every file stream or SD-card upload and is
//! shared between the streamer task, the inbound router (alarms, host
//! actions, progress sideband) and the application (pause, resume,
//! abort). Its control state lives in a watch channel so the streamer can
//! wait on transitions instead of polling flags.
//!
//! A session reports completion exactly once, whichever of the streamer
//! or the connection teardown gets there first.

use super::progress::ProgressTracker;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use smoothiehost_core::{
    thread_safe_none, EventDispatcher, LinkEvent, StreamError, StreamMode, ThreadSafeOption,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use uuid::Uuid;

/// Control state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    /// Sending lines
    Running,
    /// Paused by the operator, an alarm or a tool change
    Paused,
    /// Paused at the controller's request; resuming sends `M601`
    Suspended,
    /// Stopped for good
    Aborted,
}

/// What a session transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Job stream executed as it is sent
    Stream(StreamMode),
    /// Upload to the controller's SD card
    Upload,
}

/// Effect of a resume request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeAction {
    /// Nothing was paused
    None,
    /// The streamer continues with the next line
    Continue,
    /// The controller was suspended; the streamer sends `M601` first
    SendResumeCommand,
}

/// One stream or upload in progress
pub struct StreamSession {
    id: Uuid,
    path: PathBuf,
    kind: SessionKind,
    started_at: DateTime<Local>,
    control: watch::Sender<StreamControl>,
    progress: Mutex<ProgressTracker>,
    m0_release: Notify,
    resume_pending: AtomicBool,
    completed: AtomicBool,
    events: EventDispatcher,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    /// Create a running session
    pub fn new(
        path: impl Into<PathBuf>,
        kind: SessionKind,
        total_lines: Option<u64>,
        progress_every: u64,
        events: EventDispatcher,
    ) -> Self {
        let (control, _rx) = watch::channel(StreamControl::Running);
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            kind,
            started_at: Local::now(),
            control,
            progress: Mutex::new(ProgressTracker::new(total_lines, progress_every)),
            m0_release: Notify::new(),
            resume_pending: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            events,
        }
    }

    /// Unique id of the session
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// File being transferred
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream or upload
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Wall clock start time
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Current control state
    pub fn state(&self) -> StreamControl {
        *self.control.borrow()
    }

    /// Check if paused or suspended
    pub fn is_paused(&self) -> bool {
        matches!(self.state(), StreamControl::Paused | StreamControl::Suspended)
    }

    /// Check if aborted
    pub fn is_aborted(&self) -> bool {
        self.state() == StreamControl::Aborted
    }

    /// Check if completion has been reported
    pub fn is_finished(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Pause at the operator's request or on an alarm
    ///
    /// Returns false if the session was not running.
    pub fn pause(&self) -> bool {
        let changed =
            self.transition(|s| (s == StreamControl::Running).then_some(StreamControl::Paused));
        if changed {
            tracing::info!("Stream paused");
            self.publish_paused(true, false);
        }
        changed
    }

    /// Pause silently for a manual tool change
    pub(crate) fn hold(&self) -> bool {
        self.transition(|s| (s == StreamControl::Running).then_some(StreamControl::Paused))
    }

    /// Suspend at the controller's request
    pub fn suspend(&self) -> bool {
        let changed = self.transition(|s| match s {
            StreamControl::Running | StreamControl::Paused => Some(StreamControl::Suspended),
            _ => None,
        });
        if changed {
            tracing::info!("Stream suspended by controller");
            self.publish_paused(true, true);
        }
        changed
    }

    /// Resume at the operator's request
    pub fn resume(&self) -> ResumeAction {
        let mut was_suspended = false;
        let changed = self.transition(|s| match s {
            StreamControl::Paused | StreamControl::Suspended => {
                was_suspended = s == StreamControl::Suspended;
                Some(StreamControl::Running)
            }
            _ => None,
        });
        if !changed {
            return ResumeAction::None;
        }
        tracing::info!("Stream resumed");
        self.publish_paused(false, false);
        if was_suspended {
            self.resume_pending.store(true, Ordering::Release);
            ResumeAction::SendResumeCommand
        } else {
            ResumeAction::Continue
        }
    }

    /// Resume because the controller says it has resumed
    pub fn controller_resume(&self) -> bool {
        let changed = self.transition(|s| match s {
            StreamControl::Paused | StreamControl::Suspended => Some(StreamControl::Running),
            _ => None,
        });
        if changed {
            self.publish_paused(false, false);
        }
        changed
    }

    /// Stop the session; the streamer winds down and reports failure
    pub fn abort(&self) -> bool {
        let changed =
            self.transition(|s| (s != StreamControl::Aborted).then_some(StreamControl::Aborted));
        if changed {
            tracing::info!("Stream aborted");
            self.m0_release.notify_waiters();
        }
        changed
    }

    /// Take the pending controller resume, if any
    pub(crate) fn take_resume_command(&self) -> bool {
        self.resume_pending.swap(false, Ordering::AcqRel)
    }

    /// Let a stream waiting on `M0` continue
    ///
    /// Ignored unless the stream is already waiting.
    pub fn release_m0(&self) {
        self.m0_release.notify_waiters();
    }

    fn transition(&self, next: impl FnOnce(StreamControl) -> Option<StreamControl>) -> bool {
        self.control.send_if_modified(|state| match next(*state) {
            Some(new_state) if new_state != *state => {
                *state = new_state;
                true
            }
            _ => false,
        })
    }

    fn publish_paused(&self, paused: bool, suspended: bool) {
        self.events
            .publish(LinkEvent::StreamPaused { paused, suspended });
    }

    /// Wait until running again; false if aborted instead
    pub(crate) async fn wait_runnable(&self) -> bool {
        let mut rx = self.control.subscribe();
        let state = match rx
            .wait_for(|s| matches!(s, StreamControl::Running | StreamControl::Aborted))
            .await
        {
            Ok(state) => *state,
            Err(_) => StreamControl::Aborted,
        };
        state == StreamControl::Running
    }

    /// Resolve once the session is aborted
    pub(crate) async fn aborted(&self) {
        let mut rx = self.control.subscribe();
        let _ = rx.wait_for(|s| *s == StreamControl::Aborted).await;
    }

    /// Wait for an operator `M0` release; false if aborted instead
    pub(crate) async fn wait_m0(&self) -> bool {
        let released = self.m0_release.notified();
        tokio::pin!(released);
        released.as_mut().enable();
        self.events.publish(LinkEvent::WaitOnM0);
        tokio::select! {
            _ = &mut released => !self.is_aborted(),
            _ = self.aborted() => false,
        }
    }

    /// Line reached so far
    pub fn line(&self) -> u64 {
        self.progress.lock().line()
    }

    /// Total lines, if known
    pub fn total_lines(&self) -> Option<u64> {
        self.progress.lock().total()
    }

    /// Record a line number reached by the streamer
    pub fn advance(&self, line: u64) {
        let update = self.progress.lock().advance(line);
        if let Some(progress) = update {
            self.events.publish(LinkEvent::StreamProgress(progress));
        }
    }

    /// Record a `progress: line,total` sideband report
    pub fn report_sideband(&self, line: u64, total: u64) {
        let update = {
            let mut tracker = self.progress.lock();
            tracker.set_total_if_unknown(total);
            tracker.advance(line)
        };
        if let Some(progress) = update {
            self.events.publish(LinkEvent::StreamProgress(progress));
        }
    }

    /// Report completion; only the first call has any effect
    pub(crate) fn finish(&self, ok: bool) -> bool {
        if self.completed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let (lines, final_progress) = {
            let mut tracker = self.progress.lock();
            let pending = (!tracker.is_reported() && tracker.line() > 0).then(|| tracker.report());
            (tracker.line(), pending)
        };
        if let Some(progress) = final_progress {
            self.events.publish(LinkEvent::StreamProgress(progress));
        }
        tracing::info!(
            "Stream of {} {} at line {}",
            self.path.display(),
            if ok { "completed" } else { "failed" },
            lines
        );
        self.events.publish(LinkEvent::StreamDone { ok, lines });
        true
    }
}

/// Holder of the single active session
#[derive(Debug, Clone)]
pub struct StreamRegistry {
    active: ThreadSafeOption<Arc<StreamSession>>,
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            active: thread_safe_none(),
        }
    }

    /// Register a new session; fails if one is active
    pub fn begin(&self, session: Arc<StreamSession>) -> Result<(), StreamError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(StreamError::AlreadyStreaming);
        }
        *active = Some(session);
        Ok(())
    }

    /// The active session, if any
    pub fn current(&self) -> Option<Arc<StreamSession>> {
        self.active.lock().clone()
    }

    /// Check if a session is active
    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Unregister `session` and report its completion
    ///
    /// The slot is cleared before `StreamDone` goes out, so a new stream
    /// can be started as soon as the event is seen. Returns false if the
    /// session had already completed.
    pub fn complete(&self, session: &Arc<StreamSession>, ok: bool) -> bool {
        {
            let mut active = self.active.lock();
            if active.as_ref().is_some_and(|s| Arc::ptr_eq(s, session)) {
                *active = None;
            }
        }
        session.finish(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smoothiehost_core::LinkEvents;

    fn session() -> (Arc<StreamSession>, LinkEvents) {
        let (events, rx) = EventDispatcher::channel();
        let session = StreamSession::new(
            "job.nc",
            SessionKind::Stream(StreamMode::PingPong),
            Some(100),
            10,
            events,
        );
        (Arc::new(session), rx)
    }

    #[test]
    fn test_pause_resume_idempotent() {
        let (session, mut events) = session();
        assert!(session.pause());
        assert!(!session.pause());
        assert_eq!(session.resume(), ResumeAction::Continue);
        assert_eq!(session.resume(), ResumeAction::None);
        assert_eq!(
            events.drain(),
            vec![
                LinkEvent::StreamPaused {
                    paused: true,
                    suspended: false
                },
                LinkEvent::StreamPaused {
                    paused: false,
                    suspended: false
                },
            ]
        );
    }

    #[test]
    fn test_suspend_needs_resume_command() {
        let (session, mut events) = session();
        assert!(session.suspend());
        assert_eq!(session.resume(), ResumeAction::SendResumeCommand);
        assert_eq!(session.state(), StreamControl::Running);
        assert!(session.take_resume_command());
        assert!(!session.take_resume_command());
        assert_eq!(events.drain().len(), 2);
    }

    #[test]
    fn test_abort_is_terminal() {
        let (session, _events) = session();
        assert!(session.abort());
        assert!(!session.pause());
        assert_eq!(session.resume(), ResumeAction::None);
        assert!(!session.suspend());
        assert!(session.is_aborted());
    }

    #[test]
    fn test_finish_once() {
        let (session, mut events) = session();
        session.advance(7);
        assert!(session.finish(false));
        assert!(!session.finish(true));
        assert_eq!(
            events.drain(),
            vec![
                LinkEvent::StreamProgress(smoothiehost_core::StreamProgress {
                    line: 7,
                    total: Some(100),
                    eta: None
                }),
                LinkEvent::StreamDone {
                    ok: false,
                    lines: 7
                }
            ]
        );
    }

    #[test]
    fn test_sideband_adopts_total() {
        let (events, mut rx) = EventDispatcher::channel();
        let session = StreamSession::new("job.nc", SessionKind::Upload, None, 1, events);
        session.report_sideband(3, 50);
        assert_eq!(session.total_lines(), Some(50));
        session.report_sideband(2, 50);
        assert_eq!(session.line(), 3);
        assert_eq!(rx.drain().len(), 1);
    }

    #[test]
    fn test_registry_single_session() {
        let registry = StreamRegistry::new();
        let (first, _events) = session();
        let (second, _events2) = session();
        registry.begin(first.clone()).unwrap();
        assert_eq!(
            registry.begin(second.clone()),
            Err(StreamError::AlreadyStreaming)
        );
        assert!(registry.complete(&first, true));
        assert!(!registry.is_active());
        assert!(!registry.complete(&first, true));
        registry.begin(second).unwrap();
    }

    #[tokio::test]
    async fn test_wait_runnable() {
        let (session, _events) = session();
        assert!(session.wait_runnable().await);

        session.pause();
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.wait_runnable().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        session.abort();
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_m0_release() {
        let (session, mut events) = session();
        session.release_m0();

        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.wait_m0().await })
        };
        assert_eq!(events.recv().await, Some(LinkEvent::WaitOnM0));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!waiter.is_finished(), "early release must not skip the M0");

        session.release_m0();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_m0_abort() {
        let (session, _events) = session();
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.wait_m0().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        session.abort();
        assert!(!waiter.await.unwrap());
    }
}
