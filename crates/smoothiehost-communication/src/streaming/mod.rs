//! File streaming and SD-card transfers
//!
//! This module provides:
//! - Job line filtering and up-front line counting
//! - Stream sessions with pause, resume, abort and M0 release
//! - The ping-pong and fast streamers
//! - SD-card upload and listing
//! - Progress and ETA tracking

pub mod filter;
pub mod line_count;
pub mod progress;
pub mod session;
pub(crate) mod streamer;
pub mod upload;

pub use line_count::get_line_count;
pub use progress::{estimate_eta, ProgressTracker};
pub use session::{ResumeAction, SessionKind, StreamControl, StreamRegistry, StreamSession};
pub use upload::{classify_upload_reply, UploadReply, SD_LIST_TIMEOUT};

use crate::communication::ack::AckTracker;
use crate::communication::redirect::RedirectSlot;
use crate::communication::send_queue::SendQueue;
use smoothiehost_core::{EventDispatcher, StreamingSettings};
use std::sync::Arc;

/// Everything a streamer needs from the connection
#[derive(Debug, Clone)]
pub(crate) struct StreamContext {
    pub queue: Arc<SendQueue>,
    pub acks: Arc<AckTracker>,
    pub events: EventDispatcher,
    pub registry: StreamRegistry,
    pub redirect: RedirectSlot,
    pub settings: StreamingSettings,
}
