//! Two-priority send queue
//!
//! Outbound messages wait here until the writer task puts them on the
//! transport. High priority messages (status queries, cancel, poll
//! queries) always go out before normal ones. The high queue is
//! unbounded; the normal queue holds at most `capacity` messages, which
//! is what paces a fast stream against a slow transport.
//!
//! A disconnect closes the queue: pending messages are discarded, the
//! writer's `next()` returns `None` and further enqueues fail.

use parking_lot::Mutex;
use smoothiehost_core::ConnectionError;
use std::collections::VecDeque;
use tokio::sync::{Semaphore, TryAcquireError};

/// Message priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Sent before anything in the normal queue
    High,
    /// Regular commands and streamed lines
    Normal,
}

/// A message taken off the queue for sending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Text to write, including any terminator
    pub payload: String,
    /// Queue it came from
    pub priority: Priority,
}

#[derive(Debug, Default)]
struct Queues {
    high: VecDeque<String>,
    normal: VecDeque<String>,
    closed: bool,
}

/// Bounded two-priority FIFO shared by producers and the writer task
#[derive(Debug)]
pub struct SendQueue {
    queues: Mutex<Queues>,
    /// One permit per queued message
    available: Semaphore,
    /// One permit per free normal slot
    normal_space: Semaphore,
    capacity: usize,
}

impl SendQueue {
    /// Create a queue whose normal half holds `capacity` messages
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Mutex::new(Queues::default()),
            available: Semaphore::new(0),
            normal_space: Semaphore::new(capacity),
            capacity,
        }
    }

    /// Enqueue without waiting
    ///
    /// Fails with `QueueFull` when the normal queue is at capacity and with
    /// `QueueClosed` after a disconnect.
    pub fn enqueue(
        &self,
        payload: impl Into<String>,
        priority: Priority,
    ) -> Result<(), ConnectionError> {
        if priority == Priority::Normal {
            match self.normal_space.try_acquire() {
                Ok(permit) => permit.forget(),
                Err(TryAcquireError::NoPermits) => {
                    return Err(ConnectionError::QueueFull {
                        capacity: self.capacity,
                    })
                }
                Err(TryAcquireError::Closed) => return Err(ConnectionError::QueueClosed),
            }
        }
        self.push(payload.into(), priority)
    }

    /// Enqueue a normal priority message, waiting for space
    pub async fn enqueue_wait(&self, payload: impl Into<String>) -> Result<(), ConnectionError> {
        let payload = payload.into();
        self.normal_space
            .acquire()
            .await
            .map_err(|_| ConnectionError::QueueClosed)?
            .forget();
        self.push(payload, Priority::Normal)
    }

    fn push(&self, payload: String, priority: Priority) -> Result<(), ConnectionError> {
        {
            let mut queues = self.queues.lock();
            if queues.closed {
                return Err(ConnectionError::QueueClosed);
            }
            match priority {
                Priority::High => queues.high.push_back(payload),
                Priority::Normal => queues.normal.push_back(payload),
            }
        }
        self.available.add_permits(1);
        Ok(())
    }

    /// Wait for the next message, high priority first
    ///
    /// Returns `None` once the queue is closed.
    pub async fn next(&self) -> Option<OutboundMessage> {
        loop {
            self.available.acquire().await.ok()?.forget();
            let mut queues = self.queues.lock();
            if let Some(payload) = queues.high.pop_front() {
                return Some(OutboundMessage {
                    payload,
                    priority: Priority::High,
                });
            }
            if let Some(payload) = queues.normal.pop_front() {
                self.normal_space.add_permits(1);
                return Some(OutboundMessage {
                    payload,
                    priority: Priority::Normal,
                });
            }
            // permit of a flushed message
        }
    }

    /// Discard pending normal priority messages
    ///
    /// Returns how many were dropped. High priority messages stay queued.
    pub fn flush_normal(&self) -> usize {
        let dropped = {
            let mut queues = self.queues.lock();
            let dropped = queues.normal.len();
            queues.normal.clear();
            dropped
        };
        if dropped > 0 && !self.normal_space.is_closed() {
            self.normal_space.add_permits(dropped);
        }
        dropped
    }

    /// Close the queue and discard anything pending
    pub fn close(&self) {
        {
            let mut queues = self.queues.lock();
            queues.closed = true;
            queues.high.clear();
            queues.normal.clear();
        }
        self.available.close();
        self.normal_space.close();
    }

    /// Check if the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.queues.lock().closed
    }

    /// Messages waiting in the high queue
    pub fn high_len(&self) -> usize {
        self.queues.lock().high.len()
    }

    /// Messages waiting in the normal queue
    pub fn normal_len(&self) -> usize {
        self.queues.lock().normal.len()
    }

    /// Total messages waiting
    pub fn len(&self) -> usize {
        let queues = self.queues.lock();
        queues.high.len() + queues.normal.len()
    }

    /// Check if nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity of the normal queue
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
