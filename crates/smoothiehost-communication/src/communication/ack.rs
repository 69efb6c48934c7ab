//! Acknowledgment tracking
//!
//! Every `ok` from the controller bumps a counter published on a watch
//! channel. Waiters take a [`AckMark`] *before* sending and then wait for
//! the counter to move past it, so an `ok` that arrives before the waiter
//! starts waiting is never lost. Alarms that must not leave a sender
//! hanging (`!!`, `error:Alarm lock`) bump a separate release counter.

use std::time::Duration;
use tokio::sync::watch;

/// Snapshot of the ack and release counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckMark {
    /// Acknowledgments received
    pub acks: u64,
    /// Forced releases received
    pub releases: u64,
}

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// An `ok` arrived
    Acked,
    /// An alarm released the wait
    Released,
    /// The wait timed out
    TimedOut,
}

/// Shared ack counter
#[derive(Debug)]
pub struct AckTracker {
    tx: watch::Sender<AckMark>,
}

impl Default for AckTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AckTracker {
    /// Create a tracker with both counters at zero
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AckMark::default());
        Self { tx }
    }

    /// Record an `ok`
    pub fn ack(&self) {
        self.tx.send_modify(|m| m.acks += 1);
    }

    /// Release any waiter without an `ok`
    pub fn release(&self) {
        self.tx.send_modify(|m| m.releases += 1);
    }

    /// Current counters
    pub fn mark(&self) -> AckMark {
        *self.tx.borrow()
    }

    /// Acknowledgments received so far
    pub fn count(&self) -> u64 {
        self.tx.borrow().acks
    }

    /// Wait for an ack or release after `mark`
    pub async fn wait_after(&self, mark: AckMark, timeout: Option<Duration>) -> AckOutcome {
        let mut rx = self.tx.subscribe();
        let wait = async {
            match rx
                .wait_for(|m| m.acks > mark.acks || m.releases > mark.releases)
                .await
            {
                Ok(m) if m.acks > mark.acks => AckOutcome::Acked,
                _ => AckOutcome::Released,
            }
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .unwrap_or(AckOutcome::TimedOut),
            None => wait.await,
        }
    }

    /// Wait until at least `target` acks have been received in total
    ///
    /// A release also ends the wait. Used by fast streaming at end of file.
    pub async fn wait_for_count(
        &self,
        target: u64,
        since: AckMark,
        timeout: Option<Duration>,
    ) -> AckOutcome {
        let mut rx = self.tx.subscribe();
        let wait = async {
            match rx
                .wait_for(|m| m.acks >= target || m.releases > since.releases)
                .await
            {
                Ok(m) if m.acks >= target => AckOutcome::Acked,
                _ => AckOutcome::Released,
            }
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .unwrap_or(AckOutcome::TimedOut),
            None => wait.await,
        }
    }
}
