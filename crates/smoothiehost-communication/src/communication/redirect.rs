//! Inbound line redirection
//!
//! A single slot that diverts inbound lines away from the normal routing,
//! used by request/response exchanges such as SD-card upload and file
//! listing. Setting a new target replaces the old one; the last write
//! wins. An exclusive target also stops the status poller from sending
//! queries for as long as it is installed.

use smoothiehost_core::{thread_safe_none, DataCallback, ThreadSafeOption};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Which lines a redirect receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectScope {
    /// Only lines that would have been console text
    LogOnly,
    /// Every line, before classification
    All,
}

/// Redirect target installed in the slot
#[derive(Clone)]
pub struct RedirectTarget {
    scope: RedirectScope,
    exclusive: bool,
    callback: DataCallback<String>,
}

impl std::fmt::Debug for RedirectTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectTarget")
            .field("scope", &self.scope)
            .field("exclusive", &self.exclusive)
            .finish_non_exhaustive()
    }
}

impl RedirectTarget {
    /// Receive lines that would otherwise be logged
    pub fn log_only(callback: impl Fn(String) + Send + Sync + 'static) -> Self {
        Self {
            scope: RedirectScope::LogOnly,
            exclusive: false,
            callback: Arc::new(callback),
        }
    }

    /// Receive every inbound line
    pub fn all(callback: impl Fn(String) + Send + Sync + 'static) -> Self {
        Self {
            scope: RedirectScope::All,
            exclusive: false,
            callback: Arc::new(callback),
        }
    }

    /// Suspend status polling while installed
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Scope of the target
    pub fn scope(&self) -> RedirectScope {
        self.scope
    }

    /// Whether polling is suspended
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Hand a line to the target
    pub fn deliver(&self, line: String) {
        (self.callback)(line);
    }
}

#[derive(Debug)]
struct Installed {
    generation: u64,
    target: RedirectTarget,
}

/// The single redirect slot shared by the router, poller and callers
#[derive(Debug, Clone)]
pub struct RedirectSlot {
    slot: ThreadSafeOption<Installed>,
    generation: Arc<AtomicU64>,
}

impl Default for RedirectSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl RedirectSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self {
            slot: thread_safe_none(),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Install or clear a target, returning the one it replaced
    pub fn set(&self, target: Option<RedirectTarget>) -> Option<RedirectTarget> {
        self.replace(target).1
    }

    fn replace(&self, target: Option<RedirectTarget>) -> (u64, Option<RedirectTarget>) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let installed = target.map(|target| Installed { generation, target });
        let previous = std::mem::replace(&mut *self.slot.lock(), installed);
        (generation, previous.map(|p| p.target))
    }

    /// Install a target that is cleared when the guard drops
    ///
    /// The guard only clears its own target; if something else was
    /// installed in the meantime it is left alone.
    pub fn install(&self, target: RedirectTarget) -> RedirectGuard {
        let (generation, previous) = self.replace(Some(target));
        if previous.is_some() {
            tracing::debug!("Replacing active redirect");
        }
        RedirectGuard {
            slot: self.clone(),
            generation,
        }
    }

    /// Clear the slot
    pub fn clear(&self) -> Option<RedirectTarget> {
        self.set(None)
    }

    /// The installed target, if any
    ///
    /// The target is cloned out so the callback runs without the slot
    /// locked.
    pub fn current(&self) -> Option<RedirectTarget> {
        self.slot.lock().as_ref().map(|i| i.target.clone())
    }

    /// Check if a target is installed
    pub fn is_active(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Check if an exclusive target is installed
    pub fn is_exclusive(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|i| i.target.is_exclusive())
    }
}

/// Clears its redirect on drop
#[derive(Debug)]
pub struct RedirectGuard {
    slot: RedirectSlot,
    generation: u64,
}

impl Drop for RedirectGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.slot.lock();
        if slot.as_ref().is_some_and(|i| i.generation == self.generation) {
            *slot = None;
        }
    }
}
