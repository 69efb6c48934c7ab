//! Shared-state aliases.
//!
//! State touched from both the application thread and the `smoothie-link`
//! thread lives behind `parking_lot` locks, which do not poison.

use parking_lot::Mutex;
use std::sync::Arc;

/// Mutex-protected value shared across threads
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// Single slot that is either empty or holds one value
pub type ThreadSafeOption<T> = Arc<Mutex<Option<T>>>;

/// Line sink installed by a collaborator.
///
/// Reference counted so the slot lock can be dropped before the call.
pub type DataCallback<T> = Arc<dyn Fn(T) + Send + Sync>;

#[inline]
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}

/// Empty `ThreadSafeOption`
#[inline]
pub fn thread_safe_none<T>() -> ThreadSafeOption<T> {
    Arc::new(Mutex::new(None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_take_empties() {
        let slot: ThreadSafeOption<String> = thread_safe_none();
        assert!(slot.lock().is_none());
        *slot.lock() = Some("connection".to_string());
        assert_eq!(slot.lock().take().as_deref(), Some("connection"));
        assert!(slot.lock().is_none());
    }

    #[test]
    fn test_callback_shares_state() {
        let seen = thread_safe(Vec::new());
        let sink = seen.clone();
        let callback: DataCallback<String> = Arc::new(move |s| sink.lock().push(s));
        callback("ok".to_string());
        callback("!!".to_string());
        assert_eq!(*seen.lock(), vec!["ok".to_string(), "!!".to_string()]);
    }
}
