//! Cross-thread handoff primitives used by the loader thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Cooperative cancellation flag shared between the loader thread and its owner.
///
/// Streaming passes poll [`is_cancelled`](Self::is_cancelled) between tiles and
/// objects. Cancelling never rolls back work that already finished.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Creates a flag in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the running pass.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Clears a previous cancellation before starting a new pass.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// A value that is replaced wholesale and read as an immutable snapshot.
///
/// Readers get an `Arc` to either the previous or the new value, never a
/// partially updated one. Writers build a complete new value off to the side
/// and [`publish`](Self::publish) it.
#[derive(Debug, Default)]
pub struct Published<T> {
    current: RwLock<Arc<T>>,
}

impl<T> Published<T> {
    /// Creates a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    /// Returns the current snapshot.
    pub fn load(&self) -> Arc<T> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replaces the current snapshot.
    pub fn publish(&self, value: T) {
        self.publish_arc(Arc::new(value));
    }

    /// Replaces the current snapshot with an already shared value.
    pub fn publish_arc(&self, value: Arc<T>) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
        other.reset();
        assert!(!flag.is_cancelled());
    }

    #[test]
    fn test_published_snapshot_is_stable() {
        let cell = Published::new(vec![1, 2, 3]);
        let before = cell.load();
        cell.publish(vec![4]);
        assert_eq!(*before, vec![1, 2, 3]);
        assert_eq!(*cell.load(), vec![4]);
    }

    #[test]
    fn test_published_across_threads() {
        let cell = Arc::new(Published::new(0u32));
        let writer = {
            let cell = Arc::clone(&cell);
            std::thread::spawn(move || {
                for i in 1..=100 {
                    cell.publish(i);
                }
            })
        };
        writer.join().unwrap();
        assert_eq!(*cell.load(), 100);
    }
}
