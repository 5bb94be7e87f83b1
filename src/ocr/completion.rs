//! One-shot completion gate.

use std::sync::{Arc, Mutex};

use tracing::debug;

type Callback<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// Wraps a completion callback so it runs at most once.
///
/// Clones share the same slot. The first [`Completion::complete`] call takes
/// the callback and runs it; later calls are dropped.
pub struct Completion<T> {
    slot: Arc<Mutex<Option<Callback<T>>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Completion<T> {
    pub fn new(callback: impl FnOnce(T) + Send + 'static) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(Box::new(callback)))),
        }
    }

    /// Deliver `value`. Returns `false` if the gate already fired.
    pub fn complete(&self, value: T) -> bool {
        // Take the callback before running it so the lock is not held.
        let callback = match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match callback {
            Some(callback) => {
                callback(value);
                true
            }
            None => {
                debug!("Ignoring repeated completion");
                false
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        match self.slot.lock() {
            Ok(slot) => slot.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("completed", &self.is_completed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_fires_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let (c, s) = (calls.clone(), seen.clone());
        let completion = Completion::new(move |value: u32| {
            c.fetch_add(1, Ordering::SeqCst);
            s.lock().unwrap().push(value);
        });
        let other = completion.clone();

        assert!(!completion.is_completed());
        assert!(completion.complete(1));
        assert!(!other.complete(2));
        assert!(!completion.complete(3));

        assert!(other.is_completed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_reentrant_complete_is_ignored() {
        let slot: Arc<Mutex<Option<Completion<u32>>>> = Arc::new(Mutex::new(None));
        let inner = slot.clone();
        let completion = Completion::new(move |_value: u32| {
            if let Some(again) = inner.lock().unwrap().as_ref() {
                assert!(!again.complete(99));
            }
        });
        *slot.lock().unwrap() = Some(completion.clone());

        assert!(completion.complete(1));
    }
}
