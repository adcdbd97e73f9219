use std::fmt;

/// Completion invoked with the outcome of a coalesced request
pub type ResultHandler<R> = Box<dyn FnOnce(R) + Send + 'static>;

/// Interest in the result of the request identified by `key`.
///
/// A pending callback without a handler only takes part in deduplication:
/// it keeps the request in flight but nothing runs when it is drained.
pub struct PendingCallback<R> {
    key: String,
    callback: Option<ResultHandler<R>>,
}

impl<R> PendingCallback<R> {
    pub fn new(key: impl Into<String>, callback: Option<ResultHandler<R>>) -> Self {
        Self {
            key: key.into(),
            callback,
        }
    }

    /// Register interest in `key` and run `callback` with the result
    pub fn with_handler<F>(key: impl Into<String>, callback: F) -> Self
    where
        F: FnOnce(R) + Send + 'static,
    {
        Self::new(key, Some(Box::new(callback)))
    }

    /// Register interest in `key` without running anything on completion
    pub fn detached(key: impl Into<String>) -> Self {
        Self::new(key, None)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn has_handler(&self) -> bool {
        self.callback.is_some()
    }

    /// Hand the result to the handler, if there is one
    pub fn complete(self, value: R) {
        if let Some(callback) = self.callback {
            callback(value);
        }
    }
}

impl<R> fmt::Debug for PendingCallback<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCallback")
            .field("key", &self.key)
            .field("has_handler", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use crate::PendingCallback;

    #[test]
    fn complete_runs_handler_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let pending = PendingCallback::with_handler("key", move |value: usize| {
            counter.fetch_add(value, Ordering::SeqCst);
        });

        assert!(pending.has_handler());
        pending.complete(3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn detached_callback_is_skipped() {
        let pending: PendingCallback<()> = PendingCallback::detached("key");

        assert_eq!(pending.key(), "key");
        assert!(!pending.has_handler());
        pending.complete(());
    }
}
