use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{CallbackQueue, PendingCallback};

/// Outcome of registering a callback with a [`CallbackCache`]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum CacheStatus {
    /// No request was running for this key, the caller has to issue it
    FirstInFlight,
    /// A request is already running, the callback rides along with it
    AddedToExisting,
}

/// Keyed registry of callbacks waiting on in-flight requests.
///
/// Callers sharing a key are coalesced onto a single request: the first
/// [`add`](Self::add) for a key opens an in-flight cycle, every later one joins
/// it, and [`drain_and_remove`](Self::drain_and_remove) closes the cycle and
/// delivers to everyone who joined, in the order they joined.
///
/// Clones share the same registry.
pub struct CallbackCache<R> {
    entries: Arc<Mutex<HashMap<String, Vec<PendingCallback<R>>>>>,
    callback_queue: CallbackQueue,
}

impl<R> Clone for CallbackCache<R> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            callback_queue: self.callback_queue.clone(),
        }
    }
}

impl<R> fmt::Debug for CallbackCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackCache")
            .field("in_flight", &self.len())
            .field("callback_queue", &self.callback_queue)
            .finish()
    }
}

impl<R> CallbackCache<R> {
    pub fn new(callback_queue: CallbackQueue) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            callback_queue,
        }
    }

    /// Queue callbacks are delivered on
    pub fn callback_queue(&self) -> &CallbackQueue {
        &self.callback_queue
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Vec<PendingCallback<R>>>> {
        // Nothing runs user code while holding the lock, so a poisoned map
        // is still consistent
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `callback` under its key.
    ///
    /// Exactly one caller per in-flight cycle sees [`CacheStatus::FirstInFlight`].
    pub fn add(&self, callback: PendingCallback<R>) -> CacheStatus {
        let mut entries = self.entries();

        match entries.get_mut(callback.key()) {
            Some(waiting) => {
                debug!(
                    "Joining in-flight request for {}, {} already waiting",
                    callback.key(),
                    waiting.len()
                );

                waiting.push(callback);
                CacheStatus::AddedToExisting
            }
            None => {
                entries.insert(callback.key().to_string(), vec![callback]);
                CacheStatus::FirstInFlight
            }
        }
    }

    /// Whether a request for `key` is currently in flight
    pub fn in_flight(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    /// Number of keys with a request in flight
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: Send + 'static> CallbackCache<R> {
    /// Close the in-flight cycle for `key`.
    ///
    /// Every callback registered under `key` is taken out and handed to
    /// `action` on the callback queue, in registration order. The lock is
    /// released before any of them runs. Draining a key with no entry does
    /// nothing.
    pub fn drain_and_remove<F>(&self, key: &str, mut action: F)
    where
        F: FnMut(PendingCallback<R>) + Send + 'static,
    {
        let drained = self.entries().remove(key);

        let Some(callbacks) = drained else {
            debug!("Nothing waiting on {key}, ignoring drain");
            return;
        };

        debug!("Delivering to {} callback(s) for {key}", callbacks.len());

        self.callback_queue.dispatch(move || {
            for callback in callbacks {
                action(callback);
            }
        });
    }

    /// Close the in-flight cycle for `key`, handing every waiter a clone of `value`
    pub fn deliver(&self, key: &str, value: R)
    where
        R: Clone,
    {
        self.drain_and_remove(key, move |callback| callback.complete(value.clone()));
    }
}
