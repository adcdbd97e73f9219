use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use deadqueue::limited::Queue;
use purchases_config::InFlightPolicy;
use purchases_result::{create_error, Result};
use tokio::{sync::Semaphore, task::JoinHandle};

use crate::operations::{Operation, OperationHandle};

#[derive(Clone, PartialEq, Eq, Debug)]
/// Config values for [`OperationQueue`].
pub struct OperationQueueConfig {
    /// How many operations may hold a slot at once, 1 runs them serially
    pub max_concurrent: usize,
    /// Max amount of operations waiting to start
    pub max_queue: usize,
    /// Whether an issued request keeps holding its slot
    pub in_flight: InFlightPolicy,
}

impl Default for OperationQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            max_queue: 10_000,
            in_flight: InFlightPolicy::Detached,
        }
    }
}

impl From<&purchases_config::Queue> for OperationQueueConfig {
    fn from(queue: &purchases_config::Queue) -> Self {
        Self {
            max_concurrent: queue.max_concurrent,
            max_queue: queue.max_queue,
            in_flight: queue.in_flight,
        }
    }
}

struct Queued {
    id: u64,
    operation: Box<dyn Operation>,
}

type Waiting = Arc<Mutex<HashMap<u64, OperationHandle>>>;

/// Runs operations in submission order.
///
/// Operations are started one at a time by a dispatcher task. With
/// [`InFlightPolicy::Detached`] the request an operation issues runs in the
/// background, so later operations can start (and coalesce onto it) while it
/// is outstanding. With [`InFlightPolicy::OccupiesSlot`] at most
/// `max_concurrent` requests are outstanding at once.
pub struct OperationQueue {
    config: OperationQueueConfig,
    queue: Arc<Queue<Queued>>,
    waiting: Waiting,
    next_id: AtomicU64,
    dispatcher: JoinHandle<()>,
}

impl OperationQueue {
    /// Start the dispatcher on the current tokio runtime.
    ///
    /// Limits below 1 are raised to 1.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new(config: OperationQueueConfig) -> Self {
        let config = OperationQueueConfig {
            max_concurrent: config.max_concurrent.max(1),
            max_queue: config.max_queue.max(1),
            ..config
        };

        let queue = Arc::new(Queue::new(config.max_queue));
        let waiting = Waiting::default();

        let dispatcher = tokio::spawn(dispatch(
            queue.clone(),
            waiting.clone(),
            Arc::new(Semaphore::new(config.max_concurrent)),
            config.in_flight,
        ));

        Self {
            config,
            queue,
            waiting,
            next_id: AtomicU64::new(0),
            dispatcher,
        }
    }

    pub fn config(&self) -> &OperationQueueConfig {
        &self.config
    }

    /// Submit an operation, returning a handle that can cancel it
    pub fn add_operation<O: Operation>(&self, operation: O) -> Result<OperationHandle> {
        self.add_boxed(Box::new(operation))
    }

    pub fn add_boxed(&self, operation: Box<dyn Operation>) -> Result<OperationHandle> {
        if self.dispatcher.is_finished() {
            return Err(create_error!(QueueClosed));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = operation.handle().clone();

        // Registered first so the dispatcher never sees an unknown id
        self.waiting().insert(id, handle.clone());

        if self.queue.try_push(Queued { id, operation }).is_err() {
            self.waiting().remove(&id);
            warn!(
                "Operation queue is full ({} slots), dropping operation",
                self.queue.capacity()
            );

            return Err(create_error!(QueueFull {
                max: self.queue.capacity()
            }));
        }

        debug!(
            "Queue is using {} slots from {}.",
            self.queue.len(),
            self.queue.capacity()
        );

        Ok(handle)
    }

    fn waiting(&self) -> std::sync::MutexGuard<'_, HashMap<u64, OperationHandle>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of operations submitted but not yet started
    pub fn operation_count(&self) -> usize {
        self.waiting().len()
    }

    /// Cancel every operation that has not started yet
    pub fn cancel_all_operations(&self) {
        let waiting = self.waiting();
        info!("Cancelling {} queued operation(s)", waiting.len());

        for handle in waiting.values() {
            handle.cancel();
        }
    }
}

impl Drop for OperationQueue {
    fn drop(&mut self) {
        // Requests already issued keep running and still deliver
        self.dispatcher.abort();
    }
}

async fn dispatch(
    queue: Arc<Queue<Queued>>,
    waiting: Waiting,
    slots: Arc<Semaphore>,
    in_flight: InFlightPolicy,
) {
    loop {
        let Queued { id, operation } = queue.pop().await;

        let Ok(permit) = slots.clone().acquire_owned().await else {
            break;
        };

        waiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        let Some(request) = operation.run() else {
            continue;
        };

        match in_flight {
            InFlightPolicy::Detached => {
                drop(permit);
                tokio::spawn(request);
            }
            InFlightPolicy::OccupiesSlot => {
                tokio::spawn(async move {
                    request.await;
                    drop(permit);
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use purchases_config::InFlightPolicy;
    use purchases_result::ErrorType;
    use tokio::sync::Semaphore;

    use super::{OperationQueue, OperationQueueConfig};
    use crate::{
        operations::{InFlight, Operation, OperationHandle},
        test::wait_until,
    };

    /// Records when it starts and, optionally, issues a request that
    /// finishes once `gate` hands out a permit
    struct Step {
        name: usize,
        started: Arc<Mutex<Vec<usize>>>,
        finished: Arc<AtomicUsize>,
        gate: Option<Arc<Semaphore>>,
        handle: OperationHandle,
    }

    impl Operation for Step {
        fn handle(&self) -> &OperationHandle {
            &self.handle
        }

        fn run(self: Box<Self>) -> Option<InFlight> {
            if self.is_cancelled() {
                return None;
            }

            self.started.lock().unwrap().push(self.name);

            let gate = self.gate.clone()?;
            let finished = self.finished.clone();
            Some(Box::pin(async move {
                gate.acquire().await.unwrap().forget();
                finished.fetch_add(1, Ordering::SeqCst);
            }))
        }
    }

    struct Harness {
        started: Arc<Mutex<Vec<usize>>>,
        finished: Arc<AtomicUsize>,
        gate: Arc<Semaphore>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                started: Default::default(),
                finished: Default::default(),
                gate: Arc::new(Semaphore::new(0)),
            }
        }

        fn step(&self, name: usize, issues_request: bool) -> Step {
            Step {
                name,
                started: self.started.clone(),
                finished: self.finished.clone(),
                gate: issues_request.then(|| self.gate.clone()),
                handle: OperationHandle::default(),
            }
        }

        fn started(&self) -> Vec<usize> {
            self.started.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn starts_in_submission_order() {
        let harness = Harness::new();
        let queue = OperationQueue::new(OperationQueueConfig::default());

        for name in 0..20 {
            queue.add_operation(harness.step(name, false)).unwrap();
        }

        wait_until(|| harness.started().len() == 20).await;
        assert_eq!(harness.started(), (0..20).collect::<Vec<_>>());
        assert_eq!(queue.operation_count(), 0);
    }

    #[tokio::test]
    async fn detached_requests_do_not_block_later_operations() {
        let harness = Harness::new();
        let queue = OperationQueue::new(OperationQueueConfig::default());

        queue.add_operation(harness.step(0, true)).unwrap();
        queue.add_operation(harness.step(1, true)).unwrap();

        wait_until(|| harness.started().len() == 2).await;
        assert_eq!(harness.finished.load(Ordering::SeqCst), 0);

        harness.gate.add_permits(2);
        wait_until(|| harness.finished.load(Ordering::SeqCst) == 2).await;
    }

    #[tokio::test]
    async fn occupied_slot_holds_back_the_next_operation() {
        let harness = Harness::new();
        let queue = OperationQueue::new(OperationQueueConfig {
            in_flight: InFlightPolicy::OccupiesSlot,
            ..Default::default()
        });

        queue.add_operation(harness.step(0, true)).unwrap();
        queue.add_operation(harness.step(1, false)).unwrap();

        wait_until(|| harness.started() == vec![0]).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(harness.started(), vec![0]);

        harness.gate.add_permits(1);
        wait_until(|| harness.started() == vec![0, 1]).await;
    }

    #[tokio::test]
    async fn cancelled_operations_never_start() {
        let harness = Harness::new();
        let queue = OperationQueue::new(OperationQueueConfig::default());

        let handle = queue.add_operation(harness.step(0, false)).unwrap();
        handle.cancel();
        queue.add_operation(harness.step(1, false)).unwrap();

        wait_until(|| queue.operation_count() == 0).await;
        wait_until(|| harness.started() == vec![1]).await;
    }

    #[tokio::test]
    async fn cancel_all_only_affects_waiting_operations() {
        let harness = Harness::new();
        let queue = OperationQueue::new(OperationQueueConfig {
            in_flight: InFlightPolicy::OccupiesSlot,
            ..Default::default()
        });

        queue.add_operation(harness.step(0, true)).unwrap();
        wait_until(|| harness.started() == vec![0]).await;

        queue.add_operation(harness.step(1, false)).unwrap();
        queue.add_operation(harness.step(2, false)).unwrap();
        queue.cancel_all_operations();

        harness.gate.add_permits(1);
        wait_until(|| harness.finished.load(Ordering::SeqCst) == 1).await;
        wait_until(|| queue.operation_count() == 0).await;

        queue.add_operation(harness.step(3, false)).unwrap();
        wait_until(|| harness.started() == vec![0, 3]).await;
    }

    #[tokio::test]
    async fn rejects_operations_beyond_max_queue() {
        let harness = Harness::new();
        let queue = OperationQueue::new(OperationQueueConfig {
            max_queue: 1,
            in_flight: InFlightPolicy::OccupiesSlot,
            ..Default::default()
        });

        queue.add_operation(harness.step(0, true)).unwrap();
        wait_until(|| harness.started() == vec![0]).await;

        // One waits for the slot in the dispatcher, one fills the buffer
        queue.add_operation(harness.step(1, false)).unwrap();
        wait_until(|| queue.queue.len() == 0).await;
        queue.add_operation(harness.step(2, false)).unwrap();

        let error = queue.add_operation(harness.step(3, false)).unwrap_err();
        assert_eq!(error.error_type, ErrorType::QueueFull { max: 1 });

        harness.gate.add_permits(1);
        wait_until(|| harness.started() == vec![0, 1, 2]).await;
    }

    #[tokio::test]
    async fn zero_limits_are_raised_to_one() {
        let harness = Harness::new();
        let queue = OperationQueue::new(OperationQueueConfig {
            max_concurrent: 0,
            max_queue: 0,
            ..Default::default()
        });

        assert_eq!(queue.config().max_concurrent, 1);
        assert_eq!(queue.config().max_queue, 1);

        queue.add_operation(harness.step(0, false)).unwrap();
        wait_until(|| harness.started() == vec![0]).await;
    }

    #[test]
    fn settings_convert_to_queue_config() {
        let settings =
            purchases_config::parse("[queue]\nmax_queue = 0\nin_flight = \"occupies_slot\"")
                .unwrap();
        let config = OperationQueueConfig::from(&settings.queue);

        assert_eq!(config.max_queue, 0);
        assert_eq!(config.in_flight, InFlightPolicy::OccupiesSlot);
    }
}
