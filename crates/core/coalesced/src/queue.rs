use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Execution context callbacks are delivered on.
///
/// A spawned queue runs jobs one after another on a dedicated task, in the
/// order they were dispatched. An inline queue runs them on the caller.
#[derive(Clone, Debug, Default)]
pub struct CallbackQueue {
    sender: Option<mpsc::UnboundedSender<Job>>,
}

impl CallbackQueue {
    /// Run callbacks on whichever thread dispatches them
    pub fn inline() -> Self {
        Self { sender: None }
    }

    /// Start a serial delivery task on the current tokio runtime.
    ///
    /// Outside of a runtime this falls back to inline delivery.
    pub fn spawn() -> Self {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No tokio runtime available, delivering callbacks inline");
                return Self::inline();
            }
        };

        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        handle.spawn(async move {
            while let Some(job) = receiver.recv().await {
                job();
            }

            debug!("Callback queue closed");
        });

        Self {
            sender: Some(sender),
        }
    }

    pub fn is_inline(&self) -> bool {
        self.sender.is_none()
    }

    /// Schedule `job` to run after every job dispatched before it
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.sender {
            Some(sender) => {
                if let Err(mpsc::error::SendError(job)) = sender.send(Box::new(job)) {
                    // Delivery task is gone, callbacks still have to run
                    warn!("Callback queue stopped, delivering inline");
                    job();
                }
            }
            None => job(),
        }
    }

    /// Wait until every job dispatched so far has run
    pub async fn flush(&self) {
        if self.sender.is_none() {
            return;
        }

        let (tx, rx) = oneshot::channel();
        self.dispatch(move || {
            tx.send(()).ok();
        });

        rx.await.ok();
    }
}
