use std::{fmt, sync::Arc};

use futures::{
    future::BoxFuture,
    stream::{FuturesUnordered, StreamExt},
};
use purchases_result::create_error;
use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
};

use crate::http::{HttpClient, HttpRequest, HttpResponse};

struct Job {
    request: HttpRequest,
    reply: oneshot::Sender<HttpResponse>,
}

/// Hands requests to an [`HttpClient`] in the order they were submitted.
///
/// Submission is synchronous, the lane's task starts each request before
/// the ones submitted after it. Requests may still overlap on the wire,
/// serial ones are ordered by the client itself.
#[derive(Clone)]
pub struct RequestLane {
    client: Arc<dyn HttpClient>,
    sender: Option<mpsc::UnboundedSender<Job>>,
}

impl RequestLane {
    /// Start the lane on the current tokio runtime.
    ///
    /// Outside of a runtime requests go to the client directly, unordered.
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No tokio runtime available, requests will not be ordered");
                return Self {
                    client,
                    sender: None,
                };
            }
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        handle.spawn(drive(client.clone(), receiver));

        Self {
            client,
            sender: Some(sender),
        }
    }

    /// Take a place in line for `request`, resolving to its response
    pub fn submit(&self, request: HttpRequest) -> BoxFuture<'static, HttpResponse> {
        let (reply, response) = oneshot::channel();
        let mut job = Job { request, reply };

        if let Some(sender) = &self.sender {
            match sender.send(job) {
                Ok(()) => {
                    return Box::pin(async move {
                        response.await.unwrap_or_else(|_| {
                            warn!("Request lane stopped before answering");
                            HttpResponse::failed(create_error!(InternalError))
                        })
                    })
                }
                Err(mpsc::error::SendError(rejected)) => {
                    warn!("Request lane stopped, sending directly");
                    job = rejected;
                }
            }
        }

        let client = self.client.clone();
        Box::pin(async move { client.perform_request(job.request).await })
    }
}

impl fmt::Debug for RequestLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLane")
            .field("ordered", &self.sender.is_some())
            .finish()
    }
}

async fn drive(client: Arc<dyn HttpClient>, mut jobs: mpsc::UnboundedReceiver<Job>) {
    let mut running = FuturesUnordered::new();

    // New requests are polled for the first time in the order they were pushed
    loop {
        tokio::select! {
            biased;
            job = jobs.recv() => match job {
                Some(job) => running.push(hand_off(client.clone(), job)),
                None => break,
            },
            Some(()) = running.next(), if !running.is_empty() => {}
        }
    }

    while running.next().await.is_some() {}
    debug!("Request lane closed");
}

async fn hand_off(client: Arc<dyn HttpClient>, job: Job) {
    if job.reply.is_closed() {
        debug!("Skipping {} nobody is waiting for", job.request.path);
        return;
    }

    let response = client.perform_request(job.request).await;
    job.reply.send(response).ok();
}
