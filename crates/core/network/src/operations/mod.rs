use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    hash::Hasher,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use futures::future::BoxFuture;
use purchases_coalesced::{CacheStatus, CallbackCache, PendingCallback, ResultHandler};
use purchases_result::{create_error, Result};
use serde_json::Value;

use crate::{
    http::{AuthHeaders, HttpRequest, HttpResponse},
    identifier::escape_identifier,
    lane::RequestLane,
};

mod create_alias;
mod get_subscriber_data;
mod post_receipt_data;
mod post_subscriber_attributes;

pub use create_alias::{CreateAlias, CreateAliasOperation};
pub use get_subscriber_data::{GetSubscriberData, GetSubscriberDataOperation};
pub use post_receipt_data::{PostReceiptData, PostReceiptDataOperation};
pub use post_subscriber_attributes::{PostSubscriberAttributes, PostSubscriberAttributesOperation};

/// Completion for an operation producing `T`
pub type Completion<T> = ResultHandler<Result<T>>;

/// Network work left over once an operation has issued its request
pub type InFlight = BoxFuture<'static, ()>;

/// Shared cancellation flag of an operation
#[derive(Clone, Debug, Default)]
pub struct OperationHandle {
    cancelled: Arc<AtomicBool>,
}

impl OperationHandle {
    /// Prevent the operation from starting, has no effect once it has run
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cancellable unit of work run once by an [`OperationQueue`](crate::OperationQueue)
pub trait Operation: Send + 'static {
    fn handle(&self) -> &OperationHandle;

    fn cancel(&self) {
        self.handle().cancel()
    }

    fn is_cancelled(&self) -> bool {
        self.handle().is_cancelled()
    }

    /// Do the synchronous part of the work.
    ///
    /// Returns the outstanding network request, if one was issued. A
    /// cancelled operation returns `None` without side effects.
    fn run(self: Box<Self>) -> Option<InFlight>;
}

/// Immutable per-call configuration captured by an operation
#[derive(Clone)]
pub struct UserSpecificConfiguration {
    lane: RequestLane,
    auth_headers: Arc<AuthHeaders>,
    app_user_id: String,
}

impl UserSpecificConfiguration {
    pub fn new(
        lane: RequestLane,
        auth_headers: Arc<AuthHeaders>,
        app_user_id: impl Into<String>,
    ) -> Self {
        Self {
            lane,
            auth_headers,
            app_user_id: app_user_id.into(),
        }
    }

    pub fn lane(&self) -> &RequestLane {
        &self.lane
    }

    pub fn auth_headers(&self) -> &AuthHeaders {
        &self.auth_headers
    }

    pub fn app_user_id(&self) -> &str {
        &self.app_user_id
    }
}

impl fmt::Debug for UserSpecificConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSpecificConfiguration")
            .field("app_user_id", &self.app_user_id)
            .field("auth_headers", &self.auth_headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// App user id as supplied and as escaped for use in a path
#[derive(Clone, Copy, Debug)]
pub struct AppUserId<'a> {
    pub id: &'a str,
    pub escaped: &'a str,
}

/// What a concrete operation sends and how it reads the answer
pub trait RequestAction: Send + 'static {
    type Value: Clone + Send + 'static;

    /// Requests with equal keys share one network call
    fn cache_key(&self, user: AppUserId<'_>) -> String;

    fn request(&self, user: AppUserId<'_>) -> HttpRequest;

    /// Called once per network call, the result goes to every waiter
    fn decode(&self, response: &HttpResponse) -> Result<Self::Value>;
}

/// Stable digest of a request body, for keys of requests that carry one
pub(crate) fn body_digest(body: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(body.to_string().as_bytes());
    hasher.finish()
}

/// Operation coalescing its request through a [`CallbackCache`]
pub struct NetworkOperation<A: RequestAction> {
    configuration: UserSpecificConfiguration,
    action: A,
    cache: CallbackCache<Result<A::Value>>,
    completion: Option<Completion<A::Value>>,
    handle: OperationHandle,
}

impl<A: RequestAction> NetworkOperation<A> {
    pub fn new(
        configuration: UserSpecificConfiguration,
        action: A,
        completion: Option<Completion<A::Value>>,
        cache: CallbackCache<Result<A::Value>>,
    ) -> Self {
        Self {
            configuration,
            action,
            cache,
            completion,
            handle: OperationHandle::default(),
        }
    }
}

impl<A: RequestAction> Operation for NetworkOperation<A> {
    fn handle(&self) -> &OperationHandle {
        &self.handle
    }

    fn run(self: Box<Self>) -> Option<InFlight> {
        if self.is_cancelled() {
            debug!(
                "Skipping cancelled operation for {}",
                self.configuration.app_user_id()
            );
            return None;
        }

        let NetworkOperation {
            configuration,
            action,
            cache,
            completion,
            ..
        } = *self;

        let escaped = match escape_identifier(configuration.app_user_id()) {
            Ok(escaped) => escaped,
            Err(error) => {
                warn!(
                    "Not sending request for invalid app user id {:?}",
                    configuration.app_user_id()
                );

                if let Some(completion) = completion {
                    cache
                        .callback_queue()
                        .dispatch(move || completion(Err(error)));
                }

                return None;
            }
        };

        let user = AppUserId {
            id: configuration.app_user_id().trim(),
            escaped: &escaped,
        };

        let key = action.cache_key(user);
        if cache.add(PendingCallback::new(key.clone(), completion)) == CacheStatus::AddedToExisting {
            return None;
        }

        let mut request = action.request(user);
        request.headers.extend(
            configuration
                .auth_headers()
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );

        // Queued on the lane before returning, so requests go out in run order
        let response = configuration.lane().submit(request);
        let cycle = Cycle {
            cache,
            key: Some(key),
        };

        Some(Box::pin(async move {
            let response = response.await;
            cycle.complete(action.decode(&response));
        }))
    }
}

/// Open in-flight cycle, closed exactly once even if the request is dropped
struct Cycle<V: Clone + Send + 'static> {
    cache: CallbackCache<Result<V>>,
    key: Option<String>,
}

impl<V: Clone + Send + 'static> Cycle<V> {
    fn complete(mut self, outcome: Result<V>) {
        if let Some(key) = self.key.take() {
            self.cache.deliver(&key, outcome);
        }
    }
}

impl<V: Clone + Send + 'static> Drop for Cycle<V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            warn!("Request for {key} was dropped before it completed");
            self.cache.deliver(&key, Err(create_error!(InternalError)));
        }
    }
}
