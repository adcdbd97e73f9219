use std::sync::Arc;

use purchases_coalesced::{CallbackCache, CallbackQueue};
use purchases_config::Settings;
use purchases_result::{create_error, Result};
use tokio::sync::oneshot;

use crate::{
    http::{AuthHeaders, HttpClient},
    lane::RequestLane,
    models::{CustomerInfo, PostData, SubscriberAttributeDict},
    operations::{
        Completion, CreateAlias, CreateAliasOperation, GetSubscriberData,
        GetSubscriberDataOperation, OperationHandle, PostReceiptData, PostReceiptDataOperation,
        PostSubscriberAttributes, PostSubscriberAttributesOperation, UserSpecificConfiguration,
    },
    queue::{OperationQueue, OperationQueueConfig},
};

/// Entry points for subscriber related requests.
///
/// Every call becomes an operation on the shared queue. Calls of the same
/// kind for the same subject are coalesced into one request while it is in
/// flight.
pub struct SubscribersApi {
    lane: RequestLane,
    auth_headers: Arc<AuthHeaders>,
    operation_queue: OperationQueue,
    alias_callback_cache: CallbackCache<Result<()>>,
    customer_info_callback_cache: CallbackCache<Result<CustomerInfo>>,
    attributes_callback_cache: CallbackCache<Result<()>>,
}

impl SubscribersApi {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        auth_headers: AuthHeaders,
        callback_queue: CallbackQueue,
        operation_queue: OperationQueue,
    ) -> Self {
        Self {
            lane: RequestLane::new(http_client),
            auth_headers: Arc::new(auth_headers),
            operation_queue,
            alias_callback_cache: CallbackCache::new(callback_queue.clone()),
            customer_info_callback_cache: CallbackCache::new(callback_queue.clone()),
            attributes_callback_cache: CallbackCache::new(callback_queue),
        }
    }

    /// Build the queue from configuration and deliver callbacks on a
    /// dedicated task. Must be called within a tokio runtime.
    pub fn from_settings(
        http_client: Arc<dyn HttpClient>,
        auth_headers: AuthHeaders,
        settings: &Settings,
    ) -> Self {
        Self::new(
            http_client,
            auth_headers,
            CallbackQueue::spawn(),
            OperationQueue::new(OperationQueueConfig::from(&settings.queue)),
        )
    }

    pub fn operation_queue(&self) -> &OperationQueue {
        &self.operation_queue
    }

    fn configuration(&self, app_user_id: &str) -> UserSpecificConfiguration {
        UserSpecificConfiguration::new(
            self.lane.clone(),
            self.auth_headers.clone(),
            app_user_id,
        )
    }

    pub fn create_alias(
        &self,
        app_user_id: &str,
        new_app_user_id: &str,
        completion: Option<Completion<()>>,
    ) -> Result<OperationHandle> {
        self.operation_queue.add_operation(CreateAliasOperation::new(
            self.configuration(app_user_id),
            CreateAlias::new(new_app_user_id),
            completion,
            self.alias_callback_cache.clone(),
        ))
    }

    pub fn get_subscriber_data<F>(&self, app_user_id: &str, completion: F) -> Result<OperationHandle>
    where
        F: FnOnce(Result<CustomerInfo>) + Send + 'static,
    {
        self.operation_queue
            .add_operation(GetSubscriberDataOperation::new(
                self.configuration(app_user_id),
                GetSubscriberData,
                Some(Box::new(completion)),
                self.customer_info_callback_cache.clone(),
            ))
    }

    pub fn post_receipt_data<F>(
        &self,
        app_user_id: &str,
        post_data: PostData,
        completion: F,
    ) -> Result<OperationHandle>
    where
        F: FnOnce(Result<CustomerInfo>) + Send + 'static,
    {
        self.operation_queue.add_operation(PostReceiptDataOperation::new(
            self.configuration(app_user_id),
            PostReceiptData::new(post_data),
            Some(Box::new(completion)),
            self.customer_info_callback_cache.clone(),
        ))
    }

    pub fn post_subscriber_attributes(
        &self,
        app_user_id: &str,
        attributes: SubscriberAttributeDict,
        completion: Option<Completion<()>>,
    ) -> Result<OperationHandle> {
        self.operation_queue
            .add_operation(PostSubscriberAttributesOperation::new(
                self.configuration(app_user_id),
                PostSubscriberAttributes::new(attributes),
                completion,
                self.attributes_callback_cache.clone(),
            ))
    }

    /// Fetch customer info, waiting for the result
    pub async fn fetch_customer_info(&self, app_user_id: &str) -> Result<CustomerInfo> {
        let (tx, rx) = oneshot::channel();
        self.get_subscriber_data(app_user_id, move |result| {
            tx.send(result).ok();
        })?;

        receive(rx).await
    }

    /// Create an alias, waiting for the result
    pub async fn alias(&self, app_user_id: &str, new_app_user_id: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.create_alias(
            app_user_id,
            new_app_user_id,
            Some(Box::new(move |result: Result<()>| {
                tx.send(result).ok();
            })),
        )?;

        receive(rx).await
    }

    /// Post a receipt, waiting for the updated customer info
    pub async fn post_receipt(&self, app_user_id: &str, post_data: PostData) -> Result<CustomerInfo> {
        let (tx, rx) = oneshot::channel();
        self.post_receipt_data(app_user_id, post_data, move |result| {
            tx.send(result).ok();
        })?;

        receive(rx).await
    }

    /// Post subscriber attributes, waiting for the result
    pub async fn post_attributes(
        &self,
        app_user_id: &str,
        attributes: SubscriberAttributeDict,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.post_subscriber_attributes(
            app_user_id,
            attributes,
            Some(Box::new(move |result: Result<()>| {
                tx.send(result).ok();
            })),
        )?;

        receive(rx).await
    }
}

/// The sender is dropped without a result only if the operation never ran
async fn receive<T>(rx: oneshot::Receiver<Result<T>>) -> Result<T> {
    rx.await.map_err(|_| create_error!(QueueClosed))?
}
