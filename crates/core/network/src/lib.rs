#[macro_use]
extern crate log;

mod api;
mod handlers;
mod http;
mod identifier;
mod lane;
mod models;
mod operations;
mod queue;


pub use api::SubscribersApi;
pub use handlers::{decode_customer_info, decode_post_response};
pub use http::{AuthHeaders, HttpClient, HttpMethod, HttpRequest, HttpResponse, ReqwestClient};
pub use identifier::escape_identifier;
pub use lane::RequestLane;
pub use models::{
    CustomerInfo, Entitlement, PostData, ProductRequestData, Subscriber, SubscriberAttribute,
    SubscriberAttributeDict, Subscription,
};
pub use operations::{
    AppUserId, Completion, CreateAlias, CreateAliasOperation, GetSubscriberData,
    GetSubscriberDataOperation, InFlight, NetworkOperation, Operation, OperationHandle,
    PostReceiptData, PostReceiptDataOperation, PostSubscriberAttributes,
    PostSubscriberAttributesOperation, RequestAction, UserSpecificConfiguration,
};
pub use queue::{OperationQueue, OperationQueueConfig};

pub use purchases_coalesced::{CacheStatus, CallbackCache, CallbackQueue, PendingCallback};
pub use purchases_config::InFlightPolicy;
pub use purchases_result::{Error, ErrorType, Result};
