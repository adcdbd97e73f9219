use purchases_result::Result;

use super::{AppUserId, NetworkOperation, RequestAction};
use crate::{
    handlers::decode_customer_info,
    http::{HttpRequest, HttpResponse},
    models::CustomerInfo,
};

/// Fetch customer info for the configured app user id
#[derive(Debug, Clone, Copy, Default)]
pub struct GetSubscriberData;

fn path(user: AppUserId<'_>) -> String {
    format!("/subscribers/{}", user.escaped)
}

impl RequestAction for GetSubscriberData {
    type Value = CustomerInfo;

    fn cache_key(&self, user: AppUserId<'_>) -> String {
        path(user)
    }

    fn request(&self, user: AppUserId<'_>) -> HttpRequest {
        HttpRequest::get(path(user))
    }

    fn decode(&self, response: &HttpResponse) -> Result<CustomerInfo> {
        decode_customer_info(response)
    }
}

pub type GetSubscriberDataOperation = NetworkOperation<GetSubscriberData>;
