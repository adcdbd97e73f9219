use purchases_result::Result;
use serde_json::{json, Value};

use super::{body_digest, AppUserId, NetworkOperation, RequestAction};
use crate::{
    handlers::decode_post_response,
    http::{HttpRequest, HttpResponse},
    models::{attributes_to_json, SubscriberAttributeDict},
};

/// Store subscriber attributes for the configured app user id
#[derive(Debug, Clone)]
pub struct PostSubscriberAttributes {
    attributes: SubscriberAttributeDict,
}

impl PostSubscriberAttributes {
    pub fn new(attributes: SubscriberAttributeDict) -> Self {
        Self { attributes }
    }

    fn body(&self) -> Value {
        json!({ "attributes": attributes_to_json(&self.attributes) })
    }
}

fn path(user: AppUserId<'_>) -> String {
    format!("/subscribers/{}/attributes", user.escaped)
}

impl RequestAction for PostSubscriberAttributes {
    type Value = ();

    fn cache_key(&self, user: AppUserId<'_>) -> String {
        format!("{}:{:016x}", path(user), body_digest(&self.body()))
    }

    fn request(&self, user: AppUserId<'_>) -> HttpRequest {
        HttpRequest::post(path(user), self.body())
    }

    fn decode(&self, response: &HttpResponse) -> Result<()> {
        decode_post_response(response)
    }
}

pub type PostSubscriberAttributesOperation = NetworkOperation<PostSubscriberAttributes>;
