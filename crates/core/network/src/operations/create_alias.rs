use purchases_result::Result;
use serde_json::json;
use urlencoding::encode;

use super::{AppUserId, NetworkOperation, RequestAction};
use crate::{
    handlers::decode_post_response,
    http::{HttpRequest, HttpResponse},
};

/// Alias the configured app user id to a new one
#[derive(Debug, Clone)]
pub struct CreateAlias {
    new_app_user_id: String,
}

impl CreateAlias {
    pub fn new(new_app_user_id: impl Into<String>) -> Self {
        Self {
            new_app_user_id: new_app_user_id.into(),
        }
    }
}

impl RequestAction for CreateAlias {
    type Value = ();

    fn cache_key(&self, user: AppUserId<'_>) -> String {
        // Both ids are escaped, so `:` only ever appears as the separator
        format!(
            "/subscribers/{}/alias:{}",
            user.escaped,
            encode(&self.new_app_user_id)
        )
    }

    fn request(&self, user: AppUserId<'_>) -> HttpRequest {
        info!("Creating an alias");

        HttpRequest::post(
            format!("/subscribers/{}/alias", user.escaped),
            json!({ "new_app_user_id": self.new_app_user_id }),
        )
    }

    fn decode(&self, response: &HttpResponse) -> Result<()> {
        decode_post_response(response)
    }
}

pub type CreateAliasOperation = NetworkOperation<CreateAlias>;
