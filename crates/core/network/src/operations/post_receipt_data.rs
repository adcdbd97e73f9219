use purchases_result::Result;

use super::{body_digest, AppUserId, NetworkOperation, RequestAction};
use crate::{
    handlers::decode_customer_info,
    http::{HttpRequest, HttpResponse},
    models::{CustomerInfo, PostData},
};

const PATH: &str = "/receipts";

/// Post a receipt, answered with the updated customer info
#[derive(Debug, Clone)]
pub struct PostReceiptData {
    post_data: PostData,
}

impl PostReceiptData {
    pub fn new(post_data: PostData) -> Self {
        Self { post_data }
    }
}

impl RequestAction for PostReceiptData {
    type Value = CustomerInfo;

    /// Identical posts for the same user share a request
    fn cache_key(&self, user: AppUserId<'_>) -> String {
        let digest = body_digest(&self.post_data.to_json(user.id));
        format!("{PATH}:{}:{digest:016x}", user.escaped)
    }

    fn request(&self, user: AppUserId<'_>) -> HttpRequest {
        HttpRequest::post(PATH, self.post_data.to_json(user.id))
    }

    fn decode(&self, response: &HttpResponse) -> Result<CustomerInfo> {
        decode_customer_info(response)
    }
}

pub type PostReceiptDataOperation = NetworkOperation<PostReceiptData>;

#[cfg(test)]
mod tests {
    use super::PostReceiptData;
    use crate::{
        models::PostData,
        operations::{AppUserId, RequestAction},
    };

    const USER: AppUserId<'static> = AppUserId {
        id: "user",
        escaped: "user",
    };

    fn receipt(receipt_data: &[u8], is_restore: bool) -> PostReceiptData {
        PostReceiptData::new(PostData {
            receipt_data: receipt_data.to_vec(),
            is_restore,
            ..Default::default()
        })
    }

    #[test]
    fn identical_posts_share_a_key() {
        assert_eq!(
            receipt(b"a", false).cache_key(USER),
            receipt(b"a", false).cache_key(USER)
        );
        assert!(receipt(b"a", false).cache_key(USER).starts_with("/receipts:user:"));
    }

    #[test]
    fn differing_posts_do_not() {
        assert_ne!(
            receipt(b"a", false).cache_key(USER),
            receipt(b"b", false).cache_key(USER)
        );
        assert_ne!(
            receipt(b"a", false).cache_key(USER),
            receipt(b"a", true).cache_key(USER)
        );
    }

    #[test]
    fn never_collides_with_subscriber_paths() {
        assert!(!receipt(b"a", false).cache_key(USER).starts_with("/subscribers/"));
    }
}
