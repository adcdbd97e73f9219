use std::collections::{BTreeMap, HashMap};

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Customer information as returned by the subscribers endpoint
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CustomerInfo {
    #[serde(default)]
    pub request_date: Option<DateTime<Utc>>,
    pub subscriber: Subscriber,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Subscriber {
    pub original_app_user_id: String,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub management_url: Option<String>,
    #[serde(default)]
    pub original_application_version: Option<String>,
    #[serde(default)]
    pub entitlements: HashMap<String, Entitlement>,
    #[serde(default)]
    pub subscriptions: HashMap<String, Subscription>,
    #[serde(default)]
    pub non_subscriptions: HashMap<String, Vec<Value>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Entitlement {
    pub product_identifier: String,
    #[serde(default)]
    pub purchase_date: Option<DateTime<Utc>>,
    /// Absent for lifetime entitlements
    #[serde(default)]
    pub expires_date: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Subscription {
    #[serde(default)]
    pub purchase_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub original_purchase_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub period_type: Option<String>,
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub is_sandbox: bool,
    #[serde(default)]
    pub unsubscribe_detected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub billing_issues_detected_at: Option<DateTime<Utc>>,
}

impl Entitlement {
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.expires_date.map_or(true, |expires| expires > at)
    }
}

impl CustomerInfo {
    /// Identifiers of entitlements that have not expired at `at`
    pub fn active_entitlements(&self, at: DateTime<Utc>) -> Vec<&str> {
        let mut active: Vec<&str> = self
            .subscriber
            .entitlements
            .iter()
            .filter(|(_, entitlement)| entitlement.is_active_at(at))
            .map(|(id, _)| id.as_str())
            .collect();

        active.sort_unstable();
        active
    }
}

/// Value set for a subscriber attribute, `None` clears it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberAttribute {
    pub value: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriberAttribute {
    pub fn new(value: Option<String>, updated_at: DateTime<Utc>) -> Self {
        Self { value, updated_at }
    }

    fn to_json(&self) -> Value {
        json!({
            "value": self.value,
            "updated_at_ms": self.updated_at.timestamp_millis(),
        })
    }
}

/// Attributes keyed by name, ordered so request bodies are stable
pub type SubscriberAttributeDict = BTreeMap<String, SubscriberAttribute>;

pub(crate) fn attributes_to_json(attributes: &SubscriberAttributeDict) -> Value {
    Value::Object(
        attributes
            .iter()
            .map(|(key, attribute)| (key.clone(), attribute.to_json()))
            .collect::<Map<String, Value>>(),
    )
}

/// Store product details sent along with a receipt
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductRequestData {
    pub product_identifier: String,
    /// Decimal price as a string to avoid float rounding
    pub price: String,
    pub currency_code: Option<String>,
    pub normal_duration: Option<String>,
    pub subscription_group: Option<String>,
}

/// Everything posted together with a receipt
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PostData {
    pub receipt_data: Vec<u8>,
    pub is_restore: bool,
    pub product_data: Option<ProductRequestData>,
    pub presented_offering_identifier: Option<String>,
    pub observer_mode: bool,
    pub subscriber_attributes: Option<SubscriberAttributeDict>,
}

impl PostData {
    pub(crate) fn to_json(&self, app_user_id: &str) -> Value {
        let mut body = Map::new();
        body.insert("fetch_token".into(), STANDARD.encode(&self.receipt_data).into());
        body.insert("app_user_id".into(), app_user_id.into());
        body.insert("is_restore".into(), self.is_restore.into());
        body.insert("observer_mode".into(), self.observer_mode.into());

        if let Some(product) = &self.product_data {
            body.insert("product_id".into(), product.product_identifier.clone().into());
            body.insert("price".into(), product.price.clone().into());

            for (key, value) in [
                ("currency", &product.currency_code),
                ("normal_duration", &product.normal_duration),
                ("subscription_group_id", &product.subscription_group),
            ] {
                if let Some(value) = value {
                    body.insert(key.into(), value.clone().into());
                }
            }
        }

        if let Some(offering) = &self.presented_offering_identifier {
            body.insert("presented_offering_identifier".into(), offering.clone().into());
        }

        if let Some(attributes) = &self.subscriber_attributes {
            if !attributes.is_empty() {
                body.insert("attributes".into(), attributes_to_json(attributes));
            }
        }

        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{
        CustomerInfo, PostData, ProductRequestData, SubscriberAttribute, SubscriberAttributeDict,
    };

    #[test]
    fn decodes_customer_info() {
        let info: CustomerInfo = serde_json::from_value(json!({
            "request_date": "2021-11-18T10:00:00Z",
            "subscriber": {
                "original_app_user_id": "user",
                "first_seen": "2021-01-01T00:00:00Z",
                "entitlements": {
                    "pro": {
                        "product_identifier": "monthly",
                        "expires_date": "2021-12-01T00:00:00Z"
                    },
                    "lifetime": { "product_identifier": "forever", "expires_date": null },
                    "old": {
                        "product_identifier": "weekly",
                        "expires_date": "2021-11-01T00:00:00Z"
                    }
                },
                "subscriptions": {
                    "monthly": { "store": "app_store", "is_sandbox": true }
                }
            }
        }))
        .unwrap();

        let now = Utc.with_ymd_and_hms(2021, 11, 18, 10, 0, 0).unwrap();
        assert_eq!(info.subscriber.original_app_user_id, "user");
        assert_eq!(info.active_entitlements(now), vec!["lifetime", "pro"]);
        assert!(info.subscriber.subscriptions["monthly"].is_sandbox);
        assert!(info.subscriber.non_subscriptions.is_empty());
    }

    #[test]
    fn receipt_body_carries_optional_fields() {
        let updated_at = Utc.with_ymd_and_hms(2021, 11, 18, 0, 0, 0).unwrap();
        let mut attributes = SubscriberAttributeDict::new();
        attributes.insert(
            "$email".to_string(),
            SubscriberAttribute::new(Some("a@b.c".to_string()), updated_at),
        );

        let post_data = PostData {
            receipt_data: b"receipt".to_vec(),
            is_restore: true,
            product_data: Some(ProductRequestData {
                product_identifier: "monthly".to_string(),
                price: "4.99".to_string(),
                currency_code: Some("USD".to_string()),
                ..Default::default()
            }),
            presented_offering_identifier: Some("default".to_string()),
            observer_mode: false,
            subscriber_attributes: Some(attributes),
        };

        assert_eq!(
            post_data.to_json("user"),
            json!({
                "fetch_token": "cmVjZWlwdA==",
                "app_user_id": "user",
                "is_restore": true,
                "observer_mode": false,
                "product_id": "monthly",
                "price": "4.99",
                "currency": "USD",
                "presented_offering_identifier": "default",
                "attributes": {
                    "$email": { "value": "a@b.c", "updated_at_ms": 1637193600000i64 }
                }
            })
        );
    }

    #[test]
    fn minimal_receipt_body() {
        let body = PostData {
            receipt_data: vec![1, 2, 3],
            ..Default::default()
        }
        .to_json("user");

        assert_eq!(body["fetch_token"], "AQID");
        assert!(body.get("product_id").is_none());
        assert!(body.get("attributes").is_none());
    }
}
