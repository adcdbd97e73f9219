//! Response decoders, each run once per in-flight request

use purchases_result::{create_error, AttributeError, Error, Result};
use serde::Deserialize;

use crate::{http::HttpResponse, models::CustomerInfo};

/// Error payload the backend sends with non-2xx responses
#[derive(Deserialize, Default)]
struct ErrorBody {
    code: Option<i64>,
    message: Option<String>,
    #[serde(default)]
    attribute_errors: Vec<AttributeError>,
}

fn error_body(response: &HttpResponse) -> ErrorBody {
    response
        .body
        .as_deref()
        .and_then(|body| serde_json::from_slice(body).ok())
        .unwrap_or_default()
}

fn backend_error(response: &HttpResponse, body: ErrorBody) -> Error {
    create_error!(BackendError {
        status: response.status_code,
        code: body.code,
        message: body.message,
    })
}

/// Decode a response carrying customer info
pub fn decode_customer_info(response: &HttpResponse) -> Result<CustomerInfo> {
    if let Some(error) = &response.error {
        return Err(error.clone());
    }

    if !response.is_success() {
        return Err(backend_error(response, error_body(response)));
    }

    let body = response.body.as_deref().unwrap_or_default();
    serde_json::from_slice(body).map_err(|err| {
        create_error!(UnexpectedBackendResponse {
            reason: format!("customer info could not be decoded: {err}"),
        })
    })
}

/// Decode a response where only success matters
pub fn decode_post_response(response: &HttpResponse) -> Result<()> {
    if let Some(error) = &response.error {
        return Err(error.clone());
    }

    if response.is_success() {
        return Ok(());
    }

    let mut body = error_body(response);
    if !body.attribute_errors.is_empty() {
        return Err(create_error!(InvalidSubscriberAttributes {
            errors: std::mem::take(&mut body.attribute_errors),
        }));
    }

    Err(backend_error(response, body))
}

#[cfg(test)]
mod tests {
    use purchases_result::{create_network_error, ErrorType};
    use serde_json::json;

    use super::{decode_customer_info, decode_post_response};
    use crate::http::HttpResponse;

    fn response(status: u16, body: serde_json::Value) -> HttpResponse {
        HttpResponse::new(status, body.to_string())
    }

    #[test]
    fn transport_error_wins() {
        let mut failed = response(200, json!({}));
        failed.error = Some(create_network_error!("offline"));

        let error = decode_customer_info(&failed).unwrap_err();
        assert!(matches!(error.error_type, ErrorType::NetworkError { .. }));
        assert!(decode_post_response(&failed).is_err());
    }

    #[test]
    fn backend_errors_carry_code_and_message() {
        let error = decode_customer_info(&response(
            500,
            json!({ "code": 7110, "message": "Internal server error" }),
        ))
        .unwrap_err();

        assert_eq!(
            error.error_type,
            ErrorType::BackendError {
                status: 500,
                code: Some(7110),
                message: Some("Internal server error".to_string()),
            }
        );
    }

    #[test]
    fn unparseable_error_body_still_reports_status() {
        let error = decode_post_response(&HttpResponse::new(404, "not json")).unwrap_err();

        assert_eq!(
            error.error_type,
            ErrorType::BackendError {
                status: 404,
                code: None,
                message: None,
            }
        );
    }

    #[test]
    fn malformed_success_is_unexpected() {
        let error = decode_customer_info(&response(200, json!({ "nope": true }))).unwrap_err();
        assert!(matches!(
            error.error_type,
            ErrorType::UnexpectedBackendResponse { .. }
        ));

        let mut empty = response(200, json!({}));
        empty.body = None;
        assert!(decode_customer_info(&empty).is_err());
    }

    #[test]
    fn attribute_errors_are_surfaced() {
        let error = decode_post_response(&response(
            400,
            json!({
                "code": 7263,
                "message": "Some subscriber attributes keys were unable to be saved.",
                "attribute_errors": [
                    { "key_name": "$email", "message": "Value is not a valid email address." }
                ]
            }),
        ))
        .unwrap_err();

        match error.error_type {
            ErrorType::InvalidSubscriberAttributes { errors } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].key_name, "$email");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn post_success_ignores_body() {
        assert!(decode_post_response(&HttpResponse::new(201, "")).is_ok());
    }
}
