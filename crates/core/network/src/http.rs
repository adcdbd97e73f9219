use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use purchases_config::Api;
use purchases_result::{create_error, create_network_error, Error, Result};
use reqwest::{Client, Method};
use serde_json::Value;
use tokio::sync::Mutex;

/// Headers attached to every request, usually authorisation
pub type AuthHeaders = HashMap<String, String>;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        }
    }
}

/// Request handed to an [`HttpClient`]
#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Path relative to the API base, starting with `/`
    pub path: String,
    pub body: Option<Value>,
    pub headers: AuthHeaders,
    /// Issue this request only after earlier serial requests have finished
    pub serially: bool,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            body: None,
            headers: AuthHeaders::new(),
            serially: true,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            body: Some(body),
            headers: AuthHeaders::new(),
            serially: true,
        }
    }
}

/// Everything a transport reports back for one request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: Option<Vec<u8>>,
    pub error: Option<Error>,
}

impl HttpResponse {
    pub fn new(status_code: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code,
            body: Some(body.into()),
            error: None,
        }
    }

    /// Response for a request that never produced a status
    pub fn failed(error: Error) -> Self {
        Self {
            status_code: 0,
            body: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Transport capability used by network operations
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform the request, transport failures are reported in the response
    async fn perform_request(&self, request: HttpRequest) -> HttpResponse;
}

/// [`HttpClient`] backed by reqwest
pub struct ReqwestClient {
    client: Client,
    base_url: String,
    serial: Mutex<()>,
}

impl ReqwestClient {
    pub fn new(api: &Api) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&api.user_agent)
            .timeout(Duration::from_secs(api.timeout_secs))
            .connect_timeout(Duration::from_secs(api.connect_timeout_secs))
            .build()
            .map_err(|err| {
                error!("Failed to build HTTP client: {err}");
                create_error!(InternalError)
            })?;

        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            serial: Mutex::new(()),
        })
    }

    pub fn into_shared(self) -> Arc<dyn HttpClient> {
        Arc::new(self)
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn perform_request(&self, request: HttpRequest) -> HttpResponse {
        let _serial = if request.serially {
            Some(self.serial.lock().await)
        } else {
            None
        };

        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.into(), &url);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!("Request to {url} failed: {err}");
                return HttpResponse::failed(create_network_error!(err));
            }
        };

        let status_code = response.status().as_u16();
        match response.bytes().await {
            Ok(body) => HttpResponse::new(status_code, body.to_vec()),
            Err(err) => HttpResponse {
                status_code,
                body: None,
                error: Some(create_network_error!(err)),
            },
        }
    }
}
