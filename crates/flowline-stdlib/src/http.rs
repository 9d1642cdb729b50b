use async_trait::async_trait;
use flowline_core::{EngineError, HttpClient, HttpRequest, HttpResponse};
use reqwest::{Client, Method};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors raised by the HTTP client
#[derive(Debug, Error)]
pub enum HttpError {
    /// The method is not a valid HTTP token
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Client construction, connection or body read failed
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl From<HttpError> for EngineError {
    fn from(err: HttpError) -> Self {
        EngineError::Collaborator(err.to_string())
    }
}

/// `reqwest` backed client for webhook and API steps
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Client with a 30 second request timeout
    pub fn new() -> Result<Self, HttpError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Client with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap a preconfigured client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn perform(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let method = Method::from_str(&request.method.to_uppercase())
            .map_err(|_| HttpError::InvalidMethod(request.method.clone()))?;

        let mut builder = self.client.request(method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if method != Method::GET && method != Method::HEAD {
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }
        }

        debug!(method = %method, url = %request.url, "Sending HTTP request");
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        debug!(url = %request.url, status, "HTTP response received");

        Ok(HttpResponse {
            status,
            body: decode_body(text),
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, EngineError> {
        Ok(self.perform(request).await?)
    }
}

// JSON when it parses, the raw text otherwise
fn decode_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(method: &str, url: String, body: Option<Value>) -> HttpRequest {
        HttpRequest {
            method: method.to_string(),
            url,
            headers: BTreeMap::new(),
            body,
        }
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(String::new()), Value::Null);
        assert_eq!(decode_body("{\"a\":1}".to_string()), json!({ "a": 1 }));
        assert_eq!(decode_body("plain".to_string()), json!("plain"));
    }

    #[tokio::test]
    async fn test_posts_json_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/lead"))
            .and(header("x-api-key", "secret"))
            .and(body_json(json!({ "lead": "Ada" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "accepted": true })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ReqwestHttpClient::new().unwrap();
        let mut req = request("post", format!("{}/hooks/lead", server.uri()), Some(json!({ "lead": "Ada" })));
        req.headers.insert("x-api-key".to_string(), "secret".to_string());

        let response = client.send(req).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.body, json!({ "accepted": true }));
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = ReqwestHttpClient::new().unwrap();
        let response = client
            .send(request("GET", format!("{}/status", server.uri()), None))
            .await
            .unwrap();
        assert!(!response.is_success());
        assert_eq!(response.status, 503);
        assert_eq!(response.body, json!("maintenance"));
    }

    #[tokio::test]
    async fn test_transport_failure_is_an_error() {
        let client = ReqwestHttpClient::with_timeout(Duration::from_millis(500)).unwrap();
        let result = client
            .send(request("GET", "http://127.0.0.1:1/unreachable".to_string(), None))
            .await;
        assert!(matches!(result, Err(EngineError::Collaborator(_))));
    }

    #[tokio::test]
    async fn test_invalid_method() {
        let client = ReqwestHttpClient::new().unwrap();
        let result = client
            .send(request("NOT A METHOD", "http://localhost".to_string(), None))
            .await;
        assert_eq!(
            result.unwrap_err(),
            EngineError::Collaborator("Invalid HTTP method: NOT A METHOD".to_string())
        );
    }
}
