//! Outbound HTTP for generated tools.
//!
//! Tools never talk to the network directly; they hand an [`HttpRequest`]
//! to an [`HttpExecutor`]. Production uses [`ReqwestExecutor`].

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::domains::protocols::HttpMethod;

/// A fully built upstream request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    /// First header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Upstream answer. Non-JSON bodies are returned as a JSON string.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

/// Transport-level failure: the request produced no usable response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,

    #[error("response exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("redirects are not followed (HTTP {0})")]
    Redirect(u16),
}

/// Performs HTTP requests on behalf of generated tools.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ExecutorError>;
}

/// `reqwest`-backed executor.
///
/// Redirects are refused so a declared HTTPS host cannot bounce a call to
/// an undeclared one, and response bodies are read with a hard size cap.
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: Client,
    max_response_bytes: usize,
}

impl ReqwestExecutor {
    pub fn new(timeout: Duration, max_response_bytes: usize) -> Result<Self, ExecutorError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("protocol-mcp-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExecutorError::Request(e.to_string()))?;
        Ok(Self {
            client,
            max_response_bytes,
        })
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ExecutorError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        };

        let mut builder = self.client.request(method, request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest)?;
        let status = response.status().as_u16();
        if (300..400).contains(&status) {
            return Err(ExecutorError::Redirect(status));
        }

        let bytes = read_limited(response, self.max_response_bytes).await?;
        let text = String::from_utf8_lossy(&bytes);
        let body = serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.into_owned()));

        Ok(HttpResponse { status, body })
    }
}

fn map_reqwest(error: reqwest::Error) -> ExecutorError {
    if error.is_timeout() {
        ExecutorError::Timeout
    } else {
        ExecutorError::Request(error.to_string())
    }
}

/// Read a response body, failing once it grows past `limit` bytes.
pub(crate) async fn read_limited(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ExecutorError> {
    if let Some(len) = response.content_length()
        && len > limit as u64
    {
        warn!(content_length = len, max = limit, "Rejected response: Content-Length exceeds limit");
        return Err(ExecutorError::TooLarge { limit });
    }

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_reqwest)?;
        if body.len() + chunk.len() > limit {
            return Err(ExecutorError::TooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Records requests and answers with a canned response.
    #[derive(Debug)]
    pub struct MockExecutor {
        pub requests: Mutex<Vec<HttpRequest>>,
        response: Result<HttpResponse, ExecutorError>,
        delay: Option<Duration>,
    }

    impl MockExecutor {
        pub fn ok(status: u16, body: Value) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                response: Ok(HttpResponse { status, body }),
                delay: None,
            }
        }

        pub fn failing(error: ExecutorError) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                response: Err(error),
                delay: None,
            }
        }

        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn last(&self) -> Option<HttpRequest> {
            self.requests.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl HttpExecutor for MockExecutor {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ExecutorError> {
            self.requests.lock().unwrap().push(request);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.response.clone()
        }
    }
}
