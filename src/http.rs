use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::error::{Error, Result};

const CLIENT_USER_AGENT: &str = concat!("smsbox-desktop/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    pub body: Bytes,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::InvalidResponse(format!("Unable to parse response body: {e}")))
    }

    /// Body as JSON, or as a JSON string when it is not valid JSON.
    pub fn json_or_text(&self) -> Value {
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&self.body).to_string()))
    }
}

/// A response whose body arrives incrementally.
pub struct BodyStream {
    pub content_length: Option<u64>,
    pub chunks: BoxStream<'static, Result<Bytes>>,
}

impl std::fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Network access used by the update, stream and API components.
///
/// `execute` buffers the whole body and returns non-2xx responses as values.
/// `open_stream` fails with [`Error::HttpStatus`] for non-2xx responses.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response>;

    async fn open_stream(&self, request: Request) -> Result<BodyStream>;
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// `connect_timeout` bounds the TCP and TLS handshake of every request.
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(CLIENT_USER_AGENT)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::Network(format!("Unable to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn build(&self, request: Request) -> Result<reqwest::RequestBuilder> {
        let mut headers = HeaderMap::new();
        for (key, value) in &request.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| Error::Network(format!("Invalid header name {key}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Network(format!("Invalid value for header {key}: {e}")))?;
            headers.insert(name, value);
        }

        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: Request) -> Result<Response> {
        let url = request.url.clone();
        let response = self
            .build(request)?
            .send()
            .await
            .map_err(|e| Error::Network(format!("Request to {url} failed: {e}")))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Unable to read response from {url}: {e}")))?;
        Ok(Response { status, body })
    }

    async fn open_stream(&self, request: Request) -> Result<BodyStream> {
        let url = request.url.clone();
        let response = self
            .build(request)?
            .send()
            .await
            .map_err(|e| Error::Network(format!("Request to {url} failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::HttpStatus { status, body });
        }
        let content_length = response.content_length();
        let chunks = response
            .bytes_stream()
            .map_err(|e| Error::Network(format!("Unable to read response stream: {e}")))
            .boxed();
        Ok(BodyStream {
            content_length,
            chunks,
        })
    }
}
