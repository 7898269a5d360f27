//! The transport collaborator and the session that drives it.
//!
//! # Design
//! `Transport` executes exactly one HTTP exchange and knows nothing about
//! auth, status validation or decoding. `Session` wraps a transport with the
//! request interceptor and one fixed timeout applied to every request. No
//! retries happen at either layer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ApiError, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::interceptor::RequestInterceptor;

/// Timeout applied to every request unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes one HTTP request.
///
/// Non-2xx statuses are *not* errors at this level: return them as an
/// `HttpResponse` and let the client validate them. `Err` is for failures
/// where no usable response exists.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// `Transport` backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| TransportError::new(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_reqwest(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(to_reqwest(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| TransportError {
            message: e.to_string(),
            status: e.status().map(|s| s.as_u16()),
            body: None,
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|e| TransportError {
            message: e.to_string(),
            status: Some(status),
            body: None,
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

/// A transport configured with an interceptor and a per-request timeout.
#[derive(Clone)]
pub struct Session {
    transport: Arc<dyn Transport>,
    interceptor: Arc<dyn RequestInterceptor>,
    timeout: Duration,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        transport: Arc<dyn Transport>,
        interceptor: Arc<dyn RequestInterceptor>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            interceptor,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Adapt `request` through the interceptor and execute it once.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let request = self.interceptor.adapt(request)?;
        match tokio::time::timeout(self.timeout, self.transport.execute(request)).await {
            Ok(result) => result.map_err(ApiError::from),
            Err(_) => Err(TransportError::timed_out().into()),
        }
    }
}
