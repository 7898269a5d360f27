//! The API client facade.
//!
//! # Design
//! `ApiClient` is a capability set (base URL, session, request builder,
//! normalizer, decoder) whose provided methods implement the pipeline:
//! build → adapt + dispatch → validate status → decode → normalize.
//! `NetworkService` is the one concrete implementation; every collaborator
//! is passed in explicitly so tests can swap in fakes.
//!
//! Each call performs exactly one network attempt. The async entry points
//! return `None` when the normalizer suppressed the completion (401); the
//! callback entry points simply never call `on_complete` in that case.
//! The callback entry points need an ambient tokio runtime; without one they
//! complete immediately with a local failure.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::builder::{DefaultRequestBuilder, RequestBuilder, RequestDescriptor};
use crate::config::{ClientConfig, ConfigError, ConfigSource};
use crate::decoder::JsonDecoder;
use crate::error::{ApiError, NormalizedError};
use crate::error_body::{ErrorBodyParser, JsonErrorBodyParser};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::interceptor::{AuthInterceptor, RequestInterceptor};
use crate::normalizer::{ResponseNormalizer, TransportOutcome};
use crate::params::RequestOptions;
use crate::session::SessionStore;
use crate::telemetry::{TelemetrySink, TracingTelemetry};
use crate::transport::{ReqwestTransport, Session, Transport};

/// Statuses for which the no-body variant accepts an empty payload.
pub const EMPTY_RESPONSE_CODES: [u16; 4] = [200, 201, 204, 205];

#[async_trait]
pub trait ApiClient: Send + Sync {
    fn base_url(&self) -> &str;
    fn session(&self) -> &Session;
    fn request_builder(&self) -> &dyn RequestBuilder;
    fn normalizer(&self) -> &ResponseNormalizer;
    fn decoder(&self) -> &JsonDecoder;

    fn build_request(
        &self,
        path: &str,
        method: HttpMethod,
        options: &RequestOptions,
    ) -> Result<HttpRequest, ApiError> {
        self.request_builder().build(&RequestDescriptor {
            base_url: self.base_url(),
            path,
            method,
            body: &options.body,
            query: options.query.as_ref(),
        })
    }

    /// Send a request and decode the body as `T`.
    ///
    /// Returns `None` only when the server answered 401 and the session was
    /// ended; no result is delivered in that case.
    async fn fetch<T>(
        &self,
        path: &str,
        method: HttpMethod,
        options: RequestOptions,
    ) -> Option<Result<T, NormalizedError>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let request = match self.build_request(path, method, &options) {
            Ok(request) => request,
            Err(error) => return Some(self.normalizer().local_failure(&error)),
        };
        tracing::debug!(method = %request.method, url = %request.url, "API request");

        let result = self.session().send(request).await;
        let decoder = self.decoder();
        let outcome = into_outcome(result, |response| decoder.decode::<T>(&response.body));
        self.normalizer().normalize(outcome)
    }

    /// Send a request whose response body is ignored.
    ///
    /// Empty bodies are accepted for 200, 201, 204 and 205 (and any HEAD
    /// response). Same `None` semantics as [`ApiClient::fetch`].
    async fn fetch_empty(
        &self,
        path: &str,
        method: HttpMethod,
        options: RequestOptions,
    ) -> Option<Result<(), NormalizedError>> {
        let request = match self.build_request(path, method, &options) {
            Ok(request) => request,
            Err(error) => return Some(self.normalizer().local_failure(&error)),
        };
        tracing::debug!(method = %request.method, url = %request.url, "API request");

        let result = self.session().send(request).await;
        let outcome = into_outcome(result, |response| accept_empty(response, method));
        self.normalizer().normalize(outcome)
    }

    /// Run [`ApiClient::fetch`] on the current tokio runtime and hand the
    /// result to `on_complete`, which is called at most once and never on
    /// 401.
    ///
    /// Outside a runtime nothing is sent: `on_complete` receives a local
    /// failure right away and `None` is returned.
    fn request<T, F>(
        self: Arc<Self>,
        path: impl Into<String>,
        method: HttpMethod,
        options: RequestOptions,
        on_complete: F,
    ) -> Option<JoinHandle<()>>
    where
        Self: Sized + 'static,
        T: DeserializeOwned + Send + 'static,
        F: FnOnce(Result<T, NormalizedError>) + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            on_complete(self.normalizer().local_failure(&ApiError::NoRuntime));
            return None;
        };
        let path = path.into();
        Some(runtime.spawn(async move {
            if let Some(result) = self.fetch::<T>(&path, method, options).await {
                on_complete(result);
            }
        }))
    }

    /// Callback form of [`ApiClient::fetch_empty`].
    fn request_empty<F>(
        self: Arc<Self>,
        path: impl Into<String>,
        method: HttpMethod,
        options: RequestOptions,
        on_complete: F,
    ) -> Option<JoinHandle<()>>
    where
        Self: Sized + 'static,
        F: FnOnce(Result<(), NormalizedError>) + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            on_complete(self.normalizer().local_failure(&ApiError::NoRuntime));
            return None;
        };
        let path = path.into();
        Some(runtime.spawn(async move {
            if let Some(result) = self.fetch_empty(&path, method, options).await {
                on_complete(result);
            }
        }))
    }
}

/// Validate the status and decode the body of a dispatched request.
fn into_outcome<T>(
    result: Result<HttpResponse, ApiError>,
    decode: impl FnOnce(&HttpResponse) -> Result<T, ApiError>,
) -> TransportOutcome<T> {
    let response = match result {
        Ok(response) => response,
        Err(error) => {
            let (status, body) = match &error {
                ApiError::Transport(e) => (e.status, e.body.clone()),
                _ => (None, None),
            };
            return TransportOutcome::Failure {
                error,
                status,
                body,
            };
        }
    };

    if !response.is_success() {
        return TransportOutcome::Failure {
            error: ApiError::UnacceptableStatus(response.status),
            status: Some(response.status),
            body: Some(response.body),
        };
    }

    match decode(&response) {
        Ok(value) => TransportOutcome::Success(value),
        Err(error) => TransportOutcome::Failure {
            error,
            status: Some(response.status),
            body: Some(response.body),
        },
    }
}

fn accept_empty(response: &HttpResponse, method: HttpMethod) -> Result<(), ApiError> {
    let empty_allowed = EMPTY_RESPONSE_CODES.contains(&response.status) || method == HttpMethod::Head;
    if response.body.is_empty() && !empty_allowed {
        return Err(ApiError::EmptyResponse);
    }
    Ok(())
}

/// The default `ApiClient`.
pub struct NetworkService {
    base_url: String,
    session: Session,
    request_builder: Arc<dyn RequestBuilder>,
    normalizer: ResponseNormalizer,
    decoder: JsonDecoder,
}

impl std::fmt::Debug for NetworkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkService")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .field("decoder", &self.decoder)
            .finish_non_exhaustive()
    }
}

impl NetworkService {
    pub fn builder(config: ClientConfig, store: Arc<dyn SessionStore>) -> NetworkServiceBuilder {
        NetworkServiceBuilder::new(config, store)
    }

    /// Client with default collaborators: reqwest transport, tracing
    /// telemetry, JSON error-body parser.
    pub fn new(config: ClientConfig, store: Arc<dyn SessionStore>) -> Result<Self, ApiError> {
        Self::builder(config, store).build()
    }

    /// Builder seeded from a configuration source such as `EnvConfig`.
    pub fn from_source(
        source: &dyn ConfigSource,
        store: Arc<dyn SessionStore>,
    ) -> Result<NetworkServiceBuilder, ConfigError> {
        Ok(Self::builder(ClientConfig::from_source(source)?, store))
    }
}

#[async_trait]
impl ApiClient for NetworkService {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn request_builder(&self) -> &dyn RequestBuilder {
        self.request_builder.as_ref()
    }

    fn normalizer(&self) -> &ResponseNormalizer {
        &self.normalizer
    }

    fn decoder(&self) -> &JsonDecoder {
        &self.decoder
    }
}

/// Configures the collaborators of a [`NetworkService`].
pub struct NetworkServiceBuilder {
    config: ClientConfig,
    store: Arc<dyn SessionStore>,
    telemetry: Arc<dyn TelemetrySink>,
    error_parser: Arc<dyn ErrorBodyParser>,
    transport: Option<Arc<dyn Transport>>,
    interceptor: Option<Arc<dyn RequestInterceptor>>,
    request_builder: Arc<dyn RequestBuilder>,
    decoder: JsonDecoder,
}

impl NetworkServiceBuilder {
    fn new(config: ClientConfig, store: Arc<dyn SessionStore>) -> Self {
        Self {
            config,
            store,
            telemetry: Arc::new(TracingTelemetry),
            error_parser: Arc::new(JsonErrorBodyParser),
            transport: None,
            interceptor: None,
            request_builder: Arc::new(DefaultRequestBuilder),
            decoder: JsonDecoder::default(),
        }
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn error_parser(mut self, parser: Arc<dyn ErrorBodyParser>) -> Self {
        self.error_parser = parser;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the default `AuthInterceptor` built over the session store.
    pub fn interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn request_builder(mut self, builder: Arc<dyn RequestBuilder>) -> Self {
        self.request_builder = builder;
        self
    }

    pub fn decoder(mut self, decoder: JsonDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn build(self) -> Result<NetworkService, ApiError> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let interceptor = self
            .interceptor
            .unwrap_or_else(|| Arc::new(AuthInterceptor::new(self.store.clone())));

        Ok(NetworkService {
            base_url: self.config.base_url,
            session: Session::new(transport, interceptor, self.config.timeout),
            request_builder: self.request_builder,
            normalizer: ResponseNormalizer::new(self.telemetry, self.store, self.error_parser),
            decoder: self.decoder,
        })
    }
}
