//! Generic HTTP API client layer.
//!
//! # Overview
//! Builds outgoing requests, injects session auth headers, dispatches them
//! through a pluggable transport, decodes typed responses and collapses every
//! failure into a single `NormalizedError { message, code }`.
//!
//! # Design
//! - `RequestBuilder` is pure: base URL + path are concatenated verbatim, GET
//!   parameters go to the query string, everything else to a JSON body.
//! - `AuthInterceptor` runs inside the `Session` right before dispatch and
//!   pulls headers from the `SessionStore` on every request.
//! - `ResponseNormalizer` reports each failure to the `TelemetrySink` once.
//!   A 401 forces a logout and the caller gets no completion at all.
//! - Collaborators (transport, session store, telemetry, error-body parser,
//!   configuration) are traits passed in at construction; there are no
//!   globals.

pub mod builder;
pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod error_body;
pub mod http;
pub mod interceptor;
pub mod normalizer;
pub mod params;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use builder::{DefaultRequestBuilder, RequestBuilder, RequestDescriptor};
pub use client::{ApiClient, NetworkService, NetworkServiceBuilder};
pub use config::{ClientConfig, ConfigError, ConfigSource, EnvConfig};
pub use decoder::{DateDecodingStrategy, JsonDecoder};
pub use error::{ApiError, NormalizedError, TransportError};
pub use error_body::{ErrorBodyParser, JsonErrorBodyParser};
pub use http::{HttpMethod, HttpRequest, HttpResponse, UnknownMethod};
pub use interceptor::{reject_nil_headers, AuthInterceptor, RequestInterceptor};
pub use normalizer::{ResponseNormalizer, TransportOutcome};
pub use params::{Parameters, QueryParameters, RequestOptions};
pub use session::{AuthHeaderValue, AuthHeaders, SessionStore, StaticSessionStore};
pub use telemetry::{RecordingTelemetry, TelemetrySink, TracingTelemetry};
pub use transport::{ReqwestTransport, Session, Transport};
