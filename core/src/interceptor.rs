//! Request adaptation applied by the session right before dispatch.

use std::sync::Arc;

use crate::builder::{CONTENT_TYPE, JSON_CONTENT_TYPE};
use crate::error::ApiError;
use crate::http::HttpRequest;
use crate::session::{AuthHeaderValue, AuthHeaders, SessionStore};

/// Middleware run on every request before it leaves the client.
///
/// Returning `Err` aborts the request; the error then flows through the
/// normalizer like any other local failure.
pub trait RequestInterceptor: Send + Sync {
    fn adapt(&self, request: HttpRequest) -> Result<HttpRequest, ApiError>;
}

/// Injects the session store's auth headers and a default content type.
#[derive(Clone)]
pub struct AuthInterceptor {
    store: Arc<dyn SessionStore>,
}

impl AuthInterceptor {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInterceptor").finish_non_exhaustive()
    }
}

impl RequestInterceptor for AuthInterceptor {
    fn adapt(&self, mut request: HttpRequest) -> Result<HttpRequest, ApiError> {
        let headers = reject_nil_headers(&self.store.auth_headers());
        tracing::trace!(
            url = %request.url,
            headers = ?headers.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
            "attaching session headers"
        );

        // Session-defined names win over whatever the caller set.
        for (name, value) in headers {
            request.set_header(name, value);
        }
        if request.header(CONTENT_TYPE).is_none() {
            request.set_header(CONTENT_TYPE, JSON_CONTENT_TYPE);
        }
        Ok(request)
    }
}

/// Flatten auth headers into concrete name/value pairs.
///
/// `None` values are dropped. Lists keep their present elements joined with
/// `,`.
pub fn reject_nil_headers(source: &AuthHeaders) -> Vec<(String, String)> {
    source
        .iter()
        .filter_map(|(name, value)| {
            let value = match value.as_ref()? {
                AuthHeaderValue::Single(v) => v.clone(),
                AuthHeaderValue::List(items) => items
                    .iter()
                    .flatten()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
            };
            Some((name.clone(), value))
        })
        .collect()
}
