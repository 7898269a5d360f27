//! Turns a request descriptor into an encoded `HttpRequest`.
//!
//! # Design
//! The builder is a pure function of its inputs. Base URL and path are
//! concatenated verbatim and only validated, never normalized, so the
//! resulting URL is exactly what the caller wrote plus any appended query.
//!
//! Encoding is chosen by method: GET puts body parameters in the query
//! string, every other method serializes them as a JSON body. Explicit query
//! parameters are always appended to the URL first.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use url::Url;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest};
use crate::params::{Parameters, QueryParameters};

pub const CONTENT_TYPE: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Characters left unescaped in query components: RFC 3986 unreserved plus
/// `?` and `/`.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'?')
    .remove(b'/');

/// Everything needed to build one request. Constructed per call and dropped
/// once the request is built.
#[derive(Debug, Clone, Copy)]
pub struct RequestDescriptor<'a> {
    pub base_url: &'a str,
    pub path: &'a str,
    pub method: HttpMethod,
    pub body: &'a Parameters,
    pub query: Option<&'a QueryParameters>,
}

/// Builds encoded requests from descriptors.
pub trait RequestBuilder: Send + Sync {
    fn build(&self, descriptor: &RequestDescriptor<'_>) -> Result<HttpRequest, ApiError>;
}

/// URL-encodes GET parameters and JSON-encodes everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRequestBuilder;

impl RequestBuilder for DefaultRequestBuilder {
    fn build(&self, descriptor: &RequestDescriptor<'_>) -> Result<HttpRequest, ApiError> {
        let mut url = format!("{}{}", descriptor.base_url, descriptor.path);
        validate_url(&url)?;

        if let Some(query) = descriptor.query {
            let components: Vec<(String, String)> = query
                .iter()
                .map(|(k, v)| (escape(k), escape(v)))
                .collect();
            append_query(&mut url, &join_components(&components));
        }

        let mut request = HttpRequest::new(descriptor.method, url);

        if descriptor.method == HttpMethod::Get {
            if !descriptor.body.is_empty() {
                let encoded = url_encode(descriptor.body);
                append_query(&mut request.url, &encoded);
            }
        } else {
            let body = serde_json::to_string(descriptor.body)
                .map_err(|e| ApiError::Encoding(e.to_string()))?;
            request.set_header(CONTENT_TYPE, JSON_CONTENT_TYPE);
            request.body = Some(body);
        }

        Ok(request)
    }
}

/// Reject anything that is not an absolute URL, or that only parses after
/// escaping (whitespace and control characters).
fn validate_url(candidate: &str) -> Result<(), ApiError> {
    let has_bad_chars = candidate
        .chars()
        .any(|c| c.is_whitespace() || c.is_control());
    match Url::parse(candidate) {
        Ok(parsed) if !has_bad_chars && parsed.has_host() => Ok(()),
        _ => Err(ApiError::InvalidUrl(candidate.to_string())),
    }
}

/// Append already-encoded query components, ahead of any fragment.
fn append_query(url: &mut String, encoded: &str) {
    if encoded.is_empty() {
        return;
    }
    let fragment = url.find('#').map(|idx| url.split_off(idx));
    match url.find('?') {
        Some(idx) if idx + 1 < url.len() && !url.ends_with('&') => url.push('&'),
        Some(_) => {}
        None => url.push('?'),
    }
    url.push_str(encoded);
    if let Some(fragment) = fragment {
        url.push_str(&fragment);
    }
}

fn escape(component: &str) -> String {
    utf8_percent_encode(component, QUERY_COMPONENT).to_string()
}

fn join_components(components: &[(String, String)]) -> String {
    components
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// URL-encode body parameters, flattening arrays as `key[]` and objects as
/// `key[sub]`.
fn url_encode(params: &Parameters) -> String {
    let mut components = Vec::new();
    for (key, value) in params.iter() {
        query_components(key, value, &mut components);
    }
    join_components(&components)
}

fn query_components(key: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (nested, value) in map {
                query_components(&format!("{key}[{nested}]"), value, out);
            }
        }
        Value::Array(items) => {
            for value in items {
                query_components(&format!("{key}[]"), value, out);
            }
        }
        Value::Bool(b) => out.push((escape(key), if *b { "1" } else { "0" }.to_string())),
        Value::Number(n) => out.push((escape(key), escape(&n.to_string()))),
        Value::String(s) => out.push((escape(key), escape(s))),
        Value::Null => out.push((escape(key), String::new())),
    }
}
