//! Error types for the API client.
//!
//! # Design
//! `ApiError` is the internal taxonomy: every stage of the pipeline (build,
//! adapt, transport, validate, decode) fails with one of its variants. At the
//! public boundary all of them collapse into `NormalizedError`, which carries
//! only a human-readable message and a numeric code. The code is the HTTP
//! status when a response was received and `-1` otherwise.

/// Code used when no HTTP response was received.
pub const NO_RESPONSE_CODE: i32 = -1;

/// Failures raised inside the request pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Base URL + path did not form a valid URL. Carries the offending string.
    #[error("URL is not valid: {0}")]
    InvalidUrl(String),

    /// Body parameters could not be encoded.
    #[error("parameter encoding failed: {0}")]
    Encoding(String),

    /// The request interceptor refused the request.
    #[error("request adaptation failed: {0}")]
    Adaptation(String),

    /// Network or connection-level failure reported by the transport.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A response arrived with a non-2xx status.
    #[error("response status code was unacceptable: {0}")]
    UnacceptableStatus(u16),

    /// The response body did not decode into the expected type.
    #[error("response could not be decoded: {0}")]
    Decoding(String),

    /// A body was required but the response carried none.
    #[error("response could not be serialized, input data was empty")]
    EmptyResponse,

    /// A callback entry point was called outside a tokio runtime.
    #[error("no async runtime available to run the request")]
    NoRuntime,
}

/// Failure reported by a `Transport`.
///
/// `status` and `body` are present when the failure happened after a
/// response (or part of one) was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub status: Option<u16>,
    pub body: Option<Vec<u8>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            body: None,
        }
    }

    pub fn timed_out() -> Self {
        Self::new("the request timed out")
    }
}

impl ApiError {
    /// HTTP status attached to this error, if any response was received.
    pub fn response_code(&self) -> Option<u16> {
        match self {
            ApiError::Transport(e) => e.status,
            ApiError::UnacceptableStatus(status) => Some(*status),
            _ => None,
        }
    }
}

/// The single error shape surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct NormalizedError {
    pub message: String,
    pub code: i32,
}

impl NormalizedError {
    pub fn new(message: impl Into<String>, code: i32) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    /// Build from an internal error, using its description as the message.
    pub fn from_api_error(error: &ApiError, code: i32) -> Self {
        Self::new(error.to_string(), code)
    }

    /// The HTTP status this error came from, or `None` for local/transport
    /// failures without a response.
    pub fn status(&self) -> Option<u16> {
        u16::try_from(self.code).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_code_only_for_received_responses() {
        assert_eq!(ApiError::UnacceptableStatus(404).response_code(), Some(404));
        assert_eq!(ApiError::InvalidUrl("x".into()).response_code(), None);

        let mut transport = TransportError::new("connection reset");
        assert_eq!(ApiError::from(transport.clone()).response_code(), None);
        transport.status = Some(502);
        assert_eq!(ApiError::from(transport).response_code(), Some(502));
    }

    #[test]
    fn normalized_error_displays_message_only() {
        let err = NormalizedError::new("not found", 404);
        assert_eq!(err.to_string(), "not found");
        assert_eq!(err.status(), Some(404));
        assert_eq!(NormalizedError::new("offline", NO_RESPONSE_CODE).status(), None);
    }

    #[test]
    fn transport_error_is_transparent() {
        let err = ApiError::from(TransportError::new("connection refused"));
        assert_eq!(err.to_string(), "connection refused");
    }
}
