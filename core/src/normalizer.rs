//! Converts transport outcomes into caller-facing results.
//!
//! # Design
//! Every failure, local or remote, is reported to telemetry exactly once and
//! collapsed into a `NormalizedError`. A 401 is the one exception to "and
//! then returned": it forces a logout through the session store and the
//! caller's completion is suppressed. `normalize` models that with
//! `Option`: `None` means no completion is delivered.

use std::sync::Arc;

use crate::error::{ApiError, NormalizedError, NO_RESPONSE_CODE};
use crate::error_body::ErrorBodyParser;
use crate::session::SessionStore;
use crate::telemetry::TelemetrySink;

/// Status that ends the session instead of completing the call.
pub const UNAUTHORIZED: u16 = 401;

/// What the transport produced for one dispatched request.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOutcome<T> {
    /// Status validated and body decoded.
    Success(T),
    /// Transport error, unacceptable status, or decode failure. `status` and
    /// `body` are whatever part of the response arrived.
    Failure {
        error: ApiError,
        status: Option<u16>,
        body: Option<Vec<u8>>,
    },
}

#[derive(Clone)]
pub struct ResponseNormalizer {
    telemetry: Arc<dyn TelemetrySink>,
    session: Arc<dyn SessionStore>,
    parser: Arc<dyn ErrorBodyParser>,
}

impl std::fmt::Debug for ResponseNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseNormalizer").finish_non_exhaustive()
    }
}

impl ResponseNormalizer {
    pub fn new(
        telemetry: Arc<dyn TelemetrySink>,
        session: Arc<dyn SessionStore>,
        parser: Arc<dyn ErrorBodyParser>,
    ) -> Self {
        Self {
            telemetry,
            session,
            parser,
        }
    }

    /// A failure that happened before the request left the client.
    pub fn local_failure<T>(&self, error: &ApiError) -> Result<T, NormalizedError> {
        let code = error
            .response_code()
            .map(i32::from)
            .unwrap_or(NO_RESPONSE_CODE);
        let normalized = NormalizedError::from_api_error(error, code);
        tracing::debug!(code, error = %error, "request failed before dispatch");
        self.telemetry.record(&normalized);
        Err(normalized)
    }

    /// Normalize a transport outcome. Returns `None` when the completion must
    /// not fire (401).
    pub fn normalize<T>(&self, outcome: TransportOutcome<T>) -> Option<Result<T, NormalizedError>> {
        let (error, status, body) = match outcome {
            TransportOutcome::Success(value) => return Some(Ok(value)),
            TransportOutcome::Failure {
                error,
                status,
                body,
            } => (error, status, body),
        };

        let code = status.map(i32::from).unwrap_or(NO_RESPONSE_CODE);
        let mut normalized = NormalizedError::from_api_error(&error, code);

        if status == Some(UNAUTHORIZED) {
            self.telemetry.record(&normalized);
            tracing::warn!(code, "session rejected by server, forcing logout");
            self.session.force_logout(UNAUTHORIZED);
            return None;
        }

        if let Some(body) = body.filter(|b| !b.is_empty()) {
            let server_message = self.parser.parse(&body);
            if !server_message.is_empty() {
                normalized.message = server_message;
            }
        }

        tracing::debug!(code, message = %normalized.message, "request failed");
        self.telemetry.record(&normalized);
        Some(Err(normalized))
    }
}
