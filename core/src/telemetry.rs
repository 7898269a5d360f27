//! Out-of-band error reporting.

use std::sync::Mutex;

use crate::error::NormalizedError;

/// Receives every normalized error exactly once. Fire-and-forget.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, error: &NormalizedError);
}

/// Emits each error as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, error: &NormalizedError) {
        tracing::error!(
            target: "api_core::telemetry",
            code = error.code,
            message = %error.message,
            "recorded API error"
        );
    }
}

/// Keeps recorded errors in memory.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    errors: Mutex<Vec<NormalizedError>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<NormalizedError> {
        self.errors.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.errors.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn record(&self, error: &NormalizedError) {
        self.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(error.clone());
    }
}
