//! Delivery log sink.
//!
//! Fire-and-forget: the engine hands every `DeliveryResult` to the sink and
//! logs a warning if recording fails. A sink failure never fails the send —
//! the message is already accepted or refused by then.

use parking_lot::Mutex;
use thiserror::Error;

use herald_common::tracing;

use crate::types::{DeliveryResult, DeliveryStatus};

/// Error raised by a sink implementation.
#[derive(Debug, Error)]
#[error("delivery log sink error: {0}")]
pub struct SinkError(pub String);

/// Consumer of final delivery outcomes for audit and observability.
pub trait DeliveryLogSink: Send + Sync {
    /// Records one result.
    ///
    /// # Errors
    ///
    /// Implementations may fail (database down, pipe closed); the engine
    /// logs and continues.
    fn record(&self, result: &DeliveryResult) -> Result<(), SinkError>;
}

/// Default sink: structured tracing events.
#[derive(Debug, Default)]
pub struct TracingLogSink;

impl DeliveryLogSink for TracingLogSink {
    fn record(&self, result: &DeliveryResult) -> Result<(), SinkError> {
        match result.status {
            DeliveryStatus::Sent => tracing::info!(
                provider = result.provider.as_deref().unwrap_or("-"),
                message_id = result.message_id.as_deref().unwrap_or("-"),
                attempts = result.attempts.len(),
                elapsed_ms = result.total_elapsed_ms,
                "delivery succeeded"
            ),
            DeliveryStatus::Failed => tracing::warn!(
                provider = result.provider.as_deref().unwrap_or("-"),
                reason = result.reason.as_deref().unwrap_or("-"),
                attempts = result.attempts.len(),
                elapsed_ms = result.total_elapsed_ms,
                "delivery failed"
            ),
        }
        Ok(())
    }
}

/// Captures results in memory; for tests.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    records: Mutex<Vec<DeliveryResult>>,
}

impl MemoryLogSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<DeliveryResult> {
        self.records.lock().clone()
    }
}

impl DeliveryLogSink for MemoryLogSink {
    fn record(&self, result: &DeliveryResult) -> Result<(), SinkError> {
        self.records.lock().push(result.clone());
        Ok(())
    }
}
