//! Type definitions for delivery attempts and outcomes.

use serde::{Deserialize, Serialize};

/// SMTP operation timeout configuration.
///
/// Three independent budgets: connection establishment, each command
/// round-trip, and the DATA-termination response (servers routinely take
/// longer to accept a body than to answer a command).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpTimeouts {
    /// Timeout for TCP connect plus, on implicit-TLS endpoints, the TLS
    /// handshake.
    ///
    /// Default: 15 seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// Timeout for each command round-trip (EHLO, AUTH, MAIL FROM, RCPT TO,
    /// DATA, STARTTLS including the handshake it triggers, QUIT).
    ///
    /// Default: 10 seconds
    #[serde(default = "default_command_timeout")]
    pub command_secs: u64,

    /// Timeout for transmitting the message body and receiving the final
    /// 250.
    ///
    /// Default: 15 seconds
    #[serde(default = "default_data_timeout")]
    pub data_secs: u64,
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout(),
            command_secs: default_command_timeout(),
            data_secs: default_data_timeout(),
        }
    }
}

const fn default_connect_timeout() -> u64 {
    15
}

const fn default_command_timeout() -> u64 {
    10
}

const fn default_data_timeout() -> u64 {
    15
}

/// Final status of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// Terminal outcome of a single connection lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Message accepted; carries the message identifier (provider-assigned
    /// when one could be extracted from the final 250, otherwise ours).
    Sent { message_id: String },
    /// Attempt failed. `transient` records how the retry controller
    /// classified it.
    Failed { reason: String, transient: bool },
}

/// One connection lifecycle: the command/response exchange, terminal
/// outcome, and elapsed time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    /// Name of the provider endpoint this attempt ran against.
    pub provider: String,
    /// (command, response) pairs as they went over the wire, credentials
    /// masked.
    pub exchange: Vec<(String, String)>,
    /// Terminal outcome of the attempt.
    pub outcome: AttemptOutcome,
    /// Wall-clock duration of the attempt in milliseconds.
    pub elapsed_ms: u64,
}

/// Final outcome for one outbound message.
///
/// The engine always returns one of these for expected failure modes;
/// panics are reserved for programming errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub status: DeliveryStatus,
    /// Provider that accepted the message (or the last one tried).
    pub provider: Option<String>,
    /// Message identifier, present when the message was sent.
    pub message_id: Option<String>,
    /// Failure reason, present when `status` is `Failed`.
    pub reason: Option<String>,
    /// Seconds to wait before resubmitting, when the rate limiter refused.
    pub retry_after_secs: Option<u64>,
    /// Every connection attempt made, in order, across providers.
    pub attempts: Vec<DeliveryAttempt>,
    /// Total wall-clock time spent, including backoff waits.
    pub total_elapsed_ms: u64,
}

impl DeliveryResult {
    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.status == DeliveryStatus::Sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_defaults() {
        let timeouts = SmtpTimeouts::default();
        assert_eq!(timeouts.connect_secs, 15);
        assert_eq!(timeouts.command_secs, 10);
        assert_eq!(timeouts.data_secs, 15);
    }

    #[test]
    fn test_timeouts_deserialize_with_defaults() {
        let timeouts: SmtpTimeouts = serde_json::from_str(r#"{"command_secs": 5}"#).unwrap();
        assert_eq!(timeouts.command_secs, 5);
        assert_eq!(timeouts.connect_secs, 15);
    }

    #[test]
    fn test_result_status() {
        let result = DeliveryResult {
            status: DeliveryStatus::Sent,
            provider: Some("primary".to_string()),
            message_id: Some("<abc@x>".to_string()),
            reason: None,
            retry_after_secs: None,
            attempts: Vec::new(),
            total_elapsed_ms: 12,
        };
        assert!(result.is_sent());
    }
}
