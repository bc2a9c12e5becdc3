//! Typed error handling for delivery operations.
//!
//! The taxonomy drives retry behavior, so classification happens in exactly
//! one place: low-level client errors are converted here, and the retry
//! controller only ever asks "is this temporary?". The categories:
//!
//! - Permanent (5xx SMTP codes, contract violations) - don't retry
//! - Temporary (4xx SMTP codes, network faults) - retry with backoff
//! - System (protocol violations, internal errors) - don't retry
//! - `RateLimited` - refused before any network IO, outside the retry budget
//! - `Cancelled` - caller aborted, never retried

use thiserror::Error;

use herald_smtp::ClientError;

/// Top-level delivery error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Permanent failure that should not be retried (e.g., 5xx SMTP codes).
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    /// Temporary failure that can be retried with backoff (e.g., 4xx SMTP codes).
    #[error("Temporary failure: {0}")]
    Temporary(#[from] TemporaryError),

    /// System-level error (protocol violations, internal errors).
    #[error("System error: {0}")]
    System(#[from] SystemError),

    /// Refused by the rate limiter before any network IO. Not counted
    /// against the SMTP retry budget; the caller decides when to resubmit.
    #[error("Rate limited; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Caller-initiated cancellation. Distinct from both temporary and
    /// permanent failures; never retried.
    #[error("Cancelled by caller")]
    Cancelled,
}

/// Permanent errors that should not be retried.
#[derive(Debug, Error)]
pub enum PermanentError {
    /// Caller contract violation: missing recipient, missing body, or an
    /// unparseable address. Detected before any network activity.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Recipient is on the suppression list.
    #[error("suppressed: {0}")]
    Suppressed(String),

    /// Recipient address was rejected by the server.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Message was rejected by the server (e.g., policy violation, spam).
    #[error("Message rejected: {0}")]
    MessageRejected(String),

    /// SMTP authentication failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// TLS is required for this endpoint but not available.
    #[error("TLS required: {0}")]
    TlsRequired(String),
}

/// Temporary errors that should be retried with exponential backoff.
#[derive(Debug, Error)]
pub enum TemporaryError {
    /// Failed to establish connection to the mail server.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Server is temporarily busy or unavailable.
    #[error("Server busy: {0}")]
    ServerBusy(String),

    /// An operation exceeded its timeout budget.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Server returned a temporary failure code.
    #[error("Temporary SMTP error: {0}")]
    SmtpTemporary(String),

    /// TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),
}

/// System-level errors that indicate internal problems.
#[derive(Debug, Error)]
pub enum SystemError {
    /// Engine misconfiguration (e.g., no providers).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeliveryError {
    /// Returns `true` if this error is temporary and should be retried.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    /// Returns `true` if this error is permanent and should not be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Returns `true` if the caller cancelled the send.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Convert from SMTP `ClientError` to `DeliveryError`.
///
/// - **4xx SMTP codes** → Temporary (should retry)
/// - **5xx SMTP codes** → Permanent (should not retry)
/// - **Connection/I/O errors** → Temporary (network issues are transient)
/// - **TLS errors** → Temporary (handshake may succeed on retry)
/// - **Parse/UTF-8 errors** → System (protocol violation)
impl From<ClientError> for DeliveryError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::SmtpError { code, message } if (400..500).contains(&code) => {
                Self::Temporary(TemporaryError::SmtpTemporary(format!("{code} {message}")))
            }

            ClientError::SmtpError { code, message } if (500..600).contains(&code) => {
                Self::Permanent(PermanentError::MessageRejected(format!("{code} {message}")))
            }

            ClientError::SmtpError { code, message }
            | ClientError::UnexpectedResponse { code, message } => Self::System(
                SystemError::Internal(format!("Unexpected SMTP response: {code} {message}")),
            ),

            ClientError::Io(e) => {
                Self::Temporary(TemporaryError::ConnectionFailed(format!("I/O error: {e}")))
            }

            ClientError::ConnectionClosed => Self::Temporary(TemporaryError::ConnectionFailed(
                "Connection closed unexpectedly".to_string(),
            )),

            ClientError::TlsError(msg) => Self::Temporary(TemporaryError::TlsHandshakeFailed(msg)),

            ClientError::ParseError(msg) => Self::System(SystemError::Internal(format!(
                "SMTP protocol parse error: {msg}"
            ))),

            ClientError::Utf8Error(e) => {
                Self::System(SystemError::Internal(format!("UTF-8 decoding error: {e}")))
            }
        }
    }
}
