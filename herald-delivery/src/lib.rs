//! Transactional email delivery engine.
//!
//! Accepts a logical message (recipient, subject, html/text bodies, template
//! variables), renders it into an SMTP/MIME byte stream, and submits it to
//! one of several configured providers over a negotiated — optionally
//! TLS-upgraded — connection, with bounded retries, per-domain rate
//! limiting, provider health tracking, and an auditable outcome for every
//! send.

mod engine;
mod error;
mod message;
pub mod policy;
mod provider;
mod rate_limit;
mod sink;
mod suppression;
pub mod template;
mod transaction;
mod types;

pub use engine::Mailer;
pub use error::{DeliveryError, PermanentError, SystemError, TemporaryError};
pub use message::{OutboundMessage, SendRequest};
pub use policy::RetryPolicy;
pub use provider::{ProviderRegistry, RankedEndpoint, SmtpEndpoint};
pub use rate_limit::{
    DomainRateLimit, RateDecision, RateLimitConfig, RateLimitGate, TokenBucketGate, UnlimitedGate,
};
pub use sink::{DeliveryLogSink, MemoryLogSink, SinkError, TracingLogSink};
pub use suppression::{MemorySuppressionList, SuppressionList};
pub use template::{EmailTemplate, MemoryTemplateStore, TemplateStore};
pub use types::{
    AttemptOutcome, DeliveryAttempt, DeliveryResult, DeliveryStatus, SmtpTimeouts,
};

// Re-export the shared vocabulary so embedders need only this crate.
pub use herald_common::{Address, Domain, Secret, Signal};
