//! The delivery engine.
//!
//! [`Mailer`] owns the full pipeline for one message:
//! normalize → suppression → template render → MIME build → rate gate →
//! provider loop × retry loop × SMTP transaction → result + log sink.
//!
//! Failover policy: the top-ranked provider gets the retry policy's full
//! budget; only when every attempt there failed *transiently* does the
//! engine move to the next-ranked provider, with a fresh budget. A terminal
//! failure anywhere stops the whole send — a 550 from one provider will be
//! a 550 from the next.
//!
//! `Mailer` is `Send + Sync`; concurrent sends share only the provider
//! registry (atomics) and the rate gate.

use std::{sync::Arc, time::Instant};

use tokio::sync::broadcast;

use herald_common::{Address, Signal, internal, tracing};
use herald_smtp::MimeMessage;

use crate::{
    error::{DeliveryError, PermanentError, SystemError},
    message::{OutboundMessage, SendRequest},
    policy::RetryPolicy,
    provider::ProviderRegistry,
    rate_limit::{RateDecision, RateLimitGate, UnlimitedGate},
    sink::{DeliveryLogSink, TracingLogSink},
    suppression::SuppressionList,
    template::{TemplateStore, render},
    transaction::SmtpTransaction,
    types::{AttemptOutcome, DeliveryAttempt, DeliveryResult, DeliveryStatus, SmtpTimeouts},
};

/// Transactional mail delivery engine.
pub struct Mailer {
    registry: Arc<ProviderRegistry>,
    templates: Option<Arc<dyn TemplateStore>>,
    suppression: Option<Arc<dyn SuppressionList>>,
    rate_gate: Arc<dyn RateLimitGate>,
    sink: Arc<dyn DeliveryLogSink>,
    retry: RetryPolicy,
    timeouts: SmtpTimeouts,
    local_identity: String,
    default_from: Option<Address>,
}

impl Mailer {
    /// Creates an engine over the given provider registry.
    ///
    /// `local_identity` is the name presented in EHLO. Collaborators default
    /// to: no template store, no suppression list, an unlimited rate gate,
    /// and a tracing log sink.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>, local_identity: impl Into<String>) -> Self {
        Self {
            registry,
            templates: None,
            suppression: None,
            rate_gate: Arc::new(UnlimitedGate),
            sink: Arc::new(TracingLogSink),
            retry: RetryPolicy::default(),
            timeouts: SmtpTimeouts::default(),
            local_identity: local_identity.into(),
            default_from: None,
        }
    }

    #[must_use]
    pub fn with_templates(mut self, templates: Arc<dyn TemplateStore>) -> Self {
        self.templates = Some(templates);
        self
    }

    #[must_use]
    pub fn with_suppression(mut self, suppression: Arc<dyn SuppressionList>) -> Self {
        self.suppression = Some(suppression);
        self
    }

    #[must_use]
    pub fn with_rate_gate(mut self, gate: Arc<dyn RateLimitGate>) -> Self {
        self.rate_gate = gate;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DeliveryLogSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: SmtpTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Sender used when a request carries no `from`.
    #[must_use]
    pub fn with_default_from(mut self, from: Address) -> Self {
        self.default_from = Some(from);
        self
    }

    /// Delivers one message. Always returns a [`DeliveryResult`] for
    /// expected failure modes; never panics on them.
    pub async fn send(&self, request: SendRequest) -> DeliveryResult {
        // A channel nobody signals: the cancellation arm stays pending.
        let (_cancel_tx, cancel_rx) = broadcast::channel(1);
        self.send_cancellable(request, cancel_rx).await
    }

    /// Delivers one message, aborting as soon as a [`Signal`] arrives.
    ///
    /// Cancellation drops the in-flight connection immediately — no QUIT,
    /// no retry — and yields a `Cancelled` failure.
    pub async fn send_cancellable(
        &self,
        request: SendRequest,
        mut cancel: broadcast::Receiver<Signal>,
    ) -> DeliveryResult {
        let started = Instant::now();
        let result = self.deliver(request, &mut cancel, started).await;

        // Fire-and-forget: a sink failure never fails the send.
        if let Err(error) = self.sink.record(&result) {
            tracing::warn!(%error, "Delivery log sink failed; result not recorded");
        }

        result
    }

    async fn deliver(
        &self,
        request: SendRequest,
        cancel: &mut broadcast::Receiver<Signal>,
        started: Instant,
    ) -> DeliveryResult {
        let message = match request.normalize(self.default_from.as_ref()) {
            Ok(message) => message,
            Err(error) => return refusal(error, started),
        };

        if let Some(suppression) = &self.suppression
            && suppression.is_suppressed(&message.to)
        {
            internal!(level = DEBUG, "recipient {} is suppressed", message.to);
            return refusal(
                PermanentError::Suppressed(message.to.envelope()).into(),
                started,
            );
        }

        let message = match self.apply_template(message) {
            Ok(message) => message,
            Err(error) => return refusal(error, started),
        };
        if let Err(error) = message.validate_bodies() {
            return refusal(error, started);
        }

        if let RateDecision::Denied { retry_after } =
            self.rate_gate.check_and_reserve(message.to.domain())
        {
            return refusal(
                DeliveryError::RateLimited {
                    retry_after_secs: retry_after.as_secs().max(1),
                },
                started,
            );
        }

        let built = {
            let mut mime = MimeMessage::new(
                message.from.clone(),
                message.to.clone(),
                message.subject.clone().unwrap_or_default(),
            );
            if let Some(text) = &message.text {
                mime = mime.text(text.clone());
            }
            if let Some(html) = &message.html {
                mime = mime.html(html.clone());
            }
            mime.build()
        };

        let ranked = self.registry.ranked();
        if ranked.is_empty() {
            return refusal(
                SystemError::Configuration("no providers configured".to_string()).into(),
                started,
            );
        }

        let mut attempts: Vec<DeliveryAttempt> = Vec::new();
        let mut last_error: Option<DeliveryError> = None;
        let mut last_provider: Option<String> = None;

        for provider in &ranked {
            let name = provider.endpoint.name.clone();
            last_provider = Some(name.clone());

            for attempt_no in 1..=self.retry.max_attempts {
                let attempt_started = Instant::now();
                let transaction = SmtpTransaction::new(
                    &provider.endpoint,
                    &self.timeouts,
                    &self.local_identity,
                    &message.from,
                    &message.to,
                    &built.data,
                    &built.message_id,
                );

                let outcome = tokio::select! {
                    biased;
                    () = wait_for_cancel(cancel) => None,
                    outcome = transaction.execute() => Some(outcome),
                };

                let elapsed_ms = elapsed_ms(attempt_started);

                let Some((result, exchange)) = outcome else {
                    // Dropping the transaction future closed the socket.
                    attempts.push(DeliveryAttempt {
                        provider: name.clone(),
                        exchange: Vec::new(),
                        outcome: AttemptOutcome::Failed {
                            reason: DeliveryError::Cancelled.to_string(),
                            transient: false,
                        },
                        elapsed_ms,
                    });
                    return conclusion(
                        Some(name),
                        None,
                        Some(DeliveryError::Cancelled),
                        attempts,
                        started,
                    );
                };

                match result {
                    Ok(message_id) => {
                        self.registry.record_outcome(&name, true);
                        attempts.push(DeliveryAttempt {
                            provider: name.clone(),
                            exchange,
                            outcome: AttemptOutcome::Sent {
                                message_id: message_id.clone(),
                            },
                            elapsed_ms,
                        });
                        return conclusion(Some(name), Some(message_id), None, attempts, started);
                    }
                    Err(error) => {
                        self.registry.record_outcome(&name, false);
                        let transient = error.is_temporary();
                        attempts.push(DeliveryAttempt {
                            provider: name.clone(),
                            exchange,
                            outcome: AttemptOutcome::Failed {
                                reason: error.to_string(),
                                transient,
                            },
                            elapsed_ms,
                        });

                        tracing::warn!(
                            provider = %name,
                            attempt = attempt_no,
                            transient,
                            %error,
                            "Delivery attempt failed"
                        );

                        if !transient {
                            return conclusion(Some(name), None, Some(error), attempts, started);
                        }
                        last_error = Some(error);

                        if attempt_no < self.retry.max_attempts {
                            let delay = self.retry.backoff_delay(attempt_no);
                            if !delay.is_zero() {
                                tokio::select! {
                                    biased;
                                    () = wait_for_cancel(cancel) => {
                                        return conclusion(
                                            Some(name),
                                            None,
                                            Some(DeliveryError::Cancelled),
                                            attempts,
                                            started,
                                        );
                                    }
                                    () = tokio::time::sleep(delay) => {}
                                }
                            }
                        }
                    }
                }
            }

            internal!(
                level = INFO,
                "provider {} exhausted its retry budget, failing over",
                name
            );
        }

        let error = last_error
            .unwrap_or_else(|| SystemError::Internal("no attempts were made".to_string()).into());
        conclusion(last_provider, None, Some(error), attempts, started)
    }

    /// Fills subject/bodies the request omitted from the named template,
    /// substituting `{{var}}` placeholders from the request's variables.
    fn apply_template(&self, mut message: OutboundMessage) -> Result<OutboundMessage, DeliveryError> {
        let Some(key) = message.template_key.clone() else {
            return Ok(message);
        };

        let Some(store) = &self.templates else {
            return Err(PermanentError::InvalidMessage(format!(
                "template {key:?} requested but no template store is configured"
            ))
            .into());
        };

        let Some(template) = store.resolve(&key) else {
            return Err(PermanentError::InvalidMessage(format!("unknown template {key:?}")).into());
        };

        let variables = &message.variables;
        if message.subject.is_none() {
            message.subject = template.subject.map(|s| render(&s, variables));
        }
        if message.text.is_none() {
            message.text = template.text.map(|t| render(&t, variables));
        }
        if message.html.is_none() {
            message.html = template.html.map(|h| render(&h, variables));
        }

        Ok(message)
    }
}

/// Resolves when a cancellation signal arrives; pends forever when the
/// sender is gone (an uncancellable send).
async fn wait_for_cancel(cancel: &mut broadcast::Receiver<Signal>) {
    loop {
        match cancel.recv().await {
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => return,
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

/// A failure before any attempt was made: contract violation, suppression,
/// rate limit, misconfiguration.
fn refusal(error: DeliveryError, started: Instant) -> DeliveryResult {
    let retry_after_secs = match &error {
        DeliveryError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
        _ => None,
    };

    DeliveryResult {
        status: DeliveryStatus::Failed,
        provider: None,
        message_id: None,
        reason: Some(error.to_string()),
        retry_after_secs,
        attempts: Vec::new(),
        total_elapsed_ms: elapsed_ms(started),
    }
}

fn conclusion(
    provider: Option<String>,
    message_id: Option<String>,
    error: Option<DeliveryError>,
    attempts: Vec<DeliveryAttempt>,
    started: Instant,
) -> DeliveryResult {
    DeliveryResult {
        status: if error.is_none() {
            DeliveryStatus::Sent
        } else {
            DeliveryStatus::Failed
        },
        provider,
        message_id,
        reason: error.map(|e| e.to_string()),
        retry_after_secs: None,
        attempts,
        total_elapsed_ms: elapsed_ms(started),
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
