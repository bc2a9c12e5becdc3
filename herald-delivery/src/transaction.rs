//! SMTP transaction execution.
//!
//! Drives one complete submission against one endpoint:
//! connect (implicit TLS on 465) → greeting → EHLO → optional STARTTLS +
//! re-EHLO → AUTH PLAIN → MAIL FROM → RCPT TO → DATA → body → QUIT.
//!
//! Every step runs under its own timeout and must see the expected status
//! family before the next command goes out; anything else ends the attempt
//! with a classified error. The connection belongs to this transaction
//! alone — it is never reused, and dropping the transaction (cancellation)
//! closes the socket without a QUIT.

use std::time::Duration;

use tokio::time::timeout;

use herald_common::{Address, tracing};
use herald_smtp::client::{ClientError, Response, SmtpClient};

use crate::{
    error::{DeliveryError, PermanentError, SystemError, TemporaryError},
    provider::SmtpEndpoint,
    types::SmtpTimeouts,
};

/// One submission attempt against one endpoint.
pub(crate) struct SmtpTransaction<'a> {
    endpoint: &'a SmtpEndpoint,
    timeouts: &'a SmtpTimeouts,
    /// Name presented in EHLO.
    local_identity: &'a str,
    from: &'a Address,
    to: &'a Address,
    /// The complete MIME byte stream (headers + body).
    data: &'a str,
    /// Message-ID to report when the server's final 250 carries no usable
    /// queue identifier.
    fallback_message_id: &'a str,
}

impl<'a> SmtpTransaction<'a> {
    pub(crate) const fn new(
        endpoint: &'a SmtpEndpoint,
        timeouts: &'a SmtpTimeouts,
        local_identity: &'a str,
        from: &'a Address,
        to: &'a Address,
        data: &'a str,
        fallback_message_id: &'a str,
    ) -> Self {
        Self {
            endpoint,
            timeouts,
            local_identity,
            from,
            to,
            data,
            fallback_message_id,
        }
    }

    /// Runs the transaction to completion.
    ///
    /// Returns the delivery outcome together with the (command, response)
    /// exchange that took place, for the attempt record. The exchange is
    /// present on failures too — that is usually when it matters.
    pub(crate) async fn execute(self) -> (Result<String, DeliveryError>, Vec<(String, String)>) {
        let mut client = match self.connect_and_greet().await {
            Ok(client) => client,
            Err(error) => return (Err(error), Vec::new()),
        };

        let result = self.run(&mut client).await;

        if result.is_ok() {
            // The message is already accepted; QUIT is courtesy only.
            let quit_budget = Duration::from_secs(self.timeouts.command_secs);
            match timeout(quit_budget, client.quit()).await {
                Ok(Ok(_)) => {}
                Ok(Err(error)) => {
                    tracing::debug!(server = %self.endpoint.address(), %error, "QUIT failed after accepted delivery");
                }
                Err(_) => {
                    tracing::debug!(server = %self.endpoint.address(), "QUIT timed out after accepted delivery");
                }
            }
        }

        let transcript = client
            .transcript()
            .iter()
            .map(|(command, response)| {
                (
                    command.clone(),
                    format!("{} {}", response.code, response.lines.join(" ")),
                )
            })
            .collect();

        (result, transcript)
    }

    /// Opens the connection (TLS-first on implicit-TLS endpoints) and reads
    /// the 220 greeting.
    async fn connect_and_greet(&self) -> Result<SmtpClient, DeliveryError> {
        let addr = self.endpoint.address();
        let connect_budget = Duration::from_secs(self.timeouts.connect_secs);

        let connected = timeout(connect_budget, async {
            if self.endpoint.uses_implicit_tls() {
                SmtpClient::connect_tls(
                    &addr,
                    self.endpoint.host.clone(),
                    self.endpoint.accept_invalid_certs,
                )
                .await
            } else {
                SmtpClient::connect(&addr, self.endpoint.host.clone())
                    .await
                    .map(|client| client.accept_invalid_certs(self.endpoint.accept_invalid_certs))
            }
        })
        .await
        .map_err(|_| {
            TemporaryError::Timeout(format!("connect to {addr} timed out after {connect_budget:?}"))
        })?;

        let mut client = connected.map_err(|error| match error {
            ClientError::TlsError(msg) => TemporaryError::TlsHandshakeFailed(msg),
            other => TemporaryError::ConnectionFailed(format!("Failed to connect to {addr}: {other}")),
        })?;

        let greeting = self
            .step("greeting", self.timeouts.command_secs, client.read_greeting())
            .await?;

        if !greeting.is_success() {
            return Err(TemporaryError::ServerBusy(format!(
                "Server rejected connection: {}",
                greeting.message()
            ))
            .into());
        }

        Ok(client)
    }

    /// The command sequence after the greeting.
    async fn run(&self, client: &mut SmtpClient) -> Result<String, DeliveryError> {
        let cmd = self.timeouts.command_secs;

        let ehlo = self.step("EHLO", cmd, client.ehlo(self.local_identity)).await?;
        if !ehlo.is_success() {
            return Err(classify("EHLO", &ehlo));
        }

        if self.endpoint.wants_starttls() {
            if !client.extensions().starttls {
                return Err(PermanentError::TlsRequired(format!(
                    "{} does not advertise STARTTLS",
                    self.endpoint.name
                ))
                .into());
            }

            // starttls() performs the handshake on 220 and discards the
            // pre-upgrade capability list.
            let response = self.step("STARTTLS", cmd, client.starttls()).await?;
            if !response.is_success() {
                return Err(PermanentError::TlsRequired(format!(
                    "Server rejected STARTTLS: {} {}",
                    response.code,
                    response.message()
                ))
                .into());
            }

            let ehlo = self
                .step("EHLO after STARTTLS", cmd, client.ehlo(self.local_identity))
                .await?;
            if !ehlo.is_success() {
                return Err(classify("EHLO after STARTTLS", &ehlo));
            }
        }

        if let Some((username, password)) = self.endpoint.credentials() {
            let response = self
                .step("AUTH", cmd, client.auth_plain(username, password))
                .await?;
            if !response.is_success() {
                return Err(if response.is_permanent_error() {
                    PermanentError::AuthenticationFailed(format!(
                        "{} {}",
                        response.code,
                        response.message()
                    ))
                    .into()
                } else if response.is_temporary_error() {
                    TemporaryError::SmtpTemporary(format!(
                        "AUTH deferred: {} {}",
                        response.code,
                        response.message()
                    ))
                    .into()
                } else {
                    SystemError::Internal(format!(
                        "Unexpected AUTH response: {} {}",
                        response.code,
                        response.message()
                    ))
                    .into()
                });
            }
        }

        // Envelope commands carry the bare address; display names stay in
        // the headers.
        let response = self
            .step("MAIL FROM", cmd, client.mail_from(&self.from.envelope(), None))
            .await?;
        if !response.is_success() {
            return Err(classify("MAIL FROM", &response));
        }

        let response = self
            .step("RCPT TO", cmd, client.rcpt_to(&self.to.envelope()))
            .await?;
        if !response.is_success() {
            return Err(if response.is_permanent_error() {
                PermanentError::InvalidRecipient(format!(
                    "Server rejected RCPT TO {}: {} {}",
                    self.to.envelope(),
                    response.code,
                    response.message()
                ))
                .into()
            } else {
                classify("RCPT TO", &response)
            });
        }

        let response = self.step("DATA", cmd, client.data()).await?;
        if !(300..400).contains(&response.code) {
            return Err(classify("DATA", &response));
        }

        let response = self
            .step(
                "DATA termination",
                self.timeouts.data_secs,
                client.send_data(self.data),
            )
            .await?;
        if !response.is_success() {
            return Err(classify("message body", &response));
        }

        Ok(extract_queue_id(&response)
            .unwrap_or_else(|| self.fallback_message_id.to_string()))
    }

    /// Runs one protocol step under its timeout budget.
    async fn step<T>(
        &self,
        what: &str,
        budget_secs: u64,
        operation: impl Future<Output = herald_smtp::client::Result<T>>,
    ) -> Result<T, DeliveryError> {
        let budget = Duration::from_secs(budget_secs);
        match timeout(budget, operation).await {
            Ok(result) => result.map_err(DeliveryError::from),
            Err(_) => {
                Err(TemporaryError::Timeout(format!("{what} timed out after {budget:?}")).into())
            }
        }
    }
}

/// Maps an unexpected response to the error taxonomy by status family.
fn classify(what: &str, response: &Response) -> DeliveryError {
    let detail = format!(
        "Server rejected {what}: {} {}",
        response.code,
        response.message()
    );

    if response.is_permanent_error() {
        PermanentError::MessageRejected(detail).into()
    } else if response.is_temporary_error() {
        TemporaryError::SmtpTemporary(detail).into()
    } else {
        SystemError::Internal(format!(
            "Unexpected response to {what}: {} {}",
            response.code,
            response.message()
        ))
        .into()
    }
}

/// Pulls a provider-assigned queue identifier out of the final 250 line,
/// when the last token plausibly is one (`250 2.0.0 Ok: queued as 4xGk29`).
fn extract_queue_id(response: &Response) -> Option<String> {
    let token = response.lines.last()?.split_whitespace().next_back()?;

    let plausible = token.len() >= 4
        && !token.contains('@')
        && token.chars().any(|c| c.is_ascii_digit())
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    plausible.then(|| token.to_string())
}
