//! The outbound message model and its normalization boundary.
//!
//! External callers historically send loosely shaped payloads —
//! `to`/`recipient`/`email` for the recipient, `body` for the text part.
//! All of that ambiguity is absorbed in one place: [`SendRequest`] accepts
//! the legacy aliases at deserialization, and [`SendRequest::normalize`]
//! maps it onto the canonical [`OutboundMessage`]. Nothing past this module
//! deals with optional-field fallbacks.

use ahash::AHashMap;
use serde::Deserialize;

use herald_common::Address;

use crate::error::{DeliveryError, PermanentError};

/// An inbound send request, as received from the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendRequest {
    /// Sender. Falls back to the engine's configured default sender.
    #[serde(default)]
    pub from: Option<String>,

    /// Recipient. Legacy payloads call this `recipient` or `email`.
    #[serde(alias = "recipient", alias = "email")]
    pub to: String,

    #[serde(default)]
    pub subject: Option<String>,

    #[serde(default, alias = "html_body")]
    pub html: Option<String>,

    #[serde(default, alias = "text_body", alias = "body")]
    pub text: Option<String>,

    /// Template to render; its subject/bodies fill any the request omitted.
    #[serde(default, alias = "template")]
    pub template_key: Option<String>,

    /// Values substituted for `{{name}}` placeholders during rendering.
    #[serde(default)]
    pub variables: AHashMap<String, String>,

    /// Accepted for compatibility; the engine delivers synchronously, so
    /// ordering is the caller's concern.
    #[serde(default)]
    pub priority: Option<u8>,
}

impl SendRequest {
    #[must_use]
    pub fn to(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    #[must_use]
    pub fn template(mut self, key: impl Into<String>) -> Self {
        self.template_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Maps the request onto the canonical message shape.
    ///
    /// Template resolution has not happened yet, so only the structural
    /// contract is enforced here: parseable addresses and a sender from
    /// either the request or the engine default. Body presence is validated
    /// after rendering.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMessage` for a missing sender or unparseable address.
    pub fn normalize(self, default_from: Option<&Address>) -> Result<OutboundMessage, DeliveryError> {
        let to = Address::parse(&self.to).map_err(|e| {
            PermanentError::InvalidMessage(format!("invalid recipient address: {e}"))
        })?;

        let from = match &self.from {
            Some(from) => Address::parse(from).map_err(|e| {
                PermanentError::InvalidMessage(format!("invalid sender address: {e}"))
            })?,
            None => default_from
                .cloned()
                .ok_or_else(|| {
                    PermanentError::InvalidMessage(
                        "no sender address: request has no `from` and the engine has no default"
                            .to_string(),
                    )
                })?,
        };

        Ok(OutboundMessage {
            from,
            to,
            subject: self.subject,
            html: self.html,
            text: self.text,
            template_key: self.template_key,
            variables: self.variables,
        })
    }
}

/// The canonical outbound message. Immutable once constructed; consumed by
/// the engine exactly once.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub from: Address,
    pub to: Address,
    pub subject: Option<String>,
    pub html: Option<String>,
    pub text: Option<String>,
    pub template_key: Option<String>,
    pub variables: AHashMap<String, String>,
}

impl OutboundMessage {
    /// Enforces the body contract: after template rendering, at least one
    /// non-empty body must be present.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMessage` when both bodies are missing or blank.
    pub fn validate_bodies(&self) -> Result<(), DeliveryError> {
        let has_html = self.html.as_deref().is_some_and(|b| !b.trim().is_empty());
        let has_text = self.text.as_deref().is_some_and(|b| !b.trim().is_empty());

        if has_html || has_text {
            Ok(())
        } else {
            Err(PermanentError::InvalidMessage(
                "message has neither an html nor a text body".to_string(),
            )
            .into())
        }
    }
}
