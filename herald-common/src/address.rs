//! Sender and recipient addresses.
//!
//! An [`Address`] carries both forms an email address takes on the wire: the
//! header form (which may include a display name, used for `From:`/`To:`)
//! and the bare envelope form (`local@domain`, the only form permitted in
//! `MAIL FROM`/`RCPT TO`). Conflating the two is a classic source of
//! rejected envelopes, so the envelope form is only reachable through
//! [`Address::envelope`].

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Domain;

/// Errors produced when parsing an address from its textual form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("missing '@' separator in {0:?}")]
    MissingAt(String),

    #[error("missing local part in {0:?}")]
    MissingLocalPart(String),

    #[error("missing domain in {0:?}")]
    MissingDomain(String),

    #[error("unterminated angle bracket in {0:?}")]
    UnterminatedAngle(String),

    #[error("whitespace or control character inside address {0:?}")]
    InvalidCharacter(String),
}

/// A parsed email address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    display_name: Option<String>,
    local_part: String,
    domain: Domain,
}

impl Address {
    /// Parse an address from any of the common textual forms:
    /// `user@example.com`, `<user@example.com>`,
    /// `Name <user@example.com>`, `"Name" <user@example.com>`.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] when the input has no `@`, an empty local
    /// part or domain, an unterminated `<`, or whitespace/control characters
    /// inside the addr-spec itself.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }

        let (display_name, spec) = match (trimmed.rfind('<'), trimmed.ends_with('>')) {
            (Some(open), true) => {
                let name = trimmed[..open].trim().trim_matches('"').trim();
                let spec = &trimmed[open + 1..trimmed.len() - 1];
                let name = (!name.is_empty()).then(|| name.to_string());
                (name, spec.trim())
            }
            (Some(_), false) => return Err(AddressError::UnterminatedAngle(trimmed.to_string())),
            (None, _) => (None, trimmed),
        };

        if spec
            .chars()
            .any(|c| c.is_whitespace() || c.is_ascii_control())
        {
            return Err(AddressError::InvalidCharacter(spec.to_string()));
        }

        let (local_part, domain) = spec
            .rsplit_once('@')
            .ok_or_else(|| AddressError::MissingAt(spec.to_string()))?;

        if local_part.is_empty() {
            return Err(AddressError::MissingLocalPart(spec.to_string()));
        }
        if domain.is_empty() {
            return Err(AddressError::MissingDomain(spec.to_string()));
        }

        Ok(Self {
            display_name,
            local_part: local_part.to_string(),
            domain: Domain::from(domain),
        })
    }

    /// The bare `local@domain` form used in SMTP envelope commands.
    #[must_use]
    pub fn envelope(&self) -> String {
        format!("{}@{}", self.local_part, self.domain)
    }

    /// The form used in message headers, keeping the display name.
    #[must_use]
    pub fn header_value(&self) -> String {
        match &self.display_name {
            Some(name) => format!("{name} <{}@{}>", self.local_part, self.domain),
            None => self.envelope(),
        }
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    #[must_use]
    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    #[must_use]
    pub fn domain(&self) -> &Domain {
        &self.domain
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

impl std::str::FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.header_value()
    }
}
