//! SMTP response parsing and capability detection.

use super::error::{ClientError, Result};

/// Represents a single line in an SMTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    /// The SMTP status code (e.g., 220, 250, 550).
    pub code: u16,
    /// Whether this is the last line in a multi-line response.
    pub is_last: bool,
    /// The message text following the status code.
    pub message: String,
}

/// Represents a complete SMTP response, which may be multi-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The SMTP status code.
    pub code: u16,
    /// All message lines in the response.
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// The complete message with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// Returns `true` for a 2xx code.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Returns `true` for a 4xx code.
    #[must_use]
    pub const fn is_temporary_error(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    /// Returns `true` for a 5xx code.
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    /// Returns `true` for any error code (4xx or 5xx).
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.is_temporary_error() || self.is_permanent_error()
    }

    /// Parses a single response line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line doesn't match SMTP
    /// format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        if line.len() < 3 {
            return Err(ClientError::ParseError(format!(
                "Response line too short: '{line}'"
            )));
        }

        let code_str = &line[..3];
        let code = code_str
            .parse::<u16>()
            .map_err(|_| ClientError::ParseError(format!("Invalid status code: '{code_str}'")))?;

        let is_last = match line.as_bytes().get(3) {
            Some(b' ') => true,
            Some(b'-') => false,
            Some(c) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{}'",
                    *c as char
                )));
            }
            None => true,
        };

        let message = if line.len() > 4 {
            line[4..].to_string()
        } else {
            String::new()
        };

        Ok(ResponseLine {
            code,
            is_last,
            message,
        })
    }

    /// Parses a complete multi-line SMTP response from a buffer.
    ///
    /// Returns the parsed `Response` and the number of bytes consumed, or
    /// `None` when the buffer does not yet hold a complete response.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the response is malformed.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let text = std::str::from_utf8(buffer)?;
        let mut lines = Vec::new();
        let mut bytes_consumed = 0;
        let mut first_code = None;

        loop {
            let rest = &text[bytes_consumed..];
            let Some(end) = rest.find('\n') else {
                return Ok(None); // Incomplete line, need more data
            };

            let line = rest[..end].trim_end_matches('\r');
            bytes_consumed += end + 1;

            if line.is_empty() {
                continue;
            }

            let parsed_line = Self::parse_line(line)?;

            if let Some(code) = first_code {
                if parsed_line.code != code {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {code}, got {}",
                        parsed_line.code
                    )));
                }
            } else {
                first_code = Some(parsed_line.code);
            }

            lines.push(parsed_line.message);

            if parsed_line.is_last {
                let code = first_code.unwrap_or(parsed_line.code);
                return Ok(Some((Self::new(code, lines), bytes_consumed)));
            }
        }
    }
}

/// Server capabilities advertised in the EHLO response.
///
/// Parsed fresh from every EHLO; the client discards this on STARTTLS so a
/// pre-upgrade capability list (which a man in the middle could have forged)
/// can never influence post-upgrade behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Extensions {
    /// Server advertises the STARTTLS upgrade.
    pub starttls: bool,
    /// Server accepts 8-bit message bodies.
    pub eight_bit_mime: bool,
    /// Maximum message size accepted, when advertised.
    pub size: Option<usize>,
}

impl Extensions {
    /// Extracts capabilities from a multi-line EHLO 250 response.
    ///
    /// The first line is the server greeting and is skipped.
    #[must_use]
    pub fn from_response(response: &Response) -> Self {
        let mut extensions = Self::default();

        for line in response.lines.iter().skip(1) {
            let mut words = line.split_whitespace();
            match words.next().map(str::to_ascii_uppercase).as_deref() {
                Some("STARTTLS") => extensions.starttls = true,
                Some("8BITMIME") => extensions.eight_bit_mime = true,
                Some("SIZE") => {
                    extensions.size = words.next().and_then(|s| s.parse().ok());
                }
                _ => {}
            }
        }

        extensions
    }
}
