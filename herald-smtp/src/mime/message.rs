//! MIME message construction.
//!
//! Turns a logical message (from, to, subject, html/text bodies) into a
//! single RFC 5322 byte stream: ordered headers, CRLF discipline throughout,
//! quoted-printable bodies, and a multipart/alternative container when both
//! body forms are present (text first, per convention, so the simplest
//! renderable part comes first).

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use herald_common::Address;

use super::header::encode_subject;
use super::quoted_printable;

/// The rendered message, ready for the DATA phase.
#[derive(Debug, Clone)]
pub struct BuiltMessage {
    /// The generated `Message-ID` header value, angle brackets included.
    pub message_id: String,
    /// The full header + body byte stream. CRLF line endings only.
    pub data: String,
}

/// Builder for an outbound MIME message.
///
/// Construction cannot fail for well-formed input: a message with neither
/// body renders as an empty text part, but callers are expected to have
/// validated that upstream (the engine rejects such messages before any
/// building happens).
#[derive(Debug, Clone)]
pub struct MimeMessage {
    from: Address,
    to: Address,
    subject: String,
    text: Option<String>,
    html: Option<String>,
}

impl MimeMessage {
    #[must_use]
    pub fn new(from: Address, to: Address, subject: impl Into<String>) -> Self {
        Self {
            from,
            to,
            subject: subject.into(),
            text: None,
            html: None,
        }
    }

    /// Sets the plain-text body.
    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    /// Sets the HTML body.
    #[must_use]
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    /// Renders the message into its final byte stream.
    #[must_use]
    pub fn build(&self) -> BuiltMessage {
        let message_id = generate_message_id(self.from.domain().as_str());

        let mut out = String::with_capacity(1024);
        out.push_str(&format!("Message-ID: {message_id}\r\n"));
        out.push_str(&format!("Date: {}\r\n", rfc2822_date()));
        out.push_str(&format!("From: {}\r\n", self.from.header_value()));
        out.push_str(&format!("To: {}\r\n", self.to.header_value()));
        out.push_str(&format!("Subject: {}\r\n", encode_subject(&self.subject)));
        out.push_str("MIME-Version: 1.0\r\n");

        let text = self.text.as_deref().map(normalize_newlines);
        let html = self.html.as_deref().map(normalize_newlines);

        match (text, html) {
            (Some(text), Some(html)) => {
                let text_part = quoted_printable::encode(&text);
                let html_part = quoted_printable::encode(&html);
                let boundary = generate_boundary(&[&text_part, &html_part]);

                out.push_str(&format!(
                    "Content-Type: multipart/alternative; boundary=\"{boundary}\"\r\n"
                ));
                out.push_str("\r\n");

                out.push_str(&format!("--{boundary}\r\n"));
                out.push_str("Content-Type: text/plain; charset=UTF-8\r\n");
                out.push_str("Content-Transfer-Encoding: quoted-printable\r\n");
                out.push_str("\r\n");
                out.push_str(&text_part);
                out.push_str("\r\n");

                out.push_str(&format!("--{boundary}\r\n"));
                out.push_str("Content-Type: text/html; charset=UTF-8\r\n");
                out.push_str("Content-Transfer-Encoding: quoted-printable\r\n");
                out.push_str("\r\n");
                out.push_str(&html_part);
                out.push_str("\r\n");

                out.push_str(&format!("--{boundary}--\r\n"));
            }
            (text, html) => {
                let (content_type, body) = match (&text, &html) {
                    (_, Some(html)) => ("text/html", html.as_str()),
                    (Some(text), None) => ("text/plain", text.as_str()),
                    (None, None) => ("text/plain", ""),
                };

                out.push_str(&format!(
                    "Content-Type: {content_type}; charset=UTF-8\r\n"
                ));
                out.push_str("Content-Transfer-Encoding: quoted-printable\r\n");
                out.push_str("\r\n");
                out.push_str(&quoted_printable::encode(body));
                out.push_str("\r\n");
            }
        }

        BuiltMessage {
            message_id,
            data: out,
        }
    }
}

/// Converts any line-ending convention to CRLF before encoding, so the
/// quoted-printable output carries real line breaks instead of `=0A` runs.
fn normalize_newlines(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', "\r\n")
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Globally unique Message-ID: timestamp + random token + sending domain.
fn generate_message_id(domain: &str) -> String {
    let token: u64 = rand::rng().random();
    format!("<{}.{token:016x}@{domain}>", unix_millis())
}

/// Generates a boundary that provably does not occur in any part body.
fn generate_boundary(parts: &[&str]) -> String {
    loop {
        let token: u32 = rand::rng().random();
        let boundary = format!("----=_Part_{}_{token:08x}", unix_millis());
        if parts.iter().all(|part| !part.contains(&boundary)) {
            return boundary;
        }
    }
}

/// `Date` header value in RFC 2822 format, UTC.
fn rfc2822_date() -> String {
    chrono::Utc::now().to_rfc2822()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn build_simple() -> BuiltMessage {
        MimeMessage::new(address("x@y.com"), address("a@b.com"), "Hi")
            .text("Hello")
            .build()
    }

    #[test]
    fn test_plain_text_only() {
        let built = build_simple();

        assert!(built.data.contains("From: x@y.com\r\n"));
        assert!(built.data.contains("To: a@b.com\r\n"));
        assert!(built.data.contains("Subject: Hi\r\n"));
        assert!(built.data.contains("MIME-Version: 1.0\r\n"));
        assert!(built.data.contains("Content-Type: text/plain; charset=UTF-8\r\n"));
        assert!(built.data.contains("Content-Transfer-Encoding: quoted-printable\r\n"));
        assert!(built.data.contains("Hello"));
        assert!(!built.data.contains("multipart"));
    }

    #[test]
    fn test_html_only() {
        let built = MimeMessage::new(address("x@y.com"), address("a@b.com"), "Hi")
            .html("<p>Hello</p>")
            .build();

        assert!(built.data.contains("Content-Type: text/html; charset=UTF-8\r\n"));
        assert!(!built.data.contains("multipart"));
    }

    #[test]
    fn test_multipart_text_before_html() {
        let built = MimeMessage::new(address("x@y.com"), address("a@b.com"), "Hi")
            .text("plain version")
            .html("<p>rich version</p>")
            .build();

        assert!(built.data.contains("multipart/alternative"));
        let text_pos = built.data.find("text/plain").unwrap();
        let html_pos = built.data.find("text/html").unwrap();
        assert!(text_pos < html_pos);
    }

    #[test]
    fn test_multipart_structure_parses() {
        let built = MimeMessage::new(address("x@y.com"), address("a@b.com"), "Hi")
            .text("plain body")
            .html("<p>html body</p>")
            .build();

        let parsed = mailparse::parse_mail(built.data.as_bytes()).unwrap();
        assert_eq!(parsed.subparts.len(), 2);
        assert_eq!(parsed.subparts[0].get_body().unwrap().trim(), "plain body");
        assert_eq!(
            parsed.subparts[1].get_body().unwrap().trim(),
            "<p>html body</p>"
        );
    }

    #[test]
    fn test_boundary_not_in_either_body() {
        let built = MimeMessage::new(address("x@y.com"), address("a@b.com"), "Hi")
            .text("some text body")
            .html("<p>some html body</p>")
            .build();

        let boundary_line = built
            .data
            .lines()
            .find(|l| l.contains("boundary="))
            .unwrap();
        let boundary = boundary_line
            .split("boundary=\"")
            .nth(1)
            .unwrap()
            .trim_end_matches('"');

        // Exactly two inner boundary markers plus the closing marker.
        assert_eq!(built.data.matches(&format!("--{boundary}\r\n")).count(), 2);
        assert_eq!(built.data.matches(&format!("--{boundary}--")).count(), 1);
    }

    #[test]
    fn test_no_bare_lf() {
        let built = MimeMessage::new(address("x@y.com"), address("a@b.com"), "Hi")
            .text("body with\nunix newlines\n")
            .html("<p>html</p>\n")
            .build();

        let bytes = built.data.as_bytes();
        for (i, b) in bytes.iter().enumerate() {
            if *b == b'\n' {
                assert_eq!(bytes[i - 1], b'\r', "bare LF at offset {i}");
            }
        }
    }

    #[test]
    fn test_exactly_one_blank_line_separates_headers() {
        let built = build_simple();
        let header_end = built.data.find("\r\n\r\n").unwrap();
        let headers = &built.data[..header_end];
        assert!(headers.lines().all(|l| !l.is_empty()));
    }

    #[test]
    fn test_message_id_present_and_unique() {
        let a = build_simple();
        let b = build_simple();

        assert!(a.data.contains(&format!("Message-ID: {}", a.message_id)));
        assert!(a.message_id.starts_with('<'));
        assert!(a.message_id.ends_with("@y.com>"));
        assert_ne!(a.message_id, b.message_id);
    }

    #[test]
    fn test_structurally_identical_output() {
        // Pure apart from Message-ID/Date/boundary randomness.
        let strip = |data: &str| -> String {
            data.lines()
                .filter(|l| {
                    !l.starts_with("Message-ID:")
                        && !l.starts_with("Date:")
                        && !l.contains("_Part_")
                        && !l.contains("boundary=")
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        let a = MimeMessage::new(address("x@y.com"), address("a@b.com"), "Hi")
            .text("same")
            .html("<p>same</p>")
            .build();
        let b = MimeMessage::new(address("x@y.com"), address("a@b.com"), "Hi")
            .text("same")
            .html("<p>same</p>")
            .build();

        assert_eq!(strip(&a.data), strip(&b.data));
    }

    #[test]
    fn test_display_names_kept_in_headers() {
        let built = MimeMessage::new(
            address("Shop <orders@shop.example>"),
            address("Jane Doe <jane@example.com>"),
            "Your order",
        )
        .text("Thanks!")
        .build();

        assert!(built.data.contains("From: Shop <orders@shop.example>\r\n"));
        assert!(built.data.contains("To: Jane Doe <jane@example.com>\r\n"));
    }

    #[test]
    fn test_non_ascii_subject_encoded() {
        let built = MimeMessage::new(address("x@y.com"), address("a@b.com"), "Grüße")
            .text("hi")
            .build();

        assert!(built.data.contains("Subject: =?UTF-8?Q?"));
        let parsed = mailparse::parse_mail(built.data.as_bytes()).unwrap();
        let subject = parsed
            .headers
            .iter()
            .find(|h| h.get_key() == "Subject")
            .unwrap()
            .get_value();
        assert_eq!(subject, "Grüße");
    }

    #[test]
    fn test_quoted_printable_body_decodes() {
        let built = MimeMessage::new(address("x@y.com"), address("a@b.com"), "Hi")
            .text("Grüße = viele Grüße")
            .build();

        let parsed = mailparse::parse_mail(built.data.as_bytes()).unwrap();
        assert_eq!(parsed.get_body().unwrap().trim(), "Grüße = viele Grüße");
    }
}
