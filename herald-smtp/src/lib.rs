//! SMTP wire layer for the herald delivery engine.
//!
//! This crate owns everything with byte-exact framing requirements: the
//! outbound SMTP client (plain TCP, implicit TLS, and STARTTLS upgrade),
//! response parsing, DATA-phase dot-stuffing, and the MIME message builder
//! (quoted-printable bodies, RFC 2047 subject encoding,
//! multipart/alternative). Policy — retries, rate limits, provider choice —
//! lives upstream in `herald-delivery`.

mod base64;
pub mod client;
pub mod mime;
pub mod stuffing;

pub use client::{ClientError, Extensions, Response, ResponseLine, SmtpClient};
pub use mime::{BuiltMessage, MimeMessage};
