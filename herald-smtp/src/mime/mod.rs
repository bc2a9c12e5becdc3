//! MIME message construction: quoted-printable bodies, RFC 2047 subject
//! encoding, multipart/alternative assembly.

pub mod header;
mod message;
pub mod quoted_printable;

pub use message::{BuiltMessage, MimeMessage};
