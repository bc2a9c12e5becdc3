//! Quoted-printable content-transfer-encoding (RFC 2045 section 6.7).

/// Longest visible line the encoder will emit, excluding the soft-break `=`.
const MAX_LINE: usize = 76;

/// Encodes bytes as quoted-printable.
///
/// Rules:
/// - `=` and any byte outside `0x20–0x7E` become `=XX` (uppercase hex)
/// - CRLF sequences are hard line breaks, re-emitted verbatim
/// - a lone `\n` or `\r` is data, not a line break, and is encoded —
///   the output therefore never contains a bare LF
/// - soft breaks (`=` CRLF) keep every line at or under [`MAX_LINE`] visible
///   characters and never land inside an `=XX` triplet
///
/// Decoding the result per RFC 2045 yields the input bytes exactly.
#[must_use]
pub fn encode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(bytes.len() + bytes.len() / 8);
    let mut col = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
            out.push_str("\r\n");
            col = 0;
            i += 2;
            continue;
        }

        let literal = (0x20..=0x7E).contains(&b) && b != b'=';
        let width = if literal { 1 } else { 3 };

        if col + width > MAX_LINE {
            out.push_str("=\r\n");
            col = 0;
        }

        if literal {
            out.push(b as char);
        } else {
            out.push('=');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }

        col += width;
        i += 1;
    }

    out
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Decodes quoted-printable data. Tolerant of malformed escapes (passed
/// through literally), strict about nothing — this exists to state the
/// round-trip property in tests, not to parse hostile input.
#[must_use]
pub fn decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'=' {
            // Soft break: swallow the marker and line ending
            if bytes.get(i + 1) == Some(&b'\r') && bytes.get(i + 2) == Some(&b'\n') {
                i += 3;
                continue;
            }
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                #[allow(clippy::cast_possible_truncation, reason = "two hex digits fit a byte")]
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    out
}
