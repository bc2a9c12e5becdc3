//! Header value encoding (RFC 2047 encoded words).

/// Maximum length of the encoded text inside one `=?UTF-8?Q?...?=` word,
/// keeping the whole word within the 75-character limit of RFC 2047.
const MAX_ENCODED_TEXT: usize = 63;

/// Prepares a Subject value for the header block.
///
/// Pure-ASCII subjects pass through with control characters stripped and
/// whitespace collapsed to a single line. Anything containing non-ASCII
/// bytes becomes one or more Q-encoded words, folded with CRLF + space
/// between them.
#[must_use]
pub fn encode_subject(subject: &str) -> String {
    if subject.is_ascii() {
        return sanitize_ascii(subject);
    }

    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for c in subject.chars() {
        let encoded = q_encode_char(c);
        if current.len() + encoded.len() > MAX_ENCODED_TEXT {
            words.push(std::mem::take(&mut current));
        }
        current.push_str(&encoded);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|w| format!("=?UTF-8?Q?{w}?="))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

/// Q-encodes one character. Space maps to `_`; `=`, `?`, `_`, and anything
/// outside printable ASCII map to `=XX` per UTF-8 byte.
fn q_encode_char(c: char) -> String {
    if c == ' ' {
        return "_".to_string();
    }

    let mut buf = [0u8; 4];
    c.encode_utf8(&mut buf)
        .bytes()
        .map(|b| {
            if (0x21..=0x7E).contains(&b) && b != b'=' && b != b'?' && b != b'_' {
                (b as char).to_string()
            } else {
                format!("={b:02X}")
            }
        })
        .collect()
}

/// Strips control characters and collapses the value to one line.
fn sanitize_ascii(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_was_space = false;

    for c in value.chars() {
        let c = match c {
            '\r' | '\n' | '\t' => ' ',
            c if c.is_control() => continue,
            c => c,
        };

        if c == ' ' {
            if last_was_space {
                continue;
            }
            last_was_space = true;
        } else {
            last_was_space = false;
        }
        out.push(c);
    }

    out.trim().to_string()
}
