//! DATA-phase dot-stuffing (RFC 5321 section 4.5.2).
//!
//! A line of the DATA payload that begins with `.` would be mistaken for the
//! end-of-data marker, so the client doubles the leading dot before
//! transmission and the receiver strips it. This is a transport-level escape
//! applied exactly once to the complete payload after MIME construction —
//! never per-part, and never to the header block in isolation (headers and
//! body travel through here together as one payload).

/// Doubles the leading `.` of every line. No other byte is altered.
#[must_use]
pub fn dot_stuff(body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 8);
    let mut at_line_start = true;

    for c in body.chars() {
        if at_line_start && c == '.' {
            out.push('.');
        }
        out.push(c);
        at_line_start = c == '\n';
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_dot_doubled() {
        assert_eq!(dot_stuff(".hidden\r\n"), "..hidden\r\n");
        assert_eq!(dot_stuff("a\r\n.b\r\nc\r\n"), "a\r\n..b\r\nc\r\n");
    }

    #[test]
    fn test_dot_at_start_of_payload() {
        assert_eq!(dot_stuff("."), "..");
        assert_eq!(dot_stuff(".\r\n"), "..\r\n");
    }

    #[test]
    fn test_interior_dots_untouched() {
        assert_eq!(dot_stuff("a.b\r\nc.d\r\n"), "a.b\r\nc.d\r\n");
        assert_eq!(dot_stuff("end.\r\n"), "end.\r\n");
    }

    #[test]
    fn test_non_dot_lines_unaltered() {
        let body = "Subject: ok\r\n\r\nplain text\r\nmore\r\n";
        assert_eq!(dot_stuff(body), body);
    }

    #[test]
    fn test_every_original_dot_line_gains_exactly_one_dot() {
        let body = ".a\r\n..b\r\nplain\r\n.\r\n";
        let stuffed = dot_stuff(body);
        assert_eq!(stuffed, "..a\r\n...b\r\nplain\r\n..\r\n");

        // Same number of lines, and only dot-leading lines grew.
        let original: Vec<&str> = body.split("\r\n").collect();
        let result: Vec<&str> = stuffed.split("\r\n").collect();
        assert_eq!(original.len(), result.len());
        for (before, after) in original.iter().zip(&result) {
            if before.starts_with('.') {
                assert_eq!(after.len(), before.len() + 1);
            } else {
                assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(dot_stuff(""), "");
    }
}
