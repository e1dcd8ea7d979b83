//! Logging helpers for user-supplied text.
//! Relayed messages are multi-line and arbitrary; logs must stay one line per event.

/// Longest preview of user text written to the log.
pub const MAX_PREVIEW: usize = 120;

/// Escape a string for single-line logging and cap its length.
///
/// Newlines, carriage returns, tabs and backslashes become their escaped
/// forms; other control characters are written as `\xNN`. Text longer than
/// [MAX_PREVIEW] characters is cut and ends with `…`.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_payload_stays_on_one_line() {
        assert_eq!(escape_log("IT-407:\nhello\tthere"), "IT-407:\\nhello\\tthere");
    }

    #[test]
    fn long_text_is_truncated() {
        let long = "x".repeat(MAX_PREVIEW + 50);
        let esc = escape_log(&long);
        assert_eq!(esc.chars().count(), MAX_PREVIEW + 1);
        assert!(esc.ends_with('…'));
    }
}
