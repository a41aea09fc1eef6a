//! Logging utilities for sanitizing producer-supplied strings and payload
//! bytes so logs stay single-line and bounded.

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
///   Truncates very long strings (over `MAX_PREVIEW`) with an ellipsis to cap log noise.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 300;
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
                // Represent other control chars as hex \xNN
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Bounded hex preview of an opaque payload, e.g. `16 bytes: 7b226465...`.
/// Payloads are opaque to the agent, so a short prefix is all a log line
/// ever needs.
pub fn hex_preview(bytes: &[u8]) -> String {
    const MAX_BYTES: usize = 16;
    let mut out = format!("{} bytes", bytes.len());
    if bytes.is_empty() {
        return out;
    }
    out.push_str(": ");
    for b in bytes.iter().take(MAX_BYTES) {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    if bytes.len() > MAX_BYTES {
        out.push('…');
    }
    out
}
