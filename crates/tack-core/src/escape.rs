//! HTML escaping for user text embedded in rendered documents.

/// Escape the five HTML-significant characters, quotes included, so the
/// result is safe both as element text and inside attribute values.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 8);
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Insert `<br />` before every line break, keeping the break itself.
///
/// `\r\n` and `\n\r` pairs count as one break.
#[must_use]
pub fn newlines_to_breaks(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' | '\n' => {
                out.push_str("<br />");
                out.push(c);
                let pair = if c == '\r' { '\n' } else { '\r' };
                if chars.peek() == Some(&pair) {
                    out.push(pair);
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Escape user text for display as a paragraph: HTML-escape first, then
/// convert line breaks.
#[must_use]
pub fn escape_multiline(input: &str) -> String {
    newlines_to_breaks(&escape_html(input))
}
