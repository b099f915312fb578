use std::borrow::Cow;

use html2text::render::text_renderer::TrivialDecorator;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Column width used when converting HTML bodies for display.
pub const DISPLAY_WIDTH: usize = 80;

/// Wide enough that html2text never wraps a cleaned single-line field.
const CLEAN_WIDTH: usize = 10_000;

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Reduces feed-supplied markup to a single line of plain text.
///
/// Tags are dropped, entities decoded, Latin-1 mojibake repaired, terminal
/// control characters removed and all whitespace runs collapsed to one space.
///
/// # Examples
///
/// ```
/// use rivulet::util::clean;
///
/// assert_eq!(clean("<p>Hello &amp;\n <b>world</b></p>"), "Hello & world");
/// ```
pub fn clean(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }
    let text = if raw.contains('<') || raw.contains('&') {
        html2text::from_read_with_decorator(
            raw.as_bytes(),
            CLEAN_WIDTH,
            TrivialDecorator::new(),
        )
    } else {
        raw.to_owned()
    };
    let text = fix_mojibake(&text);
    let text = strip_control_chars(&text);
    normalize_spaces(&text)
}

/// Converts an HTML body into wrapped, markdown-flavoured text for a reader view.
pub fn to_display_format(raw_html: &str) -> String {
    if raw_html.trim().is_empty() {
        return String::new();
    }
    let rendered = html2text::from_read(raw_html.as_bytes(), DISPLAY_WIDTH);
    strip_control_chars(&rendered).into_owned()
}

/// Repairs UTF-8 text that was decoded as Latin-1 somewhere upstream.
///
/// Only applies when every char fits in a byte and the bytes form valid UTF-8,
/// so correctly encoded text is returned untouched.
pub fn fix_mojibake(s: &str) -> Cow<'_, str> {
    if s.is_ascii() || s.chars().any(|c| u32::from(c) > 0xFF) {
        return Cow::Borrowed(s);
    }
    let bytes: Vec<u8> = s.chars().map(|c| c as u8).collect();
    match String::from_utf8(bytes) {
        Ok(repaired) => Cow::Owned(repaired),
        Err(_) => Cow::Borrowed(s),
    }
}

/// Strips terminal control characters and ANSI escape sequences.
///
/// Tab, newline and carriage return are preserved.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_control =
        |c: char| c == '\x1b' || c == '\x7f' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'));
    if !s.chars().any(is_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.peek() {
                // CSI: parameters until a final byte in 0x40..=0x7e
                Some('[') => {
                    chars.next();
                    for n in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&n) {
                            break;
                        }
                    }
                }
                // OSC: until BEL or ST
                Some(']') => {
                    chars.next();
                    while let Some(n) = chars.next() {
                        if n == '\x07' {
                            break;
                        }
                        if n == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
        } else if !is_control(c) {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

fn normalize_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates a string to a terminal column budget, appending "..." when cut.
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if UnicodeWidthStr::width(s) <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width <= ELLIPSIS_WIDTH {
        let mut width = 0;
        let kept: String = s
            .chars()
            .take_while(|c| {
                width += UnicodeWidthChar::width(*c).unwrap_or(0);
                width <= max_width
            })
            .collect();
        return Cow::Owned(kept);
    }

    let budget = max_width - ELLIPSIS_WIDTH;
    let mut width = 0;
    let mut out = String::new();
    for c in s.chars() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + w > budget {
            break;
        }
        width += w;
        out.push(c);
    }
    out.push_str(ELLIPSIS);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_plain_text_collapses_whitespace() {
        assert_eq!(clean("  one\r\ntwo\n\tthree  "), "one two three");
    }

    #[test]
    fn test_clean_strips_tags_and_entities() {
        assert_eq!(clean("<div><p>Rust &lt;3</p></div>"), "Rust <3");
    }

    #[test]
    fn test_clean_empty() {
        assert_eq!(clean(""), "");
        assert_eq!(clean("   \n "), "");
    }

    #[test]
    fn test_fix_mojibake_repairs_latin1_decoded_utf8() {
        // "café" encoded as UTF-8 then read as Latin-1
        assert_eq!(fix_mojibake("cafÃ©"), "café");
    }

    #[test]
    fn test_fix_mojibake_leaves_valid_text() {
        assert!(matches!(fix_mojibake("plain"), Cow::Borrowed(_)));
        assert!(matches!(fix_mojibake("日本語"), Cow::Borrowed(_)));
        // é alone is not a valid UTF-8 byte sequence
        assert_eq!(fix_mojibake("café"), "café");
    }

    #[test]
    fn test_strip_control_chars() {
        assert_eq!(strip_control_chars("\x1b[31mRed\x1b[0m"), "Red");
        assert_eq!(strip_control_chars("\x1b]0;title\x07safe"), "safe");
        assert_eq!(strip_control_chars("a\x00b\x7fc"), "abc");
        assert!(matches!(strip_control_chars("line\n\ttab"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_to_display_format_wraps_html() {
        let rendered = to_display_format("<h1>Title</h1><p>Body text</p>");
        assert!(rendered.contains("Title"));
        assert!(rendered.contains("Body text"));
        assert_eq!(to_display_format(""), "");
    }

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width("Short", 10), "Short");
        assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
        assert_eq!(truncate_to_width("Test", 2), "Te");
        assert_eq!(truncate_to_width("你好世界", 7), "你好...");
    }
}
