// Subtitle payload decoding
//
// GStreamer delivers subtitle buffers as UTF-8 text in the Pango text
// attribute markup format: a small subset of HTML-like tags plus
// character entities (&amp;, &auml;, ...). We only need plain text, so
// tags are stripped, the common entities are decoded, and newlines are
// normalized to a single '\n' convention.
//
// This is deliberately minimal subtitle support. WebVTT, TTML etc. would
// need their own handling and are out of scope.

/// Converts a Pango-markup subtitle payload to plain display text.
pub fn markup_to_plain(markup: &str) -> String {
    let normalized = markup.replace("\r\n", "\n");

    let mut out = String::with_capacity(normalized.len());
    let mut chars = normalized.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '<' => {
                // Skip the tag body. A lone '<' with no closing '>' is
                // malformed markup; drop the rest of the line like Pango
                // does rather than render tag soup.
                let mut tag = String::new();
                let mut closed = false;
                for t in chars.by_ref() {
                    if t == '>' {
                        closed = true;
                        break;
                    }
                    tag.push(t);
                }
                if !closed {
                    break;
                }
                // <br> and friends count as a line break.
                let name = tag.trim_start_matches('/').trim().to_ascii_lowercase();
                if name == "br" || name == "br/" {
                    out.push('\n');
                }
            }
            '&' => {
                let mut entity = String::new();
                let mut terminated = false;
                while let Some(&e) = chars.peek() {
                    if e == ';' {
                        chars.next();
                        terminated = true;
                        break;
                    }
                    if !e.is_ascii_alphanumeric() && e != '#' {
                        break;
                    }
                    entity.push(e);
                    chars.next();
                }
                if terminated {
                    match decode_entity(&entity) {
                        Some(decoded) => out.push(decoded),
                        None => {
                            // Unknown entity: keep it verbatim.
                            out.push('&');
                            out.push_str(&entity);
                            out.push(';');
                        }
                    }
                } else {
                    out.push('&');
                    out.push_str(&entity);
                }
            }
            _ => out.push(c),
        }
    }

    out.trim_end_matches('\n').to_string()
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        "auml" => Some('ä'),
        "ouml" => Some('ö'),
        "uuml" => Some('ü'),
        "Auml" => Some('Ä'),
        "Ouml" => Some('Ö'),
        "Uuml" => Some('Ü'),
        "szlig" => Some('ß'),
        _ => {
            // Numeric references: &#228; or &#xE4;
            let rest = entity.strip_prefix('#')?;
            let code = if let Some(hex) = rest.strip_prefix('x').or_else(|| rest.strip_prefix('X'))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                rest.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passthrough() {
        assert_eq!(markup_to_plain("hello world"), "hello world");
    }

    #[test]
    fn test_tags_stripped() {
        assert_eq!(markup_to_plain("<b>bold</b> and <i>italic</i>"), "bold and italic");
    }

    #[test]
    fn test_br_becomes_newline() {
        assert_eq!(markup_to_plain("line one<br>line two"), "line one\nline two");
    }

    #[test]
    fn test_crlf_normalized() {
        assert_eq!(markup_to_plain("line one\r\nline two"), "line one\nline two");
    }

    #[test]
    fn test_named_entities() {
        assert_eq!(markup_to_plain("Tom &amp; Jerry &lt;3"), "Tom & Jerry <3");
        assert_eq!(markup_to_plain("K&auml;se"), "Käse");
    }

    #[test]
    fn test_numeric_entities() {
        assert_eq!(markup_to_plain("K&#228;se"), "Käse");
        assert_eq!(markup_to_plain("K&#xE4;se"), "Käse");
    }

    #[test]
    fn test_unknown_entity_kept() {
        assert_eq!(markup_to_plain("a &bogus; b"), "a &bogus; b");
    }

    #[test]
    fn test_unterminated_tag_dropped() {
        assert_eq!(markup_to_plain("text <unterminated"), "text ");
    }

    #[test]
    fn test_trailing_newlines_trimmed() {
        assert_eq!(markup_to_plain("subtitle\n\n"), "subtitle");
    }
}
