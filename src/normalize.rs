//! Canonicalizes raw response bodies into stable line sequences before
//! comparison.
//!
//! Bodies that look like JSON are reprinted with 2-space indentation and the
//! key order exactly as received; a parse failure silently falls back to the
//! raw text. XML, SOAP and plain-text bodies pass through unchanged.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LINE_BREAK: Regex = Regex::new(r"\r\n|\n|\r").unwrap();
}

pub fn normalize_body(raw: &str) -> String {
    let trimmed = raw.trim();

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(value) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_string())
            }
            Err(_) => raw.to_string(),
        }
    } else {
        raw.to_string()
    }
}

/// Splits on `\r\n`, `\n` and `\r` uniformly. A trailing separator yields
/// one trailing empty line; an empty input yields no lines.
pub fn split_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    LINE_BREAK.split(text).map(String::from).collect()
}

pub fn normalize_lines(raw: &str) -> Vec<String> {
    split_lines(&normalize_body(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_body_is_pretty_printed_with_received_key_order() {
        let normalized = normalize_body("{\"zebra\":1,\"alpha\":{\"b\":2,\"a\":3}}");

        assert_eq!(
            normalized,
            "{\n  \"zebra\": 1,\n  \"alpha\": {\n    \"b\": 2,\n    \"a\": 3\n  }\n}"
        );
    }

    #[test]
    fn json_array_body_is_pretty_printed() {
        let normalized = normalize_body("[1,2]");

        assert_eq!(normalized, "[\n  1,\n  2\n]");
    }

    #[test]
    fn malformed_json_falls_back_to_raw_text() {
        let raw = "{\"open\": ";

        assert_eq!(normalize_body(raw), raw);
    }

    #[test]
    fn xml_body_passes_through_unchanged() {
        let raw = "<envelope><id>1</id></envelope>";

        assert_eq!(normalize_body(raw), raw);
    }

    #[test]
    fn split_treats_all_line_break_styles_uniformly() {
        assert_eq!(split_lines("a\r\nb\nc\rd"), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn trailing_separator_yields_trailing_empty_line() {
        assert_eq!(split_lines("a\n"), vec!["a", ""]);
    }

    #[test]
    fn empty_input_yields_no_lines() {
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn normalize_lines_combines_both_steps() {
        let lines = normalize_lines("{\"id\":1,\"name\":\"A\"}");

        assert_eq!(lines, vec!["{", "  \"id\": 1,", "  \"name\": \"A\"", "}"]);
    }
}
