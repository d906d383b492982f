//! C2 TextSanitizer (spec §4.2): control-char stripping, binary-PDF
//! detection, and conditional HTML stripping.

use once_cell::sync::Lazy;
use regex::Regex;

/// `[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]` per spec §4.2, excluding `\t \n \r`.
static CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").unwrap());

static SCRIPT_STYLE: Lazy<fancy_regex::Regex> =
    Lazy::new(|| fancy_regex::Regex::new(r"(?is)<(script|style)[^>]*>.*?</\1>").unwrap());
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const STRUCTURAL_MARKERS: [&str; 8] = [
    "<html", "<body", "<div", "<span", "<p", "<table", "<script", "<style",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripMethod {
    DomStyle,
    RegexFallback,
}

pub struct TextSanitizer;

impl TextSanitizer {
    /// Decodes bytes as UTF-8 (replacing errors), coerces non-string
    /// input, and strips C0 control chars except `\t \n \r`.
    pub fn ensure_plain_string(bytes: &[u8]) -> String {
        let decoded = String::from_utf8_lossy(bytes);
        Self::strip_control_chars(&decoded)
    }

    /// Strips control chars from an already-decoded string. Required
    /// before any storage, tokenization, or prompt composition.
    pub fn strip_control_chars(text: &str) -> String {
        CONTROL_CHARS.replace_all(text, "").into_owned()
    }

    /// `sanitize(sanitize(x)) == sanitize(x)` (spec §8 idempotence law).
    pub fn sanitize(text: &str) -> String {
        Self::strip_control_chars(text)
    }

    /// True iff `bytes` starts with the PDF magic number.
    pub fn is_binary_pdf(bytes: &[u8]) -> bool {
        bytes.starts_with(b"%PDF-")
    }

    /// Strips HTML when activated (length > 5000 and >= 3 structural
    /// markers present). Never expands the input; returns the shorter
    /// of the DOM-style and regex-fallback results.
    pub fn strip_html(text: &str) -> (String, Option<StripMethod>) {
        if text.len() <= 5000 {
            return (text.to_string(), None);
        }
        let marker_count = STRUCTURAL_MARKERS
            .iter()
            .filter(|m| text.contains(*m))
            .count();
        if marker_count < 3 {
            return (text.to_string(), None);
        }

        let dom_style = Self::strip_dom_style(text);
        let regex_fallback = Self::strip_regex_fallback(text);

        if dom_style.len() <= regex_fallback.len() {
            (dom_style, Some(StripMethod::DomStyle))
        } else {
            (regex_fallback, Some(StripMethod::RegexFallback))
        }
    }

    /// `stripHtml(stripHtml(x)) == stripHtml(x)` (spec §8 idempotence law).
    pub fn strip_html_idempotent(text: &str) -> String {
        Self::strip_html(text).0
    }

    fn strip_dom_style(text: &str) -> String {
        let without_script_style = SCRIPT_STYLE.replace_all(text, " ");
        let without_tags = ANY_TAG.replace_all(&without_script_style, " ");
        WHITESPACE_RUN
            .replace_all(without_tags.trim(), " ")
            .into_owned()
    }

    fn strip_regex_fallback(text: &str) -> String {
        let without_script_style = SCRIPT_STYLE.replace_all(text, "");
        let without_tags = ANY_TAG.replace_all(&without_script_style, "");
        WHITESPACE_RUN
            .replace_all(without_tags.trim(), " ")
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_chars_but_keeps_tab_newline_cr() {
        let input = "a\x00b\tc\nd\re\x1ff";
        let cleaned = TextSanitizer::sanitize(input);
        assert_eq!(cleaned, "ab\tc\nd\ref");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let input = "hello\x07world";
        let once = TextSanitizer::sanitize(input);
        let twice = TextSanitizer::sanitize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn ensure_plain_string_replaces_invalid_utf8() {
        let bytes = vec![0x68, 0x69, 0xFF, 0xFE];
        let s = TextSanitizer::ensure_plain_string(&bytes);
        assert!(s.starts_with("hi"));
    }

    #[test]
    fn detects_pdf_signature() {
        assert!(TextSanitizer::is_binary_pdf(b"%PDF-1.4\n..."));
        assert!(!TextSanitizer::is_binary_pdf(b"not a pdf"));
    }

    #[test]
    fn strip_html_skips_short_input() {
        let input = "<div>hi</div>";
        let (out, method) = TextSanitizer::strip_html(input);
        assert_eq!(out, input);
        assert!(method.is_none());
    }

    #[test]
    fn strip_html_activates_on_long_structured_input() {
        let body = "<p>paragraph text here.</p>".repeat(300);
        let input = format!("<html><body><div><span>{body}</span></div></body></html>");
        let (out, method) = TextSanitizer::strip_html(&input);
        assert!(method.is_some());
        assert!(out.len() < input.len());
        assert!(!out.contains('<'));
    }

    #[test]
    fn strip_html_never_expands_input() {
        let body = "<p>paragraph text here.</p>".repeat(300);
        let input = format!("<html><body><div><span>{body}</span></div></body></html>");
        let (out, _) = TextSanitizer::strip_html(&input);
        assert!(out.len() <= input.len());
    }

    #[test]
    fn strip_html_is_idempotent() {
        let body = "<p>paragraph text here.</p>".repeat(300);
        let input = format!("<html><body><div><span>{body}</span></div></body></html>");
        let once = TextSanitizer::strip_html_idempotent(&input);
        let twice = TextSanitizer::strip_html_idempotent(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn strip_html_removes_script_and_style_subtrees() {
        let body = "<p>content</p>".repeat(300);
        let input = format!(
            "<html><body><div><script>alert('x')</script><style>.a{{}}</style><span>{body}</span></div></body></html>"
        );
        let (out, _) = TextSanitizer::strip_html(&input);
        assert!(!out.contains("alert"));
    }
}
