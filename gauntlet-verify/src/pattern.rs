//! Placeholder-pattern compilation
//!
//! A pattern expectation is literal text with `%`-prefixed tokens, each
//! standing for a class of acceptable substrings. Compilation quotes the
//! literal text and substitutes the tokens in a fixed order; no token's
//! expansion contains `%`, so an expansion is never re-read as another
//! token.

use std::borrow::Cow;
use std::path::MAIN_SEPARATOR;

/// Token table, applied in this order after literal text is quoted.
/// `%i` precedes `%d` so the signed class keeps its own token; `%%` is
/// handled last so a doubled percent always means a literal `%`.
const TOKENS: &[(&str, &str)] = &[
    ("%s", r"[^\r\n]+"),
    ("%S", r"[^\r\n]*"),
    ("%a", r".+"),
    ("%A", r".*"),
    ("%w", r"\s*"),
    ("%i", r"[+-]?\d+"),
    ("%d", r"\d+"),
    ("%x", r"[0-9a-fA-F]+"),
    // Accepts a stray second point ("-.0.0"); best simple expression.
    ("%f", r"[+-]?\.?\d+\.?\d*(?:[Ee][+-]?\d+)?"),
    ("%c", r"."),
];

/// Quote literal text, honoring `%r...%r` raw-regex sections.
///
/// Text between a balanced pair of `%r` markers is inserted as a regex
/// group without quoting. An unbalanced `%r` is literal text.
fn quote_with_raw_sections(wanted: &str) -> String {
    let mut out = String::with_capacity(wanted.len() * 2);
    let mut rest = wanted;
    while let Some(start) = rest.find("%r") {
        let Some(end) = rest[start + 2..].find("%r") else {
            break;
        };
        out.push_str(&regex::escape(&rest[..start]));
        out.push('(');
        out.push_str(&rest[start + 2..start + 2 + end]);
        out.push(')');
        rest = &rest[start + 2 + end + 2..];
    }
    out.push_str(&regex::escape(rest));
    out
}

/// Compile a placeholder pattern to regex source (unanchored).
pub fn compile_pattern(wanted: &str) -> String {
    let mut source = quote_with_raw_sections(wanted);

    // %e expands to the platform path separator, quoted.
    source = source.replace("%e", &regex::escape(&MAIN_SEPARATOR.to_string()));
    for (token, class) in TOKENS {
        source = source.replace(token, class);
    }
    // Must be last so expansions above can't resurrect a token.
    source.replace("%%", "%")
}

/// Normalize CR / CRLF line endings to LF.
pub fn normalize_newlines(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use regex::Regex;

    fn anchored(source: &str) -> Regex {
        Regex::new(&format!("^(?:{source})$")).unwrap()
    }

    #[test]
    fn literal_text_is_quoted() {
        let re = anchored(&compile_pattern("a+b (c)"));
        assert!(re.is_match("a+b (c)"));
        assert!(!re.is_match("aab (c)"));
    }

    #[test]
    fn digit_classes() {
        let re = anchored(&compile_pattern("Count: %d"));
        assert!(re.is_match("Count: 42"));
        assert!(!re.is_match("Count: -3"), "%d has no sign");

        let re = anchored(&compile_pattern("Count: %i"));
        assert!(re.is_match("Count: -3"));
        assert!(re.is_match("Count: +7"));
    }

    #[test]
    fn string_and_whitespace_classes() {
        let re = anchored(&compile_pattern("x=%s."));
        assert!(re.is_match("x=anything here."));
        assert!(!re.is_match("x=two\nlines."), "%s stops at newlines");

        let re = anchored(&compile_pattern("a%wb"));
        assert!(re.is_match("a   b"));
        assert!(re.is_match("ab"));
    }

    #[test]
    fn multiline_class_crosses_newlines() {
        let re = Regex::new(&format!("(?s)^(?:{})$", compile_pattern("start%Aend"))).unwrap();
        assert!(re.is_match("start\nmiddle\nend"));
    }

    #[test]
    fn float_and_hex_and_char() {
        let re = anchored(&compile_pattern("%f"));
        for ok in ["1.5", "-0.25", "3", "+.5", "1e10", "2.5E-3"] {
            assert!(re.is_match(ok), "{ok}");
        }
        let re = anchored(&compile_pattern("0x%x"));
        assert!(re.is_match("0xDEADbeef"));
        let re = anchored(&compile_pattern("%c"));
        assert!(re.is_match("q"));
        assert!(!re.is_match("qq"));
    }

    #[test]
    fn doubled_percent_is_literal() {
        let re = anchored(&compile_pattern("100%% done"));
        assert!(re.is_match("100% done"));
    }

    #[test]
    fn raw_regex_section() {
        let re = anchored(&compile_pattern("id=%r[a-z]{3}%r!"));
        assert!(re.is_match("id=abc!"));
        assert!(!re.is_match("id=ABC!"));
    }

    #[test]
    fn unbalanced_raw_marker_is_literal() {
        let source = compile_pattern("x %r oops");
        let re = anchored(&source);
        assert!(re.is_match("x %r oops"));
    }

    #[test]
    fn newline_normalization() {
        assert_eq!(normalize_newlines("a\r\nb\rc\nd"), "a\nb\nc\nd");
        assert!(matches!(normalize_newlines("plain"), Cow::Borrowed(_)));
    }
}
