//! Position-tracked scanning over template source
//!
//! The [Scanner] is a forward-only cursor over the source text. Every match is anchored at
//! the current position: on success the cursor moves past the matched text, on failure it
//! stays where it was. Lookahead helpers ([Scanner::rest], [Scanner::peek_char]) never move
//! the cursor.
//!
//! Positions are byte offsets that always sit on `char` boundaries. Diagnostics convert them
//! to codepoint offsets when an error is raised.
//!
//! The lexical patterns shared by the parsers live here as lazily compiled statics.

use once_cell::sync::Lazy;
use regex::Regex;

/// Identifier: a variable, a loop binding, a member name or a directive name.
pub static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*").unwrap());

/// Double-quoted string literal. The literal ends at the first quote preceded by an even
/// number of backslashes.
pub static STRING_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?s)(?:"(?:\\\\)*"|(?:".*?[^\\]|")(?:\\\\)*")"#).unwrap()
});

/// Numeric literal. Exponential and hex forms are tried before plain decimals so that
/// `1e10` and `0x1F` are read as one token.
pub static NUMBER_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[0-9]+[eE][+-]?[0-9]+|0x[0-9A-Fa-f]+|[0-9]+\.?[0-9]*|[0-9]*\.?[0-9]+)")
        .unwrap()
});

/// The optional line break swallowed after a directive close.
pub static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\r?\n?").unwrap());

/// True for characters that may continue an identifier, used for keyword boundaries.
pub fn is_word_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

/// Forward-only cursor over the template source.
#[derive(Debug, Clone)]
pub struct Scanner<'src> {
    source: &'src str,
    pos: usize,
}

impl<'src> Scanner<'src> {
    pub fn new(source: &'src str) -> Self {
        Scanner { source, pos: 0 }
    }

    /// The full source text.
    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Current byte offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The unconsumed remainder of the source.
    pub fn rest(&self) -> &'src str {
        &self.source[self.pos..]
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    pub fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Consume one character.
    pub fn advance_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Consume `len` bytes. `len` must land on a char boundary of the remainder.
    pub fn advance(&mut self, len: usize) {
        debug_assert!(self.rest().is_char_boundary(len));
        self.pos = (self.pos + len).min(self.source.len());
    }

    /// Anchored regex match at the current position.
    ///
    /// `pattern` must be anchored with `^`. Returns the matched text and moves past it.
    pub fn match_regex(&mut self, pattern: &Regex) -> Option<&'src str> {
        let rest = self.rest();
        let found = pattern.find(rest)?;
        if found.start() != 0 {
            return None;
        }
        self.pos += found.end();
        Some(&rest[..found.end()])
    }

    /// Anchored literal match at the current position.
    pub fn match_literal(&mut self, text: &str) -> bool {
        if !text.is_empty() && self.rest().starts_with(text) {
            self.pos += text.len();
            true
        } else {
            false
        }
    }

    /// Skip any whitespace. Always succeeds.
    pub fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_advances_on_success_only() {
        let mut scanner = Scanner::new("abc123 rest");
        assert_eq!(scanner.match_regex(&NUMBER_LITERAL), None);
        assert_eq!(scanner.position(), 0);
        assert_eq!(scanner.match_regex(&IDENTIFIER), Some("abc123"));
        assert_eq!(scanner.position(), 6);
        scanner.skip_whitespace();
        assert_eq!(scanner.rest(), "rest");
    }

    #[test]
    fn test_match_literal() {
        let mut scanner = Scanner::new("{%if");
        assert!(!scanner.match_literal("{{"));
        assert!(scanner.match_literal("{%"));
        assert_eq!(scanner.rest(), "if");
        assert!(!scanner.match_literal(""));
    }

    #[test]
    fn test_advance_char_is_utf8_aware() {
        let mut scanner = Scanner::new("été");
        assert_eq!(scanner.advance_char(), Some('é'));
        assert_eq!(scanner.position(), 2);
        assert_eq!(scanner.rest(), "té");
    }

    #[test]
    fn test_number_forms_are_single_tokens() {
        for literal in ["0x1F", "3.14", ".5", "5.", "1e10", "1E-3", "42"] {
            let mut scanner = Scanner::new(literal);
            assert_eq!(scanner.match_regex(&NUMBER_LITERAL), Some(literal), "{}", literal);
            assert!(scanner.at_end());
        }
    }

    #[test]
    fn test_number_stops_before_member_like_suffix() {
        let mut scanner = Scanner::new("1else");
        assert_eq!(scanner.match_regex(&NUMBER_LITERAL), Some("1"));
    }

    #[test]
    fn test_string_literal_respects_escapes() {
        let mut scanner = Scanner::new(r#""a\"b" tail"#);
        assert_eq!(scanner.match_regex(&STRING_LITERAL), Some(r#""a\"b""#));

        let mut scanner = Scanner::new(r#""ends with \\" tail"#);
        assert_eq!(scanner.match_regex(&STRING_LITERAL), Some(r#""ends with \\""#));

        let mut scanner = Scanner::new(r#""""#);
        assert_eq!(scanner.match_regex(&STRING_LITERAL), Some(r#""""#));
    }

    #[test]
    fn test_unterminated_string_does_not_match() {
        let mut scanner = Scanner::new(r#""open \""#);
        assert_eq!(scanner.match_regex(&STRING_LITERAL), None);
        assert_eq!(scanner.position(), 0);
    }

    #[test]
    fn test_line_break_is_optional() {
        let mut scanner = Scanner::new("\r\nnext");
        scanner.match_regex(&LINE_BREAK);
        assert_eq!(scanner.rest(), "next");

        let mut scanner = Scanner::new("next");
        assert_eq!(scanner.match_regex(&LINE_BREAK), Some(""));
        assert_eq!(scanner.position(), 0);
    }
}
