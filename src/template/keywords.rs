//! Directive keyword recognition
//!
//! A directive starts with the operator-open delimiter immediately followed by a keyword:
//! one of the fixed [KEYWORDS] or a name registered for the current compile. The keyword
//! must end on a word boundary, so `{format2` is not the `format` keyword followed by `2`.
//! The boundary character itself is never consumed.

use std::collections::BTreeSet;

use super::scanning::{is_word_char, Scanner, IDENTIFIER};

pub const REM: &str = "rem";
pub const ENDREM: &str = "endrem";
pub const RAW: &str = "raw";
pub const ENDRAW: &str = "endraw";
pub const ECHO: &str = "echo";
pub const IF: &str = "if";
pub const ELIF: &str = "elif";
pub const ELSE: &str = "else";
pub const ENDIF: &str = "endif";
pub const FOR: &str = "for";
pub const ENDFOR: &str = "endfor";
pub const FORMAT: &str = "format";
pub const INCLUDE: &str = "include";
pub const SET: &str = "set";
pub const INC: &str = "inc";
pub const DEC: &str = "dec";

/// Every fixed keyword. Content runs stop in front of any of them.
pub const KEYWORDS: &[&str] = &[
    REM, ENDREM, RAW, ENDRAW, IF, ELIF, ELSE, ENDIF, FOR, ENDFOR, ECHO, FORMAT, INCLUDE, SET, INC,
    DEC,
];

/// Keywords that are reserved but only usable once a handler is registered under the name.
pub const RESERVED: &[&str] = &[FORMAT];

/// Recognizes `<open><keyword>` at the scanner position.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    open: String,
    keywords: BTreeSet<String>,
}

impl KeywordMatcher {
    pub fn new<I, S>(open: impl Into<String>, registered: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keywords: BTreeSet<String> = KEYWORDS.iter().map(|k| k.to_string()).collect();
        keywords.extend(registered.into_iter().map(Into::into));
        KeywordMatcher {
            open: open.into(),
            keywords,
        }
    }

    pub fn is_keyword(&self, name: &str) -> bool {
        self.keywords.contains(name)
    }

    pub fn open(&self) -> &str {
        &self.open
    }

    /// Lookahead: the keyword at the scanner position and the byte length of
    /// `<open><keyword>`, without consuming anything.
    pub fn peek<'s>(&self, scanner: &Scanner<'s>) -> Option<(&'s str, usize)> {
        self.keyword_at(scanner.rest())
    }

    /// Consume a directive keyword accepted by `accept`.
    pub fn match_directive_with(
        &self,
        scanner: &mut Scanner<'_>,
        accept: impl Fn(&str) -> bool,
    ) -> Option<String> {
        let (name, len) = self.peek(scanner)?;
        if !accept(name) {
            return None;
        }
        scanner.advance(len);
        Some(name.to_string())
    }

    /// Consume a directive keyword, restricted to `allowed` when given.
    pub fn match_directive(
        &self,
        scanner: &mut Scanner<'_>,
        allowed: Option<&[&str]>,
    ) -> Option<String> {
        self.match_directive_with(scanner, |name| {
            allowed.map_or(true, |allowed| allowed.contains(&name))
        })
    }

    fn keyword_at<'s>(&self, text: &'s str) -> Option<(&'s str, usize)> {
        if self.open.is_empty() {
            return None;
        }
        let after_open = text.strip_prefix(self.open.as_str())?;
        let name = IDENTIFIER.find(after_open)?.as_str();
        if after_open[name.len()..]
            .chars()
            .next()
            .is_some_and(is_word_char)
        {
            return None;
        }
        if !self.keywords.contains(name) {
            return None;
        }
        Some((name, self.open.len() + name.len()))
    }
}
