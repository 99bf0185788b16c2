//! Operator tokens and the leveled precedence table
//!
//! All operators of all levels are lexed by one `logos` token enum, which always yields the
//! longest operator string at a position (`<=` before `<`, `!=` before `!`). Whether a lexed
//! operator applies is decided afterwards by the precedence level that asked for it.

use logos::Logos;
use once_cell::sync::Lazy;
use std::fmt;

/// Every operator known to the expression grammar.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    #[token("||")]
    Or,
    #[token("&&")]
    And,
    #[token("==")]
    Eq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEq,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
    #[token("@")]
    At,
    #[token("[")]
    OpenBracket,
    #[token(".")]
    Dot,
    #[token("(")]
    OpenParen,
    #[token(":")]
    Colon,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Or => "||",
            Operator::And => "&&",
            Operator::Eq => "==",
            Operator::NotEq => "!=",
            Operator::Less => "<",
            Operator::LessEq => "<=",
            Operator::Greater => ">",
            Operator::GreaterEq => ">=",
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Star => "*",
            Operator::Slash => "/",
            Operator::Percent => "%",
            Operator::Bang => "!",
            Operator::At => "@",
            Operator::OpenBracket => "[",
            Operator::Dot => ".",
            Operator::OpenParen => "(",
            Operator::Colon => ":",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lex the longest operator at the start of `text`.
///
/// Returns the operator and its byte length.
pub fn lex_operator(text: &str) -> Option<(Operator, usize)> {
    let mut lexer = Operator::lexer(text);
    match lexer.next() {
        Some(Ok(op)) if lexer.span().start == 0 => Some((op, lexer.span().end)),
        _ => None,
    }
}

/// How a precedence level combines its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelKind {
    /// Prefix operators.
    Unary,
    /// Left-associative infix operators.
    Binary,
    /// Postfix chains: index, call and member access.
    Special,
    /// Lexically reserved tokens that are not expression operators.
    NotExpr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorLevel {
    pub kind: LevelKind,
    pub operators: Vec<Operator>,
}

impl OperatorLevel {
    pub fn new(kind: LevelKind, operators: &[Operator]) -> Self {
        OperatorLevel {
            kind,
            operators: operators.to_vec(),
        }
    }

    pub fn contains(&self, op: Operator) -> bool {
        self.operators.contains(&op)
    }
}

/// Ordered precedence levels; index 0 binds loosest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorTable {
    pub levels: Vec<OperatorLevel>,
    /// Level at which the operand of a prefix operator is parsed.
    pub unary_operand_level: usize,
}

impl OperatorTable {
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level(&self, index: usize) -> Option<&OperatorLevel> {
        self.levels.get(index)
    }
}

impl Default for OperatorTable {
    fn default() -> Self {
        use LevelKind::{Binary, NotExpr, Special, Unary};
        use Operator as Op;

        let levels = vec![
            OperatorLevel::new(Binary, &[Op::Or]),
            OperatorLevel::new(Binary, &[Op::And]),
            OperatorLevel::new(Binary, &[Op::Eq, Op::NotEq]),
            OperatorLevel::new(Binary, &[Op::Less, Op::LessEq, Op::Greater, Op::GreaterEq]),
            OperatorLevel::new(Binary, &[Op::Plus, Op::Minus]),
            OperatorLevel::new(Binary, &[Op::Star, Op::Slash, Op::Percent]),
            OperatorLevel::new(Unary, &[Op::Bang, Op::Minus, Op::Plus, Op::At]),
            OperatorLevel::new(Special, &[Op::OpenBracket, Op::Dot, Op::OpenParen]),
            OperatorLevel::new(NotExpr, &[Op::Colon]),
        ];
        // Prefix operands are parsed at the prefix level itself, so prefixes stack (`!-x`)
        // and fall through to the postfix chain: `-a.b` is `-(a.b)`.
        OperatorTable {
            levels,
            unary_operand_level: 6,
        }
    }
}

/// The table every compile uses.
pub static DEFAULT_OPERATORS: Lazy<OperatorTable> = Lazy::new(OperatorTable::default);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_operator_wins() {
        assert_eq!(lex_operator("<= 3"), Some((Operator::LessEq, 2)));
        assert_eq!(lex_operator("< 3"), Some((Operator::Less, 1)));
        assert_eq!(lex_operator("!=x"), Some((Operator::NotEq, 2)));
        assert_eq!(lex_operator("!x"), Some((Operator::Bang, 1)));
        assert_eq!(lex_operator("||"), Some((Operator::Or, 2)));
    }

    #[test]
    fn test_non_operators() {
        assert_eq!(lex_operator("x + 1"), None);
        assert_eq!(lex_operator("= 1"), None);
        assert_eq!(lex_operator(""), None);
        assert_eq!(lex_operator(" +"), None);
    }

    #[test]
    fn test_default_table_shape() {
        let table = OperatorTable::default();
        assert_eq!(table.len(), 9);
        assert_eq!(table.levels[0].operators, vec![Operator::Or]);
        assert_eq!(table.levels[6].kind, LevelKind::Unary);
        assert_eq!(table.levels[table.unary_operand_level].kind, LevelKind::Unary);
        assert_eq!(table.levels[7].kind, LevelKind::Special);
        assert!(table.levels[4].contains(Operator::Minus));
        assert!(table.levels[6].contains(Operator::Minus));
        assert!(!table.levels[5].contains(Operator::Minus));
    }

    #[test]
    fn test_every_operator_sits_on_a_level() {
        let table = OperatorTable::default();
        let text = "|| && == != < <= > >= + - * / % ! @ [ . ( :";
        for token in text.split(' ') {
            let (op, len) = lex_operator(token).unwrap();
            assert_eq!(len, token.len());
            assert_eq!(op.as_str(), token);
            assert!(table.levels.iter().any(|level| level.contains(op)), "{}", token);
        }
    }
}
