//! Leveled operator-precedence expression parser
//!
//! Expressions are parsed over an explicit, ordered [OperatorTable](operators::OperatorTable).
//! Parsing enters at level 0, the loosest, and each level hands its operands to the level
//! above it:
//!
//! - `NotExpr`: reserved tokens only; parsing continues at the next level.
//! - `Unary`: a prefix operator of the level requires an operand, parsed at the table's
//!   unary-operand level. Without one, parsing continues at the next level.
//! - `Binary`: a left-associative loop collected into one flat chain, so `1-2-3` is a
//!   single node that displays as `((1)-(2))-(3)`. Chain length is not limited.
//! - `Special`: a postfix chain of `[key]`, `(args)` and `.name` applied left to right.
//!   Each link counts toward the nesting depth.
//! - Past the last level: a parenthesized expression, a string or number constant, or a
//!   variable.
//!
//! An expression ends, without error and without consuming anything, in front of `,` `)`
//! `]`, the operator-close delimiter or the end of input. Callers decide whether a missing
//! expression is an error ([CompileContext::expect_expression]).
//!
//! Operators are lexed longest-first across all levels, once per position: the lexed
//! operator is cached, and each level only accepts it when it belongs to that level. An
//! operator that no level accepts is left in place for the caller.

pub mod ast;
pub mod operators;

use self::ast::{unescape, Expr};
use self::operators::{lex_operator, LevelKind, Operator};
use super::compiler::CompileContext;
use super::diagnostics::CompileResult;
use super::scanning::{Scanner, IDENTIFIER, NUMBER_LITERAL, STRING_LITERAL};

impl<'a> CompileContext<'a> {
    /// Parse an expression, or nothing if an expression end comes first.
    pub fn parse_expression(&mut self) -> CompileResult<Option<Expr>> {
        self.nested(|ctx| ctx.parse_level(0))
    }

    /// Parse a required expression.
    pub fn expect_expression(&mut self) -> CompileResult<Expr> {
        match self.parse_expression()? {
            Some(expr) => Ok(expr),
            None => Err(self.error("expected expression")),
        }
    }

    /// Parse an assignment target: a variable followed directly by `[key]` and `.name`
    /// suffixes.
    ///
    /// Suffixes must touch the name, so in `{set x .5}` the target is `x` and `.5` the value.
    pub fn expect_place(&mut self) -> CompileResult<Expr> {
        self.scanner.skip_whitespace();
        let start = self.scanner.position();
        let Some(name) = self.scanner.match_regex(&IDENTIFIER) else {
            return Err(self.error("expected assignable expression"));
        };
        if name == "this" {
            return Err(self.error_at(start, "`this` cannot be referenced"));
        }
        let mut target = Expr::var(name);
        let mut links = 0;
        let result = loop {
            match self.scanner.peek_char() {
                Some('[') | Some('.') => {}
                Some('(') => break Err(self.error_at(start, "expected assignable expression")),
                _ => break Ok(target),
            }
            if let Err(err) = self.enter() {
                break Err(err);
            }
            links += 1;
            target = match self.parse_place_suffix(target) {
                Ok(next) => next,
                Err(err) => break Err(err),
            };
        };
        for _ in 0..links {
            self.leave();
        }
        result
    }

    fn parse_place_suffix(&mut self, target: Expr) -> CompileResult<Expr> {
        match self.scanner.advance_char() {
            Some('[') => self.parse_postfix(Operator::OpenBracket, target),
            _ => self.parse_postfix(Operator::Dot, target),
        }
    }

    /// Consume an identifier at the current position, without skipping whitespace.
    pub fn expect_identifier(&mut self) -> CompileResult<String> {
        match self.scanner.match_regex(&IDENTIFIER) {
            Some(name) => Ok(name.to_string()),
            None => Err(self.error("expected identifier")),
        }
    }

    /// Skip whitespace, then require `expected`.
    pub fn expect_char(&mut self, expected: char) -> CompileResult<()> {
        self.scanner.skip_whitespace();
        if self.scanner.peek_char() == Some(expected) {
            self.scanner.advance_char();
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`", expected)))
        }
    }

    fn at_expression_end(&self) -> bool {
        match self.scanner.peek_char() {
            None | Some(',') | Some(')') | Some(']') => true,
            Some(_) => self.at_close(),
        }
    }

    fn parse_level(&mut self, level: usize) -> CompileResult<Option<Expr>> {
        self.scanner.skip_whitespace();
        if self.at_expression_end() {
            return Ok(None);
        }
        let operators = self.operators;
        let Some(entry) = operators.level(level) else {
            return self.parse_terminal();
        };

        match entry.kind {
            LevelKind::NotExpr => self.parse_level(level + 1),
            LevelKind::Unary => match self.match_operator(level) {
                Some(op) => {
                    let operand_level = operators.unary_operand_level;
                    let operand = self.nested(|ctx| ctx.parse_level(operand_level))?;
                    match operand {
                        Some(operand) => Ok(Some(Expr::Unary {
                            op,
                            operand: Box::new(operand),
                        })),
                        None => Err(self.error("expected expression")),
                    }
                }
                None => self.parse_level(level + 1),
            },
            LevelKind::Binary => {
                let Some(first) = self.parse_level(level + 1)? else {
                    return Ok(None);
                };
                let mut rest = Vec::new();
                while let Some(op) = self.match_operator(level) {
                    let Some(operand) = self.parse_level(level + 1)? else {
                        return Err(self.error("expected expression"));
                    };
                    rest.push((op, operand));
                }
                if rest.is_empty() {
                    Ok(Some(first))
                } else {
                    Ok(Some(Expr::Binary {
                        first: Box::new(first),
                        rest,
                    }))
                }
            }
            LevelKind::Special => {
                let Some(mut target) = self.parse_level(level + 1)? else {
                    return Ok(None);
                };
                // Every link wraps the target once more, so each counts toward the depth.
                let mut links = 0;
                let result = loop {
                    let Some(op) = self.match_operator(level) else {
                        break Ok(Some(target));
                    };
                    if let Err(err) = self.enter() {
                        break Err(err);
                    }
                    links += 1;
                    target = match self.parse_postfix(op, target) {
                        Ok(next) => next,
                        Err(err) => break Err(err),
                    };
                };
                for _ in 0..links {
                    self.leave();
                }
                result
            }
        }
    }

    fn parse_postfix(&mut self, op: Operator, target: Expr) -> CompileResult<Expr> {
        match op {
            Operator::OpenBracket => {
                let key = self.expect_expression()?;
                self.expect_char(']')?;
                Ok(Expr::Index {
                    target: Box::new(target),
                    key: Box::new(key),
                })
            }
            Operator::OpenParen => {
                let mut args = Vec::new();
                while let Some(arg) = self.parse_expression()? {
                    args.push(arg);
                    self.scanner.skip_whitespace();
                    if !self.scanner.match_literal(",") {
                        break;
                    }
                }
                self.expect_char(')')?;
                Ok(Expr::Call {
                    callee: Box::new(target),
                    args,
                })
            }
            Operator::Dot => {
                let name = self.expect_identifier()?;
                Ok(Expr::Member {
                    target: Box::new(target),
                    name,
                })
            }
            other => Err(self.error(format!("`{}` is not a postfix operator", other))),
        }
    }

    fn parse_terminal(&mut self) -> CompileResult<Option<Expr>> {
        let start = self.scanner.position();
        match self.scanner.peek_char() {
            Some('(') => {
                self.scanner.advance_char();
                let inner = self.expect_expression()?;
                self.expect_char(')')?;
                return Ok(Some(Expr::group(inner)));
            }
            Some('"') => {
                return match self.scanner.match_regex(&STRING_LITERAL) {
                    Some(literal) => Ok(Some(Expr::Str(unescape(&literal[1..literal.len() - 1])))),
                    None => Err(self.error("expected end of string literal")),
                };
            }
            Some('{') => return Err(self.error("map literals are not implemented")),
            Some('[') => return Err(self.error("array literals are not implemented")),
            _ => {}
        }

        if let Some(number) = self.scanner.match_regex(&NUMBER_LITERAL) {
            return Ok(Some(Expr::Number(number.to_string())));
        }
        if let Some(name) = self.scanner.match_regex(&IDENTIFIER) {
            if name == "this" {
                return Err(self.error_at(start, "`this` cannot be referenced"));
            }
            return Ok(Some(Expr::var(name)));
        }
        Ok(None)
    }

    /// Consume the operator at the current position if it belongs to `level`.
    ///
    /// Leading whitespace is skipped only when an operator is consumed. An operator never
    /// starts where the operator-close delimiter does, so `%>` closes rather than reading
    /// as `%`.
    fn match_operator(&mut self, level: usize) -> Option<Operator> {
        let start = self.scanner.position();
        let found = match self.cached_operator(start) {
            Some(found) => found,
            None => {
                let found = self.lex_operator_at(start);
                self.cache_operator(start, found);
                found
            }
        };
        let (op, end) = found?;
        let accepted = self.operators.level(level)?.contains(op);
        if accepted {
            self.scanner.advance(end - start);
            Some(op)
        } else {
            None
        }
    }

    fn lex_operator_at(&self, start: usize) -> Option<(Operator, usize)> {
        let mut lookahead = Scanner::new(self.scanner.source());
        lookahead.advance(start);
        lookahead.skip_whitespace();
        if lookahead
            .rest()
            .starts_with(self.options.operator_close.as_str())
        {
            return None;
        }
        let (op, len) = lex_operator(lookahead.rest())?;
        Some((op, lookahead.position() + len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::compiler::CompileOptions;
    use crate::template::statements::directives::DirectiveTable;

    fn parse_with(source: &str, options: &CompileOptions) -> CompileResult<Option<String>> {
        let directives = DirectiveTable::new(options);
        let mut ctx = CompileContext::new(source, options, &directives);
        Ok(ctx.parse_expression()?.map(|expr| expr.to_string()))
    }

    fn parse(source: &str) -> String {
        parse_with(source, &CompileOptions::default())
            .unwrap()
            .unwrap_or_default()
    }

    fn parse_err(source: &str) -> String {
        parse_with(source, &CompileOptions::default())
            .unwrap_err()
            .message
    }

    #[test]
    fn test_precedence() {
        assert_eq!(parse("1+2*3"), "(1)+((2)*(3))");
        assert_eq!(parse("a || b && c"), "($a)||(($b)&&($c))");
        assert_eq!(parse("a == b < c"), "($a)==(($b)<($c))");
    }

    #[test]
    fn test_left_associativity() {
        assert_eq!(parse("1-2-3"), "((1)-(2))-(3)");
        assert_eq!(parse("8 / 4 / 2"), "((8)/(4))/(2)");
    }

    #[test]
    fn test_postfix_chains_left_to_right() {
        assert_eq!(parse("a.b.c"), "$a->b->c");
        assert_eq!(parse("a[0][1]"), "$a[0][1]");
        assert_eq!(parse("f(1, x,)(2)"), "$f(1,$x)(2)");
        assert_eq!(parse("user.greet()"), "$user->greet()");
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(parse("!x"), "!$x");
        assert_eq!(parse("!-x"), "!-$x");
        assert_eq!(parse("-a.b"), "-$a->b");
        assert_eq!(parse("-x * 2"), "(-$x)*(2)");
        assert_eq!(parse("@items[3]"), "@$items[3]");
    }

    #[test]
    fn test_longest_operator_is_matched() {
        assert_eq!(parse("a<=b"), "($a)<=($b)");
        assert_eq!(parse("a != b"), "($a)!=($b)");
    }

    #[test]
    fn test_parenthesized_expression() {
        assert_eq!(parse("(1+2)*3"), "(((1)+(2)))*(3)");
        assert_eq!(parse_err("(1+2"), "expected `)`");
    }

    #[test]
    fn test_constants() {
        assert_eq!(parse(r#""it's""#), r"'it\'s'");
        for number in ["0x1F", "3.14", ".5", "5.", "1e10", "1E-3"] {
            assert_eq!(parse(number), number);
        }
    }

    #[test]
    fn test_expression_end_is_not_an_error() {
        for source in ["", "  ", ", x", ") x", "] x", "} x"] {
            assert_eq!(
                parse_with(source, &CompileOptions::default()).unwrap(),
                None,
                "{:?}",
                source
            );
        }
    }

    #[test]
    fn test_expression_stops_before_trailing_content() {
        let options = CompileOptions::default();
        let directives = DirectiveTable::new(&options);
        let mut ctx = CompileContext::new("items v}", &options, &directives);
        assert_eq!(ctx.parse_expression().unwrap(), Some(Expr::var("items")));
        assert_eq!(ctx.scanner.rest(), " v}");
    }

    #[test]
    fn test_close_delimiter_is_not_an_operator() {
        let options = CompileOptions::default().with_delimiters("<%", "%>");
        assert_eq!(
            parse_with("a %>", &options).unwrap(),
            Some("$a".to_string())
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_err("this"), "`this` cannot be referenced");
        assert_eq!(parse_err("{a: 1}"), "map literals are not implemented");
        assert_eq!(parse_err("[1, 2]"), "array literals are not implemented");
        assert_eq!(parse_err(r#""open"#), "expected end of string literal");
        assert_eq!(parse_err("1 +"), "expected expression");
        assert_eq!(parse_err("!"), "expected expression");
        assert_eq!(parse_err("a[]"), "expected expression");
        assert_eq!(parse_err("a[1"), "expected `]`");
        assert_eq!(parse_err("a. b"), "expected identifier");
    }

    #[test]
    fn test_depth_is_bounded() {
        let source = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert!(parse_err(&source).starts_with("nesting exceeds the maximum depth"));

        let source = "!".repeat(100) + "x";
        assert!(parse_err(&source).starts_with("nesting exceeds the maximum depth"));
    }

    #[test]
    fn test_long_operator_chains_stay_flat() {
        let source = format!("1{}", "+1".repeat(10_000));
        let options = CompileOptions::default();
        let directives = DirectiveTable::new(&options);
        let mut ctx = CompileContext::new(&source, &options, &directives);
        match ctx.parse_expression().unwrap() {
            Some(Expr::Binary { first, rest }) => {
                assert_eq!(*first, Expr::Number("1".into()));
                assert_eq!(rest.len(), 10_000);
                assert!(rest.iter().all(|(op, operand)| {
                    *op == Operator::Plus && *operand == Expr::Number("1".into())
                }));
            }
            other => panic!("expected a binary chain, got {:?}", other),
        }
    }

    #[test]
    fn test_postfix_links_count_toward_depth() {
        let within = format!("a{}", ".b".repeat(20));
        assert_eq!(parse(&within), format!("$a{}", "->b".repeat(20)));

        let beyond = format!("a{}", ".b".repeat(100));
        assert!(parse_err(&beyond).starts_with("nesting exceeds the maximum depth"));
        let beyond = format!("a{}", "[0]".repeat(100));
        assert!(parse_err(&beyond).starts_with("nesting exceeds the maximum depth"));
    }

    #[test]
    fn test_this_prefix_is_an_ordinary_name() {
        assert_eq!(parse("thistle"), "$thistle");
    }
}
