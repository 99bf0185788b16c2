//! Recursive-descent directive parser
//!
//! A template is a directive sequence followed by trailing content, and nothing may remain
//! after it. A sequence is a run of "operators", each being an optional content run (all
//! text up to the next recognized directive keyword) followed by an optional directive that
//! may start a statement. The sequence stops at the first operator that consumes nothing,
//! which is how block bodies end in front of `{elif}`, `{else}` or `{endif}`.
//!
//! Directives are looked up by name in a [DirectiveTable] and parsed by their
//! [Directive] implementation. The parser only offers the shared building blocks:
//! required keywords, directive closes, nested bodies and raw marker scanning.
//!
//! Content runs are never interpreted. A keyword that no sequence can start, such as an
//! `{endif}` with no open `if`, stops the content run, and the compile then fails with
//! "expected end of template" at that keyword.

pub mod directives;

use log::trace;

use self::directives::DirectiveTable;
use super::compiler::CompileContext;
use super::diagnostics::CompileResult;
use super::fragments::Fragments;
use super::scanning::LINE_BREAK;

pub struct StatementParser<'c, 'a> {
    pub ctx: &'c mut CompileContext<'a>,
    directives: &'c DirectiveTable,
}

impl<'c, 'a> StatementParser<'c, 'a> {
    pub fn new(ctx: &'c mut CompileContext<'a>, directives: &'c DirectiveTable) -> Self {
        StatementParser { ctx, directives }
    }

    /// Parse the whole source.
    pub fn parse_template(&mut self) -> CompileResult<Fragments> {
        let mut out = Fragments::new();
        self.parse_sequence(&mut out)?;
        self.parse_content(&mut out);
        if !self.ctx.scanner.at_end() {
            return Err(self.ctx.error("expected end of template"));
        }
        Ok(out)
    }

    pub fn parse_sequence(&mut self, out: &mut Fragments) -> CompileResult<()> {
        while self.parse_operator(out)? {}
        Ok(())
    }

    /// One content run and one statement directive. Returns whether anything was consumed.
    fn parse_operator(&mut self, out: &mut Fragments) -> CompileResult<bool> {
        let consumed = self.parse_content(out);
        let directives = self.directives;
        let start = self.ctx.scanner.position();
        let Some(name) = self
            .ctx
            .keywords
            .match_directive_with(&mut self.ctx.scanner, |name| directives.contains(name))
        else {
            return Ok(consumed);
        };
        let Some(directive) = directives.get(&name) else {
            return Ok(consumed);
        };
        trace!("directive `{}` at byte {}", name, start);
        directive.parse(self, out)?;
        Ok(true)
    }

    /// Copy literal text up to the next directive keyword. Returns whether any text was
    /// consumed.
    fn parse_content(&mut self, out: &mut Fragments) -> bool {
        let scanner = &mut self.ctx.scanner;
        let start = scanner.position();
        let open = self.ctx.keywords.open();
        while self.ctx.keywords.peek(scanner).is_none() {
            let rest = scanner.rest();
            let Some(first) = rest.chars().next() else {
                break;
            };
            let skip = rest[first.len_utf8()..]
                .find(open)
                .map(|i| i + first.len_utf8())
                .unwrap_or(rest.len());
            scanner.advance(skip);
        }
        let end = scanner.position();
        if end > start {
            out.print_literal(&scanner.source()[start..end]);
            true
        } else {
            false
        }
    }

    /// Close the current directive: optional whitespace, the operator-close delimiter and,
    /// when enabled, one line break.
    pub fn close(&mut self) -> CompileResult<()> {
        let ctx = &mut *self.ctx;
        ctx.scanner.skip_whitespace();
        if !ctx.scanner.match_literal(&ctx.options.operator_close) {
            return Err(ctx.error("expected directive close"));
        }
        if ctx.options.swallow_newline {
            ctx.scanner.match_regex(&LINE_BREAK);
        }
        Ok(())
    }

    /// Consume one of the `allowed` directive keywords.
    pub fn match_keyword(&mut self, allowed: &[&str]) -> Option<String> {
        self.ctx
            .keywords
            .match_directive(&mut self.ctx.scanner, Some(allowed))
    }

    /// Require one of the `allowed` directive keywords.
    pub fn expect_keyword(&mut self, allowed: &[&str]) -> CompileResult<String> {
        if let Some(name) = self.match_keyword(allowed) {
            return Ok(name);
        }
        let open = self.ctx.options.operator_open.as_str();
        let expected: Vec<String> = allowed
            .iter()
            .map(|keyword| format!("`{}{}`", open, keyword))
            .collect();
        let message = match expected.as_slice() {
            [single] => format!("expected {}", single),
            _ => format!("expected one of {}", expected.join(", ")),
        };
        Err(self.ctx.error(message))
    }

    /// Parse a block body one nesting level deeper.
    pub fn parse_body(&mut self, out: &mut Fragments) -> CompileResult<()> {
        self.ctx.enter()?;
        let result = self.parse_sequence(out);
        self.ctx.leave();
        result
    }

    /// Consume everything up to and including `<open><keyword><close>`, returning the text
    /// before the marker. Nothing in between is interpreted.
    pub fn scan_until_marker(&mut self, keyword: &str) -> CompileResult<&'a str> {
        let ctx = &mut *self.ctx;
        let marker = format!(
            "{}{}{}",
            ctx.options.operator_open, keyword, ctx.options.operator_close
        );
        let rest = ctx.scanner.rest();
        let Some(index) = rest.find(&marker) else {
            return Err(ctx.error(format!("expected closing `{}`", marker)));
        };
        ctx.scanner.advance(index + marker.len());
        if ctx.options.swallow_newline {
            ctx.scanner.match_regex(&LINE_BREAK);
        }
        Ok(&rest[..index])
    }
}
