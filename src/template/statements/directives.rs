//! Directive table
//!
//! Every directive that can start a statement is a [Directive] registered by name. The
//! table for one compile holds, from lowest to highest precedence:
//!
//! 1. registered output functions, which print the function's result
//! 2. registered compiler handlers, which append arbitrary fragments
//! 3. reserved keywords without a handler, which always fail
//! 4. the built-in directives
//!
//! Chain keywords (`elif`, `else`, `endif`, `endfor`, `endrem`, `endraw`) are never in the
//! table; they are only accepted by the directive that owns them.

use std::collections::BTreeMap;

use super::StatementParser;
use crate::template::compiler::{CompileOptions, Handler};
use crate::template::diagnostics::CompileResult;
use crate::template::expressions::ast::Expr;
use crate::template::fragments::{Block, Fragments, Statement};
use crate::template::keywords::{
    DEC, ECHO, ELIF, ELSE, ENDFOR, ENDIF, ENDRAW, ENDREM, FOR, IF, INC, INCLUDE, RAW, REM,
    RESERVED, SET,
};
use crate::template::scanning::IDENTIFIER;

/// Parses one directive. Called with the scanner right after the directive keyword.
pub trait Directive: Send + Sync {
    fn parse(&self, parser: &mut StatementParser<'_, '_>, out: &mut Fragments) -> CompileResult<()>;
}

/// `{rem}...{endrem}`: dropped.
struct Rem;

impl Directive for Rem {
    fn parse(&self, parser: &mut StatementParser<'_, '_>, _out: &mut Fragments) -> CompileResult<()> {
        parser.close()?;
        parser.scan_until_marker(ENDREM)?;
        Ok(())
    }
}

/// `{raw}...{endraw}`: printed verbatim.
struct Raw;

impl Directive for Raw {
    fn parse(&self, parser: &mut StatementParser<'_, '_>, out: &mut Fragments) -> CompileResult<()> {
        parser.close()?;
        let text = parser.scan_until_marker(ENDRAW)?;
        out.print_literal(text);
        Ok(())
    }
}

struct Echo;

impl Directive for Echo {
    fn parse(&self, parser: &mut StatementParser<'_, '_>, out: &mut Fragments) -> CompileResult<()> {
        let expr = parser.ctx.expect_expression()?;
        parser.close()?;
        out.print_value(Expr::group(expr));
        Ok(())
    }
}

/// `{if c}...{elif c}...{else}...{endif}`. The arms are written straight into `out`.
struct If;

impl Directive for If {
    fn parse(&self, parser: &mut StatementParser<'_, '_>, out: &mut Fragments) -> CompileResult<()> {
        let condition = parser.ctx.expect_expression()?;
        parser.close()?;
        out.begin(Block::If(condition));
        loop {
            parser.parse_body(out)?;
            let keyword = parser.expect_keyword(&[ENDIF, ELIF, ELSE])?;
            match keyword.as_str() {
                ELIF => {
                    let condition = parser.ctx.expect_expression()?;
                    parser.close()?;
                    out.end_begin(Block::ElseIf(condition));
                }
                ELSE => {
                    parser.close()?;
                    out.end_begin(Block::Else);
                    parser.parse_body(out)?;
                    parser.expect_keyword(&[ENDIF])?;
                    parser.close()?;
                    out.end();
                    return Ok(());
                }
                _ => {
                    parser.close()?;
                    out.end();
                    return Ok(());
                }
            }
        }
    }
}

/// `{for collection [key] value}...[{else}...]{endfor}`.
///
/// With an `else` arm the collection is stored in a temporary first, so it is evaluated
/// once for both the emptiness guard and the loop.
struct For;

impl Directive for For {
    fn parse(&self, parser: &mut StatementParser<'_, '_>, out: &mut Fragments) -> CompileResult<()> {
        let collection = parser.ctx.expect_expression()?;
        parser.ctx.scanner.skip_whitespace();
        let first = parser.ctx.expect_identifier()?;
        parser.ctx.scanner.skip_whitespace();
        let (key, value) = match parser.ctx.scanner.match_regex(&IDENTIFIER) {
            Some(second) => (Some(first), second.to_string()),
            None => (None, first),
        };
        parser.close()?;

        let mut body = Fragments::new();
        parser.parse_body(&mut body)?;
        let else_body = match parser.match_keyword(&[ELSE]) {
            Some(_) => {
                parser.close()?;
                let mut else_body = Fragments::new();
                parser.parse_body(&mut else_body)?;
                Some(else_body)
            }
            None => None,
        };
        parser.expect_keyword(&[ENDFOR])?;
        parser.close()?;

        match else_body {
            Some(else_body) => {
                let temp = Expr::var(parser.ctx.temp_name());
                out.statement(Statement::Assign {
                    target: temp.clone(),
                    value: collection,
                });
                out.begin(Block::If(temp.clone()));
                out.begin(Block::Foreach {
                    collection: temp,
                    key,
                    value,
                });
                out.nested(body);
                out.end();
                out.end_begin(Block::Else);
                out.nested(else_body);
                out.end();
            }
            None => {
                out.begin(Block::Foreach {
                    collection,
                    key,
                    value,
                });
                out.nested(body);
                out.end();
            }
        }
        Ok(())
    }
}

/// `{set target value}`
struct Set;

impl Directive for Set {
    fn parse(&self, parser: &mut StatementParser<'_, '_>, out: &mut Fragments) -> CompileResult<()> {
        let target = parser.ctx.expect_place()?;
        let value = parser.ctx.expect_expression()?;
        parser.close()?;
        out.statement(Statement::Assign { target, value });
        Ok(())
    }
}

/// `{inc target}` and `{dec target}`
struct Step {
    increment: bool,
}

impl Directive for Step {
    fn parse(&self, parser: &mut StatementParser<'_, '_>, out: &mut Fragments) -> CompileResult<()> {
        let target = parser.ctx.expect_place()?;
        parser.close()?;
        out.statement(if self.increment {
            Statement::Increment(target)
        } else {
            Statement::Decrement(target)
        });
        Ok(())
    }
}

/// `{include name}`: prints another template rendered with the current variables.
struct Include;

impl Directive for Include {
    fn parse(&self, parser: &mut StatementParser<'_, '_>, out: &mut Fragments) -> CompileResult<()> {
        let name = parser.ctx.expect_expression()?;
        parser.close()?;
        out.print_value(Expr::Include(Box::new(name)));
        Ok(())
    }
}

/// Whitespace-separated argument expressions up to the directive close.
fn parse_arguments(parser: &mut StatementParser<'_, '_>) -> CompileResult<Vec<Expr>> {
    let mut args = Vec::new();
    while let Some(arg) = parser.ctx.parse_expression()? {
        args.push(arg);
    }
    parser.close()?;
    Ok(args)
}

/// A registered compiler handler.
struct HandlerDirective {
    handler: Handler,
}

impl Directive for HandlerDirective {
    fn parse(&self, parser: &mut StatementParser<'_, '_>, out: &mut Fragments) -> CompileResult<()> {
        let args = parse_arguments(parser)?;
        (self.handler)(out, &args);
        Ok(())
    }
}

/// A registered output function: `{name args}` prints `name(args)`.
struct OutputFunction {
    name: String,
}

impl Directive for OutputFunction {
    fn parse(&self, parser: &mut StatementParser<'_, '_>, out: &mut Fragments) -> CompileResult<()> {
        let args = parse_arguments(parser)?;
        out.print_value(Expr::Function {
            name: self.name.clone(),
            args,
        });
        Ok(())
    }
}

/// A reserved keyword with nothing registered under it.
struct Unregistered {
    name: &'static str,
}

impl Directive for Unregistered {
    fn parse(&self, parser: &mut StatementParser<'_, '_>, _out: &mut Fragments) -> CompileResult<()> {
        Err(parser.ctx.error(format!(
            "directive `{}` has no registered handler",
            self.name
        )))
    }
}

/// Statement directives available to one compile, by name.
pub struct DirectiveTable {
    entries: BTreeMap<String, Box<dyn Directive>>,
}

impl DirectiveTable {
    pub fn new(options: &CompileOptions) -> Self {
        let mut entries: BTreeMap<String, Box<dyn Directive>> = BTreeMap::new();
        for name in &options.output_functions {
            entries.insert(name.clone(), Box::new(OutputFunction { name: name.clone() }));
        }
        for (name, handler) in &options.directive_handlers {
            entries.insert(
                name.clone(),
                Box::new(HandlerDirective {
                    handler: handler.clone(),
                }),
            );
        }
        for &name in RESERVED {
            entries
                .entry(name.to_string())
                .or_insert_with(|| Box::new(Unregistered { name }) as Box<dyn Directive>);
        }

        let builtins: [(&str, Box<dyn Directive>); 9] = [
            (REM, Box::new(Rem)),
            (RAW, Box::new(Raw)),
            (ECHO, Box::new(Echo)),
            (IF, Box::new(If)),
            (FOR, Box::new(For)),
            (SET, Box::new(Set)),
            (INC, Box::new(Step { increment: true })),
            (DEC, Box::new(Step { increment: false })),
            (INCLUDE, Box::new(Include)),
        ];
        for (name, directive) in builtins {
            entries.insert(name.to_string(), directive);
        }
        DirectiveTable { entries }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Directive> {
        self.entries.get(name).map(|directive| directive.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::compiler::compile;

    fn listing(source: &str, options: &CompileOptions) -> Vec<String> {
        let template = compile(source, options).unwrap();
        let listing = template.listing();
        let lines: Vec<&str> = listing.lines().collect();
        lines[2..lines.len() - 1]
            .iter()
            .map(|line| line.to_string())
            .collect()
    }

    #[test]
    fn test_builtins_are_statement_starters() {
        let table = DirectiveTable::new(&CompileOptions::default());
        for name in [REM, RAW, ECHO, IF, FOR, SET, INC, DEC, INCLUDE, "format"] {
            assert!(table.contains(name), "{}", name);
        }
        for name in [ELIF, ELSE, ENDIF, ENDFOR, ENDREM, ENDRAW] {
            assert!(!table.contains(name), "{}", name);
        }
    }

    #[test]
    fn test_if_chain_code() {
        let lines = listing(
            "{if x > 0}+{elif x < 0}-{else}0{endif}",
            &CompileOptions::default(),
        );
        assert_eq!(
            lines,
            vec![
                "if(($x)>(0)){",
                "  $___accum.='+';",
                "}else if(($x)<(0)){",
                "  $___accum.='-';",
                "}else{",
                "  $___accum.='0';",
                "}",
            ]
        );
    }

    #[test]
    fn test_for_without_else_uses_collection_directly() {
        let lines = listing("{for items k v}{echo k}{endfor}", &CompileOptions::default());
        assert_eq!(
            lines,
            vec!["foreach($items as $k=>$v){", "  $___accum.=($k);", "}"]
        );
    }

    #[test]
    fn test_for_with_else_evaluates_collection_once() {
        let lines = listing(
            "{for load() v}{echo v}{else}none{endfor}",
            &CompileOptions::default(),
        );
        assert_eq!(
            lines,
            vec![
                "$___tplUniqVar1=$load();",
                "if($___tplUniqVar1){",
                "  foreach($___tplUniqVar1 as $v){",
                "    $___accum.=($v);",
                "  }",
                "}else{",
                "  $___accum.='none';",
                "}",
            ]
        );
    }

    #[test]
    fn test_assignment_statements() {
        let lines = listing(
            "{set total -1}{inc user.visits}{dec counts[0]}",
            &CompileOptions::default(),
        );
        assert_eq!(
            lines,
            vec!["$total=-1;", "$user->visits++;", "$counts[0]--;"]
        );
    }

    #[test]
    fn test_assignment_target_must_be_a_place() {
        let err = compile("{set 1 2}", &CompileOptions::default()).unwrap_err();
        assert_eq!(err.message, "expected assignable expression");
        assert_eq!(err.column, 6);

        let err = compile("{inc f()}", &CompileOptions::default()).unwrap_err();
        assert_eq!(err.message, "expected assignable expression");

        let err = compile("{set this 1}", &CompileOptions::default()).unwrap_err();
        assert_eq!(err.message, "`this` cannot be referenced");
    }

    #[test]
    fn test_assigned_value_may_start_with_a_group_or_dot() {
        let lines = listing(
            "{set x (1+2)*3}{set y .5}{set row[0].name (x)}",
            &CompileOptions::default(),
        );
        assert_eq!(
            lines,
            vec![
                "$x=(((1)+(2)))*(3);",
                "$y=.5;",
                "$row[0]->name=($x);",
            ]
        );
    }

    #[test]
    fn test_include_prints_render_call() {
        let lines = listing("{include \"header\"}", &CompileOptions::default());
        assert_eq!(
            lines,
            vec!["$___accum.=$this->render('header', get_defined_vars());"]
        );
    }

    #[test]
    fn test_output_function_and_handler() {
        let options = CompileOptions::default()
            .with_output_function("upper")
            .with_directive("stamp", |out, args| {
                out.expr_piece(Expr::Call {
                    callee: Box::new(Expr::var("log")),
                    args: args.to_vec(),
                });
            });
        let lines = listing("{upper name 2}{stamp \"x\" y}", &options);
        assert_eq!(
            lines,
            vec![
                "$___accum.=$this->userFunctions['upper']($name, 2);",
                "$log('x',$y);",
            ]
        );
    }

    #[test]
    fn test_handler_wins_over_output_function() {
        let options = CompileOptions::default()
            .with_output_function("shout")
            .with_directive("shout", |out, _| out.print_literal("handled"));
        assert_eq!(listing("{shout}", &options), vec!["$___accum.='handled';"]);
    }

    #[test]
    fn test_unregistered_format_fails() {
        let err = compile("{format x}", &CompileOptions::default()).unwrap_err();
        assert_eq!(err.message, "directive `format` has no registered handler");
    }

    #[test]
    fn test_raw_is_not_interpreted() {
        let lines = listing("{raw}{if 'x'}{endraw}", &CompileOptions::default());
        assert_eq!(lines, vec![r"$___accum.='{if \'x\'}';"]);
    }

    #[test]
    fn test_unterminated_rem_and_raw() {
        let err = compile("{rem}never closed", &CompileOptions::default()).unwrap_err();
        assert_eq!(err.message, "expected closing `{endrem}`");
        let err = compile("{raw}never closed", &CompileOptions::default()).unwrap_err();
        assert_eq!(err.message, "expected closing `{endraw}`");
    }

    #[test]
    fn test_for_requires_a_binding() {
        let err = compile("{for items}{endfor}", &CompileOptions::default()).unwrap_err();
        assert_eq!(err.message, "expected identifier");
    }
}
