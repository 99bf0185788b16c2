//! Fragment assembly
//!
//! Linearizes a nested fragment list into a flat [Program]. The assembler walks the list in
//! order with a single indent counter, starting at 0:
//!
//! - a print run becomes exactly one `Print` line at the current indent
//! - a block begin is emitted at the current indent, then the indent grows by one
//! - a block end first shrinks the indent, then is emitted
//! - a block end-begin is emitted one level out, with no net change
//! - statements and expression pieces are emitted at the current indent
//! - a nested list is walked with the same counter, so its changes carry over to the
//!   siblings that follow it
//!
//! While walking, block chains (`if`, `else if`, `else`, closing `}`) are linked into a jump
//! table so the runtime can move from one arm to the next without rescanning. Fragments
//! appended by directive handlers are not trusted: a chain that does not balance is an
//! [AssemblyError].

use std::fmt;

use thiserror::Error;

use super::expressions::ast::Expr;
use super::fragments::{Block, Fragment, Fragments, Output, Statement};

/// Guard placed at the top of every listing.
pub const LISTING_GUARD: &str =
    "<?php if(!defined('AWA_TEMPLATE_GUARD')){exit('Template guard restriction');}";

/// Name of the output accumulator in listings.
pub const ACCUMULATOR: &str = "$___accum";

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Print(Vec<Output>),
    Begin(Block),
    EndBegin(Block),
    End,
    Statement(Statement),
    Expr(Expr),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Print(outputs) => {
                write!(f, "{}.=", ACCUMULATOR)?;
                for (i, output) in outputs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    write!(f, "{}", output)?;
                }
                f.write_str(";")
            }
            Instruction::Begin(block) => write!(f, "{}", block),
            Instruction::EndBegin(block) => write!(f, "}}{}", block),
            Instruction::End => f.write_str("}"),
            Instruction::Statement(statement) => write!(f, "{};", statement),
            Instruction::Expr(expr) => write!(f, "{};", expr),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub indent: usize,
    pub instruction: Instruction,
}

/// Position of a block header within its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    /// Line of the next arm of the chain, or of the closing `End`.
    pub next: usize,
    /// Line of the closing `End`.
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("block end without an open block (line {line})")]
    UnmatchedEnd { line: usize },
    #[error("`{header}` does not continue an open `if` chain (line {line})")]
    DanglingContinuation { header: String, line: usize },
    #[error("`{header}` cannot open a block (line {line})")]
    InvalidOpening { header: String, line: usize },
    #[error("block opened at line {line} is never closed")]
    Unclosed { line: usize },
}

/// The flat, executable form of a compiled template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    lines: Vec<Line>,
    links: Vec<Option<Link>>,
}

impl Program {
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Chain link of a block header line; `None` for any other line.
    pub fn link(&self, line: usize) -> Option<Link> {
        self.links.get(line).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Listing form: guard, accumulator reset, the indented lines, return.
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", LISTING_GUARD)?;
        writeln!(f, "{}='';", ACCUMULATOR)?;
        for line in &self.lines {
            writeln!(f, "{}{}", "  ".repeat(line.indent), line.instruction)?;
        }
        writeln!(f, "return {};", ACCUMULATOR)
    }
}

struct OpenChain {
    is_if: bool,
    closed_by_else: bool,
    headers: Vec<usize>,
}

struct Assembler {
    lines: Vec<Line>,
    links: Vec<Option<Link>>,
    indent: usize,
    open: Vec<OpenChain>,
}

impl Assembler {
    fn emit(&mut self, indent: usize, instruction: Instruction) -> usize {
        self.lines.push(Line {
            indent,
            instruction,
        });
        self.links.push(None);
        self.lines.len() - 1
    }

    fn walk(&mut self, fragments: &Fragments) -> Result<(), AssemblyError> {
        for fragment in fragments {
            match fragment {
                Fragment::PrintRun(outputs) => {
                    self.emit(self.indent, Instruction::Print(outputs.clone()));
                }
                Fragment::BlockBegin(block) => {
                    if !block.opens_chain() {
                        return Err(AssemblyError::InvalidOpening {
                            header: block.to_string(),
                            line: self.lines.len(),
                        });
                    }
                    let line = self.emit(self.indent, Instruction::Begin(block.clone()));
                    self.indent += 1;
                    self.open.push(OpenChain {
                        is_if: matches!(block, Block::If(_)),
                        closed_by_else: false,
                        headers: vec![line],
                    });
                }
                Fragment::BlockEndBegin(block) => {
                    let line = self.lines.len();
                    let chain = self
                        .open
                        .last_mut()
                        .filter(|chain| chain.is_if && !chain.closed_by_else && block.continues_chain())
                        .ok_or_else(|| AssemblyError::DanglingContinuation {
                            header: block.to_string(),
                            line,
                        })?;
                    chain.headers.push(line);
                    chain.closed_by_else = matches!(block, Block::Else);
                    self.emit(
                        self.indent.saturating_sub(1),
                        Instruction::EndBegin(block.clone()),
                    );
                }
                Fragment::BlockEnd => {
                    let chain = self.open.pop().ok_or(AssemblyError::UnmatchedEnd {
                        line: self.lines.len(),
                    })?;
                    self.indent = self.indent.saturating_sub(1);
                    let end = self.emit(self.indent, Instruction::End);
                    let mut headers = chain.headers.into_iter().peekable();
                    while let Some(header) = headers.next() {
                        let next = headers.peek().copied().unwrap_or(end);
                        self.links[header] = Some(Link { next, end });
                    }
                }
                Fragment::Statement(statement) => {
                    self.emit(self.indent, Instruction::Statement(statement.clone()));
                }
                Fragment::ExprPiece(expr) => {
                    self.emit(self.indent, Instruction::Expr(expr.clone()));
                }
                Fragment::Nested(inner) => self.walk(inner)?,
            }
        }
        Ok(())
    }
}

/// Linearize `fragments` into a program.
pub fn assemble(fragments: &Fragments) -> Result<Program, AssemblyError> {
    let mut assembler = Assembler {
        lines: Vec::new(),
        links: Vec::new(),
        indent: 0,
        open: Vec::new(),
    };
    assembler.walk(fragments)?;
    if let Some(chain) = assembler.open.first() {
        return Err(AssemblyError::Unclosed {
            line: chain.headers[0],
        });
    }
    Ok(Program {
        lines: assembler.lines,
        links: assembler.links,
    })
}
