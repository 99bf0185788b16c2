//! Typed code fragments
//!
//! The statement parser does not emit target source text. It appends typed fragments to a
//! [Fragments] list, in emission order, and the assembler later turns that list into a
//! program.
//!
//! Print runs are grouped when they are built: [Fragments::print_literal] and
//! [Fragments::print_value] extend a trailing [Fragment::PrintRun] instead of pushing a new
//! fragment, so consecutive outputs always share one run. A run ends as soon as any other
//! fragment is appended.
//!
//! Each payload's `Display` is its reference target code:
//!
//! | fragment | listing |
//! |---|---|
//! | `PrintRun([a, b])` | `$___accum.=a.b;` |
//! | `BlockBegin(If(c))` | `if(c){` |
//! | `BlockEndBegin(Else)` | `}else{` |
//! | `BlockEnd` | `}` |
//! | `Statement(Assign)` | `$x=v;` |

use std::fmt;

use super::expressions::ast::{quote, Expr};

/// One item of a print run.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Literal template text.
    Literal(String),
    /// The printed value of an expression.
    Value(Expr),
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Literal(text) => f.write_str(&quote(text)),
            Output::Value(expr) => write!(f, "{}", expr),
        }
    }
}

/// The header of a block.
///
/// `If` and `Foreach` open a block; `ElseIf` and `Else` continue an `If` chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    If(Expr),
    ElseIf(Expr),
    Else,
    Foreach {
        collection: Expr,
        key: Option<String>,
        value: String,
    },
}

impl Block {
    pub fn opens_chain(&self) -> bool {
        matches!(self, Block::If(_) | Block::Foreach { .. })
    }

    pub fn continues_chain(&self) -> bool {
        matches!(self, Block::ElseIf(_) | Block::Else)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Block::If(condition) => write!(f, "if({}){{", condition),
            Block::ElseIf(condition) => write!(f, "else if({}){{", condition),
            Block::Else => f.write_str("else{"),
            Block::Foreach {
                collection,
                key: Some(key),
                value,
            } => write!(f, "foreach({} as ${}=>${}){{", collection, key, value),
            Block::Foreach {
                collection,
                key: None,
                value,
            } => write!(f, "foreach({} as ${}){{", collection, value),
        }
    }
}

/// A standalone statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign { target: Expr, value: Expr },
    Increment(Expr),
    Decrement(Expr),
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Assign { target, value } => write!(f, "{}={}", target, value),
            Statement::Increment(target) => write!(f, "{}++", target),
            Statement::Decrement(target) => write!(f, "{}--", target),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    PrintRun(Vec<Output>),
    BlockBegin(Block),
    BlockEndBegin(Block),
    BlockEnd,
    Statement(Statement),
    /// An expression evaluated for its side effects.
    ExprPiece(Expr),
    Nested(Fragments),
}

/// An ordered fragment list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragments {
    items: Vec<Fragment>,
}

impl Fragments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_literal(&mut self, text: impl Into<String>) {
        self.print(Output::Literal(text.into()));
    }

    pub fn print_value(&mut self, expr: Expr) {
        self.print(Output::Value(expr));
    }

    fn print(&mut self, output: Output) {
        match self.items.last_mut() {
            Some(Fragment::PrintRun(run)) => run.push(output),
            _ => self.items.push(Fragment::PrintRun(vec![output])),
        }
    }

    pub fn begin(&mut self, block: Block) {
        self.items.push(Fragment::BlockBegin(block));
    }

    pub fn end_begin(&mut self, block: Block) {
        self.items.push(Fragment::BlockEndBegin(block));
    }

    pub fn end(&mut self) {
        self.items.push(Fragment::BlockEnd);
    }

    pub fn statement(&mut self, statement: Statement) {
        self.items.push(Fragment::Statement(statement));
    }

    pub fn expr_piece(&mut self, expr: Expr) {
        self.items.push(Fragment::ExprPiece(expr));
    }

    pub fn nested(&mut self, inner: Fragments) {
        self.items.push(Fragment::Nested(inner));
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Fragment> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a Fragments {
    type Item = &'a Fragment;
    type IntoIter = std::slice::Iter<'a, Fragment>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consecutive_prints_share_a_run() {
        let mut fragments = Fragments::new();
        fragments.print_literal("Hello ");
        fragments.print_value(Expr::group(Expr::var("name")));
        fragments.print_literal("!");

        assert_eq!(fragments.len(), 1);
        match fragments.iter().next() {
            Some(Fragment::PrintRun(run)) => {
                let code: Vec<String> = run.iter().map(ToString::to_string).collect();
                assert_eq!(code, vec!["'Hello '", "($name)", "'!'"]);
            }
            other => panic!("expected a print run, got {:?}", other),
        }
    }

    #[test]
    fn test_any_other_fragment_ends_the_run() {
        let mut fragments = Fragments::new();
        fragments.print_literal("a");
        fragments.begin(Block::If(Expr::var("x")));
        fragments.print_literal("b");
        fragments.end();
        fragments.print_literal("c");
        assert_eq!(fragments.len(), 5);
    }

    #[test]
    fn test_nested_list_does_not_join_parent_run() {
        let mut inner = Fragments::new();
        inner.print_literal("inner");
        let mut fragments = Fragments::new();
        fragments.print_literal("outer");
        fragments.nested(inner);
        fragments.print_literal("after");
        assert_eq!(fragments.len(), 3);
    }

    #[test]
    fn test_block_headers() {
        let foreach = Block::Foreach {
            collection: Expr::var("items"),
            key: Some("k".into()),
            value: "v".into(),
        };
        assert_eq!(foreach.to_string(), "foreach($items as $k=>$v){");
        assert_eq!(Block::ElseIf(Expr::var("y")).to_string(), "else if($y){");
        assert!(foreach.opens_chain());
        assert!(Block::Else.continues_chain());
    }

    #[test]
    fn test_statements() {
        let assign = Statement::Assign {
            target: Expr::var("___tplUniqVar1"),
            value: Expr::var("items"),
        };
        assert_eq!(assign.to_string(), "$___tplUniqVar1=$items");
        assert_eq!(Statement::Decrement(Expr::var("n")).to_string(), "$n--");
    }
}
