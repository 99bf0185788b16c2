//! Expression code produced by the expression parser
//!
//! An [Expr] is both the executable form of an expression and its generated code: its
//! `Display` renders the reference target source. Binary operations are always fully
//! parenthesized, `((a)op(b))op(c)`, so the rendered code never depends on the target's own
//! precedence rules.

use std::fmt;

use super::operators::Operator;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// String constant, already unescaped.
    Str(String),
    /// Numeric constant, kept as written.
    Number(String),
    /// Variable reference.
    Var(String),
    /// Parenthesized sub-expression.
    Group(Box<Expr>),
    Unary {
        op: Operator,
        operand: Box<Expr>,
    },
    /// A left-associative chain of operators from one precedence level: `first`, then each
    /// `(op, operand)` folded in order. Kept flat so long chains never nest.
    Binary {
        first: Box<Expr>,
        rest: Vec<(Operator, Expr)>,
    },
    Index {
        target: Box<Expr>,
        key: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        target: Box<Expr>,
        name: String,
    },
    /// Call of an output function registered with the template manager.
    Function {
        name: String,
        args: Vec<Expr>,
    },
    /// Rendered output of another template, resolved by name at render time.
    Include(Box<Expr>),
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Str(value.into())
    }

    pub fn group(inner: Expr) -> Self {
        Expr::Group(Box::new(inner))
    }

    /// True for expressions that can be assigned to: a variable, or an index or member
    /// chain rooted at a variable.
    pub fn is_place(&self) -> bool {
        match self {
            Expr::Var(_) => true,
            Expr::Index { target, .. } | Expr::Member { target, .. } => target.is_place(),
            _ => false,
        }
    }
}

/// Quote `text` as a single-quoted target string literal.
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for c in text.chars() {
        if c == '\\' || c == '\'' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Collapse backslash escapes in the body of a string constant.
///
/// Supports `\n \t \r \v \f \a \e`, octal `\NNN`, hex `\xHH`; any other escaped character
/// stands for itself.
pub fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escaped) = chars.next() else {
            break;
        };
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'v' => out.push('\u{0B}'),
            'f' => out.push('\u{0C}'),
            'a' => out.push('\u{07}'),
            'e' => out.push('\u{1B}'),
            'x' if chars.peek().is_some_and(|c| c.is_ascii_hexdigit()) => {
                let mut value = 0u32;
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(16)) {
                        Some(digit) => {
                            value = value * 16 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value).unwrap_or('\u{FFFD}'));
            }
            '0'..='7' => {
                let mut value = escaped.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value & 0xFF).unwrap_or('\u{FFFD}'));
            }
            other => out.push(other),
        }
    }
    out
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr], separator: &str) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{}", arg)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Str(value) => f.write_str(&quote(value)),
            Expr::Number(text) => f.write_str(text),
            Expr::Var(name) => write!(f, "${}", name),
            Expr::Group(inner) => write!(f, "({})", inner),
            Expr::Unary { op, operand } => write!(f, "{}{}", op, operand),
            Expr::Binary { first, rest } => {
                for _ in 1..rest.len() {
                    f.write_str("(")?;
                }
                write!(f, "({})", first)?;
                for (i, (op, operand)) in rest.iter().enumerate() {
                    write!(f, "{}({})", op, operand)?;
                    if i + 1 < rest.len() {
                        f.write_str(")")?;
                    }
                }
                Ok(())
            }
            Expr::Index { target, key } => write!(f, "{}[{}]", target, key),
            Expr::Call { callee, args } => {
                write!(f, "{}(", callee)?;
                write_args(f, args, ",")?;
                f.write_str(")")
            }
            Expr::Member { target, name } => write!(f, "{}->{}", target, name),
            Expr::Function { name, args } => {
                write!(f, "$this->userFunctions[{}](", quote(name))?;
                write_args(f, args, ", ")?;
                f.write_str(")")
            }
            Expr::Include(name) => write!(f, "$this->render({}, get_defined_vars())", name),
        }
    }
}
