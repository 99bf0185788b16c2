//! Program execution
//!
//! A compiled [Program] is interpreted line by line against a copy of the caller's
//! [Bindings]. All variables share one flat scope: loop variables, `set` targets and the
//! temporaries of `for ... else` are written into it and stay visible after their block.
//!
//! Block headers carry chain links computed at assembly time, so an `if` chain jumps
//! straight to the arm that runs and a loop body is replayed by re-running its line range.
//!
//! Output functions and `include` resolution come from the [Environment]. Without an
//! [Includer], `{include}` fails at render time.

pub mod value;

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use thiserror::Error;

pub use self::value::{Function, Value};
use self::value::parse_number;
use super::assembling::{Instruction, Link, Program};
use super::expressions::ast::Expr;
use super::expressions::operators::Operator;
use super::fragments::{Block, Output, Statement};

/// Includes nested deeper than this fail.
pub const MAX_INCLUDE_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("a value of type {0} cannot be printed")]
    NotPrintable(&'static str),
    #[error("a value of type {0} is not iterable")]
    NotIterable(&'static str),
    #[error("a value of type {0} is not callable")]
    NotCallable(&'static str),
    #[error("cannot assign into a value of type {0}")]
    NotAssignable(&'static str),
    #[error("invalid list index `{0}`")]
    InvalidIndex(String),
    #[error("invalid operands for `{op}`: {lhs} and {rhs}")]
    InvalidOperands {
        op: String,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("invalid operand for `{op}`: {operand}")]
    InvalidOperand { op: String, operand: &'static str },
    #[error("division by zero")]
    DivisionByZero,
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("includes are not available without a template manager")]
    IncludeUnavailable,
    #[error("includes nested deeper than {0} levels")]
    IncludeDepth(usize),
    #[error("failed to include `{name}`: {message}")]
    Include { name: String, message: String },
    /// Raised by user functions.
    #[error("{0}")]
    Custom(String),
}

impl RenderError {
    pub fn invalid_operands(op: &str, lhs: &Value, rhs: &Value) -> Self {
        RenderError::InvalidOperands {
            op: op.to_string(),
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
        }
    }
}

/// Named input values of one render.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Bindings(BTreeMap<String, Value>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Parse a JSON object.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    fn slot(&mut self, name: &str) -> &mut Value {
        self.0.entry(name.to_string()).or_default()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Bindings(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// Resolves `{include}` by template name.
pub trait Includer {
    /// Render `name` with `bindings`. `depth` counts the enclosing includes.
    fn include(&self, name: &str, bindings: &Bindings, depth: usize) -> Result<String, RenderError>;
}

/// Everything a render may call out to.
#[derive(Clone, Default)]
pub struct Environment<'a> {
    functions: BTreeMap<String, Function>,
    includer: Option<&'a dyn Includer>,
    depth: usize,
}

impl fmt::Debug for Environment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("includer", &self.includer.is_some())
            .field("depth", &self.depth)
            .finish()
    }
}

impl<'a> Environment<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, RenderError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Function::new(body));
        self
    }

    pub fn with_functions(mut self, functions: &BTreeMap<String, Function>) -> Self {
        self.functions
            .extend(functions.iter().map(|(name, f)| (name.clone(), f.clone())));
        self
    }

    pub fn with_includer(mut self, includer: &'a dyn Includer, depth: usize) -> Self {
        self.includer = Some(includer);
        self.depth = depth;
        self
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Run `program` against `bindings`.
pub fn execute(
    program: &Program,
    bindings: &Bindings,
    env: &Environment<'_>,
) -> Result<String, RenderError> {
    let mut machine = Machine {
        program,
        env,
        vars: bindings.clone(),
        out: String::new(),
    };
    machine.run(0, program.len())?;
    Ok(machine.out)
}

struct Machine<'p, 'e, 'a> {
    program: &'p Program,
    env: &'e Environment<'a>,
    vars: Bindings,
    out: String,
}

impl Machine<'_, '_, '_> {
    /// Headers always carry a link once assembled; anything else runs as an empty block.
    fn link(&self, header: usize) -> Link {
        self.program.link(header).unwrap_or(Link {
            next: header + 1,
            end: header,
        })
    }

    /// Run lines `start..end`, which must hold whole blocks.
    fn run(&mut self, start: usize, end: usize) -> Result<(), RenderError> {
        let program = self.program;
        let lines = program.lines();
        let mut pc = start;
        while pc < end {
            pc = match &lines[pc].instruction {
                Instruction::Print(outputs) => {
                    for output in outputs {
                        match output {
                            Output::Literal(text) => self.out.push_str(text),
                            Output::Value(expr) => {
                                let value = self.eval(expr)?;
                                value.print_to(&mut self.out)?;
                            }
                        }
                    }
                    pc + 1
                }
                Instruction::Statement(statement) => {
                    self.exec(statement)?;
                    pc + 1
                }
                Instruction::Expr(expr) => {
                    self.eval(expr)?;
                    pc + 1
                }
                Instruction::Begin(Block::Foreach {
                    collection,
                    key,
                    value,
                }) => {
                    let link = self.link(pc);
                    let entries = self.eval(collection)?.entries()?;
                    for (entry_key, entry_value) in entries {
                        if let Some(key) = key {
                            *self.vars.slot(key) = entry_key;
                        }
                        *self.vars.slot(value) = entry_value;
                        self.run(pc + 1, link.next)?;
                    }
                    link.end + 1
                }
                Instruction::Begin(_) => self.run_chain(pc)?,
                Instruction::EndBegin(_) | Instruction::End => pc + 1,
            };
        }
        Ok(())
    }

    /// Run the taken arm of the `if` chain headed at `pc`; returns the line after the chain.
    fn run_chain(&mut self, pc: usize) -> Result<usize, RenderError> {
        let program = self.program;
        let lines = program.lines();
        let mut header = pc;
        loop {
            let link = self.link(header);
            let taken = match &lines[header].instruction {
                Instruction::Begin(Block::If(condition))
                | Instruction::EndBegin(Block::ElseIf(condition)) => {
                    self.eval(condition)?.is_truthy()
                }
                Instruction::EndBegin(Block::Else) => true,
                _ => false,
            };
            if taken {
                self.run(header + 1, link.next)?;
                return Ok(link.end + 1);
            }
            if link.next >= link.end {
                return Ok(link.end + 1);
            }
            header = link.next;
        }
    }

    fn exec(&mut self, statement: &Statement) -> Result<(), RenderError> {
        match statement {
            Statement::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value)
            }
            Statement::Increment(target) => {
                let value = self.eval(target)?.arithmetic("+", &Value::Int(1))?;
                self.assign(target, value)
            }
            Statement::Decrement(target) => {
                let value = self.eval(target)?.arithmetic("-", &Value::Int(1))?;
                self.assign(target, value)
            }
        }
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Result<(), RenderError> {
        let mut path = Vec::new();
        let mut cursor = target;
        let root = loop {
            match cursor {
                Expr::Var(name) => break name,
                Expr::Index { target, key } => {
                    path.push(self.eval(key)?);
                    cursor = target;
                }
                Expr::Member { target, name } => {
                    path.push(Value::Str(name.clone()));
                    cursor = target;
                }
                other => return Err(RenderError::NotAssignable(expr_kind(other))),
            }
        };
        let mut slot = self.vars.slot(root);
        for key in path.iter().rev() {
            slot = slot.slot_mut(key)?;
        }
        *slot = value;
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, RenderError> {
        match expr {
            Expr::Str(text) => Ok(Value::Str(text.clone())),
            Expr::Number(text) => Ok(parse_number(text)),
            Expr::Var(name) => Ok(self.vars.get(name).cloned().unwrap_or_default()),
            Expr::Group(inner) => self.eval(inner),
            Expr::Unary { op, operand } => match op {
                Operator::At => Ok(self.eval(operand).unwrap_or_default()),
                Operator::Bang => Ok(Value::Bool(!self.eval(operand)?.is_truthy())),
                Operator::Minus => self.eval(operand)?.negate(),
                Operator::Plus => self.eval(operand)?.to_numeric(),
                other => Err(RenderError::InvalidOperand {
                    op: other.to_string(),
                    operand: "expression",
                }),
            },
            Expr::Binary { first, rest } => {
                let mut value = self.eval(first)?;
                for (op, operand) in rest {
                    value = self.eval_binary(*op, value, operand)?;
                }
                Ok(value)
            }
            Expr::Index { target, key } => {
                let target = self.eval(target)?;
                let key = self.eval(key)?;
                Ok(target.index(&key))
            }
            Expr::Member { target, name } => Ok(self.eval(target)?.member(name)),
            Expr::Call { callee, args } => {
                let callee = self.eval(callee)?;
                let args = self.eval_all(args)?;
                callee.call(&args)
            }
            Expr::Function { name, args } => {
                let args = self.eval_all(args)?;
                let function = self
                    .env
                    .functions
                    .get(name)
                    .ok_or_else(|| RenderError::UnknownFunction(name.clone()))?;
                function.call(&args)
            }
            Expr::Include(name) => {
                let name = self.eval(name)?.to_key();
                let includer = self.env.includer.ok_or(RenderError::IncludeUnavailable)?;
                if self.env.depth >= MAX_INCLUDE_DEPTH {
                    return Err(RenderError::IncludeDepth(MAX_INCLUDE_DEPTH));
                }
                includer
                    .include(&name, &self.vars, self.env.depth + 1)
                    .map(Value::Str)
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, RenderError> {
        exprs.iter().map(|expr| self.eval(expr)).collect()
    }

    /// Fold one link of a binary chain into the value accumulated so far.
    fn eval_binary(&mut self, op: Operator, left: Value, rhs: &Expr) -> Result<Value, RenderError> {
        match op {
            Operator::And => {
                let value = left.is_truthy() && self.eval(rhs)?.is_truthy();
                return Ok(Value::Bool(value));
            }
            Operator::Or => {
                let value = left.is_truthy() || self.eval(rhs)?.is_truthy();
                return Ok(Value::Bool(value));
            }
            _ => {}
        }
        let right = self.eval(rhs)?;
        let ordering = |accept: fn(std::cmp::Ordering) -> bool| {
            left.compare(&right, op.as_str())
                .map(|ordering| Value::Bool(ordering.is_some_and(accept)))
        };
        match op {
            Operator::Eq => Ok(Value::Bool(left.loose_eq(&right))),
            Operator::NotEq => Ok(Value::Bool(!left.loose_eq(&right))),
            Operator::Less => ordering(|o| o.is_lt()),
            Operator::LessEq => ordering(|o| o.is_le()),
            Operator::Greater => ordering(|o| o.is_gt()),
            Operator::GreaterEq => ordering(|o| o.is_ge()),
            Operator::Plus
            | Operator::Minus
            | Operator::Star
            | Operator::Slash
            | Operator::Percent => left.arithmetic(op.as_str(), &right),
            other => Err(RenderError::invalid_operands(other.as_str(), &left, &right)),
        }
    }
}

fn expr_kind(expr: &Expr) -> &'static str {
    match expr {
        Expr::Str(_) => "string",
        Expr::Number(_) => "number",
        Expr::Call { .. } | Expr::Function { .. } => "call result",
        Expr::Include(_) => "include",
        _ => "expression",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::compiler::{compile, CompileOptions};

    fn render(source: &str, bindings: &Bindings) -> Result<String, RenderError> {
        compile(source, &CompileOptions::default())
            .unwrap()
            .render(bindings)
    }

    #[test]
    fn test_bindings_from_json() {
        let bindings = Bindings::from_json(r#"{"name": "World", "items": [1, 2]}"#).unwrap();
        assert_eq!(bindings.get("name"), Some(&Value::from("World")));
        assert_eq!(bindings.get("items"), Some(&Value::from(vec![1, 2])));
        assert!(Bindings::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_variables_persist_after_blocks() {
        let bindings = Bindings::new().with("items", vec!["a", "b"]);
        let out = render("{for items i v}{endfor}{echo i}{echo v}", &bindings).unwrap();
        assert_eq!(out, "1b");
    }

    #[test]
    fn test_set_inc_dec() {
        let out = render(
            "{set n 1}{inc n}{inc n}{dec n}{echo n}|{set user.name \"Ann\"}{echo user.name}|{set xs[0] 5}{echo xs[0]}",
            &Bindings::new(),
        )
        .unwrap();
        assert_eq!(out, "2|Ann|5");
    }

    #[test]
    fn test_short_circuit() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let bindings = Bindings::new().with(
            "touch",
            Value::function(move |_| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(Value::Bool(true))
            }),
        );
        let out = render("{echo 0 && touch()}{echo 1 || touch()}", &bindings).unwrap();
        assert_eq!(out, "1");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_binary_chains_fold_left() {
        let out = render("{echo 1 - 2 - 3}|{echo 2 * 3 + 4 * 5}|{echo 0 || 0 || 7}", &Bindings::new());
        assert_eq!(out.unwrap(), "-4|26|1");

        let source = format!("{{echo 1{}}}", "+1".repeat(10_000));
        assert_eq!(render(&source, &Bindings::new()).unwrap(), "10001");
    }

    #[test]
    fn test_short_circuit_spans_the_whole_chain() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let bindings = Bindings::new().with(
            "touch",
            Value::function(move |_| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(Value::Bool(true))
            }),
        );
        let out = render("{echo 0 && touch() && touch()}{echo 1 && touch() || touch()}", &bindings);
        assert_eq!(out.unwrap(), "1");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_silenced_errors_read_as_null() {
        let out = render("[{echo @(1 / 0)}]", &Bindings::new()).unwrap();
        assert_eq!(out, "[]");
        assert_eq!(
            render("{echo 1 / 0}", &Bindings::new()),
            Err(RenderError::DivisionByZero)
        );
    }

    #[test]
    fn test_render_errors() {
        let bindings = Bindings::new().with("n", 3).with("xs", vec![1]);
        assert_eq!(
            render("{for n v}{endfor}", &bindings),
            Err(RenderError::NotIterable("int"))
        );
        assert_eq!(
            render("{echo xs}", &bindings),
            Err(RenderError::NotPrintable("list"))
        );
        assert_eq!(
            render("{echo n()}", &bindings),
            Err(RenderError::NotCallable("int"))
        );
        assert_eq!(
            render("{include \"other\"}", &bindings),
            Err(RenderError::IncludeUnavailable)
        );
    }

    #[test]
    fn test_output_functions_come_from_environment() {
        let options = CompileOptions::default().with_output_function("upper");
        let template = compile("{upper name}", &options).unwrap();
        let bindings = Bindings::new().with("name", "ann");
        assert_eq!(
            template.render(&bindings),
            Err(RenderError::UnknownFunction("upper".into()))
        );

        let env = Environment::new().with_function("upper", |args| {
            let mut text = String::new();
            for arg in args {
                arg.print_to(&mut text)?;
            }
            Ok(Value::from(text.to_uppercase()))
        });
        assert_eq!(template.render_with(&bindings, &env).unwrap(), "ANN");
    }

    #[test]
    fn test_include_depth_is_bounded() {
        struct Recursive;
        impl Includer for Recursive {
            fn include(
                &self,
                _name: &str,
                bindings: &Bindings,
                depth: usize,
            ) -> Result<String, RenderError> {
                let template = compile("{include \"self\"}", &CompileOptions::default())
                    .map_err(|err| RenderError::Custom(err.to_string()))?;
                template.render_with(bindings, &Environment::new().with_includer(self, depth))
            }
        }
        let template = compile("{include \"self\"}", &CompileOptions::default()).unwrap();
        let env = Environment::new().with_includer(&Recursive, 0);
        assert_eq!(
            template.render_with(&Bindings::new(), &env),
            Err(RenderError::IncludeDepth(MAX_INCLUDE_DEPTH))
        );
    }
}
