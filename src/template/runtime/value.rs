//! Runtime values
//!
//! Values are loosely typed. Numbers and numeric strings mix in arithmetic and comparison,
//! `null` reads as zero or the empty string, and any value has a truthiness. Lists, maps and
//! functions cannot be printed.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use super::RenderError;

type FunctionBody = dyn Fn(&[Value]) -> Result<Value, RenderError> + Send + Sync;

/// A callable value: an output function or a function passed in through bindings.
#[derive(Clone)]
pub struct Function(Arc<FunctionBody>);

impl Function {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, RenderError> + Send + Sync + 'static,
    {
        Function(Arc::new(body))
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, RenderError> {
        (self.0)(args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Function(..)")
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Function(Function),
}

/// A value read as a number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(n) => n,
        }
    }

    fn partial_cmp(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Number::Int(n) => Value::Int(n),
            Number::Float(n) => Value::Float(n),
        }
    }
}

/// Parse a numeric literal as written in a template.
pub fn parse_number(text: &str) -> Value {
    if let Some(hex) = text.strip_prefix("0x") {
        return match i64::from_str_radix(hex, 16) {
            Ok(n) => Value::Int(n),
            Err(_) => u64::from_str_radix(hex, 16)
                .map(|n| Value::Float(n as f64))
                .unwrap_or(Value::Float(f64::INFINITY)),
        };
    }
    if !text.contains(['.', 'e', 'E']) {
        if let Ok(n) = text.parse::<i64>() {
            return Value::Int(n);
        }
    }
    text.parse::<f64>().map(Value::Float).unwrap_or(Value::Null)
}

fn parse_numeric_str(text: &str) -> Option<Number> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    let plain = text
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !plain {
        return None;
    }
    if let Ok(n) = text.parse::<i64>() {
        return Some(Number::Int(n));
    }
    text.parse::<f64>().ok().map(Number::Float)
}

impl Value {
    pub fn function<F>(body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, RenderError> + Send + Sync + 'static,
    {
        Value::Function(Function::new(body))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty() && s != "0",
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Function(_) => true,
        }
    }

    /// Append the printed form of the value to `out`.
    pub fn print_to(&self, out: &mut String) -> Result<(), RenderError> {
        match self {
            Value::Null | Value::Bool(false) => {}
            Value::Bool(true) => out.push('1'),
            Value::Int(n) => out.push_str(&n.to_string()),
            Value::Float(n) => out.push_str(&n.to_string()),
            Value::Str(s) => out.push_str(s),
            other => return Err(RenderError::NotPrintable(other.type_name())),
        }
        Ok(())
    }

    /// The value as a map or list key.
    pub fn to_key(&self) -> String {
        match self {
            Value::Null | Value::Bool(false) => String::new(),
            Value::Bool(true) => "1".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::Str(s) => s.clone(),
            other => other.type_name().to_string(),
        }
    }

    fn as_index(&self) -> Option<usize> {
        match self.to_number()? {
            Number::Int(n) => usize::try_from(n).ok(),
            Number::Float(n) if n >= 0.0 && n.fract() == 0.0 => Some(n as usize),
            Number::Float(_) => None,
        }
    }

    pub fn to_number(&self) -> Option<Number> {
        match self {
            Value::Null => Some(Number::Int(0)),
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            Value::Int(n) => Some(Number::Int(*n)),
            Value::Float(n) => Some(Number::Float(*n)),
            Value::Str(s) => parse_numeric_str(s),
            _ => None,
        }
    }

    /// Loose equality: numbers and numeric strings compare by value, `null` and booleans
    /// compare by truthiness.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), _) => *a == other.is_truthy(),
            (_, Value::Bool(b)) => self.is_truthy() == *b,
            (Value::Null, value) | (value, Value::Null) => !value.is_truthy(),
            (Value::Str(a), Value::Str(b)) => match (self.to_number(), other.to_number()) {
                (Some(x), Some(y)) => x.partial_cmp(y) == Some(Ordering::Equal),
                _ => a == b,
            },
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, x)| b.get(key).is_some_and(|y| x.loose_eq(y)))
            }
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => match (self.to_number(), other.to_number()) {
                (Some(x), Some(y)) => x.partial_cmp(y) == Some(Ordering::Equal),
                _ => false,
            },
        }
    }

    /// Ordering for `<`, `<=`, `>` and `>=`. Two non-numeric strings compare
    /// lexicographically; anything else compares as numbers. `Ok(None)` means unordered
    /// (NaN).
    pub fn compare(&self, other: &Value, op: &str) -> Result<Option<Ordering>, RenderError> {
        if let (Value::Str(a), Value::Str(b)) = (self, other) {
            return Ok(match (self.to_number(), other.to_number()) {
                (Some(x), Some(y)) => x.partial_cmp(y),
                _ => Some(a.cmp(b)),
            });
        }
        match (self.to_number(), other.to_number()) {
            (Some(x), Some(y)) => Ok(x.partial_cmp(y)),
            _ => Err(RenderError::invalid_operands(op, self, other)),
        }
    }

    pub fn arithmetic(&self, op: &str, other: &Value) -> Result<Value, RenderError> {
        let (Some(a), Some(b)) = (self.to_number(), other.to_number()) else {
            return Err(RenderError::invalid_operands(op, self, other));
        };
        if op == "%" {
            let (x, y) = match (a, b) {
                (Number::Int(x), Number::Int(y)) => (x, y),
                _ => (a.as_f64() as i64, b.as_f64() as i64),
            };
            if y == 0 {
                return Err(RenderError::DivisionByZero);
            }
            return Ok(Value::Int(x.checked_rem(y).unwrap_or(0)));
        }
        let result = match (a, b) {
            (Number::Int(x), Number::Int(y)) => {
                let exact = match op {
                    "+" => x.checked_add(y),
                    "-" => x.checked_sub(y),
                    "*" => x.checked_mul(y),
                    "/" => {
                        if y == 0 {
                            return Err(RenderError::DivisionByZero);
                        }
                        if x.checked_rem(y) == Some(0) {
                            x.checked_div(y)
                        } else {
                            None
                        }
                    }
                    _ => return Err(RenderError::invalid_operands(op, self, other)),
                };
                match exact {
                    Some(n) => Number::Int(n),
                    None => float_arithmetic(op, x as f64, y as f64)?,
                }
            }
            (x, y) => float_arithmetic(op, x.as_f64(), y.as_f64())?,
        };
        Ok(result.into_value())
    }

    pub fn negate(&self) -> Result<Value, RenderError> {
        match self.to_number() {
            Some(Number::Int(n)) => Ok(n
                .checked_neg()
                .map(Value::Int)
                .unwrap_or(Value::Float(-(n as f64)))),
            Some(Number::Float(n)) => Ok(Value::Float(-n)),
            None => Err(RenderError::InvalidOperand {
                op: "-".to_string(),
                operand: self.type_name(),
            }),
        }
    }

    pub fn to_numeric(&self) -> Result<Value, RenderError> {
        self.to_number()
            .map(Number::into_value)
            .ok_or_else(|| RenderError::InvalidOperand {
                op: "+".to_string(),
                operand: self.type_name(),
            })
    }

    /// `value[key]`; missing entries read as null.
    pub fn index(&self, key: &Value) -> Value {
        match self {
            Value::List(items) => key
                .as_index()
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or_default(),
            Value::Map(entries) => entries.get(&key.to_key()).cloned().unwrap_or_default(),
            Value::Str(s) => key
                .as_index()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::Str(c.to_string()))
                .unwrap_or_default(),
            _ => Value::Null,
        }
    }

    /// `value.name`; only maps have members.
    pub fn member(&self, name: &str) -> Value {
        match self {
            Value::Map(entries) => entries.get(name).cloned().unwrap_or_default(),
            _ => Value::Null,
        }
    }

    /// Key/value pairs for iteration. Null iterates zero times.
    pub fn entries(&self) -> Result<Vec<(Value, Value)>, RenderError> {
        match self {
            Value::Null => Ok(Vec::new()),
            Value::List(items) => Ok(items
                .iter()
                .enumerate()
                .map(|(i, item)| (Value::Int(i as i64), item.clone()))
                .collect()),
            Value::Map(entries) => Ok(entries
                .iter()
                .map(|(key, item)| (Value::Str(key.clone()), item.clone()))
                .collect()),
            other => Err(RenderError::NotIterable(other.type_name())),
        }
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, RenderError> {
        match self {
            Value::Function(function) => function.call(args),
            other => Err(RenderError::NotCallable(other.type_name())),
        }
    }

    /// Mutable slot for `key`, created when missing. Null turns into an empty map first.
    pub fn slot_mut(&mut self, key: &Value) -> Result<&mut Value, RenderError> {
        if matches!(self, Value::Null) {
            *self = Value::Map(BTreeMap::new());
        }
        match self {
            Value::Map(entries) => Ok(entries.entry(key.to_key()).or_default()),
            Value::List(items) => {
                let index = key
                    .as_index()
                    .filter(|&i| i <= items.len())
                    .ok_or_else(|| RenderError::InvalidIndex(key.to_key()))?;
                if index == items.len() {
                    items.push(Value::Null);
                }
                Ok(&mut items[index])
            }
            other => Err(RenderError::NotAssignable(other.type_name())),
        }
    }
}

fn float_arithmetic(op: &str, x: f64, y: f64) -> Result<Number, RenderError> {
    let n = match op {
        "+" => x + y,
        "-" => x - y,
        "*" => x * y,
        "/" => {
            if y == 0.0 {
                return Err(RenderError::DivisionByZero);
            }
            x / y
        }
        _ => return Err(RenderError::InvalidOperand {
            op: op.to_string(),
            operand: "float",
        }),
    };
    Ok(Number::Float(n))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(key, item)| (key, Value::from(item)))
                    .collect(),
            ),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(entries: BTreeMap<String, T>) -> Self {
        Value::Map(
            entries
                .into_iter()
                .map(|(key, item)| (key, item.into()))
                .collect(),
        )
    }
}
