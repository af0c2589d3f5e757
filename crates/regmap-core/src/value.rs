//! Loosely typed property values and their coercions.
//!
//! The source format is tokenized outside this crate; every property arrives
//! here as a [`Value`]. Coercion failures abort the single property they
//! belong to and surface as `MalformedInput`.

use std::fmt;

use indexmap::IndexMap;

/// One property value as extracted from the source format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Bool(bool),
    /// An identifier-like name, e.g. a type name or a loop variable.
    Symbol(String),
    /// A free-form string, possibly a delimited pattern.
    Text(String),
    List(Vec<Value>),
    /// Key/value pairs in declaration order.
    Record(IndexMap<String, Value>),
}

/// A value could not be converted into the requested shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot convert {value} into {target}")]
pub struct CoercionError {
    pub value: String,
    pub target: &'static str,
}

impl CoercionError {
    fn new(value: &Value, target: &'static str) -> Self {
        Self {
            value: value.to_string(),
            target,
        }
    }
}

impl Value {
    pub fn symbol(name: impl Into<String>) -> Self {
        Value::Symbol(name.into())
    }

    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn record<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Record(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Coerce to an integer. Text accepts decimal, `0x`, `0b`, and `0o` forms
    /// with optional `_` separators and a leading `-`.
    pub fn as_integer(&self) -> Result<i64, CoercionError> {
        match self {
            Value::Integer(v) => Ok(*v),
            Value::Text(s) | Value::Symbol(s) => {
                parse_integer(s).ok_or_else(|| CoercionError::new(self, "integer"))
            }
            _ => Err(CoercionError::new(self, "integer")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, CoercionError> {
        match self {
            Value::Bool(v) => Ok(*v),
            Value::Text(s) | Value::Symbol(s) => match s.trim() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(CoercionError::new(self, "boolean")),
            },
            _ => Err(CoercionError::new(self, "boolean")),
        }
    }

    /// Coerce to an identifier (`[A-Za-z_][A-Za-z0-9_]*`).
    pub fn as_identifier(&self) -> Result<&str, CoercionError> {
        match self {
            Value::Symbol(s) | Value::Text(s) if is_identifier(s.trim()) => Ok(s.trim()),
            _ => Err(CoercionError::new(self, "identifier")),
        }
    }

    /// Coerce to a dotted path of identifiers (`file.register.bit_field`).
    pub fn as_path(&self) -> Result<&str, CoercionError> {
        match self {
            Value::Symbol(s) | Value::Text(s) if is_path(s.trim()) => Ok(s.trim()),
            _ => Err(CoercionError::new(self, "hierarchical name")),
        }
    }

    /// Coerce to a list of integers: a single integer, a list, or text such
    /// as `"[2, 4]"` / `"2, 4"`.
    pub fn as_integer_list(&self) -> Result<Vec<i64>, CoercionError> {
        match self {
            Value::Integer(v) => Ok(vec![*v]),
            Value::List(items) => items
                .iter()
                .map(|item| item.as_integer())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| CoercionError::new(self, "array of integers")),
            Value::Text(s) => {
                let inner = s.trim();
                let inner = inner
                    .strip_prefix('[')
                    .and_then(|rest| rest.strip_suffix(']'))
                    .unwrap_or(inner);
                if inner.trim().is_empty() {
                    return Err(CoercionError::new(self, "array of integers"));
                }
                inner
                    .split(',')
                    .map(parse_integer)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| CoercionError::new(self, "array of integers"))
            }
            _ => Err(CoercionError::new(self, "array of integers")),
        }
    }

    /// The text content of a `Symbol` or `Text` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) | Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Symbol(s) => write!(f, ":{s}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Record(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(v: IndexMap<String, Value>) -> Self {
        Value::Record(v)
    }
}

/// Parse an integer literal in decimal, hex, binary, or octal form.
pub fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (radix, digits) = match body.get(..2) {
        Some("0x") | Some("0X") => (16, &body[2..]),
        Some("0b") | Some("0B") => (2, &body[2..]),
        Some("0o") | Some("0O") => (8, &body[2..]),
        _ => (10, body),
    };
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') {
        return None;
    }
    let digits: String = digits.chars().filter(|&c| c != '_').collect();
    if !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = i64::from_str_radix(&digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn is_path(text: &str) -> bool {
    !text.is_empty() && text.split('.').all(is_identifier)
}
