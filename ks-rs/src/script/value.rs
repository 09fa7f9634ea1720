//! Runtime value type for kscript.
//!
//! Every token, variable, and command result is a [`Value`].  Raw tokens
//! arrive as [`Value::Text`]; individual commands decide whether a text
//! token should be read as a number or boolean.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::block::NamedBlock;
use super::invoke::HostRef;
use super::launch::TaskHandle;

/// Ordered string-keyed map used by [`Value::Map`].
pub type ValueMap = IndexMap<String, Value>;

/// A kscript runtime value.
///
/// Maps are held behind an `Arc`; commands that "modify" a map must go
/// through [`Value::map_cow`] (or `Arc::make_mut`) and return the new value,
/// so the caller's copy is never touched.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Map(Arc<ValueMap>),
    List(Vec<Value>),
    Block(Arc<NamedBlock>),
    Task(TaskHandle),
    Host(HostRef),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Block(a), Value::Block(b)) => Arc::ptr_eq(a, b),
            (Value::Task(a), Value::Task(b)) => a.id() == b.id(),
            (Value::Host(a), Value::Host(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(x) => {
                if x.fract() == 0.0 && x.abs() < 1e15 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Text(s) => write!(f, "{s}"),
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                write!(f, "}}")
            }
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Block(block) => write!(f, "{block}"),
            Value::Task(task) => write!(f, "{task}"),
            Value::Host(host) => write!(f, "{host}"),
        }
    }
}

impl Value {
    /// Name of the value's type, as returned by `TypeOf`.
    ///
    /// Host objects report their registered class name.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Map(_) => "map",
            Value::List(_) => "list",
            Value::Block(_) => "codeblock",
            Value::Task(_) => "task",
            Value::Host(host) => host.class_name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the text of a [`Value::Text`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Read as a boolean.
    ///
    /// Text follows the usual script convention: only `true` (any case) is
    /// true, every other string is false.  Non-boolean, non-text values
    /// return `None`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Text(s) => Some(s.trim().eq_ignore_ascii_case("true")),
            _ => None,
        }
    }

    /// Read as an integer.  Floats truncate; text must parse.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Float(x) => Some(*x as i64),
            Value::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|x| x as i64))
            }
            _ => None,
        }
    }

    /// Read as a float.  Text must parse.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// `true` for [`Value::Integer`] and [`Value::Float`].
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Copy-on-write access to a map value.
    ///
    /// Returns a second handle to the map, meant for `Arc::make_mut`: since
    /// `self` still holds a reference, the first mutation clones the map and
    /// `self` keeps seeing the old contents.
    pub fn map_cow(&self) -> Option<Arc<ValueMap>> {
        match self {
            Value::Map(map) => Some(Arc::clone(map)),
            _ => None,
        }
    }

    /// Render for re-joining raw tokens into a line of source text.
    ///
    /// Text that would not survive re-tokenizing as one token is quoted, with
    /// `"` and `\` escaped; a token holding a brace group is left as is.
    /// Null becomes `""`.  Numbers appear verbatim; other values are prefixed
    /// with their type name so the result is never mistaken for source.
    pub fn to_source_fragment(&self) -> String {
        match self {
            Value::Null => "\"\"".to_owned(),
            Value::Text(s) if needs_quotes(s) => {
                format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
            }
            Value::Text(s) => s.clone(),
            Value::Integer(_) | Value::Float(_) => self.to_string(),
            other => format!("{}: {}", other.type_name(), other),
        }
    }
}

/// `true` if `text` must be quoted to stay one token.
///
/// A brace opened before any separator swallows the rest of the token, so
/// only the part before the first `{` matters.
fn needs_quotes(text: &str) -> bool {
    let head = text.split('{').next().unwrap_or_default();
    text.is_empty()
        || head.contains(|c: char| c.is_whitespace() || c == '"' || c == '\\')
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(Arc::new(map))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
