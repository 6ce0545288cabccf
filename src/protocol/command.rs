//! Inbound command frames
//!
//! A client frame is a JSON array whose first element names the command and
//! whose remaining elements are positional arguments. Anything that does not
//! have that shape is rejected here and never reaches a handler.

use serde_json::{Number, Value};

/// A single positional argument of an inbound command
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// JSON string
    Str(String),
    /// JSON integer or float, kept as parsed so it can be echoed unchanged
    Number(Number),
}

impl Arg {
    /// Get the argument as a string, if it is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s),
            Arg::Number(_) => None,
        }
    }

    /// Get the argument as a number, if it is one
    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Arg::Number(n) => Some(n),
            Arg::Str(_) => None,
        }
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Arg::Str(s)),
            Value::Number(n) => Some(Arg::Number(n)),
            _ => None,
        }
    }
}

/// A well-formed inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    /// Command name, case-folded to lowercase
    pub command: String,
    /// Arguments following the command name
    pub args: Vec<Arg>,
}

/// Parse a raw text frame into a command and its arguments
///
/// Returns `None` when the frame is not JSON, is not a non-empty array, has
/// a non-string command, or carries an argument that is neither a string
/// nor a number. Booleans, nulls, arrays and objects are not valid arguments.
pub fn parse_frame(raw: &str) -> Option<Inbound> {
    let Value::Array(items) = serde_json::from_str::<Value>(raw).ok()? else {
        return None;
    };

    let mut items = items.into_iter();
    let command = match items.next()? {
        Value::String(s) => s.to_lowercase(),
        _ => return None,
    };

    let args = items.map(Arg::from_value).collect::<Option<Vec<_>>>()?;

    Some(Inbound { command, args })
}

/// Accepted argument count for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    /// Required arguments
    pub min: usize,
    /// Required plus optional arguments (`None` = variable tail)
    pub max: Option<usize>,
}

impl Arity {
    /// Exactly `n` arguments
    pub const fn exactly(n: usize) -> Self {
        Self { min: n, max: Some(n) }
    }

    /// Between `min` and `max` arguments inclusive
    pub const fn between(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    /// Check whether `count` arguments are acceptable
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.map_or(true, |max| count <= max)
    }
}
