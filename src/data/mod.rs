//! Data values flowing through routing, rewrite and merge
//!
//! `Value` is the cell type shared by sharding conditions, SQL parameters and
//! per-shard result rows. It is intentionally small: the middleware never
//! interprets values beyond comparing, hashing, summing and rendering them.

pub mod compare;

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

pub use compare::{compare_non_null, compare_values, NullsOrder};

/// A single SQL value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Binary(Vec<u8>),
}

/// A row of values as returned by a shard
pub type Row = Vec<Value>;

impl Value {
    /// Whether this is SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the value, parsing strings when they hold an integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::Bool(b) => Some(*b as i64),
            Value::Float64(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating-point view of the value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// String view used by inline expressions and suffix matching
    pub fn to_string_value(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::Float64(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Binary(b) => b.iter().map(|x| format!("{:02x}", x)).collect(),
        }
    }

    /// Render the value as a SQL literal
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
            Value::Int64(v) => v.to_string(),
            Value::Float64(f) => f.to_string(),
            Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Binary(_) => format!("X'{}'", self.to_string_value()),
        }
    }

    /// Bytes fed to hash-based sharding
    pub fn hash_bytes(&self) -> Vec<u8> {
        match self {
            Value::Int64(v) => v.to_be_bytes().to_vec(),
            Value::Binary(b) => b.clone(),
            other => other.to_string_value().into_bytes(),
        }
    }

    /// Numeric addition used by SUM/COUNT accumulation.
    ///
    /// NULL is the identity; two integers stay integral (saturating), any
    /// float operand promotes the result to `Float64`.
    pub fn add(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Null, v) | (v, Value::Null) => v.clone(),
            (Value::Int64(a), Value::Int64(b)) => Value::Int64(a.saturating_add(*b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Value::Float64(x + y),
                _ => Value::Null,
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
            (Value::Int64(a), Value::Float64(b)) | (Value::Float64(b), Value::Int64(a)) => int_float_eq(*a, *b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

/// Int and float are equal only when the float is exactly that integer
fn int_float_eq(int: i64, float: f64) -> bool {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    if !(-LIMIT..LIMIT).contains(&float) || float.fract() != 0.0 {
        return false;
    }
    float as i64 == int
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            // Integral floats hash like their integer so that 1 and 1.0 group together
            Value::Int64(v) => {
                2u8.hash(state);
                (*v as f64).to_bits().hash(state);
            }
            Value::Float64(f) => {
                2u8.hash(state);
                f.to_bits().hash(state);
            }
            Value::String(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Value::Binary(b) => {
                4u8.hash(state);
                b.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_value())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_add_promotes_and_skips_null() {
        assert_eq!(Value::Int64(2).add(&Value::Int64(3)), Value::Int64(5));
        assert_eq!(Value::Int64(2).add(&Value::Float64(0.5)), Value::Float64(2.5));
        assert_eq!(Value::Null.add(&Value::Int64(7)), Value::Int64(7));
        assert_eq!(Value::Null.add(&Value::Null), Value::Null);
    }

    #[test]
    fn test_integral_float_groups_with_int() {
        let mut set = HashSet::new();
        set.insert(Value::Int64(1));
        assert!(set.contains(&Value::Float64(1.0)));
        assert!(!set.contains(&Value::Float64(1.5)));
    }

    #[test]
    fn test_large_int_float_equality_is_exact() {
        let base = 1i64 << 53;
        let float = Value::Float64(base as f64);
        assert_eq!(Value::Int64(base), float);
        assert_ne!(Value::Int64(base + 1), float);
        assert_ne!(Value::Int64(i64::MAX), Value::Float64(i64::MAX as f64));
        assert_ne!(Value::Int64(3), Value::Float64(3.5));

        let mut groups = HashSet::new();
        groups.insert(Value::Int64(base));
        groups.insert(Value::Int64(base + 1));
        groups.insert(float);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(Value::from("o'brien").to_sql_literal(), "'o''brien'");
        assert_eq!(Value::Int64(-4).to_sql_literal(), "-4");
        assert_eq!(Value::Binary(vec![0xab, 0x01]).to_sql_literal(), "X'ab01'");
    }

    #[test]
    fn test_as_i64_parses_strings() {
        assert_eq!(Value::from(" 42 ").as_i64(), Some(42));
        assert_eq!(Value::Float64(3.0).as_i64(), Some(3));
        assert_eq!(Value::Float64(3.5).as_i64(), None);
        assert_eq!(Value::Null.as_i64(), None);
    }
}
