//! Runtime values for the Mica VM.
//!
//! The [`Value`] enum is the representation of all data at runtime.  Scalars
//! (`Int`, `Bool`, `Null`) are stored inline; strings, arrays, hashes and
//! compiled functions sit behind an `Rc` so that pushing a value onto the
//! stack, storing it in the globals table, or embedding it in a container
//! shares the same allocation.  Nothing mutates a container after
//! construction, so no interior mutability is needed and values live exactly
//! as long as some slot still refers to them.
//!
//! `Bool(true)`, `Bool(false)` and `Null` are the canonical singletons: the
//! compiler and the VM only ever produce these variants, so comparing them
//! structurally is the same as comparing identities.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

// ─────────────────────────────────────────────────────────────────────────────
// Value
// ─────────────────────────────────────────────────────────────────────────────

/// A runtime value in the Mica VM.
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit signed integer.
    Int(i64),
    /// Boolean.
    Bool(bool),
    /// The null value.
    Null,
    /// An immutable string.
    Str(Rc<str>),
    /// An ordered sequence of values.
    Array(Rc<Vec<Value>>),
    /// An unordered mapping from hashable keys to `(key, value)` pairs.
    /// The original key value is preserved for display and iteration.
    Hash(Rc<HashMap<HashKey, HashPair>>),
    /// A compiled function: bytecode plus its frame layout counts.
    Function(Rc<Function>),
}

/// The compiled form of a function literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// The function body's instruction stream.
    pub instructions: Vec<u8>,
    /// Total local slots the frame reserves, parameters included.
    pub num_locals: usize,
    /// Number of declared parameters.
    pub num_parameters: usize,
}

/// One entry in a hash: the original key value and the mapped value.
#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// A key derived from a hashable [`Value`].
///
/// Only integers, booleans and strings are hashable.  Equality and hashing
/// on `HashKey` agree with value equality on the underlying values, so two
/// equal strings index the same hash entry regardless of allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Int(i64),
    Bool(bool),
    Str(Rc<str>),
}

impl Value {
    /// Return `true` if this value is truthy.
    ///
    /// Only `false` and `null` are falsy; every other value, including the
    /// integer zero and the empty string, is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false) | Value::Null)
    }

    /// Return a human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Bool(_) => "Bool",
            Value::Null => "Null",
            Value::Str(_) => "String",
            Value::Array(_) => "Array",
            Value::Hash(_) => "Hash",
            Value::Function(_) => "Function",
        }
    }

    /// Derive the hash key for this value, or `None` if it is not hashable.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Int(n) => Some(HashKey::Int(*n)),
            Value::Bool(b) => Some(HashKey::Bool(*b)),
            Value::Str(s) => Some(HashKey::Str(Rc::clone(s))),
            _ => None,
        }
    }

    /// Build a string value from anything string-like.
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }
}

impl PartialEq for Value {
    /// Equality as observed by the `==` operator: scalars and strings by
    /// value, containers and functions by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "null"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, v) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Hash(pairs) => {
                // Hash iteration order is arbitrary; sort by rendered key so
                // output is stable across runs.
                let mut entries: Vec<&HashPair> = pairs.values().collect();
                entries.sort_by_key(|p| p.key.to_string());
                write!(f, "{{")?;
                for (i, pair) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            Value::Function(func) => write!(f, "<fn({})>", func.num_parameters),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::Bool(true).is_truthy());
        // Unlike many languages, zero and the empty string are truthy.
        assert!(Value::Int(0).is_truthy());
        assert!(Value::string("").is_truthy());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::string("hi").to_string(), "hi");
        let arr = Value::Array(Rc::new(vec![Value::Int(1), Value::string("x")]));
        assert_eq!(arr.to_string(), "[1, x]");
    }

    #[test]
    fn test_hash_display_is_sorted() {
        let mut map = HashMap::new();
        for n in [3i64, 1, 2] {
            map.insert(
                HashKey::Int(n),
                HashPair {
                    key: Value::Int(n),
                    value: Value::Int(n * 10),
                },
            );
        }
        let hash = Value::Hash(Rc::new(map));
        assert_eq!(hash.to_string(), "{1: 10, 2: 20, 3: 30}");
    }

    #[test]
    fn test_hash_key_agrees_with_value_equality() {
        // Two separately allocated but equal strings share a key.
        let a = Value::string("name");
        let b = Value::string("name");
        assert_eq!(a.hash_key(), b.hash_key());
        assert_ne!(
            Value::string("a").hash_key(),
            Value::string("b").hash_key()
        );
        // Type tags keep equal content apart.
        assert_ne!(Value::Int(1).hash_key(), Value::Bool(true).hash_key());
    }

    #[test]
    fn test_unhashable_values() {
        assert!(Value::Null.hash_key().is_none());
        assert!(Value::Array(Rc::new(vec![])).hash_key().is_none());
    }

    #[test]
    fn test_equality() {
        assert_eq!(Value::Int(5), Value::Int(5));
        assert_ne!(Value::Int(5), Value::Int(6));
        assert_eq!(Value::string("a"), Value::string("a"));
        assert_ne!(Value::Int(1), Value::Bool(true));
        // Containers compare by identity.
        let arr = Rc::new(vec![Value::Int(1)]);
        assert_eq!(Value::Array(Rc::clone(&arr)), Value::Array(Rc::clone(&arr)));
        assert_ne!(
            Value::Array(Rc::new(vec![Value::Int(1)])),
            Value::Array(Rc::new(vec![Value::Int(1)]))
        );
    }
}
