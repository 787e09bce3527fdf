use crate::ir::Value;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Static type of an operator tree node. Every node's type is derived from
/// its input and operator semantics, see `Expression::ty`.
#[derive(PartialEq, Eq, Debug, Clone, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Type {
    Null,
    Boolean,
    Int32,
    Int64,
    Double,
    Decimal,
    String,
    Char,
    Document,
    Array(Box<Type>),
    Dictionary(Box<Type>, Box<Type>),
    KeyValuePair(Box<Type>, Box<Type>),
    Grouping(Box<Type>, Box<Type>),
}

impl Type {
    pub fn array(element: Type) -> Type {
        Type::Array(Box::new(element))
    }

    pub fn dictionary(key: Type, value: Type) -> Type {
        Type::Dictionary(Box::new(key), Box::new(value))
    }

    pub fn key_value_pair(key: Type, value: Type) -> Type {
        Type::KeyValuePair(Box::new(key), Box::new(value))
    }

    pub fn grouping(key: Type, element: Type) -> Type {
        Type::Grouping(Box::new(key), Box::new(element))
    }

    /// Returns the element type when this type can be enumerated as a sequence.
    pub fn element_type(&self) -> Option<Type> {
        match self {
            Type::Array(t) => Some(t.as_ref().clone()),
            Type::Dictionary(k, v) => Some(Type::KeyValuePair(k.clone(), v.clone())),
            Type::Grouping(_, e) => Some(e.as_ref().clone()),
            _ => None,
        }
    }

    pub fn is_sequence(&self) -> bool {
        self.element_type().is_some()
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::Int32 | Type::Int64 | Type::Double | Type::Decimal
        )
    }

    /// The type produced by arithmetic over two numeric operands.
    pub fn widen(&self, other: &Type) -> Type {
        fn rank(t: &Type) -> u8 {
            match t {
                Type::Int32 | Type::Char => 0,
                Type::Int64 => 1,
                Type::Double => 2,
                Type::Decimal => 3,
                _ => 4,
            }
        }
        match (rank(self), rank(other)) {
            (4, _) => self.clone(),
            (_, 4) => other.clone(),
            (l, r) if l >= r => match self {
                Type::Char => Type::Int32,
                t => t.clone(),
            },
            _ => other.clone(),
        }
    }

    /// The value `default(T)` takes for this type: zero for numbers, false for
    /// booleans and null for reference-like types.
    pub fn default_value(&self) -> Value {
        match self {
            Type::Boolean => Value::Boolean(false),
            Type::Int32 => Value::Int32(0),
            Type::Int64 => Value::Int64(0),
            Type::Double => Value::Double(0.0),
            Type::Decimal => Value::Decimal(Decimal::ZERO),
            Type::Char => Value::Char('\0'),
            Type::KeyValuePair(k, v) => Value::entry(k.default_value(), v.default_value()),
            Type::Null
            | Type::String
            | Type::Document
            | Type::Array(_)
            | Type::Dictionary(_, _)
            | Type::Grouping(_, _) => Value::Null,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Null => write!(f, "null"),
            Type::Boolean => write!(f, "bool"),
            Type::Int32 => write!(f, "int"),
            Type::Int64 => write!(f, "long"),
            Type::Double => write!(f, "double"),
            Type::Decimal => write!(f, "decimal"),
            Type::String => write!(f, "string"),
            Type::Char => write!(f, "char"),
            Type::Document => write!(f, "document"),
            Type::Array(t) => write!(f, "{t}[]"),
            Type::Dictionary(k, v) => write!(f, "Dictionary<{k}, {v}>"),
            Type::KeyValuePair(k, v) => write!(f, "KeyValuePair<{k}, {v}>"),
            Type::Grouping(k, e) => write!(f, "IGrouping<{k}, {e}>"),
        }
    }
}
