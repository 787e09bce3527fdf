use crate::ir::Type;
use bson::{Bson, Decimal128};
use linked_hash_map::LinkedHashMap;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use std::{cmp::Ordering, fmt};

/// A runtime value. Constants in the operator tree, folded sub-expressions
/// and the data processed by the local evaluator all use this model.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Decimal(Decimal),
    String(String),
    Char(char),
    Array(Vec<Value>),
    Document(LinkedHashMap<String, Value>),
    /// Logical contents of a dictionary, in insertion order.
    Map(Vec<(Value, Value)>),
    Grouping {
        key: Box<Value>,
        elements: Vec<Value>,
    },
}

pub(crate) const ENTRY_KEY: &str = "Key";
pub(crate) const ENTRY_VALUE: &str = "Value";

impl Value {
    pub fn document<I, S>(fields: I) -> Value
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        Value::Document(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// A key/value pair as produced by enumerating a dictionary.
    pub fn entry(key: Value, value: Value) -> Value {
        Value::document([(ENTRY_KEY, key), (ENTRY_VALUE, value)])
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(i) => Some(*i as i64),
            Value::Int64(l) => Some(*l),
            Value::Char(c) => Some(*c as i64),
            Value::Double(d) if d.fract() == 0.0 => Some(*d as i64),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(i) => Some(*i as f64),
            Value::Int64(l) => Some(*l as f64),
            Value::Double(d) => Some(*d),
            Value::Decimal(d) => d.to_f64(),
            Value::Char(c) => Some(*c as u32 as f64),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Int32(i) => Some(Decimal::from(*i)),
            Value::Int64(l) => Some(Decimal::from(*l)),
            Value::Double(d) => Decimal::from_f64_retain(*d),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the string form of strings and characters.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Char(c) => Some(c.to_string()),
            _ => None,
        }
    }

    fn is_number(&self) -> bool {
        matches!(
            self,
            Value::Int32(_) | Value::Int64(_) | Value::Double(_) | Value::Decimal(_)
        )
    }

    /// Infers the static type of a constant. Empty arrays and maps have a
    /// null element type.
    pub fn ty(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Boolean(_) => Type::Boolean,
            Value::Int32(_) => Type::Int32,
            Value::Int64(_) => Type::Int64,
            Value::Double(_) => Type::Double,
            Value::Decimal(_) => Type::Decimal,
            Value::String(_) => Type::String,
            Value::Char(_) => Type::Char,
            Value::Document(_) => Type::Document,
            Value::Array(a) => Type::array(a.first().map(Value::ty).unwrap_or(Type::Null)),
            Value::Map(entries) => match entries.first() {
                Some((k, v)) => Type::dictionary(k.ty(), v.ty()),
                None => Type::dictionary(Type::Null, Type::Null),
            },
            Value::Grouping { key, elements } => Type::grouping(
                key.ty(),
                elements.first().map(Value::ty).unwrap_or(Type::Null),
            ),
        }
    }

    /// Equality with numeric values compared by magnitude, as both the
    /// engine and the in-memory semantics do.
    pub fn loose_eq(&self, other: &Value) -> bool {
        compare(self, other) == Ordering::Equal
    }

    /// Converts the value into its natural BSON form. Characters become code
    /// points and decimals become Decimal128.
    pub fn to_bson(&self) -> Bson {
        match self {
            Value::Null => Bson::Null,
            Value::Boolean(b) => Bson::Boolean(*b),
            Value::Int32(i) => Bson::Int32(*i),
            Value::Int64(l) => Bson::Int64(*l),
            Value::Double(d) => Bson::Double(*d),
            Value::Decimal(d) => decimal_to_bson(*d),
            Value::String(s) => Bson::String(s.clone()),
            Value::Char(c) => Bson::Int32(*c as i32),
            Value::Array(a) => Bson::Array(a.iter().map(Value::to_bson).collect()),
            Value::Document(d) => Bson::Document(
                d.iter()
                    .map(|(k, v)| (k.clone(), v.to_bson()))
                    .collect(),
            ),
            Value::Map(entries) => Bson::Array(
                entries
                    .iter()
                    .map(|(k, v)| Bson::Array(vec![k.to_bson(), v.to_bson()]))
                    .collect(),
            ),
            Value::Grouping { key, elements } => Bson::Document(bson::doc! {
                "_id": key.to_bson(),
                "_elements": Bson::Array(elements.iter().map(Value::to_bson).collect()),
            }),
        }
    }
}

/// Encodes a decimal as an IEEE 754-2008 BID Decimal128. Every
/// `rust_decimal` value has a coefficient below 2^96, so the short
/// coefficient form always applies.
pub(crate) fn decimal_to_bson(d: Decimal) -> Bson {
    const EXPONENT_BIAS: i64 = 6176;
    let coefficient = d.mantissa().unsigned_abs();
    let exponent = (EXPONENT_BIAS - d.scale() as i64) as u128;
    let sign = if d.is_sign_negative() && coefficient != 0 {
        1u128 << 127
    } else {
        0
    };
    let bits = sign | (exponent << 113) | coefficient;
    Bson::Decimal128(Decimal128::from_bytes(bits.to_le_bytes()))
}

fn type_order(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Int32(_)
        | Value::Int64(_)
        | Value::Double(_)
        | Value::Decimal(_)
        | Value::Char(_) => 1,
        Value::String(_) => 2,
        Value::Document(_) | Value::Grouping { .. } => 3,
        Value::Array(_) | Value::Map(_) => 4,
        Value::Boolean(_) => 5,
    }
}

/// Total order over values: null sorts first, numbers compare by magnitude
/// across representations, then strings, documents, arrays and booleans.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    use Value::*;
    match (a, b) {
        (Char(x), Char(y)) => x.cmp(y),
        (String(x), String(y)) => x.cmp(y),
        (Boolean(x), Boolean(y)) => x.cmp(y),
        (Null, Null) => Ordering::Equal,
        (Array(x), Array(y)) => compare_seq(x, y),
        (Document(x), Document(y)) => {
            for ((kx, vx), (ky, vy)) in x.iter().zip(y.iter()) {
                let ord = kx.cmp(ky).then_with(|| compare(vx, vy));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Map(x), Map(y)) => {
            for ((kx, vx), (ky, vy)) in x.iter().zip(y.iter()) {
                let ord = compare(kx, ky).then_with(|| compare(vx, vy));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (
            Grouping {
                key: kx,
                elements: ex,
            },
            Grouping {
                key: ky,
                elements: ey,
            },
        ) => compare(kx, ky).then_with(|| compare_seq(ex, ey)),
        _ if a.is_number() && b.is_number() => compare_numbers(a, b),
        (Char(_), _) | (_, Char(_)) if type_order(a) == type_order(b) => {
            compare_numbers(a, b)
        }
        _ => type_order(a).cmp(&type_order(b)),
    }
}

fn compare_seq(x: &[Value], y: &[Value]) -> Ordering {
    for (l, r) in x.iter().zip(y.iter()) {
        let ord = compare(l, r);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    x.len().cmp(&y.len())
}

fn compare_numbers(a: &Value, b: &Value) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_i64_exact(), b.as_i64_exact()) {
        return x.cmp(&y);
    }
    if let (Value::Decimal(_), _) | (_, Value::Decimal(_)) = (a, b) {
        if let (Some(x), Some(y)) = (a.as_decimal(), b.as_decimal()) {
            return x.cmp(&y);
        }
    }
    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
}

impl Value {
    fn as_i64_exact(&self) -> Option<i64> {
        match self {
            Value::Int32(i) => Some(*i as i64),
            Value::Int64(l) => Some(*l),
            Value::Char(c) => Some(*c as i64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Int32(i) => write!(f, "{i}"),
            Value::Int64(l) => write!(f, "{l}L"),
            Value::Double(d) => write!(f, "{d:?}"),
            Value::Decimal(d) => write!(f, "{d}m"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Char(c) => write!(f, "{c:?}"),
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Document(d) => {
                write!(f, "{{")?;
                for (i, (k, v)) in d.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[{k}] = {v}")?;
                }
                write!(f, "}}")
            }
            Value::Grouping { key, elements } => {
                write!(f, "group {key} of {} elements", elements.len())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int32(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Int64(l)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}
