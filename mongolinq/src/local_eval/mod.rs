//! In-process evaluation of an operator tree over in-memory values. This is
//! the client-side fallback for queries the pipeline compiler cannot
//! translate, and the partial evaluator uses it to fold constant subtrees.
//! It shares nothing with the translator: it interprets the tree directly
//! with in-memory semantics.

use crate::ir::{
    self, compare, AggregateFunction, BinaryOperator, CaseConversion, DictionaryOp, ElementKind,
    Expression, Lambda, QuantifierKind, SetOperator, SortDirection, StringPredicateKind, Type,
    Value,
};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use std::{cmp::Ordering, collections::HashMap, str::FromStr};
use thiserror::Error;


pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum Error {
    #[error("collection '{0}' is not available for local evaluation")]
    UnknownCollection(String),
    #[error("parameter '{0}' is not bound")]
    UnboundParameter(String),
    #[error("sequence contains no elements")]
    EmptySequence,
    #[error("sequence contains no matching element")]
    NoMatch,
    #[error("index {0} is out of range")]
    IndexOutOfRange(i64),
    #[error("the given key {0} was not present in the dictionary")]
    KeyNotFound(String),
    #[error("{operator} cannot be applied to {value}")]
    TypeMismatch {
        operator: &'static str,
        value: String,
    },
    #[error("division by zero")]
    DivideByZero,
    #[error("arithmetic overflow")]
    Overflow,
    #[error("cannot convert {value} to {to}")]
    InvalidConversion { value: String, to: Type },
}

fn mismatch(operator: &'static str, value: &Value) -> Error {
    Error::TypeMismatch {
        operator,
        value: value.to_string(),
    }
}

/// Lexically scoped lambda parameter bindings.
#[derive(Default)]
struct Env<'p> {
    bindings: Vec<(String, Value)>,
    parent: Option<&'p Env<'p>>,
}

impl<'p> Env<'p> {
    fn child<'c>(&'c self, bindings: Vec<(String, Value)>) -> Env<'c>
    where
        'p: 'c,
    {
        Env {
            bindings,
            parent: Some(self),
        }
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .or_else(|| self.parent.and_then(|p| p.lookup(name)))
    }
}

lazy_static::lazy_static! {
    static ref NO_COLLECTIONS: HashMap<String, Vec<Value>> = HashMap::new();
}

#[derive(Clone, Copy)]
pub struct LocalEvaluator<'a> {
    collections: &'a HashMap<String, Vec<Value>>,
}

impl LocalEvaluator<'static> {
    /// An evaluator without any collection, for constant expressions.
    pub fn constant() -> Self {
        LocalEvaluator {
            collections: &NO_COLLECTIONS,
        }
    }
}

impl<'a> LocalEvaluator<'a> {
    pub fn new(collections: &'a HashMap<String, Vec<Value>>) -> Self {
        LocalEvaluator { collections }
    }

    pub fn evaluate(&self, expr: &Expression) -> Result<Value> {
        self.eval(expr, &Env::default())
    }

    fn apply(&self, lambda: &Lambda, args: Vec<Value>, env: &Env) -> Result<Value> {
        let bindings = lambda
            .parameters
            .iter()
            .map(|p| p.name.clone())
            .zip(args)
            .collect();
        self.eval(&lambda.body, &env.child(bindings))
    }

    fn test(&self, lambda: &Lambda, arg: Value, env: &Env) -> Result<bool> {
        let v = self.apply(lambda, vec![arg], env)?;
        v.as_bool().ok_or_else(|| mismatch("predicate", &v))
    }

    fn elements(&self, expr: &Expression, env: &Env) -> Result<Vec<Value>> {
        match self.eval(expr, env)? {
            Value::Array(a) => Ok(a),
            Value::Map(entries) => Ok(entries
                .into_iter()
                .map(|(k, v)| Value::entry(k, v))
                .collect()),
            Value::Grouping { elements, .. } => Ok(elements),
            v => Err(mismatch(expr.operator_name(), &v)),
        }
    }

    fn filtered(
        &self,
        source: &Expression,
        predicate: Option<&Lambda>,
        env: &Env,
    ) -> Result<Vec<Value>> {
        let elements = self.elements(source, env)?;
        match predicate {
            None => Ok(elements),
            Some(p) => {
                let mut kept = vec![];
                for e in elements {
                    if self.test(p, e.clone(), env)? {
                        kept.push(e);
                    }
                }
                Ok(kept)
            }
        }
    }

    fn eval(&self, expr: &Expression, env: &Env) -> Result<Value> {
        use Expression::*;
        match expr {
            Literal(l) => Ok(l.value.clone()),
            Parameter(p) => env
                .lookup(&p.name)
                .cloned()
                .ok_or_else(|| Error::UnboundParameter(p.name.clone())),
            Source(s) => self
                .collections
                .get(&s.collection)
                .map(|docs| Value::Array(docs.clone()))
                .ok_or_else(|| Error::UnknownCollection(s.collection.clone())),
            Field(f) => {
                let source = self.eval(&f.source, env)?;
                match (&source, f.name.as_str()) {
                    (Value::Document(d), name) => Ok(d.get(name).cloned().unwrap_or(Value::Null)),
                    (Value::Grouping { key, .. }, "Key") => Ok(key.as_ref().clone()),
                    (Value::String(s), "Length") => Ok(Value::Int32(s.chars().count() as i32)),
                    (Value::Array(a), "Length" | "Count") => Ok(Value::Int32(a.len() as i32)),
                    (Value::Map(m), "Count") => Ok(Value::Int32(m.len() as i32)),
                    (Value::Null, _) => Ok(Value::Null),
                    _ => Err(mismatch("MemberAccess", &source)),
                }
            }
            Binary(b) => match b.op {
                BinaryOperator::And => {
                    let l = self.eval(&b.left, env)?;
                    if !truthy(&l) {
                        return Ok(Value::Boolean(false));
                    }
                    Ok(Value::Boolean(truthy(&self.eval(&b.right, env)?)))
                }
                BinaryOperator::Or => {
                    let l = self.eval(&b.left, env)?;
                    if truthy(&l) {
                        return Ok(Value::Boolean(true));
                    }
                    Ok(Value::Boolean(truthy(&self.eval(&b.right, env)?)))
                }
                op if op.is_comparison() => {
                    let l = self.eval(&b.left, env)?;
                    let r = self.eval(&b.right, env)?;
                    Ok(Value::Boolean(compare_with(op, &l, &r)))
                }
                op => {
                    let l = self.eval(&b.left, env)?;
                    let r = self.eval(&b.right, env)?;
                    arithmetic(op, l, r)
                }
            },
            Not(e) => {
                let v = self.eval(e, env)?;
                v.as_bool()
                    .map(|b| Value::Boolean(!b))
                    .ok_or_else(|| mismatch("Not", &v))
            }
            Conditional(c) => {
                if truthy(&self.eval(&c.test, env)?) {
                    self.eval(&c.if_true, env)
                } else {
                    self.eval(&c.if_false, env)
                }
            }
            Convert(c) => convert(self.eval(&c.expr, env)?, &c.to),
            New(n) => {
                let mut fields = vec![];
                for (name, e) in n.fields.iter() {
                    fields.push((name.clone(), self.eval(e, env)?));
                }
                Ok(Value::document(fields))
            }
            NewArray(a) => Ok(Value::Array(
                a.elements
                    .iter()
                    .map(|e| self.eval(e, env))
                    .collect::<Result<Vec<_>>>()?,
            )),
            StringPredicate(s) => {
                let target = self.eval(&s.target, env)?;
                let value = self.eval(&s.value, env)?;
                let (mut target, mut value) = match (target.as_text(), value.as_text()) {
                    (Some(t), Some(v)) => (t, v),
                    _ => return Ok(Value::Boolean(false)),
                };
                if s.mode.ignores_case() {
                    target = target.to_lowercase();
                    value = value.to_lowercase();
                }
                Ok(Value::Boolean(match s.kind {
                    StringPredicateKind::Contains => target.contains(&value),
                    StringPredicateKind::StartsWith => target.starts_with(&value),
                    StringPredicateKind::EndsWith => target.ends_with(&value),
                }))
            }
            StringCase(s) => match self.eval(&s.target, env)? {
                Value::Null => Ok(Value::Null),
                v => {
                    let text = v.as_text().ok_or_else(|| mismatch("ToLower", &v))?;
                    Ok(Value::String(match s.conversion {
                        CaseConversion::ToLower => text.to_lowercase(),
                        CaseConversion::ToUpper => text.to_uppercase(),
                    }))
                }
            },
            Where(w) => Ok(Value::Array(self.filtered(
                &w.source,
                Some(&w.predicate),
                env,
            )?)),
            Select(s) => {
                let mut out = vec![];
                for e in self.elements(&s.source, env)? {
                    out.push(self.apply(&s.selector, vec![e], env)?);
                }
                Ok(Value::Array(out))
            }
            GroupBy(g) => {
                let mut groups: Vec<(Value, Vec<Value>)> = vec![];
                for e in self.elements(&g.source, env)? {
                    let key = self.apply(&g.key, vec![e.clone()], env)?;
                    let element = match &g.element {
                        Some(selector) => self.apply(selector, vec![e], env)?,
                        None => e,
                    };
                    match groups.iter_mut().find(|(k, _)| k.loose_eq(&key)) {
                        Some((_, members)) => members.push(element),
                        None => groups.push((key, vec![element])),
                    }
                }
                Ok(Value::Array(
                    groups
                        .into_iter()
                        .map(|(key, elements)| Value::Grouping {
                            key: Box::new(key),
                            elements,
                        })
                        .collect(),
                ))
            }
            OrderBy(o) => self.order(o, env),
            Skip(s) => {
                let n = self.count_operand(&s.count, env)?;
                let elements = self.elements(&s.source, env)?;
                Ok(Value::Array(elements.into_iter().skip(n).collect()))
            }
            Take(t) => {
                let n = self.count_operand(&t.count, env)?;
                let elements = self.elements(&t.source, env)?;
                Ok(Value::Array(elements.into_iter().take(n).collect()))
            }
            SetOp(s) => {
                let source = self.elements(&s.source, env)?;
                let other = match &s.other {
                    Some(o) => self.elements(o, env)?,
                    None => vec![],
                };
                let contains = |set: &[Value], v: &Value| set.iter().any(|o| o.loose_eq(v));
                Ok(Value::Array(match s.op {
                    SetOperator::Concat => source.into_iter().chain(other).collect(),
                    SetOperator::Distinct => distinct(source),
                    SetOperator::Union => distinct(source.into_iter().chain(other).collect()),
                    SetOperator::Except => distinct(source)
                        .into_iter()
                        .filter(|v| !contains(&other, v))
                        .collect(),
                    SetOperator::Intersect => distinct(source)
                        .into_iter()
                        .filter(|v| contains(&other, v))
                        .collect(),
                }))
            }
            Quantifier(q) => {
                let elements = self.elements(&q.source, env)?;
                let result = match (q.kind, &q.predicate) {
                    (QuantifierKind::Any, None) => !elements.is_empty(),
                    (QuantifierKind::Any, Some(p)) => {
                        let mut any = false;
                        for e in elements {
                            if self.test(p, e, env)? {
                                any = true;
                                break;
                            }
                        }
                        any
                    }
                    (QuantifierKind::All, None) => true,
                    (QuantifierKind::All, Some(p)) => {
                        let mut all = true;
                        for e in elements {
                            if !self.test(p, e, env)? {
                                all = false;
                                break;
                            }
                        }
                        all
                    }
                };
                Ok(Value::Boolean(result))
            }
            Contains(c) => {
                let value = self.eval(&c.value, env)?;
                let elements = self.elements(&c.source, env)?;
                Ok(Value::Boolean(elements.iter().any(|e| e.loose_eq(&value))))
            }
            ElementAccess(e) => {
                let elements = self.filtered(&e.source, e.predicate.as_ref(), env)?;
                let default = || expr.ty().default_value();
                let missing = if e.predicate.is_some() {
                    Error::NoMatch
                } else {
                    Error::EmptySequence
                };
                let found = match &e.kind {
                    ElementKind::First => elements.into_iter().next(),
                    ElementKind::Last => elements.into_iter().last(),
                    ElementKind::ElementAt(index) => {
                        let i = self.eval(index, env)?;
                        let i = i.as_i64().ok_or_else(|| mismatch("ElementAt", &i))?;
                        match usize::try_from(i).ok().and_then(|i| elements.into_iter().nth(i)) {
                            Some(v) => Some(v),
                            None if e.or_default => None,
                            None => return Err(Error::IndexOutOfRange(i)),
                        }
                    }
                };
                match found {
                    Some(v) => Ok(v),
                    None if e.or_default => Ok(default()),
                    None => Err(missing),
                }
            }
            Reduce(r) => {
                let mut elements = self.elements(&r.source, env)?.into_iter();
                let mut acc = match &r.seed {
                    Some(seed) => self.eval(seed, env)?,
                    None => elements.next().ok_or(Error::EmptySequence)?,
                };
                for e in elements {
                    acc = self.apply(&r.func, vec![acc, e], env)?;
                }
                match &r.result_selector {
                    Some(selector) => self.apply(selector, vec![acc], env),
                    None => Ok(acc),
                }
            }
            Aggregate(a) => self.aggregate(expr, a, env),
            Reverse(s) => {
                let mut elements = self.elements(s, env)?;
                elements.reverse();
                Ok(Value::Array(elements))
            }
            DefaultIfEmpty(s) => {
                let elements = self.elements(s, env)?;
                if elements.is_empty() {
                    Ok(Value::Array(vec![s.element_ty().default_value()]))
                } else {
                    Ok(Value::Array(elements))
                }
            }
            ToArray(s) => Ok(Value::Array(self.elements(s, env)?)),
            Zip(z) => {
                let first = self.elements(&z.source, env)?;
                let second = self.elements(&z.other, env)?;
                let mut out = vec![];
                for (x, y) in first.into_iter().zip(second) {
                    out.push(self.apply(&z.selector, vec![x, y], env)?);
                }
                Ok(Value::Array(out))
            }
            Dictionary(d) => {
                let entries = match self.eval(&d.source, env)? {
                    Value::Map(entries) => entries,
                    v => return Err(mismatch(expr.operator_name(), &v)),
                };
                let as_entry = |(k, v): &(Value, Value)| Value::entry(k.clone(), v.clone());
                match &d.op {
                    DictionaryOp::ContainsKey(key) => {
                        let key = self.eval(key, env)?;
                        Ok(Value::Boolean(entries.iter().any(|(k, _)| k.loose_eq(&key))))
                    }
                    DictionaryOp::ContainsValue(value) => {
                        let value = self.eval(value, env)?;
                        Ok(Value::Boolean(entries.iter().any(|(_, v)| v.loose_eq(&value))))
                    }
                    DictionaryOp::Keys => {
                        Ok(Value::Array(entries.into_iter().map(|(k, _)| k).collect()))
                    }
                    DictionaryOp::Values => {
                        Ok(Value::Array(entries.into_iter().map(|(_, v)| v).collect()))
                    }
                    DictionaryOp::Indexer(key) => {
                        let key = self.eval(key, env)?;
                        entries
                            .into_iter()
                            .find(|(k, _)| k.loose_eq(&key))
                            .map(|(_, v)| v)
                            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
                    }
                    DictionaryOp::Count => Ok(Value::Int32(entries.len() as i32)),
                    DictionaryOp::CountWithPredicate(p) => {
                        let mut n = 0;
                        for entry in entries.iter() {
                            if self.test(p, as_entry(entry), env)? {
                                n += 1;
                            }
                        }
                        Ok(Value::Int32(n))
                    }
                    DictionaryOp::First(p) | DictionaryOp::FirstOrDefault(p) => {
                        for entry in entries.iter() {
                            if self.test(p, as_entry(entry), env)? {
                                return Ok(as_entry(entry));
                            }
                        }
                        match d.op {
                            DictionaryOp::FirstOrDefault(_) => Ok(expr.ty().default_value()),
                            _ => Err(Error::NoMatch),
                        }
                    }
                }
            }
        }
    }

    fn count_operand(&self, count: &Expression, env: &Env) -> Result<usize> {
        let n = self.eval(count, env)?;
        let n = n.as_i64().ok_or_else(|| mismatch("Skip", &n))?;
        Ok(usize::try_from(n.max(0)).unwrap_or(usize::MAX))
    }

    /// Sorts by the whole OrderBy/ThenBy chain ending at `outer` at once.
    fn order(&self, outer: &ir::OrderBy, env: &Env) -> Result<Value> {
        let mut keys: Vec<(&Lambda, SortDirection)> = vec![(&outer.key, outer.direction)];
        let mut source = outer.source.as_ref();
        let mut then_by = outer.then_by;
        while then_by {
            match source {
                Expression::OrderBy(inner) => {
                    keys.push((&inner.key, inner.direction));
                    then_by = inner.then_by;
                    source = inner.source.as_ref();
                }
                _ => break,
            }
        }
        keys.reverse();

        let mut keyed = vec![];
        for e in self.elements(source, env)? {
            let mut k = vec![];
            for (lambda, _) in keys.iter() {
                k.push(self.apply(lambda, vec![e.clone()], env)?);
            }
            keyed.push((k, e));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            for (i, (_, direction)) in keys.iter().enumerate() {
                let ord = compare(&a[i], &b[i]);
                let ord = match direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        Ok(Value::Array(keyed.into_iter().map(|(_, e)| e).collect()))
    }

    fn aggregate(
        &self,
        expr: &Expression,
        a: &ir::Aggregate,
        env: &Env,
    ) -> Result<Value> {
        use AggregateFunction::*;
        if let Count | LongCount = a.function {
            let n = self.filtered(&a.source, a.selector.as_ref(), env)?.len();
            return Ok(match a.function {
                Count => Value::Int32(n as i32),
                _ => Value::Int64(n as i64),
            });
        }
        let mut values = vec![];
        for e in self.elements(&a.source, env)? {
            let v = match &a.selector {
                Some(selector) => self.apply(selector, vec![e], env)?,
                None => e,
            };
            if !v.is_null() {
                values.push(v);
            }
        }
        let result_ty = expr.ty();
        match a.function {
            Count | LongCount => unreachable!("counts return above"),
            Sum => values
                .into_iter()
                .try_fold(result_ty.default_value(), |acc, v| {
                    arithmetic(BinaryOperator::Add, acc, v)
                }),
            Average => {
                if values.is_empty() {
                    return Err(Error::EmptySequence);
                }
                let n = values.len();
                if result_ty == Type::Decimal {
                    let total = values
                        .into_iter()
                        .try_fold(Decimal::ZERO, |acc, v| {
                            v.as_decimal()
                                .and_then(|d| acc.checked_add(d))
                                .ok_or(Error::Overflow)
                        })?;
                    Ok(Value::Decimal(total / Decimal::from(n as i64)))
                } else {
                    let total: f64 = values.iter().filter_map(Value::as_f64).sum();
                    Ok(Value::Double(total / n as f64))
                }
            }
            Min | Max => {
                let pick = if a.function == Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                values
                    .into_iter()
                    .reduce(|best, v| if compare(&v, &best) == pick { v } else { best })
                    .ok_or(Error::EmptySequence)
            }
            StdDevPop | StdDevSamp => {
                let xs: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
                let n = xs.len() as f64;
                let min_len = if a.function == StdDevPop { 1.0 } else { 2.0 };
                if n < min_len {
                    return Ok(Value::Null);
                }
                let mean = xs.iter().sum::<f64>() / n;
                let squares = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
                let divisor = if a.function == StdDevPop { n } else { n - 1.0 };
                Ok(Value::Double((squares / divisor).sqrt()))
            }
        }
    }
}

fn truthy(v: &Value) -> bool {
    matches!(v, Value::Boolean(true))
}

fn distinct(values: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = vec![];
    for v in values {
        if !out.iter().any(|o| o.loose_eq(&v)) {
            out.push(v);
        }
    }
    out
}

/// Comparison with in-memory null semantics: null equals only null and
/// orders against nothing.
fn compare_with(op: BinaryOperator, l: &Value, r: &Value) -> bool {
    if l.is_null() || r.is_null() {
        return match op {
            BinaryOperator::Eq => l.is_null() && r.is_null(),
            BinaryOperator::Ne => l.is_null() != r.is_null(),
            _ => false,
        };
    }
    let ord = compare(l, r);
    match op {
        BinaryOperator::Eq => ord == Ordering::Equal,
        BinaryOperator::Ne => ord != Ordering::Equal,
        BinaryOperator::Lt => ord == Ordering::Less,
        BinaryOperator::Lte => ord != Ordering::Greater,
        BinaryOperator::Gt => ord == Ordering::Greater,
        BinaryOperator::Gte => ord != Ordering::Less,
        _ => false,
    }
}

fn numeric_rank(v: &Value) -> Option<u8> {
    match v {
        Value::Int32(_) | Value::Char(_) => Some(0),
        Value::Int64(_) => Some(1),
        Value::Double(_) => Some(2),
        Value::Decimal(_) => Some(3),
        _ => None,
    }
}

pub(crate) fn arithmetic(op: BinaryOperator, l: Value, r: Value) -> Result<Value> {
    if op == BinaryOperator::Add {
        if let (Value::String(_), _) | (_, Value::String(_)) = (&l, &r) {
            let text = |v: &Value| match v {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                v => v.as_text().unwrap_or_else(|| plain_text(v)),
            };
            return Ok(Value::String(text(&l) + &text(&r)));
        }
    }
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    let rank = match (numeric_rank(&l), numeric_rank(&r)) {
        (Some(a), Some(b)) => a.max(b),
        (None, _) => return Err(mismatch("arithmetic", &l)),
        (_, None) => return Err(mismatch("arithmetic", &r)),
    };
    match rank {
        0 => {
            let (a, b) = (int_of(&l) as i32, int_of(&r) as i32);
            Ok(Value::Int32(match op {
                BinaryOperator::Add => a.wrapping_add(b),
                BinaryOperator::Subtract => a.wrapping_sub(b),
                BinaryOperator::Multiply => a.wrapping_mul(b),
                _ => a.checked_div(b).ok_or(Error::DivideByZero)?,
            }))
        }
        1 => {
            let (a, b) = (int_of(&l), int_of(&r));
            Ok(Value::Int64(match op {
                BinaryOperator::Add => a.wrapping_add(b),
                BinaryOperator::Subtract => a.wrapping_sub(b),
                BinaryOperator::Multiply => a.wrapping_mul(b),
                _ => a.checked_div(b).ok_or(Error::DivideByZero)?,
            }))
        }
        2 => {
            let (a, b) = (
                l.as_f64().unwrap_or_default(),
                r.as_f64().unwrap_or_default(),
            );
            Ok(Value::Double(match op {
                BinaryOperator::Add => a + b,
                BinaryOperator::Subtract => a - b,
                BinaryOperator::Multiply => a * b,
                _ => a / b,
            }))
        }
        _ => {
            let (a, b) = match (l.as_decimal(), r.as_decimal()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(Error::Overflow),
            };
            let result = match op {
                BinaryOperator::Add => a.checked_add(b),
                BinaryOperator::Subtract => a.checked_sub(b),
                BinaryOperator::Multiply => a.checked_mul(b),
                _ if b.is_zero() => return Err(Error::DivideByZero),
                _ => a.checked_div(b),
            };
            result.map(Value::Decimal).ok_or(Error::Overflow)
        }
    }
}

fn int_of(v: &Value) -> i64 {
    match v {
        Value::Int32(i) => *i as i64,
        Value::Int64(l) => *l,
        Value::Char(c) => *c as i64,
        _ => 0,
    }
}

fn plain_text(v: &Value) -> String {
    match v {
        Value::Int32(i) => i.to_string(),
        Value::Int64(l) => l.to_string(),
        Value::Double(d) => d.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Boolean(b) => b.to_string(),
        v => v.to_string(),
    }
}

pub(crate) fn convert(value: Value, to: &Type) -> Result<Value> {
    let invalid = |value: &Value| Error::InvalidConversion {
        value: value.to_string(),
        to: to.clone(),
    };
    if value.is_null() {
        return Ok(Value::Null);
    }
    match to {
        Type::Int32 => match &value {
            Value::String(s) => s.trim().parse().map(Value::Int32).map_err(|_| invalid(&value)),
            Value::Double(d) => Ok(Value::Int32(d.trunc() as i32)),
            Value::Decimal(d) => d.trunc().to_i32().map(Value::Int32).ok_or_else(|| invalid(&value)),
            Value::Boolean(b) => Ok(Value::Int32(*b as i32)),
            v => v
                .as_i64()
                .and_then(|i| i32::try_from(i).ok())
                .map(Value::Int32)
                .ok_or_else(|| invalid(&value)),
        },
        Type::Int64 => match &value {
            Value::String(s) => s.trim().parse().map(Value::Int64).map_err(|_| invalid(&value)),
            Value::Double(d) => Ok(Value::Int64(d.trunc() as i64)),
            Value::Decimal(d) => d.trunc().to_i64().map(Value::Int64).ok_or_else(|| invalid(&value)),
            Value::Boolean(b) => Ok(Value::Int64(*b as i64)),
            v => v.as_i64().map(Value::Int64).ok_or_else(|| invalid(&value)),
        },
        Type::Double => match &value {
            Value::String(s) => s.trim().parse().map(Value::Double).map_err(|_| invalid(&value)),
            Value::Boolean(b) => Ok(Value::Double(*b as i32 as f64)),
            v => v.as_f64().map(Value::Double).ok_or_else(|| invalid(&value)),
        },
        Type::Decimal => match &value {
            Value::String(s) => Decimal::from_str(s.trim())
                .map(Value::Decimal)
                .map_err(|_| invalid(&value)),
            v => v.as_decimal().map(Value::Decimal).ok_or_else(|| invalid(&value)),
        },
        Type::String => Ok(Value::String(
            value.as_text().unwrap_or_else(|| plain_text(&value)),
        )),
        Type::Char => match &value {
            Value::Char(_) => Ok(value),
            v => v
                .as_i64()
                .and_then(|i| u32::try_from(i).ok())
                .and_then(char::from_u32)
                .map(Value::Char)
                .ok_or_else(|| invalid(&value)),
        },
        Type::Boolean => match &value {
            Value::Boolean(_) => Ok(value),
            _ => Err(invalid(&value)),
        },
        _ => Ok(value),
    }
}
