//! A small in-memory interpreter for the pipeline stages the compiler emits,
//! used to check that emitted pipelines compute what the query means. It
//! implements only the operators the compiler produces.

use bson::{Bson, Document};
use std::cmp::Ordering;

pub type Result<T> = std::result::Result<T, String>;

/// Runs `pipeline` over `input`.
pub fn run(pipeline: &[Document], input: Vec<Document>) -> Result<Vec<Document>> {
    pipeline
        .iter()
        .try_fold(input, |docs, stage| run_stage(stage, docs))
}

fn run_stage(stage: &Document, docs: Vec<Document>) -> Result<Vec<Document>> {
    let (name, spec) = stage.iter().next().ok_or("empty stage")?;
    match name.as_str() {
        "$match" => {
            let query = as_document(spec)?;
            let mut kept = Vec::new();
            for doc in docs {
                if matches_query(query, &doc)? {
                    kept.push(doc);
                }
            }
            Ok(kept)
        }
        "$project" => docs.iter().map(|d| project(as_document(spec)?, d)).collect(),
        "$group" => group(as_document(spec)?, docs),
        "$sort" => {
            let keys = as_document(spec)?;
            let mut docs = docs;
            docs.sort_by(|a, b| {
                for (path, direction) in keys {
                    let ordering = compare(&lookup(a, path), &lookup(b, path));
                    let ordering = if number(direction) == Some(-1.0) {
                        ordering.reverse()
                    } else {
                        ordering
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
            Ok(docs)
        }
        "$replaceRoot" => {
            let new_root = as_document(spec)?.get("newRoot").ok_or("newRoot is missing")?;
            docs.iter()
                .map(|d| match eval(new_root, d, &Vec::new())? {
                    Bson::Document(root) => Ok(root),
                    other => Err(format!("newRoot evaluated to {other}")),
                })
                .collect()
        }
        "$skip" => {
            let n = number(spec).ok_or("$skip takes a number")? as usize;
            Ok(docs.into_iter().skip(n).collect())
        }
        "$limit" => {
            let n = number(spec).ok_or("$limit takes a number")? as usize;
            Ok(docs.into_iter().take(n).collect())
        }
        other => Err(format!("unsupported stage {other}")),
    }
}

fn as_document(b: &Bson) -> Result<&Document> {
    match b {
        Bson::Document(d) => Ok(d),
        other => Err(format!("expected a document, found {other}")),
    }
}

fn as_array(b: Bson) -> Result<Vec<Bson>> {
    match b {
        Bson::Array(a) => Ok(a),
        other => Err(format!("expected an array, found {other}")),
    }
}

fn number(b: &Bson) -> Option<f64> {
    match b {
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(l) => Some(*l as f64),
        Bson::Double(d) => Some(*d),
        _ => None,
    }
}

fn integer(b: &Bson) -> Result<i64> {
    match b {
        Bson::Int32(i) => Ok(*i as i64),
        Bson::Int64(l) => Ok(*l),
        Bson::Double(d) if d.fract() == 0.0 => Ok(*d as i64),
        other => Err(format!("expected an integer, found {other}")),
    }
}

/// An integral result keeps the narrowest integer type of its operands.
fn make_number(value: f64, operands: &[Bson]) -> Bson {
    let all_int32 = operands.iter().all(|b| matches!(b, Bson::Int32(_)));
    let all_int = operands
        .iter()
        .all(|b| matches!(b, Bson::Int32(_) | Bson::Int64(_)));
    if all_int32 && value.fract() == 0.0 && value.abs() <= i32::MAX as f64 {
        Bson::Int32(value as i32)
    } else if all_int && value.fract() == 0.0 {
        Bson::Int64(value as i64)
    } else {
        Bson::Double(value)
    }
}

fn type_order(b: &Bson) -> u8 {
    match b {
        Bson::Null | Bson::Undefined => 0,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 1,
        Bson::String(_) => 2,
        Bson::Document(_) => 3,
        Bson::Array(_) => 4,
        Bson::Boolean(_) => 5,
        _ => 6,
    }
}

/// The engine's order across types, with numbers compared by value.
pub fn compare(a: &Bson, b: &Bson) -> Ordering {
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::Array(x), Bson::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let o = compare(l, r);
                if o != Ordering::Equal {
                    return o;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Document(x), Bson::Document(y)) => {
            for ((kl, vl), (kr, vr)) in x.iter().zip(y.iter()) {
                let o = kl.cmp(kr).then_with(|| compare(vl, vr));
                if o != Ordering::Equal {
                    return o;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => match (number(a), number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => type_order(a).cmp(&type_order(b)),
        },
    }
}

fn equal(a: &Bson, b: &Bson) -> bool {
    compare(a, b) == Ordering::Equal
}

fn truthy(b: &Bson) -> bool {
    match b {
        Bson::Null | Bson::Undefined => false,
        Bson::Boolean(v) => *v,
        b => number(b).map_or(true, |n| n != 0.0),
    }
}

/// Reads a dotted path. Paths through arrays of documents collect the
/// member of every element.
pub fn lookup(doc: &Document, path: &str) -> Bson {
    read_path(&Bson::Document(doc.clone()), path).unwrap_or(Bson::Null)
}

fn read_path(value: &Bson, path: &str) -> Option<Bson> {
    if path.is_empty() {
        return Some(value.clone());
    }
    let (head, rest) = match path.split_once('.') {
        Some((h, r)) => (h, r),
        None => (path, ""),
    };
    match value {
        Bson::Document(d) => d.get(head).and_then(|v| read_path(v, rest)),
        Bson::Array(a) => Some(Bson::Array(
            a.iter().filter_map(|v| read_path(v, path)).collect(),
        )),
        _ => None,
    }
}

type Vars = Vec<(String, Bson)>;

fn variable(name: &str, root: &Document, vars: &Vars) -> Result<Bson> {
    let (head, rest) = match name.split_once('.') {
        Some((h, r)) => (h, r),
        None => (name, ""),
    };
    let value = if head == "ROOT" || head == "CURRENT" {
        Bson::Document(root.clone())
    } else {
        vars.iter()
            .rev()
            .find(|(n, _)| n == head)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| format!("variable {head} is not defined"))?
    };
    Ok(read_path(&value, rest).unwrap_or(Bson::Null))
}

fn with_var(vars: &Vars, name: &str, value: Bson) -> Vars {
    let mut scoped = vars.clone();
    scoped.push((name.to_string(), value));
    scoped
}

/// Evaluates an aggregation expression against `root`.
pub fn eval(expr: &Bson, root: &Document, vars: &Vars) -> Result<Bson> {
    match expr {
        Bson::String(s) if s.starts_with("$$") => variable(&s[2..], root, vars),
        Bson::String(s) if s.starts_with('$') => Ok(lookup(root, &s[1..])),
        Bson::Array(a) => Ok(Bson::Array(
            a.iter()
                .map(|e| eval(e, root, vars))
                .collect::<Result<Vec<_>>>()?,
        )),
        Bson::Document(d) if d.len() == 1 && d.keys().all(|k| k.starts_with('$')) => {
            let (op, args) = d.iter().next().ok_or("empty operator")?;
            operator(op, args, root, vars)
        }
        Bson::Document(d) => Ok(Bson::Document(
            d.iter()
                .map(|(k, v)| Ok((k.clone(), eval(v, root, vars)?)))
                .collect::<Result<Document>>()?,
        )),
        literal => Ok(literal.clone()),
    }
}

fn arguments(args: &Bson, root: &Document, vars: &Vars) -> Result<Vec<Bson>> {
    match args {
        Bson::Array(a) => a.iter().map(|e| eval(e, root, vars)).collect(),
        single => Ok(vec![eval(single, root, vars)?]),
    }
}

fn field<'d>(spec: &'d Document, name: &str) -> Result<&'d Bson> {
    spec.get(name).ok_or_else(|| format!("missing '{name}'"))
}

fn operator(op: &str, args: &Bson, root: &Document, vars: &Vars) -> Result<Bson> {
    match op {
        "$literal" => return Ok(args.clone()),
        // short-circuits like the server
        "$and" | "$or" => {
            let operands = match args {
                Bson::Array(a) => a.clone(),
                single => vec![single.clone()],
            };
            let stop_on = op == "$or";
            for e in &operands {
                if truthy(&eval(e, root, vars)?) == stop_on {
                    return Ok(Bson::Boolean(stop_on));
                }
            }
            return Ok(Bson::Boolean(!stop_on));
        }
        "$let" => {
            let spec = as_document(args)?;
            let mut scoped = vars.clone();
            for (name, e) in as_document(field(spec, "vars")?)? {
                let value = eval(e, root, vars)?;
                scoped.push((name.clone(), value));
            }
            return eval(field(spec, "in")?, root, &scoped);
        }
        "$cond" => {
            let spec = as_document(args)?;
            let test = eval(field(spec, "if")?, root, vars)?;
            let branch = if truthy(&test) { "then" } else { "else" };
            return eval(field(spec, branch)?, root, vars);
        }
        "$filter" => {
            let spec = as_document(args)?;
            let input = as_array(eval(field(spec, "input")?, root, vars)?)?;
            let name = field(spec, "as")?.as_str().unwrap_or("this").to_string();
            let limit = match spec.get("limit") {
                Some(l) => integer(&eval(l, root, vars)?)? as usize,
                None => usize::MAX,
            };
            let mut kept = Vec::new();
            for item in input {
                if kept.len() >= limit {
                    break;
                }
                if truthy(&eval(field(spec, "cond")?, root, &with_var(vars, &name, item.clone()))?) {
                    kept.push(item);
                }
            }
            return Ok(Bson::Array(kept));
        }
        "$map" => {
            let spec = as_document(args)?;
            let input = as_array(eval(field(spec, "input")?, root, vars)?)?;
            let name = field(spec, "as")?.as_str().unwrap_or("this").to_string();
            return Ok(Bson::Array(
                input
                    .into_iter()
                    .map(|item| eval(field(spec, "in")?, root, &with_var(vars, &name, item)))
                    .collect::<Result<Vec<_>>>()?,
            ));
        }
        "$reduce" => {
            let spec = as_document(args)?;
            let input = as_array(eval(field(spec, "input")?, root, vars)?)?;
            let mut value = eval(field(spec, "initialValue")?, root, vars)?;
            for item in input {
                let scoped = with_var(&with_var(vars, "value", value), "this", item);
                value = eval(field(spec, "in")?, root, &scoped)?;
            }
            return Ok(value);
        }
        "$zip" => {
            let spec = as_document(args)?;
            let inputs = as_array(eval(field(spec, "inputs")?, root, vars)?)?
                .into_iter()
                .map(as_array)
                .collect::<Result<Vec<_>>>()?;
            let shortest = inputs.iter().map(Vec::len).min().unwrap_or(0);
            return Ok(Bson::Array(
                (0..shortest)
                    .map(|i| Bson::Array(inputs.iter().map(|a| a[i].clone()).collect()))
                    .collect(),
            ));
        }
        _ => {}
    }

    let args = arguments(args, root, vars)?;
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Bson::Null);
    let numbers = || -> Result<Vec<f64>> {
        args.iter()
            .map(|a| number(a).ok_or_else(|| format!("{op} needs numbers, found {a}")))
            .collect()
    };
    Ok(match op {
        "$add" => make_number(numbers()?.iter().sum(), &args),
        "$subtract" => {
            let n = numbers()?;
            make_number(n[0] - n[1], &args)
        }
        "$multiply" => make_number(numbers()?.iter().product(), &args),
        "$divide" => {
            let n = numbers()?;
            if n[1] == 0.0 {
                return Err("division by zero".to_string());
            }
            Bson::Double(n[0] / n[1])
        }
        "$trunc" => match arg(0) {
            Bson::Double(d) => Bson::Double(d.trunc()),
            other => other,
        },
        "$max" | "$min" => {
            let candidates: Vec<Bson> = match args.as_slice() {
                [Bson::Array(a)] => a.clone(),
                _ => args.clone(),
            };
            let non_null = candidates.into_iter().filter(|b| !matches!(b, Bson::Null));
            let picked = if op == "$max" {
                non_null.max_by(compare)
            } else {
                non_null.min_by(compare)
            };
            picked.unwrap_or(Bson::Null)
        }
        "$eq" => Bson::Boolean(equal(&arg(0), &arg(1))),
        "$ne" => Bson::Boolean(!equal(&arg(0), &arg(1))),
        "$lt" => Bson::Boolean(compare(&arg(0), &arg(1)) == Ordering::Less),
        "$lte" => Bson::Boolean(compare(&arg(0), &arg(1)) != Ordering::Greater),
        "$gt" => Bson::Boolean(compare(&arg(0), &arg(1)) == Ordering::Greater),
        "$gte" => Bson::Boolean(compare(&arg(0), &arg(1)) != Ordering::Less),
        "$not" => Bson::Boolean(!truthy(&arg(0))),
        "$concat" => {
            let mut out = String::new();
            for a in &args {
                match a {
                    Bson::String(s) => out.push_str(s),
                    _ => return Ok(Bson::Null),
                }
            }
            Bson::String(out)
        }
        "$indexOfCP" => {
            let (haystack, needle) = match (arg(0), arg(1)) {
                (Bson::String(h), Bson::String(n)) => (h, n),
                _ => return Ok(Bson::Null),
            };
            let start = match args.get(2) {
                Some(s) => integer(s)?,
                None => 0,
            };
            let chars: Vec<char> = haystack.chars().collect();
            let needle: Vec<char> = needle.chars().collect();
            if start < 0 {
                return Err("$indexOfCP start must be non-negative".to_string());
            }
            let found = (start as usize..=chars.len())
                .find(|&i| i + needle.len() <= chars.len() && chars[i..i + needle.len()] == needle[..]);
            Bson::Int32(found.map_or(-1, |i| i as i32))
        }
        "$strLenCP" => match arg(0) {
            Bson::String(s) => Bson::Int32(s.chars().count() as i32),
            other => return Err(format!("$strLenCP needs a string, found {other}")),
        },
        "$toLower" => Bson::String(arg(0).as_str().unwrap_or_default().to_lowercase()),
        "$toUpper" => Bson::String(arg(0).as_str().unwrap_or_default().to_uppercase()),
        "$arrayElemAt" => {
            let array = as_array(arg(0))?;
            let index = integer(&arg(1))?;
            let index = if index < 0 { array.len() as i64 + index } else { index };
            if index < 0 {
                return Ok(Bson::Undefined);
            }
            array.get(index as usize).cloned().unwrap_or(Bson::Undefined)
        }
        "$concatArrays" => Bson::Array(
            args.into_iter()
                .map(as_array)
                .collect::<Result<Vec<_>>>()?
                .concat(),
        ),
        "$in" => Bson::Boolean(as_array(arg(1))?.iter().any(|b| equal(b, &arg(0)))),
        "$objectToArray" => match arg(0) {
            Bson::Document(d) => Bson::Array(
                d.into_iter()
                    .map(|(k, v)| Bson::Document(bson::doc! { "k": k, "v": v }))
                    .collect(),
            ),
            other => return Err(format!("$objectToArray needs a document, found {other}")),
        },
        "$reverseArray" => {
            let mut a = as_array(arg(0))?;
            a.reverse();
            Bson::Array(a)
        }
        "$setDifference" => {
            let other = as_array(arg(1))?;
            Bson::Array(distinct(
                as_array(arg(0))?
                    .into_iter()
                    .filter(|b| !other.iter().any(|o| equal(o, b)))
                    .collect(),
            ))
        }
        "$setIntersection" => {
            let mut sets = args.into_iter().map(as_array).collect::<Result<Vec<_>>>()?;
            let first = if sets.is_empty() { Vec::new() } else { sets.remove(0) };
            Bson::Array(distinct(
                first
                    .into_iter()
                    .filter(|b| sets.iter().all(|s| s.iter().any(|o| equal(o, b))))
                    .collect(),
            ))
        }
        "$setUnion" => Bson::Array(distinct(
            args.into_iter()
                .map(as_array)
                .collect::<Result<Vec<_>>>()?
                .concat(),
        )),
        "$size" => Bson::Int32(as_array(arg(0))?.len() as i32),
        "$slice" => {
            let array = as_array(arg(0))?;
            let (position, length) = match args.len() {
                2 => (0, integer(&arg(1))?),
                _ => (integer(&arg(1))?, integer(&arg(2))?),
            };
            if length < 0 || (args.len() == 3 && length == 0) {
                return Err("$slice needs a positive length".to_string());
            }
            let start = if position < 0 {
                (array.len() as i64 + position).max(0)
            } else {
                position
            } as usize;
            Bson::Array(array.into_iter().skip(start).take(length as usize).collect())
        }
        "$allElementsTrue" => Bson::Boolean(as_array(arg(0))?.iter().all(truthy)),
        "$anyElementTrue" => Bson::Boolean(as_array(arg(0))?.iter().any(truthy)),
        "$sum" | "$avg" | "$stdDevPop" | "$stdDevSamp" => {
            let values: Vec<Bson> = match args.as_slice() {
                [Bson::Array(a)] => a.clone(),
                _ => args.clone(),
            };
            summarize(op, &values)
        }
        "$type" => Bson::String(
            match arg(0) {
                Bson::Undefined => "missing",
                Bson::Null => "null",
                Bson::Int32(_) => "int",
                Bson::Int64(_) => "long",
                Bson::Double(_) => "double",
                Bson::String(_) => "string",
                Bson::Document(_) => "object",
                Bson::Array(_) => "array",
                Bson::Boolean(_) => "bool",
                _ => "other",
            }
            .to_string(),
        ),
        "$toInt" | "$toLong" | "$toDouble" | "$toDecimal" => {
            let n = match arg(0) {
                Bson::String(s) => s
                    .parse::<f64>()
                    .map_err(|e| format!("{op} cannot parse {s}: {e}"))?,
                Bson::Boolean(b) => b as i32 as f64,
                Bson::Null => return Ok(Bson::Null),
                other => number(&other).ok_or_else(|| format!("{op} cannot convert {other}"))?,
            };
            match op {
                "$toInt" => Bson::Int32(n.trunc() as i32),
                "$toLong" => Bson::Int64(n.trunc() as i64),
                _ => Bson::Double(n),
            }
        }
        "$toString" => match arg(0) {
            Bson::String(s) => Bson::String(s),
            Bson::Int32(i) => Bson::String(i.to_string()),
            Bson::Int64(l) => Bson::String(l.to_string()),
            Bson::Double(d) => Bson::String(d.to_string()),
            Bson::Boolean(b) => Bson::String(b.to_string()),
            Bson::Null => Bson::Null,
            other => return Err(format!("$toString cannot convert {other}")),
        },
        other => return Err(format!("unsupported operator {other}")),
    })
}

fn distinct(values: Vec<Bson>) -> Vec<Bson> {
    let mut out: Vec<Bson> = Vec::new();
    for v in values {
        if !out.iter().any(|o| equal(o, &v)) {
            out.push(v);
        }
    }
    out
}

fn summarize(op: &str, values: &[Bson]) -> Bson {
    let numeric: Vec<&Bson> = values.iter().filter(|b| number(b).is_some()).collect();
    let n: Vec<f64> = numeric.iter().filter_map(|b| number(b)).collect();
    match op {
        "$sum" => make_number(
            n.iter().sum(),
            &numeric.into_iter().cloned().collect::<Vec<_>>(),
        ),
        _ if n.is_empty() => Bson::Null,
        "$avg" => Bson::Double(n.iter().sum::<f64>() / n.len() as f64),
        _ => {
            let mean = n.iter().sum::<f64>() / n.len() as f64;
            let squares: f64 = n.iter().map(|x| (x - mean).powi(2)).sum();
            let divisor = if op == "$stdDevSamp" {
                if n.len() < 2 {
                    return Bson::Null;
                }
                n.len() - 1
            } else {
                n.len()
            };
            Bson::Double((squares / divisor as f64).sqrt())
        }
    }
}

fn project(spec: &Document, doc: &Document) -> Result<Document> {
    let is_flag = |b: &Bson| matches!(b, Bson::Int32(_) | Bson::Int64(_) | Bson::Boolean(_));
    let exclusion_only = spec.values().all(|v| is_flag(v) && !truthy(v));
    if exclusion_only {
        let mut out = doc.clone();
        for k in spec.keys() {
            out.remove(k);
        }
        return Ok(out);
    }
    let mut out = Document::new();
    if !spec.contains_key("_id") {
        if let Some(id) = doc.get("_id") {
            out.insert("_id", id.clone());
        }
    }
    for (k, v) in spec {
        match v {
            v if is_flag(v) && !truthy(v) => {}
            v if is_flag(v) => {
                if let Some(existing) = doc.get(k) {
                    out.insert(k.clone(), existing.clone());
                }
            }
            v => match eval(v, doc, &Vec::new())? {
                Bson::Undefined => {}
                value => {
                    out.insert(k.clone(), value);
                }
            },
        }
    }
    Ok(out)
}

fn group(spec: &Document, docs: Vec<Document>) -> Result<Vec<Document>> {
    let key_expr = field(spec, "_id")?;
    let mut groups: Vec<(Bson, Vec<Document>)> = Vec::new();
    for doc in docs {
        let key = eval(key_expr, &doc, &Vec::new())?;
        match groups.iter_mut().find(|(k, _)| equal(k, &key)) {
            Some((_, members)) => members.push(doc),
            None => groups.push((key, vec![doc])),
        }
    }
    groups
        .into_iter()
        .map(|(key, members)| {
            let mut out = bson::doc! { "_id": key };
            for (alias, accumulator) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
                let accumulator = as_document(accumulator)?;
                let (op, e) = accumulator.iter().next().ok_or("empty accumulator")?;
                let values = members
                    .iter()
                    .map(|m| eval(e, m, &Vec::new()))
                    .collect::<Result<Vec<_>>>()?;
                let value = match op.as_str() {
                    "$first" => values.first().cloned().unwrap_or(Bson::Null),
                    "$last" => values.last().cloned().unwrap_or(Bson::Null),
                    "$push" => Bson::Array(values),
                    "$addToSet" => Bson::Array(distinct(values)),
                    "$min" | "$max" => {
                        let non_null = values.into_iter().filter(|b| !matches!(b, Bson::Null));
                        if op == "$max" {
                            non_null.max_by(compare)
                        } else {
                            non_null.min_by(compare)
                        }
                        .unwrap_or(Bson::Null)
                    }
                    op => summarize(op, &values),
                };
                out.insert(alias.clone(), value);
            }
            Ok(out)
        })
        .collect()
}

/// Whether `doc` satisfies the native query `query`.
pub fn matches_query(query: &Document, doc: &Document) -> Result<bool> {
    for (key, condition) in query {
        let satisfied = match key.as_str() {
            "$and" | "$or" | "$nor" => {
                let clauses = match condition {
                    Bson::Array(a) => a,
                    other => return Err(format!("{key} needs an array, found {other}")),
                };
                let mut results = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    results.push(matches_query(as_document(clause)?, doc)?);
                }
                match key.as_str() {
                    "$and" => results.iter().all(|r| *r),
                    "$or" => results.iter().any(|r| *r),
                    _ => !results.iter().any(|r| *r),
                }
            }
            "$expr" => truthy(&eval(condition, doc, &Vec::new())?),
            path => {
                let value = read_path(&Bson::Document(doc.clone()), path);
                field_matches(condition, value.as_ref(), doc, path)?
            }
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_operator_document(b: &Bson) -> bool {
    matches!(b, Bson::Document(d) if !d.is_empty() && d.keys().all(|k| k.starts_with('$')))
}

/// Evaluates the condition on one field. Conditions on an array field hold
/// when they hold for the array or for any of its elements.
fn field_matches(condition: &Bson, value: Option<&Bson>, doc: &Document, path: &str) -> Result<bool> {
    if let Bson::Document(ops) = condition {
        if is_operator_document(condition) {
            for (op, arg) in ops {
                if !operator_matches(op, arg, value, doc, path)? {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
    }
    Ok(candidates(value)
        .iter()
        .any(|candidate| value_matches(condition, candidate)))
}

fn value_matches(condition: &Bson, candidate: &Bson) -> bool {
    match condition {
        Bson::RegularExpression(r) => regex_matches(r, candidate),
        condition => equal(condition, candidate),
    }
}

fn regex_matches(r: &bson::Regex, candidate: &Bson) -> bool {
    let pattern = format!("(?{}){}", if r.options.is_empty() { "s" } else { r.options.as_str() }, r.pattern);
    match (regex::Regex::new(&pattern), candidate) {
        (Ok(re), Bson::String(s)) => re.is_match(s),
        _ => false,
    }
}

/// The value and, for an array, each of its elements.
fn candidates(value: Option<&Bson>) -> Vec<Bson> {
    match value {
        None => vec![Bson::Null],
        Some(Bson::Array(a)) => {
            let mut all = vec![Bson::Array(a.clone())];
            all.extend(a.iter().cloned());
            all
        }
        Some(v) => vec![v.clone()],
    }
}

fn operator_matches(op: &str, arg: &Bson, value: Option<&Bson>, doc: &Document, path: &str) -> Result<bool> {
    let any = |test: &dyn Fn(&Bson) -> bool| candidates(value).iter().any(|c| test(c));
    Ok(match op {
        "$eq" => any(&|c| equal(c, arg)),
        "$ne" => !any(&|c| equal(c, arg)),
        "$gt" => value.is_some() && any(&|c| type_order(c) == type_order(arg) && compare(c, arg) == Ordering::Greater),
        "$gte" => value.is_some() && any(&|c| type_order(c) == type_order(arg) && compare(c, arg) != Ordering::Less),
        "$lt" => value.is_some() && any(&|c| type_order(c) == type_order(arg) && compare(c, arg) == Ordering::Less),
        "$lte" => value.is_some() && any(&|c| type_order(c) == type_order(arg) && compare(c, arg) != Ordering::Greater),
        "$in" => {
            let options = match arg {
                Bson::Array(a) => a.clone(),
                other => return Err(format!("$in needs an array, found {other}")),
            };
            options.iter().any(|o| any(&|c| value_matches(o, c)))
        }
        "$exists" => {
            let exists = read_exact(&Bson::Document(doc.clone()), path).is_some();
            exists == truthy(arg)
        }
        "$regex" => match arg {
            Bson::RegularExpression(r) => any(&|c| regex_matches(r, c)),
            other => return Err(format!("$regex needs a regular expression, found {other}")),
        },
        "$elemMatch" => match value {
            Some(Bson::Array(items)) => {
                let mut matched = false;
                for item in items {
                    let hit = if is_operator_document(arg) {
                        field_matches(arg, Some(item), doc, path)?
                    } else {
                        match item {
                            Bson::Document(d) => matches_query(as_document(arg)?, d)?,
                            Bson::Array(_) => matches_query(as_document(arg)?, &array_as_document(item))?,
                            _ => false,
                        }
                    };
                    if hit {
                        matched = true;
                        break;
                    }
                }
                matched
            }
            _ => false,
        },
        "$not" => !field_matches(arg, value, doc, path)?,
        // no stored value is a MinKey
        "$type" => false,
        other => return Err(format!("unsupported query operator {other}")),
    })
}

/// Lets positional paths such as `0` address the elements of an array.
fn array_as_document(array: &Bson) -> Document {
    match array {
        Bson::Array(a) => a
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        _ => Document::new(),
    }
}

/// Reads a path where numeric segments index arrays, as `$exists` does.
fn read_exact(value: &Bson, path: &str) -> Option<Bson> {
    if path.is_empty() {
        return Some(value.clone());
    }
    let (head, rest) = match path.split_once('.') {
        Some((h, r)) => (h, r),
        None => (path, ""),
    };
    match value {
        Bson::Document(d) => d.get(head).and_then(|v| read_exact(v, rest)),
        Bson::Array(a) => head
            .parse::<usize>()
            .ok()
            .and_then(|i| a.get(i))
            .and_then(|v| read_exact(v, rest)),
        _ => None,
    }
}
