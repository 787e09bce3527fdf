//! Map-typed fields. A map is stored either as a document keyed by its keys,
//! as an array of `[key, value]` pairs, or as an array of `{k, v}`
//! documents; every operation is emitted per shape.

use super::{
    coercion::encode_as, expressions::boolean, filters::match_op, unsupported, MapValue, MqlTranslator, Result,
    Translated, ValueShape,
};
use crate::{
    ir::{self, BinaryOperator, DictionaryOp, Expression, Type, Value, ENTRY_KEY, ENTRY_VALUE},
    mql::{self, MatchComparisonOp, MatchQuery, MqlOperator},
    representation::{MapShape, RepresentationTag},
};
use bson::Bson;

const ENTRY_VAR: &str = "entry";

/// Whether `key` can be used as a single segment of a field path.
pub(crate) fn is_valid_segment(key: &str) -> bool {
    !key.is_empty() && !key.contains('.') && !key.starts_with('$')
}

/// Reads the key or the value of one entry.
fn entry_slot(entry: mql::Expression, shape: MapShape, key: bool) -> mql::Expression {
    match shape {
        MapShape::Document | MapShape::ArrayOfEntryDocs => {
            entry.append_path(if key { "k" } else { "v" })
        }
        // A field reference here is an element inside `$elemMatch`.
        MapShape::ArrayOfPairs => match entry {
            mql::Expression::FieldRef(_) => entry.append_path(if key { "0" } else { "1" }),
            entry => entry.array_elem_at(if key { 0 } else { 1 }),
        },
    }
}

/// The field names of an entry in a native query.
fn native_slots(shape: MapShape) -> (&'static str, &'static str) {
    match shape {
        MapShape::ArrayOfPairs => ("0", "1"),
        MapShape::Document | MapShape::ArrayOfEntryDocs => ("k", "v"),
    }
}

impl<'a> MqlTranslator<'a> {
    /// The entries of a map as an array.
    pub(crate) fn map_entries(ast: mql::Expression, map: &MapValue) -> mql::Expression {
        match map.shape {
            MapShape::Document => mql::Expression::op(MqlOperator::ObjectToArray, vec![ast]),
            MapShape::ArrayOfPairs | MapShape::ArrayOfEntryDocs => ast,
        }
    }

    fn entry_slot_shape(&self, map: &MapValue, key: bool) -> Result<ValueShape> {
        let (member, ty) = if key {
            (ENTRY_KEY, &map.key_ty)
        } else {
            (ENTRY_VALUE, &map.value_ty)
        };
        match &map.path {
            Some(path) => self.resolve_shape("MemberAccess", &format!("{path}.{member}"), ty),
            None => Ok(ValueShape::computed(ty)),
        }
    }

    /// `Key` or `Value` of an entry.
    pub(crate) fn entry_member(
        &mut self,
        expr: &Expression,
        ast: mql::Expression,
        map: MapValue,
        name: &str,
    ) -> Result<Translated> {
        let key = match name {
            ENTRY_KEY => true,
            ENTRY_VALUE => false,
            _ => return Err(unsupported(expr, format!("'{name}' is not a member of an entry"))),
        };
        let shape = self.entry_slot_shape(&map, key)?;
        Ok(Translated::new(entry_slot(ast, map.shape, key), shape))
    }

    fn map_operand(&mut self, expr: &Expression, source: &Expression) -> Result<(mql::Expression, MapValue)> {
        let translated = self.translate_expr(source)?;
        match translated.shape {
            ValueShape::Map(map) if map.shape == MapShape::Document && map.key_ty != Type::String => {
                Err(unsupported(
                    expr,
                    format!("a map stored as a document cannot have keys of type {}", map.key_ty),
                ))
            }
            ValueShape::Map(map) => Ok((translated.ast, map)),
            _ => Err(unsupported(expr, "the operand is not a map")),
        }
    }

    /// All keys or all values of a map.
    fn entry_slots(ast: mql::Expression, map: &MapValue, key: bool) -> mql::Expression {
        match map.shape {
            MapShape::ArrayOfEntryDocs => entry_slot(ast, map.shape, key),
            MapShape::Document | MapShape::ArrayOfPairs => mql::Expression::Map(mql::Map {
                input: Box::new(Self::map_entries(ast, map)),
                _as: ENTRY_VAR.to_string(),
                inside: Box::new(entry_slot(mql::Expression::var(ENTRY_VAR), map.shape, key)),
            }),
        }
    }

    fn filter_entries(&self, entries: mql::Expression, var: &str, cond: mql::Expression, first_only: bool) -> mql::Expression {
        mql::Expression::Filter(mql::Filter {
            input: Box::new(entries),
            _as: var.to_string(),
            cond: Box::new(cond),
            limit: (first_only && self.options.filter_limit_supported)
                .then(|| Box::new(mql::Expression::int(1))),
        })
    }

    /// The entry returned by `FirstOrDefault` on an empty match.
    pub(crate) fn default_entry(&self, map: &MapValue) -> Result<mql::Expression> {
        let value_shape = self.entry_slot_shape(map, false)?;
        let value = encode_as(&map.value_ty.default_value(), &value_shape);
        Ok(mql::Expression::Literal(match map.shape {
            MapShape::ArrayOfPairs => Bson::Array(vec![Bson::Null, value]),
            MapShape::Document | MapShape::ArrayOfEntryDocs => {
                Bson::Document(bson::doc! { "k": Bson::Null, "v": value })
            }
        }))
    }

    pub(crate) fn translate_dictionary(
        &mut self,
        expr: &Expression,
        d: &ir::DictionaryAccess,
    ) -> Result<Translated> {
        let (ast, map) = self.map_operand(expr, &d.source)?;
        let numeric = ValueShape::Scalar(RepresentationTag::NumericScalar);
        match &d.op {
            DictionaryOp::ContainsKey(k) => {
                if map.shape == MapShape::Document {
                    if let Some(key) = literal_segment(k) {
                        let tested = mql::Expression::op(MqlOperator::Type, vec![ast.append_path(&key)]);
                        return Ok(boolean(mql::Expression::op(
                            MqlOperator::Ne,
                            vec![tested, mql::Expression::Literal(Bson::String("missing".into()))],
                        )));
                    }
                }
                let key_shape = self.entry_slot_shape(&map, true)?;
                let key = self.coerce_operand(k, &key_shape)?;
                Ok(boolean(mql::Expression::op(
                    MqlOperator::In,
                    vec![key.ast, Self::entry_slots(ast, &map, true)],
                )))
            }
            DictionaryOp::ContainsValue(v) => {
                let value_shape = self.entry_slot_shape(&map, false)?;
                let value = self.coerce_operand(v, &value_shape)?;
                Ok(boolean(mql::Expression::op(
                    MqlOperator::In,
                    vec![value.ast, Self::entry_slots(ast, &map, false)],
                )))
            }
            DictionaryOp::Keys => {
                let key_shape = self.entry_slot_shape(&map, true)?;
                Ok(Translated::new(
                    Self::entry_slots(ast, &map, true),
                    ValueShape::Array(Box::new(key_shape)),
                ))
            }
            DictionaryOp::Values => {
                let value_shape = self.entry_slot_shape(&map, false)?;
                Ok(Translated::new(
                    Self::entry_slots(ast, &map, false),
                    ValueShape::Array(Box::new(value_shape)),
                ))
            }
            DictionaryOp::Indexer(k) => {
                let value_shape = self.entry_slot_shape(&map, false)?;
                if map.shape == MapShape::Document {
                    if let Some(key) = literal_segment(k) {
                        return Ok(Translated::new(ast.append_path(&key), value_shape));
                    }
                }
                let key_shape = self.entry_slot_shape(&map, true)?;
                let key = self.coerce_operand(k, &key_shape)?;
                let matches_key = mql::Expression::op(
                    MqlOperator::Eq,
                    vec![
                        entry_slot(mql::Expression::var(ENTRY_VAR), map.shape, true),
                        key.ast,
                    ],
                );
                let found = self
                    .filter_entries(Self::map_entries(ast, &map), ENTRY_VAR, matches_key, true)
                    .array_elem_at(0);
                Ok(Translated::new(
                    mql::Expression::let_in(
                        vec![(ENTRY_VAR, found)],
                        entry_slot(mql::Expression::var(ENTRY_VAR), map.shape, false),
                    ),
                    value_shape,
                ))
            }
            DictionaryOp::Count => Ok(Translated::new(Self::map_entries(ast, &map).size(), numeric)),
            DictionaryOp::CountWithPredicate(predicate) => {
                let (var, body) = self.apply_element_lambda(predicate, &ValueShape::Entry(map.clone()))?;
                let matching = self.filter_entries(Self::map_entries(ast, &map), &var, body.ast, false);
                Ok(Translated::new(matching.size(), numeric))
            }
            DictionaryOp::First(predicate) => {
                let (var, body) = self.apply_element_lambda(predicate, &ValueShape::Entry(map.clone()))?;
                let matching = self.filter_entries(Self::map_entries(ast, &map), &var, body.ast, true);
                Ok(Translated::new(matching.array_elem_at(0), ValueShape::Entry(map)))
            }
            DictionaryOp::FirstOrDefault(predicate) => {
                let (var, body) = self.apply_element_lambda(predicate, &ValueShape::Entry(map.clone()))?;
                let matching = self.filter_entries(Self::map_entries(ast, &map), &var, body.ast, true);
                let default = self.default_entry(&map)?;
                let values = mql::Expression::var("values");
                let first_or_default = mql::Expression::cond(
                    mql::Expression::op(
                        MqlOperator::Gt,
                        vec![values.clone().size(), mql::Expression::int(0)],
                    ),
                    values.array_elem_at(0),
                    default,
                );
                Ok(Translated::new(
                    mql::Expression::let_in(vec![("values", matching)], first_or_default),
                    ValueShape::Entry(map),
                ))
            }
        }
    }

    /// The field path of a stored map, usable in a native query.
    fn stored_map(&mut self, expr: &Expression, source: &Expression) -> Result<Option<(String, MapValue)>> {
        let (ast, map) = self.map_operand(expr, source)?;
        Ok(match ast {
            mql::Expression::FieldRef(path) if !path.is_empty() => Some((path, map)),
            _ => None,
        })
    }

    /// `ContainsKey` and `ContainsValue` of a constant as native queries.
    pub(crate) fn dictionary_filter(
        &mut self,
        expr: &Expression,
        d: &ir::DictionaryAccess,
    ) -> Result<Option<MatchQuery>> {
        let (operand, key) = match &d.op {
            DictionaryOp::ContainsKey(k) => (k, true),
            DictionaryOp::ContainsValue(v) => (v, false),
            _ => return Ok(None),
        };
        let constant = match operand.as_ref() {
            Expression::Literal(l) => l.value.clone(),
            _ => return Ok(None),
        };
        let (path, map) = match self.stored_map(expr, &d.source)? {
            Some(stored) => stored,
            None => return Ok(None),
        };
        let encoded = encode_as(&constant, &self.entry_slot_shape(&map, key)?);
        let (key_slot, value_slot) = native_slots(map.shape);
        let slot = if key { key_slot } else { value_slot };
        Ok(match map.shape {
            MapShape::Document if key => constant
                .as_text()
                .filter(|k| is_valid_segment(k))
                .map(|k| MatchQuery::exists(format!("{path}.{k}"), true)),
            MapShape::Document => None,
            MapShape::ArrayOfPairs => Some(MatchQuery::elem_match(
                Some(path),
                MatchQuery::comparison(Some(slot.to_string()), MatchComparisonOp::Eq, encoded),
            )),
            MapShape::ArrayOfEntryDocs => Some(MatchQuery::comparison(
                Some(format!("{path}.{slot}")),
                MatchComparisonOp::Eq,
                encoded,
            )),
        })
    }

    /// `map.Count op n` against a map stored as an array, tested by the
    /// existence of a position.
    pub(crate) fn count_filter(
        &mut self,
        expr: &Expression,
        source: &Expression,
        op: BinaryOperator,
        n: &Value,
    ) -> Result<Option<MatchQuery>> {
        let n = match n.as_i64() {
            Some(n) => n,
            None => return Ok(None),
        };
        let path = match self.stored_map(expr, source)? {
            Some((_, map)) if map.shape == MapShape::Document => return Ok(None),
            Some((path, _)) => path,
            None => return Ok(None),
        };
        let position = |i: i64, exists: bool| MatchQuery::exists(format!("{path}.{i}"), exists);
        Ok(match op {
            BinaryOperator::Gt if n >= 0 => Some(position(n, true)),
            BinaryOperator::Gte if n >= 1 => Some(position(n - 1, true)),
            BinaryOperator::Lt if n >= 1 => Some(position(n - 1, false)),
            BinaryOperator::Lte if n >= 0 => Some(position(n, false)),
            BinaryOperator::Eq if n == 0 => Some(position(0, false)),
            BinaryOperator::Eq if n > 0 => Some(MatchQuery::And(vec![
                position(n - 1, true),
                position(n, false),
            ])),
            _ => None,
        })
    }

    /// `map[key] op value` against a map stored as an array, as an
    /// `$elemMatch` on the entry with that key.
    pub(crate) fn indexer_filter(
        &mut self,
        expr: &Expression,
        source: &Expression,
        key: &Expression,
        op: BinaryOperator,
        value: &Value,
    ) -> Result<Option<MatchQuery>> {
        let key = match key {
            Expression::Literal(l) => l.value.clone(),
            _ => return Ok(None),
        };
        let (path, map) = match self.stored_map(expr, source)? {
            Some((_, map)) if map.shape == MapShape::Document => return Ok(None),
            Some(stored) => stored,
            None => return Ok(None),
        };
        let key = encode_as(&key, &self.entry_slot_shape(&map, true)?);
        let value = encode_as(value, &self.entry_slot_shape(&map, false)?);
        let (key_slot, value_slot) = native_slots(map.shape);
        Ok(Some(MatchQuery::elem_match(
            Some(path),
            MatchQuery::And(vec![
                MatchQuery::comparison(Some(key_slot.to_string()), MatchComparisonOp::Eq, key),
                MatchQuery::comparison(Some(value_slot.to_string()), match_op(op), value),
            ]),
        )))
    }
}

/// A constant key that can be appended to a field path.
fn literal_segment(key: &Expression) -> Option<String> {
    match key {
        Expression::Literal(l) => l.value.as_text().filter(|k| is_valid_segment(k)),
        _ => None,
    }
}
