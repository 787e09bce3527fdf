//! Predicates of `Where` and the other filtering operators. A predicate is
//! emitted as a native query when every part of it constrains a stored
//! field against a constant, and as `$expr` otherwise. Inside `$elemMatch`
//! there is no `$expr` to fall back to.

use super::{
    coercion::encode_as, stages::PipelineState, MqlTranslator, Result, Translated, ValueShape,
};
use crate::{
    ir::{BinaryOperator, DictionaryAccess, DictionaryOp, Expression, Lambda, QuantifierKind, Type, Value},
    mql::{self, MatchComparisonOp, MatchIn, MatchNot, MatchQuery, MqlOperator, Stage},
    representation::MapShape,
};
use tracing::{event, Level};

pub(crate) fn match_op(op: BinaryOperator) -> MatchComparisonOp {
    match op {
        BinaryOperator::Ne => MatchComparisonOp::Ne,
        BinaryOperator::Lt => MatchComparisonOp::Lt,
        BinaryOperator::Lte => MatchComparisonOp::Lte,
        BinaryOperator::Gt => MatchComparisonOp::Gt,
        BinaryOperator::Gte => MatchComparisonOp::Gte,
        _ => MatchComparisonOp::Eq,
    }
}

fn optional_path(path: String) -> Option<String> {
    (!path.is_empty()).then_some(path)
}

/// Negates a query. A query nested under an element has no field to hang a
/// `$not` on, so it is negated in place.
fn negate_query(q: MatchQuery) -> MatchQuery {
    match q {
        MatchQuery::Expr(e) => MatchQuery::Expr(mql::Expression::op(MqlOperator::Not, vec![e])),
        q @ (MatchQuery::Comparison(_)
        | MatchQuery::In(_)
        | MatchQuery::Regex(_)
        | MatchQuery::ElemMatch(_))
            if q.input().is_none() =>
        {
            MatchQuery::Not(MatchNot {
                input: None,
                condition: Box::new(q),
            })
        }
        q => q.negate(),
    }
}

impl<'a> MqlTranslator<'a> {
    /// Appends the match stage for `predicate` applied to the current
    /// documents. A predicate that is always true adds nothing.
    pub(crate) fn filter_stage(&mut self, state: &mut PipelineState, predicate: &Lambda) -> Result<()> {
        if let Some(stage) = self.predicate_stage(&state.current, predicate)? {
            event!(Level::TRACE, ?stage, "filter");
            state.stages.push(stage);
        }
        Ok(())
    }

    pub(crate) fn predicate_stage(&mut self, current: &Translated, predicate: &Lambda) -> Result<Option<Stage>> {
        let param = predicate
            .parameter(0)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        self.with_bindings(vec![(param, current.clone())], |t| {
            let body = predicate.body.as_ref();
            if let Expression::Literal(l) = body {
                match l.value.as_bool() {
                    Some(true) => return Ok(None),
                    Some(false) => return Ok(Some(Stage::MatchFilter(MatchQuery::never()))),
                    None => {}
                }
            }
            Ok(Some(match t.native_filter(body, true)? {
                Some(MatchQuery::Expr(e)) => Stage::MatchExpr(e),
                Some(q) => Stage::MatchFilter(q),
                None => Stage::MatchExpr(t.translate_expr(body)?.ast),
            }))
        })
    }

    fn native_or_expr(&mut self, expr: &Expression, allow_expr: bool) -> Result<Option<MatchQuery>> {
        match self.native_filter(expr, allow_expr)? {
            Some(q) => Ok(Some(q)),
            None if allow_expr => Ok(Some(MatchQuery::Expr(self.translate_expr(expr)?.ast))),
            None => Ok(None),
        }
    }

    /// The predicate as a native query, or `None` when some part of it has
    /// no native form and `$expr` cannot be used.
    pub(crate) fn native_filter(&mut self, expr: &Expression, allow_expr: bool) -> Result<Option<MatchQuery>> {
        match expr {
            Expression::Binary(b) if b.op.is_logical() => {
                let mut operands = Vec::new();
                Self::flatten_logical(b.op, expr, &mut operands);
                let mut queries = Vec::with_capacity(operands.len());
                for operand in operands {
                    match self.native_or_expr(operand, allow_expr)? {
                        Some(q) => queries.push(q),
                        None => return Ok(None),
                    }
                }
                if queries.iter().all(|q| matches!(q, MatchQuery::Expr(_))) {
                    return Ok(None);
                }
                Ok(Some(match b.op {
                    BinaryOperator::And => MatchQuery::And(
                        queries
                            .into_iter()
                            .flat_map(|q| match q {
                                MatchQuery::And(inner) => inner,
                                q => vec![q],
                            })
                            .collect(),
                    ),
                    _ => MatchQuery::Or(queries),
                }))
            }
            Expression::Binary(b) if b.op.is_comparison() => self.comparison_filter(b.op, &b.left, &b.right),
            Expression::Not(inner) => Ok(self.native_filter(inner, allow_expr)?.map(negate_query)),
            Expression::StringPredicate(p) => self.string_predicate_filter(expr, p),
            Expression::Field(_) | Expression::Parameter(_) if expr.ty() == Type::Boolean => {
                Ok(match self.translate_expr(expr)?.ast {
                    mql::Expression::FieldRef(path) => Some(MatchQuery::comparison(
                        optional_path(path),
                        MatchComparisonOp::Eq,
                        bson::Bson::Boolean(true),
                    )),
                    _ => None,
                })
            }
            Expression::Quantifier(q) => {
                let (path, element) = match self.match_sequence(&q.source)? {
                    Some(stored) => stored,
                    None => return Ok(None),
                };
                Ok(match (q.kind, &q.predicate) {
                    (QuantifierKind::Any, None) => Some(MatchQuery::exists(format!("{path}.0"), true)),
                    (QuantifierKind::Any, Some(p)) => self
                        .element_predicate(p, element)?
                        .map(|c| MatchQuery::elem_match(Some(path), c)),
                    (QuantifierKind::All, Some(p)) => self.element_predicate(p, element)?.map(|c| {
                        MatchQuery::Not(MatchNot {
                            input: Some(path),
                            condition: Box::new(MatchQuery::elem_match(None, negate_query(c))),
                        })
                    }),
                    (QuantifierKind::All, None) => None,
                })
            }
            Expression::Contains(c) => self.contains_filter(c.source.as_ref(), c.value.as_ref()),
            Expression::Dictionary(d) => self.dictionary_filter(expr, d),
            _ => Ok(None),
        }
    }

    /// `field op constant`, in either order.
    fn comparison_filter(
        &mut self,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
    ) -> Result<Option<MatchQuery>> {
        let (field, constant, op) = match (left, right) {
            (Expression::Literal(_), Expression::Literal(_)) => return Ok(None),
            (f, Expression::Literal(l)) => (f, &l.value, op),
            (Expression::Literal(l), f) => (f, &l.value, op.flip()),
            _ => return Ok(None),
        };
        if let Expression::Dictionary(d) = field {
            let native = match &d.op {
                DictionaryOp::Count => self.count_filter(field, &d.source, op, constant)?,
                DictionaryOp::Indexer(key) => self.indexer_filter(field, &d.source, key, op, constant)?,
                _ => None,
            };
            if native.is_some() {
                return Ok(native);
            }
        }
        let translated = self.translate_expr(field)?;
        Ok(match translated.ast {
            mql::Expression::FieldRef(path) => Some(MatchQuery::comparison(
                optional_path(path),
                match_op(op),
                encode_as(constant, &translated.shape),
            )),
            _ => None,
        })
    }

    /// `Contains` of a field in a constant list, or of a constant in an
    /// array field.
    fn contains_filter(&mut self, source: &Expression, value: &Expression) -> Result<Option<MatchQuery>> {
        if let (Expression::Dictionary(d), Expression::Literal(_)) = (source, value) {
            if let Some(query) = self.entry_slot_contains_filter(source, d, value)? {
                return Ok(Some(query));
            }
        }
        match (source, value) {
            (Expression::Literal(list), value) if !matches!(value, Expression::Literal(_)) => {
                let items = match &list.value {
                    Value::Array(items) => items,
                    _ => return Ok(None),
                };
                let translated = self.translate_expr(value)?;
                Ok(match translated.ast {
                    mql::Expression::FieldRef(path) => Some(MatchQuery::In(MatchIn {
                        input: optional_path(path),
                        args: items.iter().map(|v| encode_as(v, &translated.shape)).collect(),
                    })),
                    _ => None,
                })
            }
            (source, Expression::Literal(l)) => Ok(self
                .match_sequence(source)?
                .map(|(path, element)| {
                    MatchQuery::comparison(Some(path), MatchComparisonOp::Eq, encode_as(&l.value, &element))
                })),
            _ => Ok(None),
        }
    }

    /// `map.Keys.Contains(k)` and `map.Values.Contains(v)` test one slot of
    /// the entries, the same as `ContainsKey` and `ContainsValue`.
    fn entry_slot_contains_filter(
        &mut self,
        source: &Expression,
        d: &DictionaryAccess,
        value: &Expression,
    ) -> Result<Option<MatchQuery>> {
        let op = match d.op {
            DictionaryOp::Keys => DictionaryOp::ContainsKey(Box::new(value.clone())),
            DictionaryOp::Values => DictionaryOp::ContainsValue(Box::new(value.clone())),
            _ => return Ok(None),
        };
        let contains = DictionaryAccess {
            source: d.source.clone(),
            op,
        };
        self.dictionary_filter(source, &contains)
    }

    /// The path and element shape of a stored array that a native query can
    /// look inside.
    fn match_sequence(&mut self, source: &Expression) -> Result<Option<(String, ValueShape)>> {
        let translated = self.translate_expr(source)?;
        Ok(match (translated.ast, translated.shape) {
            (mql::Expression::FieldRef(path), ValueShape::Array(element)) if !path.is_empty() => {
                Some((path, *element))
            }
            (mql::Expression::FieldRef(path), ValueShape::Map(map))
                if !path.is_empty() && map.shape != MapShape::Document =>
            {
                Some((path, ValueShape::Entry(map)))
            }
            _ => None,
        })
    }

    /// The condition on one array element for `$elemMatch`.
    fn element_predicate(&mut self, predicate: &Lambda, element: ValueShape) -> Result<Option<MatchQuery>> {
        let param = match predicate.parameter(0) {
            Some(p) => p.name.clone(),
            None => return Ok(None),
        };
        if predicate.body.free_parameters().iter().any(|name| *name != param) {
            return Ok(None);
        }
        let bound = Translated::new(mql::Expression::field(""), element);
        self.with_bindings(vec![(param, bound)], |t| t.native_filter(&predicate.body, false))
    }
}
