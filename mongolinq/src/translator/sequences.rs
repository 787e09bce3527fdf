//! Sequence operators applied to array-valued expressions: fields holding
//! arrays, maps enumerated as entries, and the elements of a group.

use super::{
    coercion::encode_as, expressions::boolean, pagination::UNBOUNDED, unsupported, MqlTranslator,
    Result, Translated, ValueShape,
};
use crate::{
    ir::{
        AggregateFunction, ElementKind, Expression, QuantifierKind, SetOperator, Type, Value,
    },
    mql::{self, MqlOperator},
    representation::RepresentationTag,
};

fn filter(input: mql::Expression, var: String, cond: mql::Expression, limit: Option<i32>) -> mql::Expression {
    mql::Expression::Filter(mql::Filter {
        input: Box::new(input),
        _as: var,
        cond: Box::new(cond),
        limit: limit.map(|n| Box::new(mql::Expression::int(n))),
    })
}

fn map(input: mql::Expression, var: String, inside: mql::Expression) -> mql::Expression {
    mql::Expression::Map(mql::Map {
        input: Box::new(input),
        _as: var,
        inside: Box::new(inside),
    })
}

fn is_identity(selector: &crate::ir::Lambda) -> bool {
    match (selector.parameter(0), selector.body.as_ref()) {
        (Some(p), Expression::Parameter(body)) => p.name == body.name,
        _ => false,
    }
}

impl<'a> MqlTranslator<'a> {
    /// The array a sequence operator enumerates and the shape of its
    /// elements.
    pub(crate) fn sequence_source(&mut self, expr: &Expression) -> Result<(mql::Expression, ValueShape)> {
        let translated = self.translate_expr(expr)?;
        match translated.shape {
            ValueShape::Array(element) => Ok((translated.ast, *element)),
            ValueShape::Map(map) => Ok((
                Self::map_entries(translated.ast, &map),
                ValueShape::Entry(map),
            )),
            ValueShape::Grouping {
                element,
                collecting,
                ..
            } => {
                if collecting {
                    self.require_group_elements();
                }
                Ok((translated.ast.append_path("_elements"), *element))
            }
            _ => Err(unsupported(expr, "the operand is not a sequence")),
        }
    }

    /// The second operand of a set operation. Constant arrays are encoded
    /// like the elements of the first.
    fn set_operand(&mut self, other: &Expression, element: &ValueShape) -> Result<mql::Expression> {
        match other {
            Expression::Literal(l) if matches!(l.value, Value::Array(_)) => Ok(
                mql::Expression::Literal(encode_as(&l.value, &ValueShape::Array(Box::new(element.clone())))),
            ),
            other => Ok(self.sequence_source(other)?.0),
        }
    }

    /// `default(T)` for the elements of a sequence, in their stored form.
    pub(crate) fn default_element(&self, ty: &Type, element: &ValueShape) -> Result<mql::Expression> {
        match element {
            ValueShape::Entry(map) => self.default_entry(map),
            element => Ok(mql::Expression::Literal(encode_as(&ty.default_value(), element))),
        }
    }

    /// Converts string-encoded numbers back to numbers before they are
    /// summarized.
    fn numeric_elements(&mut self, expr: &Expression, values: mql::Expression, shape: &ValueShape) -> Result<mql::Expression> {
        match shape {
            ValueShape::Scalar(tag) if tag.is_string_encoded() => {
                let converted = self.numeric(
                    expr,
                    Translated::new(mql::Expression::var("value"), shape.clone()),
                )?;
                Ok(map(values, "value".to_string(), converted))
            }
            _ => Ok(values),
        }
    }

    pub(crate) fn translate_sequence(&mut self, expr: &Expression) -> Result<Translated> {
        if let Some(fused) = self.fuse_group_operator(expr)? {
            return Ok(fused);
        }
        match expr {
            Expression::Where(w) => {
                let (input, element) = self.sequence_source(&w.source)?;
                let (var, body) = self.apply_element_lambda(&w.predicate, &element)?;
                Ok(Translated::new(
                    filter(input, var, body.ast, None),
                    ValueShape::Array(Box::new(element)),
                ))
            }
            Expression::Select(s) => {
                let (input, element) = self.sequence_source(&s.source)?;
                if is_identity(&s.selector) {
                    return Ok(Translated::new(input, ValueShape::Array(Box::new(element))));
                }
                let (var, body) = self.apply_element_lambda(&s.selector, &element)?;
                let shape = ValueShape::Array(Box::new(body.shape));
                // `$items.name` reads a member of every element
                if let (mql::Expression::FieldRef(path), mql::Expression::Variable(v)) = (&input, &body.ast) {
                    if let Some(rest) = v.strip_prefix(&format!("{var}.")) {
                        if !path.is_empty() && matches!(element, ValueShape::Document(_)) {
                            return Ok(Translated::new(
                                mql::Expression::field(&format!("{path}.{rest}")),
                                shape,
                            ));
                        }
                    }
                }
                Ok(Translated::new(map(input, var, body.ast), shape))
            }
            Expression::Skip(_) | Expression::Take(_) => self.translate_pagination(expr),
            Expression::SetOp(s) => {
                let (input, element) = self.sequence_source(&s.source)?;
                let op = match s.op {
                    SetOperator::Concat => MqlOperator::ConcatArrays,
                    SetOperator::Except => MqlOperator::SetDifference,
                    SetOperator::Union => MqlOperator::SetUnion,
                    SetOperator::Intersect | SetOperator::Distinct => MqlOperator::SetIntersection,
                };
                let args = match (s.op, &s.other) {
                    (SetOperator::Distinct, _) => vec![input],
                    (_, Some(other)) => vec![input, self.set_operand(other, &element)?],
                    (_, None) => return Err(unsupported(expr, "a second sequence is required")),
                };
                Ok(Translated::new(
                    mql::Expression::op(op, args),
                    ValueShape::Array(Box::new(element)),
                ))
            }
            Expression::Quantifier(q) => {
                let (input, element) = self.sequence_source(&q.source)?;
                match (q.kind, &q.predicate) {
                    (QuantifierKind::Any, None) => Ok(boolean(mql::Expression::op(
                        MqlOperator::Gt,
                        vec![input.size(), mql::Expression::int(0)],
                    ))),
                    (QuantifierKind::All, None) => Err(unsupported(expr, "a predicate is required")),
                    (kind, Some(predicate)) => {
                        let (var, body) = self.apply_element_lambda(predicate, &element)?;
                        let op = match kind {
                            QuantifierKind::Any => MqlOperator::AnyElementTrue,
                            QuantifierKind::All => MqlOperator::AllElementsTrue,
                        };
                        Ok(boolean(mql::Expression::op(
                            op,
                            vec![map(input, var, body.ast)],
                        )))
                    }
                }
            }
            Expression::Contains(c) => {
                let (input, element) = self.sequence_source(&c.source)?;
                let value = self.coerce_operand(&c.value, &element)?;
                Ok(boolean(mql::Expression::op(
                    MqlOperator::In,
                    vec![value.ast, input],
                )))
            }
            Expression::ElementAccess(e) => {
                let (mut input, element) = self.sequence_source(&e.source)?;
                if let Some(predicate) = &e.predicate {
                    let (var, body) = self.apply_element_lambda(predicate, &element)?;
                    let first_only = e.kind == ElementKind::First && self.options.filter_limit_supported;
                    input = filter(input, var, body.ast, first_only.then_some(1));
                }
                let index = match &e.kind {
                    ElementKind::First => mql::Expression::int(0),
                    ElementKind::Last => mql::Expression::int(-1),
                    ElementKind::ElementAt(i) => match i.as_ref() {
                        Expression::Literal(l) => match l.value.as_i64() {
                            Some(n) if n < 0 && e.or_default => {
                                return Ok(Translated::new(
                                    self.default_element(&expr.ty(), &element)?,
                                    element,
                                ))
                            }
                            Some(n) if n < 0 => return Err(unsupported(expr, "the index is negative")),
                            Some(n) => match i32::try_from(n) {
                                Ok(n) => mql::Expression::int(n),
                                Err(_) => return Err(unsupported(expr, "the index is out of range")),
                            },
                            None => return Err(unsupported(expr, "the index is not an integer")),
                        },
                        i => {
                            let translated = self.translate_expr(i)?;
                            self.numeric(expr, translated)?
                        }
                    },
                };
                if !e.or_default {
                    return Ok(Translated::new(
                        mql::Expression::op(MqlOperator::ArrayElemAt, vec![input, index]),
                        element,
                    ));
                }
                let values = mql::Expression::var("values");
                let minimum = match &e.kind {
                    ElementKind::ElementAt(_) => index.clone(),
                    _ => mql::Expression::int(0),
                };
                let found = mql::Expression::cond(
                    mql::Expression::op(MqlOperator::Gt, vec![values.clone().size(), minimum]),
                    mql::Expression::op(MqlOperator::ArrayElemAt, vec![values, index]),
                    self.default_element(&expr.ty(), &element)?,
                );
                Ok(Translated::new(
                    mql::Expression::let_in(vec![("values", input)], found),
                    element,
                ))
            }
            Expression::Reduce(r) => {
                let (source, element) = self.sequence_source(&r.source)?;
                let accumulator = r.func.parameter(0).map(|p| p.name.clone()).unwrap_or_default();
                let item = r.func.parameter(1).map(|p| p.name.clone()).unwrap_or_default();
                let accumulator = self.var_name(&accumulator);
                let mut item = self.var_name(&item);
                if item == accumulator {
                    item = self.fresh_var();
                }
                let (input, initial, seed_shape) = match &r.seed {
                    Some(seed) => {
                        let seed = self.translate_expr(seed)?;
                        (source.clone(), seed.ast, seed.shape)
                    }
                    None => (
                        mql::Expression::var("rest"),
                        mql::Expression::var("seed"),
                        element.clone(),
                    ),
                };
                let body = self.apply_lambda(
                    &r.func,
                    vec![
                        Translated::new(mql::Expression::var(&accumulator), seed_shape),
                        Translated::new(mql::Expression::var(&item), element),
                    ],
                )?;
                let inside = mql::Expression::let_in(
                    vec![
                        (accumulator.as_str(), mql::Expression::var("value")),
                        (item.as_str(), mql::Expression::var("this")),
                    ],
                    body.ast,
                );
                let mut folded = mql::Expression::Reduce(mql::Reduce {
                    input: Box::new(input),
                    initial_value: Box::new(initial),
                    inside: Box::new(inside),
                });
                if r.seed.is_none() {
                    // the first element seeds the fold over the rest
                    folded = mql::Expression::let_in(
                        vec![
                            ("seed", source.clone().array_elem_at(0)),
                            (
                                "rest",
                                mql::Expression::op(
                                    MqlOperator::Slice,
                                    vec![
                                        source,
                                        mql::Expression::int(1),
                                        mql::Expression::int(UNBOUNDED as i32),
                                    ],
                                ),
                            ),
                        ],
                        folded,
                    );
                }
                let result = Translated::new(folded, body.shape);
                match &r.result_selector {
                    Some(selector) => self.apply_lambda(selector, vec![result]),
                    None => Ok(result),
                }
            }
            Expression::Aggregate(a) => {
                let (input, element) = self.sequence_source(&a.source)?;
                let numeric = ValueShape::Scalar(RepresentationTag::NumericScalar);
                let op = match a.function {
                    AggregateFunction::Count | AggregateFunction::LongCount => {
                        let counted = match &a.selector {
                            Some(predicate) => {
                                let (var, body) = self.apply_element_lambda(predicate, &element)?;
                                filter(input, var, body.ast, None)
                            }
                            None => input,
                        };
                        return Ok(Translated::new(counted.size(), numeric));
                    }
                    AggregateFunction::Sum => MqlOperator::Sum,
                    AggregateFunction::Average => MqlOperator::Avg,
                    AggregateFunction::Min => MqlOperator::Min,
                    AggregateFunction::Max => MqlOperator::Max,
                    AggregateFunction::StdDevPop => MqlOperator::StdDevPop,
                    AggregateFunction::StdDevSamp => MqlOperator::StdDevSamp,
                };
                let (values, shape) = match &a.selector {
                    Some(selector) => {
                        let (var, body) = self.apply_element_lambda(selector, &element)?;
                        (map(input, var, body.ast), body.shape)
                    }
                    None => (input, element),
                };
                let values = self.numeric_elements(expr, values, &shape)?;
                Ok(Translated::new(mql::Expression::op(op, vec![values]), numeric))
            }
            Expression::Reverse(s) => {
                let (input, element) = self.sequence_source(s)?;
                Ok(Translated::new(
                    mql::Expression::op(MqlOperator::ReverseArray, vec![input]),
                    ValueShape::Array(Box::new(element)),
                ))
            }
            Expression::DefaultIfEmpty(s) => {
                let (input, element) = self.sequence_source(s)?;
                let default = self.default_element(&s.element_ty(), &element)?;
                let values = mql::Expression::var("values");
                let filled = mql::Expression::cond(
                    mql::Expression::op(
                        MqlOperator::Eq,
                        vec![values.clone().size(), mql::Expression::int(0)],
                    ),
                    mql::Expression::Array(vec![default]),
                    values,
                );
                Ok(Translated::new(
                    mql::Expression::let_in(vec![("values", input)], filled),
                    ValueShape::Array(Box::new(element)),
                ))
            }
            Expression::ToArray(s) => {
                let (input, element) = self.sequence_source(s)?;
                Ok(Translated::new(input, ValueShape::Array(Box::new(element))))
            }
            Expression::Zip(z) => {
                let (first, first_element) = self.sequence_source(&z.source)?;
                let (second, second_element) = self.sequence_source(&z.other)?;
                let x = z.selector.parameter(0).map(|p| p.name.clone()).unwrap_or_default();
                let y = z.selector.parameter(1).map(|p| p.name.clone()).unwrap_or_default();
                let x = self.var_name(&x);
                let mut y = self.var_name(&y);
                if x == y {
                    y = self.fresh_var();
                }
                let body = self.apply_lambda(
                    &z.selector,
                    vec![
                        Translated::new(mql::Expression::var(&x), first_element),
                        Translated::new(mql::Expression::var(&y), second_element),
                    ],
                )?;
                let pair = mql::Expression::var("pair");
                let inside = mql::Expression::let_in(
                    vec![
                        (x.as_str(), pair.clone().array_elem_at(0)),
                        (y.as_str(), pair.array_elem_at(1)),
                    ],
                    body.ast,
                );
                let zipped = mql::Expression::Zip(mql::Zip {
                    inputs: vec![first, second],
                });
                Ok(Translated::new(
                    map(zipped, "pair".to_string(), inside),
                    ValueShape::Array(Box::new(body.shape)),
                ))
            }
            Expression::GroupBy(_) | Expression::OrderBy(_) => Err(unsupported(
                expr,
                "the operator can only be applied to the collection",
            )),
            _ => Err(unsupported(expr, "the operand is not a sequence")),
        }
    }
}

