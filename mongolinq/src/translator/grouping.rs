//! `GroupBy`. Operators applied to a group inside the projection that
//! follows it are fused into accumulators of the `$group` stage. Any other
//! use of the group materializes its elements with `$push`.

use super::{
    expressions::boolean, stages::PipelineState, unsupported, MqlTranslator, Result, Translated,
    ValueShape,
};
use crate::{
    ir::{self, AggregateFunction, ElementKind, Expression, Lambda, QuantifierKind, SetOperator},
    mql::{self, AccumulatorFunction, GroupAccumulator, MqlOperator},
    representation::RepresentationTag,
};
use tracing::{event, Level};

const ELEMENTS: &str = "_elements";

/// The accumulators a projection over a group asks for.
#[derive(Debug, Clone)]
pub(crate) struct GroupCollector {
    /// An element of the group, in terms of the documents entering `$group`.
    element: Translated,
    accumulators: Vec<GroupAccumulator>,
    needs_elements: bool,
}

impl GroupCollector {
    fn new(element: Translated) -> Self {
        Self {
            element,
            accumulators: Vec::new(),
            needs_elements: false,
        }
    }
}

/// Whether `lambda` reads nothing but its own parameters.
fn is_self_contained(lambda: &Lambda) -> bool {
    lambda
        .body
        .free_parameters()
        .iter()
        .all(|name| lambda.parameters.iter().any(|p| &p.name == name))
}

fn numeric_shape() -> ValueShape {
    ValueShape::Scalar(RepresentationTag::NumericScalar)
}

impl<'a> MqlTranslator<'a> {
    pub(crate) fn require_group_elements(&mut self) {
        if let Some(collector) = self.group.as_mut() {
            collector.needs_elements = true;
        }
    }

    /// Whether `source` is the group currently being projected.
    fn is_collecting_group(&self, source: &Expression) -> bool {
        match source {
            Expression::Parameter(p) => matches!(
                self.lookup(&p.name).map(|t| &t.shape),
                Some(ValueShape::Grouping {
                    collecting: true,
                    ..
                })
            ) && self.group.is_some(),
            _ => false,
        }
    }

    /// Translates `expr` as accumulators when it is an operator applied
    /// directly to the group being projected.
    pub(crate) fn fuse_group_operator(&mut self, expr: &Expression) -> Result<Option<Translated>> {
        let (source, lambda) = match expr {
            Expression::Aggregate(a) => (&a.source, a.selector.as_ref()),
            Expression::Quantifier(q) => (&q.source, q.predicate.as_ref()),
            Expression::ElementAccess(e) if e.predicate.is_none() => (&e.source, None),
            Expression::SetOp(s) if s.op == SetOperator::Distinct => (&s.source, None),
            Expression::Select(s) => (&s.source, Some(&s.selector)),
            _ => return Ok(None),
        };
        if !self.is_collecting_group(source) || !lambda.map_or(true, is_self_contained) {
            return Ok(None);
        }
        let mut collector = match self.group.take() {
            Some(collector) => collector,
            None => return Ok(None),
        };
        let fused = self.fuse_into(&mut collector, expr, lambda);
        self.group = Some(collector);
        fused
    }

    fn accumulate(
        &mut self,
        collector: &mut GroupCollector,
        function: AccumulatorFunction,
        expr: mql::Expression,
    ) -> mql::Expression {
        if let Some(existing) = collector
            .accumulators
            .iter()
            .find(|acc| acc.function == function && acc.expr == expr)
        {
            return mql::Expression::field(&existing.alias);
        }
        let alias = self.names.agg();
        collector.accumulators.push(GroupAccumulator {
            alias: alias.clone(),
            function,
            expr,
        });
        mql::Expression::field(&alias)
    }

    fn fuse_into(
        &mut self,
        collector: &mut GroupCollector,
        expr: &Expression,
        lambda: Option<&Lambda>,
    ) -> Result<Option<Translated>> {
        let element = collector.element.clone();
        let selected = match lambda {
            Some(l) => self.apply_lambda(l, vec![element.clone()])?,
            None => element.clone(),
        };
        let fused = match expr {
            Expression::Aggregate(a) => match a.function {
                AggregateFunction::Count | AggregateFunction::LongCount => {
                    let counted = match lambda {
                        Some(_) => mql::Expression::cond(
                            selected.ast,
                            mql::Expression::int(1),
                            mql::Expression::int(0),
                        ),
                        None => mql::Expression::int(1),
                    };
                    let total = self.accumulate(collector, AccumulatorFunction::Sum, counted);
                    Translated::new(total, numeric_shape())
                }
                function => {
                    let accumulator = match function {
                        AggregateFunction::Sum => AccumulatorFunction::Sum,
                        AggregateFunction::Average => AccumulatorFunction::Avg,
                        AggregateFunction::Min => AccumulatorFunction::Min,
                        AggregateFunction::Max => AccumulatorFunction::Max,
                        AggregateFunction::StdDevPop => AccumulatorFunction::StdDevPop,
                        _ => AccumulatorFunction::StdDevSamp,
                    };
                    let string_encoded = selected.tag().map_or(false, |t| t.is_string_encoded());
                    let shape = if string_encoded {
                        numeric_shape()
                    } else {
                        selected.shape.clone()
                    };
                    let value = self.numeric(expr, selected)?;
                    Translated::new(self.accumulate(collector, accumulator, value), shape)
                }
            },
            Expression::Quantifier(q) => match (q.kind, lambda) {
                (QuantifierKind::Any, None) => {
                    let count = self.accumulate(collector, AccumulatorFunction::Sum, mql::Expression::int(1));
                    boolean(mql::Expression::op(
                        MqlOperator::Gt,
                        vec![count, mql::Expression::int(0)],
                    ))
                }
                (QuantifierKind::All, None) => return Err(unsupported(expr, "a predicate is required")),
                (kind, Some(_)) => {
                    let tests = self.accumulate(collector, AccumulatorFunction::Push, selected.ast);
                    let op = match kind {
                        QuantifierKind::Any => MqlOperator::AnyElementTrue,
                        QuantifierKind::All => MqlOperator::AllElementsTrue,
                    };
                    boolean(mql::Expression::op(op, vec![tests]))
                }
            },
            Expression::ElementAccess(e) => {
                let function = match e.kind {
                    ElementKind::First => AccumulatorFunction::First,
                    ElementKind::Last => AccumulatorFunction::Last,
                    ElementKind::ElementAt(_) => return Ok(None),
                };
                let picked = self.accumulate(collector, function, selected.ast);
                if !e.or_default {
                    return Ok(Some(Translated::new(picked, selected.shape)));
                }
                let count = self.accumulate(collector, AccumulatorFunction::Sum, mql::Expression::int(1));
                let default = self.default_element(&expr.ty(), &selected.shape)?;
                Translated::new(
                    mql::Expression::cond(
                        mql::Expression::op(MqlOperator::Gt, vec![count, mql::Expression::int(0)]),
                        picked,
                        default,
                    ),
                    selected.shape,
                )
            }
            Expression::SetOp(_) => {
                let distinct = self.accumulate(collector, AccumulatorFunction::AddToSet, selected.ast);
                Translated::new(distinct, ValueShape::Array(Box::new(selected.shape)))
            }
            Expression::Select(_) => {
                let pushed = self.accumulate(collector, AccumulatorFunction::Push, selected.ast);
                Translated::new(pushed, ValueShape::Array(Box::new(selected.shape)))
            }
            _ => return Ok(None),
        };
        Ok(Some(fused))
    }

    /// Emits the `$group` stage of `g` and, when a projection follows, the
    /// projection with every fusable operator read from an accumulator.
    pub(crate) fn translate_grouping(
        &mut self,
        state: &mut PipelineState,
        g: &ir::GroupBy,
        selector: Option<&Lambda>,
    ) -> Result<()> {
        let current = state.current.clone();
        let key = self.apply_lambda(&g.key, vec![current.clone()])?;
        let element = match &g.element {
            Some(l) => self.apply_lambda(l, vec![current])?,
            None => current,
        };
        let outer = self.group.replace(GroupCollector::new(element.clone()));
        let projected = match selector {
            Some(selector) => {
                let group = Translated::new(
                    mql::Expression::root(),
                    ValueShape::Grouping {
                        key: Box::new(key.shape.clone()),
                        element: Box::new(element.shape.clone()),
                        collecting: true,
                    },
                );
                self.apply_lambda(selector, vec![group]).map(Some)
            }
            None => Ok(None),
        };
        let collector = std::mem::replace(&mut self.group, outer);
        let projected = projected?;
        let mut collector = collector.unwrap_or_else(|| GroupCollector::new(element.clone()));

        let ungrouped = ValueShape::Grouping {
            key: Box::new(key.shape.clone()),
            element: Box::new(element.shape.clone()),
            collecting: false,
        };
        let projected = match projected {
            Some(body) if matches!(body.shape, ValueShape::Grouping { .. }) => None,
            projected => projected,
        };
        if projected.is_none() {
            collector.needs_elements = true;
        }

        let mut aggregations = collector.accumulators;
        if collector.needs_elements {
            aggregations.push(GroupAccumulator {
                alias: ELEMENTS.to_string(),
                function: AccumulatorFunction::Push,
                expr: element.ast,
            });
        }
        event!(
            Level::DEBUG,
            accumulators = aggregations.len(),
            "translated grouping"
        );
        state.stages.push(mql::Stage::Group(mql::Group {
            keys: key.ast,
            aggregations,
        }));
        match projected {
            Some(body) => self.project(state, body),
            None => {
                state.current = Translated::new(mql::Expression::root(), ungrouped);
                Ok(())
            }
        }
    }
}
