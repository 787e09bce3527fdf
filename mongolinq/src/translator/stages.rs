use super::{
    coercion::encode_as, unsupported, DocumentShape, MqlTranslator, Result, Translated, ValueShape,
};
use crate::{
    ir::{self, AggregateFunction, ElementKind, Expression, QuantifierKind, SetOperator},
    mql::{self, AccumulatorFunction, GroupAccumulator, MatchComparisonOp, MatchQuery, MqlOperator, ProjectItem, Stage},
};
use bson::Bson;
use linked_hash_map::LinkedHashMap;
use serde::{Deserialize, Serialize};
use tracing::{event, Level};

/// Where the value of each result document is found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultValue {
    /// The whole document.
    Document,
    /// A single field holding a scalar.
    Field(String),
}

/// How many results the caller should expect and how to interpret them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    Sequence,
    /// At most one document. Without `or_default` an empty result is an
    /// error for the caller.
    First { or_default: bool },
    /// One document with the summary, none for an empty collection.
    Aggregate,
    /// True when any document is returned.
    Existence,
    /// True when no document is returned.
    Absence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputShape {
    pub value: ResultValue,
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedQuery {
    pub collection: String,
    pub stages: Vec<Stage>,
    pub output: OutputShape,
}

/// The pipeline built so far and the shape of the documents it produces.
#[derive(Debug, Clone)]
pub(crate) struct PipelineState {
    pub collection: String,
    pub stages: Vec<Stage>,
    pub current: Translated,
}

impl PipelineState {
    fn finish(self, cardinality: Cardinality) -> TranslatedQuery {
        let value = match self.current.ast {
            mql::Expression::FieldRef(path) if !path.is_empty() => ResultValue::Field(path),
            _ => ResultValue::Document,
        };
        TranslatedQuery {
            collection: self.collection,
            stages: self.stages,
            output: OutputShape { value, cardinality },
        }
    }
}

const VALUE_FIELD: &str = "_v";

fn exclude_id() -> (String, ProjectItem) {
    ("_id".to_string(), ProjectItem::Exclusion)
}

impl<'a> MqlTranslator<'a> {
    /// Translates a query over a collection, including a terminal operator
    /// that reduces the sequence to a single result.
    pub fn translate_query(&mut self, expr: &Expression) -> Result<TranslatedQuery> {
        match expr {
            Expression::ElementAccess(e) => {
                let mut state = self.translate_pipeline(&e.source)?;
                if let Some(predicate) = &e.predicate {
                    self.filter_stage(&mut state, predicate)?;
                }
                match &e.kind {
                    ElementKind::First => state.stages.push(Stage::Limit(1)),
                    ElementKind::ElementAt(i) => match self.pipeline_count(expr, i)? {
                        n if n < 0 => state.stages.push(Stage::MatchFilter(MatchQuery::never())),
                        n => {
                            if n > 0 {
                                state.stages.push(Stage::Skip(n));
                            }
                            state.stages.push(Stage::Limit(1));
                        }
                    },
                    ElementKind::Last => {
                        return Err(unsupported(expr, "the collection has no defined order to take the last document from"))
                    }
                }
                Ok(state.finish(Cardinality::First {
                    or_default: e.or_default,
                }))
            }
            Expression::Aggregate(a) => {
                let mut state = self.translate_pipeline(&a.source)?;
                let (function, value) = match a.function {
                    AggregateFunction::Count | AggregateFunction::LongCount => {
                        if let Some(predicate) = &a.selector {
                            self.filter_stage(&mut state, predicate)?;
                        }
                        (AccumulatorFunction::Sum, mql::Expression::int(1))
                    }
                    function => {
                        let selected = match &a.selector {
                            Some(selector) => self.apply_lambda(selector, vec![state.current.clone()])?,
                            None => state.current.clone(),
                        };
                        let function = match function {
                            AggregateFunction::Sum => AccumulatorFunction::Sum,
                            AggregateFunction::Average => AccumulatorFunction::Avg,
                            AggregateFunction::Min => AccumulatorFunction::Min,
                            AggregateFunction::Max => AccumulatorFunction::Max,
                            AggregateFunction::StdDevPop => AccumulatorFunction::StdDevPop,
                            _ => AccumulatorFunction::StdDevSamp,
                        };
                        (function, self.numeric(expr, selected)?)
                    }
                };
                state.stages.push(Stage::Group(mql::Group {
                    keys: mql::Expression::int(1),
                    aggregations: vec![GroupAccumulator {
                        alias: VALUE_FIELD.to_string(),
                        function,
                        expr: value,
                    }],
                }));
                state.stages.push(Stage::Project(LinkedHashMap::from_iter([exclude_id()])));
                state.current = Translated::new(mql::Expression::field(VALUE_FIELD), ValueShape::computed(&expr.ty()));
                Ok(state.finish(Cardinality::Aggregate))
            }
            Expression::Quantifier(q) => {
                let mut state = self.translate_pipeline(&q.source)?;
                match (q.kind, &q.predicate) {
                    (QuantifierKind::Any, predicate) => {
                        if let Some(predicate) = predicate {
                            self.filter_stage(&mut state, predicate)?;
                        }
                        Ok(Self::existence(state))
                    }
                    (QuantifierKind::All, Some(predicate)) => {
                        let negated = match self.predicate_stage(&state.current, predicate)? {
                            None => Some(Stage::MatchFilter(MatchQuery::never())),
                            Some(Stage::MatchFilter(q)) if q == MatchQuery::never() => None,
                            Some(Stage::MatchFilter(q)) => Some(Stage::MatchFilter(MatchQuery::Nor(vec![q]))),
                            Some(Stage::MatchExpr(e)) => {
                                Some(Stage::MatchExpr(mql::Expression::op(MqlOperator::Not, vec![e])))
                            }
                            Some(other) => Some(other),
                        };
                        state.stages.extend(negated);
                        state.stages.push(Stage::Limit(1));
                        Ok(state.finish(Cardinality::Absence))
                    }
                    (QuantifierKind::All, None) => Err(unsupported(expr, "a predicate is required")),
                }
            }
            Expression::Contains(c) => {
                let mut state = self.translate_pipeline(&c.source)?;
                let current = state.current.clone();
                let stage = match (&current.ast, c.value.as_ref()) {
                    (mql::Expression::FieldRef(path), Expression::Literal(l)) if !path.is_empty() => {
                        Stage::MatchFilter(MatchQuery::comparison(
                            Some(path.clone()),
                            MatchComparisonOp::Eq,
                            encode_as(&l.value, &current.shape),
                        ))
                    }
                    (ast, value) => {
                        let value = self.coerce_operand(value, &current.shape)?;
                        Stage::MatchExpr(mql::Expression::op(
                            MqlOperator::Eq,
                            vec![ast.clone(), value.ast],
                        ))
                    }
                };
                state.stages.push(stage);
                Ok(Self::existence(state))
            }
            Expression::Reduce(_) => Err(unsupported(
                expr,
                "a collection cannot be folded on the server",
            )),
            expr => Ok(self.translate_pipeline(expr)?.finish(Cardinality::Sequence)),
        }
    }

    fn existence(mut state: PipelineState) -> TranslatedQuery {
        state.stages.push(Stage::Limit(1));
        state.stages.push(Stage::Project(LinkedHashMap::from_iter([
            exclude_id(),
            (
                VALUE_FIELD.to_string(),
                ProjectItem::Assignment(mql::Expression::Literal(Bson::Null)),
            ),
        ])));
        state.current = Translated::new(mql::Expression::field(VALUE_FIELD), ValueShape::computed(&ir::Type::Null));
        state.finish(Cardinality::Existence)
    }

    fn pipeline_count(&self, expr: &Expression, count: &Expression) -> Result<i64> {
        match count {
            Expression::Literal(l) => l
                .value
                .as_i64()
                .ok_or_else(|| unsupported(expr, "the count is not an integer")),
            _ => Err(unsupported(expr, "the count must be a constant")),
        }
    }

    /// Translates the sequence operators applied to a collection into
    /// stages.
    pub(crate) fn translate_pipeline(&mut self, expr: &Expression) -> Result<PipelineState> {
        match expr {
            Expression::Source(s) => Ok(PipelineState {
                collection: s.collection.clone(),
                stages: Vec::new(),
                current: Translated::new(
                    mql::Expression::root(),
                    ValueShape::Document(DocumentShape::Stored(String::new())),
                ),
            }),
            Expression::Where(w) => {
                let mut state = self.translate_pipeline(&w.source)?;
                self.filter_stage(&mut state, &w.predicate)?;
                Ok(state)
            }
            Expression::Select(s) => match s.source.as_ref() {
                Expression::GroupBy(g) => {
                    let mut state = self.translate_pipeline(&g.source)?;
                    self.translate_grouping(&mut state, g, Some(&s.selector))?;
                    Ok(state)
                }
                source => {
                    let mut state = self.translate_pipeline(source)?;
                    let body = self.apply_lambda(&s.selector, vec![state.current.clone()])?;
                    self.project(&mut state, body)?;
                    Ok(state)
                }
            },
            Expression::GroupBy(g) => {
                let mut state = self.translate_pipeline(&g.source)?;
                self.translate_grouping(&mut state, g, None)?;
                Ok(state)
            }
            Expression::OrderBy(_) => self.translate_ordering(expr),
            Expression::Skip(s) => {
                let mut state = self.translate_pipeline(&s.source)?;
                let n = self.pipeline_count(expr, &s.count)?;
                if n > 0 {
                    state.stages.push(Stage::Skip(n));
                }
                Ok(state)
            }
            Expression::Take(t) => {
                let mut state = self.translate_pipeline(&t.source)?;
                match self.pipeline_count(expr, &t.count)? {
                    n if n <= 0 => state.stages.push(Stage::MatchFilter(MatchQuery::never())),
                    n => state.stages.push(Stage::Limit(n)),
                }
                Ok(state)
            }
            Expression::SetOp(s) if s.op == SetOperator::Distinct => {
                let mut state = self.translate_pipeline(&s.source)?;
                let current = state.current.clone();
                match &current.ast {
                    mql::Expression::FieldRef(path) if path == VALUE_FIELD => {
                        state.stages.push(Stage::Group(mql::Group {
                            keys: current.ast.clone(),
                            aggregations: vec![],
                        }));
                        state.stages.push(Stage::Project(LinkedHashMap::from_iter([
                            (
                                VALUE_FIELD.to_string(),
                                ProjectItem::Assignment(mql::Expression::field("_id")),
                            ),
                            exclude_id(),
                        ])));
                    }
                    ast => {
                        state.stages.push(Stage::Group(mql::Group {
                            keys: ast.clone(),
                            aggregations: vec![],
                        }));
                        state
                            .stages
                            .push(Stage::ReplaceRoot(mql::Expression::field("_id")));
                    }
                }
                Ok(state)
            }
            Expression::ToArray(s) => self.translate_pipeline(s),
            _ => Err(unsupported(
                expr,
                "the operator cannot be applied to a collection",
            )),
        }
    }

    /// Emits a projection producing `body` as the new current document.
    pub(crate) fn project(&mut self, state: &mut PipelineState, body: Translated) -> Result<()> {
        if body.ast == state.current.ast {
            state.current = body;
            return Ok(());
        }
        let (stage, current) = match (body.ast, body.shape) {
            (mql::Expression::Document(fields), _) if fields.is_empty() => (
                Stage::ReplaceRoot(mql::Expression::Document(vec![])),
                Translated::new(mql::Expression::root(), ValueShape::Document(DocumentShape::Computed)),
            ),
            (mql::Expression::Document(fields), ValueShape::Document(DocumentShape::Projected(members))) => {
                let mut items: LinkedHashMap<String, ProjectItem> = fields
                    .into_iter()
                    .map(|(k, e)| (k, ProjectItem::Assignment(e)))
                    .collect();
                if !items.contains_key("_id") {
                    let (k, v) = exclude_id();
                    items.insert(k, v);
                }
                (
                    Stage::Project(items),
                    Translated::new(
                        mql::Expression::root(),
                        ValueShape::Document(DocumentShape::Projected(members)),
                    ),
                )
            }
            (mql::Expression::Literal(Bson::Document(doc)), _) => {
                let mut items: LinkedHashMap<String, ProjectItem> = doc
                    .into_iter()
                    .map(|(k, v)| (k, ProjectItem::Assignment(mql::Expression::Literal(v))))
                    .collect();
                if !items.contains_key("_id") {
                    let (k, v) = exclude_id();
                    items.insert(k, v);
                }
                (
                    Stage::Project(items),
                    Translated::new(mql::Expression::root(), ValueShape::Document(DocumentShape::Computed)),
                )
            }
            (ast, shape) => (
                Stage::Project(LinkedHashMap::from_iter([
                    (VALUE_FIELD.to_string(), ProjectItem::Assignment(ast)),
                    exclude_id(),
                ])),
                Translated::new(mql::Expression::field(VALUE_FIELD), shape),
            ),
        };
        event!(Level::TRACE, ?stage, "projection");
        state.stages.push(stage);
        state.current = current;
        Ok(())
    }
}
