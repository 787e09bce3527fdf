pub mod compose;
mod definitions;
mod types;
mod value;
pub mod visitor;

pub use definitions::*;
pub use types::Type;
pub use value::{compare, Value};
pub(crate) use value::{ENTRY_KEY, ENTRY_VALUE};

use std::collections::BTreeSet;


impl Expression {
    /// The static type of this node, derived from its inputs.
    pub fn ty(&self) -> Type {
        use Expression::*;
        match self {
            Literal(l) => l.ty.clone(),
            Parameter(p) => p.ty.clone(),
            Source(s) => Type::array(s.ty.clone()),
            Field(f) => f.ty.clone(),
            Binary(b) => {
                if b.op.is_comparison() || b.op.is_logical() {
                    Type::Boolean
                } else {
                    let (l, r) = (b.left.ty(), b.right.ty());
                    if l == Type::String || r == Type::String {
                        Type::String
                    } else {
                        l.widen(&r)
                    }
                }
            }
            Not(_) | StringPredicate(_) | Quantifier(_) | Contains(_) => Type::Boolean,
            Conditional(c) => c.if_true.ty(),
            Convert(c) => c.to.clone(),
            New(_) => Type::Document,
            NewArray(a) => Type::array(a.element_ty.clone()),
            StringCase(_) => Type::String,
            Where(w) => w.source.sequence_ty(),
            Select(s) => Type::array(s.selector.body.ty()),
            GroupBy(g) => {
                let element = match &g.element {
                    Some(e) => e.body.ty(),
                    None => g.source.element_ty(),
                };
                Type::array(Type::grouping(g.key.body.ty(), element))
            }
            OrderBy(o) => o.source.sequence_ty(),
            Skip(s) => s.source.sequence_ty(),
            Take(t) => t.source.sequence_ty(),
            SetOp(s) => s.source.sequence_ty(),
            ElementAccess(e) => e.source.element_ty(),
            Reduce(r) => match (&r.result_selector, &r.seed) {
                (Some(selector), _) => selector.body.ty(),
                (None, Some(seed)) => seed.ty(),
                (None, None) => r.source.element_ty(),
            },
            Aggregate(a) => {
                use crate::ir::AggregateFunction::*;
                let selected = match (&a.selector, a.function) {
                    (Some(s), Sum | Average | Min | Max | StdDevPop | StdDevSamp) => s.body.ty(),
                    _ => a.source.element_ty(),
                };
                match a.function {
                    Count => Type::Int32,
                    LongCount => Type::Int64,
                    Sum | Min | Max => selected,
                    Average if selected == Type::Decimal => Type::Decimal,
                    Average | StdDevPop | StdDevSamp => Type::Double,
                }
            }
            Reverse(s) | DefaultIfEmpty(s) | ToArray(s) => s.sequence_ty(),
            Zip(z) => Type::array(z.selector.body.ty()),
            Dictionary(d) => {
                let (key, value) = match d.source.ty() {
                    Type::Dictionary(k, v) => (*k, *v),
                    _ => (Type::Null, Type::Null),
                };
                match &d.op {
                    DictionaryOp::ContainsKey(_) | DictionaryOp::ContainsValue(_) => Type::Boolean,
                    DictionaryOp::Keys => Type::array(key),
                    DictionaryOp::Values => Type::array(value),
                    DictionaryOp::Indexer(_) => value,
                    DictionaryOp::Count | DictionaryOp::CountWithPredicate(_) => Type::Int32,
                    DictionaryOp::First(_) | DictionaryOp::FirstOrDefault(_) => {
                        Type::key_value_pair(key, value)
                    }
                }
            }
        }
    }

    /// The element type when this node is enumerated.
    pub fn element_ty(&self) -> Type {
        self.ty().element_type().unwrap_or(Type::Null)
    }

    /// Sequence operators over a dictionary or grouping produce plain arrays.
    fn sequence_ty(&self) -> Type {
        Type::array(self.element_ty())
    }

    /// The parameters referenced by this node that no lambda inside it binds.
    pub fn free_parameters(&self) -> BTreeSet<String> {
        let mut free = BTreeSet::new();
        self.collect_free_parameters(&mut Vec::new(), &mut free);
        free
    }

    fn collect_free_parameters(&self, bound: &mut Vec<String>, free: &mut BTreeSet<String>) {
        if let Expression::Parameter(p) = self {
            if !bound.contains(&p.name) {
                free.insert(p.name.clone());
            }
            return;
        }
        for child in self.children() {
            match child {
                Child::Expression(e) => e.collect_free_parameters(bound, free),
                Child::Lambda(l) => {
                    let depth = bound.len();
                    bound.extend(l.parameters.iter().map(|p| p.name.clone()));
                    l.body.collect_free_parameters(bound, free);
                    bound.truncate(depth);
                }
            }
        }
    }

    /// True when some node in this tree reads a collection.
    pub fn references_source(&self) -> bool {
        matches!(self, Expression::Source(_))
            || self.children().into_iter().any(|c| match c {
                Child::Expression(e) => e.references_source(),
                Child::Lambda(l) => l.body.references_source(),
            })
    }

    /// The direct children of this node in evaluation order.
    pub fn children(&self) -> Vec<Child<'_>> {
        use Child::{Expression as E, Lambda as L};
        use Expression::*;
        match self {
            Literal(_) | Parameter(_) | Source(_) => vec![],
            Field(f) => vec![E(&f.source)],
            Binary(b) => vec![E(&b.left), E(&b.right)],
            Not(e) | Reverse(e) | DefaultIfEmpty(e) | ToArray(e) => vec![E(e)],
            Conditional(c) => vec![E(&c.test), E(&c.if_true), E(&c.if_false)],
            Convert(c) => vec![E(&c.expr)],
            New(n) => n.fields.iter().map(|(_, e)| E(e)).collect(),
            NewArray(a) => a.elements.iter().map(E).collect(),
            StringPredicate(s) => vec![E(&s.target), E(&s.value)],
            StringCase(s) => vec![E(&s.target)],
            Where(w) => vec![E(&w.source), L(&w.predicate)],
            Select(s) => vec![E(&s.source), L(&s.selector)],
            GroupBy(g) => {
                let mut v = vec![E(&g.source), L(&g.key)];
                v.extend(g.element.iter().map(L));
                v
            }
            OrderBy(o) => vec![E(&o.source), L(&o.key)],
            Skip(s) => vec![E(&s.source), E(&s.count)],
            Take(t) => vec![E(&t.source), E(&t.count)],
            SetOp(s) => {
                let mut v = vec![E(&s.source)];
                v.extend(s.other.iter().map(|o| E(o)));
                v
            }
            Quantifier(q) => {
                let mut v = vec![E(&q.source)];
                v.extend(q.predicate.iter().map(L));
                v
            }
            Contains(c) => vec![E(&c.source), E(&c.value)],
            ElementAccess(e) => {
                let mut v = vec![E(&e.source)];
                if let ElementKind::ElementAt(i) = &e.kind {
                    v.push(E(i));
                }
                v.extend(e.predicate.iter().map(L));
                v
            }
            Reduce(r) => {
                let mut v = vec![E(&r.source)];
                v.extend(r.seed.iter().map(|s| E(s)));
                v.push(L(&r.func));
                v.extend(r.result_selector.iter().map(L));
                v
            }
            Aggregate(a) => {
                let mut v = vec![E(&a.source)];
                v.extend(a.selector.iter().map(L));
                v
            }
            Zip(z) => vec![E(&z.source), E(&z.other), L(&z.selector)],
            Dictionary(d) => {
                let mut v = vec![E(&d.source)];
                match &d.op {
                    DictionaryOp::ContainsKey(e)
                    | DictionaryOp::ContainsValue(e)
                    | DictionaryOp::Indexer(e) => v.push(E(e)),
                    DictionaryOp::CountWithPredicate(l)
                    | DictionaryOp::First(l)
                    | DictionaryOp::FirstOrDefault(l) => v.push(L(l)),
                    DictionaryOp::Keys | DictionaryOp::Values | DictionaryOp::Count => {}
                }
                v
            }
        }
    }

    /// A short operator name used in error messages.
    pub fn operator_name(&self) -> &'static str {
        use Expression::*;
        match self {
            Literal(_) => "Constant",
            Parameter(_) => "Parameter",
            Source(_) => "Source",
            Field(_) => "MemberAccess",
            Binary(b) => match b.op {
                BinaryOperator::Eq => "Equal",
                BinaryOperator::Ne => "NotEqual",
                BinaryOperator::Lt => "LessThan",
                BinaryOperator::Lte => "LessThanOrEqual",
                BinaryOperator::Gt => "GreaterThan",
                BinaryOperator::Gte => "GreaterThanOrEqual",
                BinaryOperator::Add => "Add",
                BinaryOperator::Subtract => "Subtract",
                BinaryOperator::Multiply => "Multiply",
                BinaryOperator::Divide => "Divide",
                BinaryOperator::And => "AndAlso",
                BinaryOperator::Or => "OrElse",
            },
            Not(_) => "Not",
            Conditional(_) => "Conditional",
            Convert(_) => "Convert",
            New(_) => "New",
            NewArray(_) => "NewArray",
            StringPredicate(s) => match s.kind {
                StringPredicateKind::Contains => "Contains",
                StringPredicateKind::StartsWith => "StartsWith",
                StringPredicateKind::EndsWith => "EndsWith",
            },
            StringCase(s) => match s.conversion {
                CaseConversion::ToLower => "ToLower",
                CaseConversion::ToUpper => "ToUpper",
            },
            Where(_) => "Where",
            Select(_) => "Select",
            GroupBy(_) => "GroupBy",
            OrderBy(o) => match (o.then_by, o.direction) {
                (false, SortDirection::Ascending) => "OrderBy",
                (false, SortDirection::Descending) => "OrderByDescending",
                (true, SortDirection::Ascending) => "ThenBy",
                (true, SortDirection::Descending) => "ThenByDescending",
            },
            Skip(_) => "Skip",
            Take(_) => "Take",
            SetOp(s) => match s.op {
                SetOperator::Concat => "Concat",
                SetOperator::Except => "Except",
                SetOperator::Intersect => "Intersect",
                SetOperator::Union => "Union",
                SetOperator::Distinct => "Distinct",
            },
            Quantifier(q) => match q.kind {
                QuantifierKind::All => "All",
                QuantifierKind::Any => "Any",
            },
            Contains(_) => "Contains",
            ElementAccess(e) => match (&e.kind, e.or_default) {
                (ElementKind::First, false) => "First",
                (ElementKind::First, true) => "FirstOrDefault",
                (ElementKind::Last, false) => "Last",
                (ElementKind::Last, true) => "LastOrDefault",
                (ElementKind::ElementAt(_), false) => "ElementAt",
                (ElementKind::ElementAt(_), true) => "ElementAtOrDefault",
            },
            Reduce(_) => "Aggregate",
            Aggregate(a) => match a.function {
                AggregateFunction::Count => "Count",
                AggregateFunction::LongCount => "LongCount",
                AggregateFunction::Sum => "Sum",
                AggregateFunction::Average => "Average",
                AggregateFunction::Min => "Min",
                AggregateFunction::Max => "Max",
                AggregateFunction::StdDevPop => "StandardDeviationPopulation",
                AggregateFunction::StdDevSamp => "StandardDeviationSample",
            },
            Reverse(_) => "Reverse",
            DefaultIfEmpty(_) => "DefaultIfEmpty",
            ToArray(_) => "ToArray",
            Zip(_) => "Zip",
            Dictionary(d) => match d.op {
                DictionaryOp::ContainsKey(_) => "ContainsKey",
                DictionaryOp::ContainsValue(_) => "ContainsValue",
                DictionaryOp::Keys => "Keys",
                DictionaryOp::Values => "Values",
                DictionaryOp::Indexer(_) => "get_Item",
                DictionaryOp::Count => "Count",
                DictionaryOp::CountWithPredicate(_) => "Count",
                DictionaryOp::First(_) => "First",
                DictionaryOp::FirstOrDefault(_) => "FirstOrDefault",
            },
        }
    }
}

/// A borrowed child of an operator node.
#[derive(Debug, Clone, Copy)]
pub enum Child<'a> {
    Expression(&'a Expression),
    Lambda(&'a Lambda),
}

impl Lambda {
    pub fn parameter(&self, index: usize) -> Option<&Parameter> {
        self.parameters.get(index)
    }
}
