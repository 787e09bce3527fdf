//! Composition API: builds operator trees the way a caller chains query
//! operators, e.g.
//!
//! ```
//! use mongolinq::ir::{compose::*, Type};
//!
//! let query = source("people", Type::Document)
//!     .filter(lambda("p", Type::Document, |p| p.field("Age", Type::Int32).gt(lit(21))))
//!     .skip(lit(10));
//! ```

use crate::{
    ir::*,
    representation::CultureId,
};

pub fn source(collection: &str, ty: Type) -> Expression {
    Expression::Source(Source {
        collection: collection.to_string(),
        ty,
    })
}

pub fn param(name: &str, ty: Type) -> Expression {
    Expression::Parameter(Parameter {
        name: name.to_string(),
        ty,
    })
}

/// A constant whose type is inferred from the value.
pub fn lit<V: Into<Value>>(value: V) -> Expression {
    let value = value.into();
    let ty = value.ty();
    Expression::Literal(Literal { value, ty })
}

/// A constant with an explicit type, e.g. a null string or an empty array.
pub fn typed_lit<V: Into<Value>>(value: V, ty: Type) -> Expression {
    Expression::Literal(Literal {
        value: value.into(),
        ty,
    })
}

pub fn null(ty: Type) -> Expression {
    typed_lit(Value::Null, ty)
}

/// A one-parameter lambda; `body` receives the parameter expression.
pub fn lambda<F>(name: &str, ty: Type, body: F) -> Lambda
where
    F: FnOnce(Expression) -> Expression,
{
    Lambda {
        parameters: vec![Parameter {
            name: name.to_string(),
            ty: ty.clone(),
        }],
        body: Box::new(body(param(name, ty))),
    }
}

pub fn lambda2<F>(first: (&str, Type), second: (&str, Type), body: F) -> Lambda
where
    F: FnOnce(Expression, Expression) -> Expression,
{
    let (a, b) = (param(first.0, first.1.clone()), param(second.0, second.1.clone()));
    Lambda {
        parameters: vec![
            Parameter {
                name: first.0.to_string(),
                ty: first.1,
            },
            Parameter {
                name: second.0.to_string(),
                ty: second.1,
            },
        ],
        body: Box::new(body(a, b)),
    }
}

pub fn new_document(fields: Vec<(&str, Expression)>) -> Expression {
    Expression::New(New {
        fields: fields
            .into_iter()
            .map(|(name, e)| (name.to_string(), e))
            .collect(),
    })
}

pub fn new_array(elements: Vec<Expression>, element_ty: Type) -> Expression {
    Expression::NewArray(NewArray {
        elements,
        element_ty,
    })
}

pub fn cond(test: Expression, if_true: Expression, if_false: Expression) -> Expression {
    Expression::Conditional(Conditional {
        test: Box::new(test),
        if_true: Box::new(if_true),
        if_false: Box::new(if_false),
    })
}

pub fn culture(name: &str) -> CultureId {
    CultureId::new(name)
}

fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Expression {
    Expression::Binary(Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

impl Expression {
    pub fn field(self, name: &str, ty: Type) -> Expression {
        Expression::Field(Field {
            source: Box::new(self),
            name: name.to_string(),
            ty,
        })
    }

    pub fn equals(self, other: Expression) -> Expression {
        binary(BinaryOperator::Eq, self, other)
    }

    pub fn not_equals(self, other: Expression) -> Expression {
        binary(BinaryOperator::Ne, self, other)
    }

    pub fn lt(self, other: Expression) -> Expression {
        binary(BinaryOperator::Lt, self, other)
    }

    pub fn lte(self, other: Expression) -> Expression {
        binary(BinaryOperator::Lte, self, other)
    }

    pub fn gt(self, other: Expression) -> Expression {
        binary(BinaryOperator::Gt, self, other)
    }

    pub fn gte(self, other: Expression) -> Expression {
        binary(BinaryOperator::Gte, self, other)
    }

    pub fn plus(self, other: Expression) -> Expression {
        binary(BinaryOperator::Add, self, other)
    }

    pub fn minus(self, other: Expression) -> Expression {
        binary(BinaryOperator::Subtract, self, other)
    }

    pub fn times(self, other: Expression) -> Expression {
        binary(BinaryOperator::Multiply, self, other)
    }

    pub fn divided_by(self, other: Expression) -> Expression {
        binary(BinaryOperator::Divide, self, other)
    }

    pub fn and(self, other: Expression) -> Expression {
        binary(BinaryOperator::And, self, other)
    }

    pub fn or(self, other: Expression) -> Expression {
        binary(BinaryOperator::Or, self, other)
    }

    pub fn negate(self) -> Expression {
        Expression::Not(Box::new(self))
    }

    pub fn convert(self, to: Type) -> Expression {
        Expression::Convert(Convert {
            expr: Box::new(self),
            to,
        })
    }

    pub fn to_lower(self) -> Expression {
        Expression::StringCase(StringCase {
            target: Box::new(self),
            conversion: CaseConversion::ToLower,
        })
    }

    pub fn to_upper(self) -> Expression {
        Expression::StringCase(StringCase {
            target: Box::new(self),
            conversion: CaseConversion::ToUpper,
        })
    }

    fn string_predicate(
        self,
        kind: StringPredicateKind,
        value: Expression,
        mode: StringMatchMode,
    ) -> Expression {
        Expression::StringPredicate(StringPredicate {
            kind,
            target: Box::new(self),
            value: Box::new(value),
            mode,
        })
    }

    pub fn contains_str(self, value: Expression) -> Expression {
        self.string_predicate(StringPredicateKind::Contains, value, StringMatchMode::Default)
    }

    pub fn contains_str_with(self, value: Expression, comparison: StringComparison) -> Expression {
        self.string_predicate(
            StringPredicateKind::Contains,
            value,
            StringMatchMode::Comparison(comparison),
        )
    }

    pub fn starts_with(self, value: Expression) -> Expression {
        self.string_predicate(
            StringPredicateKind::StartsWith,
            value,
            StringMatchMode::Default,
        )
    }

    pub fn starts_with_mode(self, value: Expression, mode: StringMatchMode) -> Expression {
        self.string_predicate(StringPredicateKind::StartsWith, value, mode)
    }

    pub fn ends_with(self, value: Expression) -> Expression {
        self.string_predicate(StringPredicateKind::EndsWith, value, StringMatchMode::Default)
    }

    pub fn ends_with_mode(self, value: Expression, mode: StringMatchMode) -> Expression {
        self.string_predicate(StringPredicateKind::EndsWith, value, mode)
    }

    pub fn filter(self, predicate: Lambda) -> Expression {
        Expression::Where(Where {
            source: Box::new(self),
            predicate,
        })
    }

    pub fn select(self, selector: Lambda) -> Expression {
        Expression::Select(Select {
            source: Box::new(self),
            selector,
        })
    }

    pub fn group_by(self, key: Lambda) -> Expression {
        Expression::GroupBy(GroupBy {
            source: Box::new(self),
            key,
            element: None,
        })
    }

    pub fn group_by_element(self, key: Lambda, element: Lambda) -> Expression {
        Expression::GroupBy(GroupBy {
            source: Box::new(self),
            key,
            element: Some(element),
        })
    }

    fn ordering(self, key: Lambda, direction: SortDirection, then_by: bool) -> Expression {
        Expression::OrderBy(OrderBy {
            source: Box::new(self),
            key,
            direction,
            then_by,
        })
    }

    pub fn order_by(self, key: Lambda) -> Expression {
        self.ordering(key, SortDirection::Ascending, false)
    }

    pub fn order_by_descending(self, key: Lambda) -> Expression {
        self.ordering(key, SortDirection::Descending, false)
    }

    pub fn then_by(self, key: Lambda) -> Expression {
        self.ordering(key, SortDirection::Ascending, true)
    }

    pub fn then_by_descending(self, key: Lambda) -> Expression {
        self.ordering(key, SortDirection::Descending, true)
    }

    pub fn skip(self, count: Expression) -> Expression {
        Expression::Skip(Skip {
            source: Box::new(self),
            count: Box::new(count),
        })
    }

    pub fn take(self, count: Expression) -> Expression {
        Expression::Take(Take {
            source: Box::new(self),
            count: Box::new(count),
        })
    }

    fn set_op(self, op: SetOperator, other: Option<Expression>) -> Expression {
        Expression::SetOp(SetOp {
            op,
            source: Box::new(self),
            other: other.map(Box::new),
        })
    }

    pub fn concat(self, other: Expression) -> Expression {
        self.set_op(SetOperator::Concat, Some(other))
    }

    pub fn except(self, other: Expression) -> Expression {
        self.set_op(SetOperator::Except, Some(other))
    }

    pub fn intersect(self, other: Expression) -> Expression {
        self.set_op(SetOperator::Intersect, Some(other))
    }

    pub fn union(self, other: Expression) -> Expression {
        self.set_op(SetOperator::Union, Some(other))
    }

    pub fn distinct(self) -> Expression {
        self.set_op(SetOperator::Distinct, None)
    }

    pub fn all(self, predicate: Lambda) -> Expression {
        Expression::Quantifier(Quantifier {
            kind: QuantifierKind::All,
            source: Box::new(self),
            predicate: Some(predicate),
        })
    }

    pub fn any(self) -> Expression {
        Expression::Quantifier(Quantifier {
            kind: QuantifierKind::Any,
            source: Box::new(self),
            predicate: None,
        })
    }

    pub fn any_with(self, predicate: Lambda) -> Expression {
        Expression::Quantifier(Quantifier {
            kind: QuantifierKind::Any,
            source: Box::new(self),
            predicate: Some(predicate),
        })
    }

    pub fn contains(self, value: Expression) -> Expression {
        Expression::Contains(Contains {
            source: Box::new(self),
            value: Box::new(value),
        })
    }

    fn element(self, kind: ElementKind, predicate: Option<Lambda>, or_default: bool) -> Expression {
        Expression::ElementAccess(ElementAccess {
            kind,
            source: Box::new(self),
            predicate,
            or_default,
        })
    }

    pub fn first(self) -> Expression {
        self.element(ElementKind::First, None, false)
    }

    pub fn first_with(self, predicate: Lambda) -> Expression {
        self.element(ElementKind::First, Some(predicate), false)
    }

    pub fn first_or_default(self) -> Expression {
        self.element(ElementKind::First, None, true)
    }

    pub fn first_or_default_with(self, predicate: Lambda) -> Expression {
        self.element(ElementKind::First, Some(predicate), true)
    }

    pub fn last(self) -> Expression {
        self.element(ElementKind::Last, None, false)
    }

    pub fn last_with(self, predicate: Lambda) -> Expression {
        self.element(ElementKind::Last, Some(predicate), false)
    }

    pub fn last_or_default(self) -> Expression {
        self.element(ElementKind::Last, None, true)
    }

    pub fn element_at(self, index: Expression) -> Expression {
        self.element(ElementKind::ElementAt(Box::new(index)), None, false)
    }

    pub fn element_at_or_default(self, index: Expression) -> Expression {
        self.element(ElementKind::ElementAt(Box::new(index)), None, true)
    }

    pub fn aggregate(self, func: Lambda) -> Expression {
        Expression::Reduce(Reduce {
            source: Box::new(self),
            seed: None,
            func,
            result_selector: None,
        })
    }

    pub fn aggregate_seeded(self, seed: Expression, func: Lambda) -> Expression {
        Expression::Reduce(Reduce {
            source: Box::new(self),
            seed: Some(Box::new(seed)),
            func,
            result_selector: None,
        })
    }

    pub fn aggregate_seeded_with_result(
        self,
        seed: Expression,
        func: Lambda,
        result_selector: Lambda,
    ) -> Expression {
        Expression::Reduce(Reduce {
            source: Box::new(self),
            seed: Some(Box::new(seed)),
            func,
            result_selector: Some(result_selector),
        })
    }

    fn summarize(self, function: AggregateFunction, selector: Option<Lambda>) -> Expression {
        Expression::Aggregate(Aggregate {
            function,
            source: Box::new(self),
            selector,
        })
    }

    pub fn count(self) -> Expression {
        self.summarize(AggregateFunction::Count, None)
    }

    pub fn count_with(self, predicate: Lambda) -> Expression {
        self.summarize(AggregateFunction::Count, Some(predicate))
    }

    pub fn long_count(self) -> Expression {
        self.summarize(AggregateFunction::LongCount, None)
    }

    pub fn sum(self) -> Expression {
        self.summarize(AggregateFunction::Sum, None)
    }

    pub fn sum_with(self, selector: Lambda) -> Expression {
        self.summarize(AggregateFunction::Sum, Some(selector))
    }

    pub fn average(self) -> Expression {
        self.summarize(AggregateFunction::Average, None)
    }

    pub fn average_with(self, selector: Lambda) -> Expression {
        self.summarize(AggregateFunction::Average, Some(selector))
    }

    pub fn min(self) -> Expression {
        self.summarize(AggregateFunction::Min, None)
    }

    pub fn min_with(self, selector: Lambda) -> Expression {
        self.summarize(AggregateFunction::Min, Some(selector))
    }

    pub fn max(self) -> Expression {
        self.summarize(AggregateFunction::Max, None)
    }

    pub fn max_with(self, selector: Lambda) -> Expression {
        self.summarize(AggregateFunction::Max, Some(selector))
    }

    pub fn std_dev_pop_with(self, selector: Lambda) -> Expression {
        self.summarize(AggregateFunction::StdDevPop, Some(selector))
    }

    pub fn std_dev_samp_with(self, selector: Lambda) -> Expression {
        self.summarize(AggregateFunction::StdDevSamp, Some(selector))
    }

    pub fn reverse(self) -> Expression {
        Expression::Reverse(Box::new(self))
    }

    pub fn default_if_empty(self) -> Expression {
        Expression::DefaultIfEmpty(Box::new(self))
    }

    pub fn to_array(self) -> Expression {
        Expression::ToArray(Box::new(self))
    }

    pub fn zip(self, other: Expression, selector: Lambda) -> Expression {
        Expression::Zip(Zip {
            source: Box::new(self),
            other: Box::new(other),
            selector,
        })
    }

    fn dictionary(self, op: DictionaryOp) -> Expression {
        Expression::Dictionary(DictionaryAccess {
            source: Box::new(self),
            op,
        })
    }

    pub fn contains_key(self, key: Expression) -> Expression {
        self.dictionary(DictionaryOp::ContainsKey(Box::new(key)))
    }

    pub fn contains_value(self, value: Expression) -> Expression {
        self.dictionary(DictionaryOp::ContainsValue(Box::new(value)))
    }

    pub fn keys(self) -> Expression {
        self.dictionary(DictionaryOp::Keys)
    }

    pub fn values(self) -> Expression {
        self.dictionary(DictionaryOp::Values)
    }

    pub fn index(self, key: Expression) -> Expression {
        self.dictionary(DictionaryOp::Indexer(Box::new(key)))
    }

    pub fn entry_count(self) -> Expression {
        self.dictionary(DictionaryOp::Count)
    }

    pub fn entry_count_with(self, predicate: Lambda) -> Expression {
        self.dictionary(DictionaryOp::CountWithPredicate(predicate))
    }

    pub fn first_entry(self, predicate: Lambda) -> Expression {
        self.dictionary(DictionaryOp::First(predicate))
    }

    pub fn first_entry_or_default(self, predicate: Lambda) -> Expression {
        self.dictionary(DictionaryOp::FirstOrDefault(predicate))
    }
}
