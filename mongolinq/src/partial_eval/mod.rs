//! Constant folding ahead of translation. A sub-tree that reads neither the
//! current document nor a collection is evaluated in process and replaced by
//! its literal value.

use crate::{
    ir::{
        visitor::{Visitor, Walk},
        Expression, Literal, Value,
    },
    local_eval::LocalEvaluator,
};
use tracing::{event, Level};


#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Constant(Value),
    Unresolved,
}

/// Decides whether `expr` is statically determinable. Sub-trees whose
/// evaluation fails, such as element access past the end of a constant
/// array, stay unresolved and are left to the translator.
pub fn evaluate(expr: &Expression) -> Evaluation {
    if !expr.free_parameters().is_empty() || expr.references_source() {
        return Evaluation::Unresolved;
    }
    match LocalEvaluator::constant().evaluate(expr) {
        Ok(value) if has_grouping(&value) => Evaluation::Unresolved,
        Ok(value) => Evaluation::Constant(value),
        Err(e) => {
            event!(Level::TRACE, operator = expr.operator_name(), error = %e, "not folded");
            Evaluation::Unresolved
        }
    }
}

/// Groupings have no literal form in the pipeline.
fn has_grouping(value: &Value) -> bool {
    match value {
        Value::Grouping { .. } => true,
        Value::Array(a) => a.iter().any(has_grouping),
        Value::Document(d) => d.values().any(has_grouping),
        Value::Map(entries) => entries.iter().any(|(k, v)| has_grouping(k) || has_grouping(v)),
        _ => false,
    }
}

/// Replaces every maximal constant sub-tree of `expr` with a literal.
pub fn fold(expr: Expression) -> Expression {
    PartialEvaluator.visit_expression(expr)
}

struct PartialEvaluator;

impl Visitor for PartialEvaluator {
    fn visit_expression(&mut self, node: Expression) -> Expression {
        if let Expression::Literal(_) = node {
            return node;
        }
        match evaluate(&node) {
            Evaluation::Constant(value) => Expression::Literal(Literal {
                value,
                ty: node.ty(),
            }),
            Evaluation::Unresolved => node.walk(self),
        }
    }
}
