//! Encodes constants in the wire form of the values they are compared with
//! and converts between stored representations in computed expressions.

use super::{expressions::boolean, unsupported, unsupported_comparison, MqlTranslator, Result, Translated, ValueShape};
use crate::{
    ir::{self, BinaryOperator, Expression, Type, Value},
    mql::{self, MqlOperator},
    representation::{RepresentationTag, ScalarKind},
};
use bson::Bson;

/// Encodes `value` in representation `tag`. String-encoded scalars are
/// written as their canonical string, characters stored as numbers as their
/// code point and decimals stored as numbers as Decimal128.
pub(crate) fn encode(value: &Value, tag: RepresentationTag) -> Bson {
    match (tag, value) {
        (_, Value::Null) => Bson::Null,
        (RepresentationTag::StringEncodedScalar(_), Value::Decimal(d)) => Bson::String(d.to_string()),
        (RepresentationTag::StringEncodedScalar(_), Value::Char(c)) => Bson::String(c.to_string()),
        (RepresentationTag::StringEncodedScalar(_), Value::Int32(i)) => Bson::String(i.to_string()),
        (RepresentationTag::StringEncodedScalar(_), Value::Int64(l)) => Bson::String(l.to_string()),
        (RepresentationTag::StringEncodedScalar(_), Value::Double(d)) => Bson::String(d.to_string()),
        _ => value.to_bson(),
    }
}

/// Encodes `value` to match a value of shape `shape`, element-wise for
/// arrays.
pub(crate) fn encode_as(value: &Value, shape: &ValueShape) -> Bson {
    match (shape, value) {
        (ValueShape::Scalar(tag), v) => encode(v, *tag),
        (ValueShape::Array(element), Value::Array(items)) => {
            Bson::Array(items.iter().map(|v| encode_as(v, element)).collect())
        }
        (_, v) => v.to_bson(),
    }
}

fn comparison_op(op: BinaryOperator) -> MqlOperator {
    match op {
        BinaryOperator::Eq => MqlOperator::Eq,
        BinaryOperator::Ne => MqlOperator::Ne,
        BinaryOperator::Lt => MqlOperator::Lt,
        BinaryOperator::Lte => MqlOperator::Lte,
        BinaryOperator::Gt => MqlOperator::Gt,
        _ => MqlOperator::Gte,
    }
}

fn conversion_op(to: &Type) -> Option<MqlOperator> {
    match to {
        Type::Int32 | Type::Char => Some(MqlOperator::ToInt),
        Type::Int64 => Some(MqlOperator::ToLong),
        Type::Double => Some(MqlOperator::ToDouble),
        Type::Decimal => Some(MqlOperator::ToDecimal),
        Type::String => Some(MqlOperator::ToString),
        _ => None,
    }
}

fn numeric_rank(t: &Type) -> u8 {
    match t {
        Type::Char | Type::Int32 => 0,
        Type::Int64 => 1,
        Type::Double => 2,
        _ => 3,
    }
}

impl<'a> MqlTranslator<'a> {
    /// Translates `expr`, encoding it like `partner` when it is a constant.
    pub(crate) fn coerce_operand(&mut self, expr: &Expression, partner: &ValueShape) -> Result<Translated> {
        match expr {
            Expression::Literal(l) if !matches!(l.value, Value::Map(_)) => {
                let shape = match partner {
                    ValueShape::Scalar(_) | ValueShape::Array(_) => partner.clone(),
                    _ => ValueShape::computed(&l.ty),
                };
                Ok(Translated::new(
                    mql::Expression::Literal(encode_as(&l.value, partner)),
                    shape,
                ))
            }
            e => self.translate_expr(e),
        }
    }

    /// Compares two operands. A constant operand is encoded like the other
    /// operand; two computed operands are compared as stored.
    pub(crate) fn translate_comparison(
        &mut self,
        expr: &Expression,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
    ) -> Result<Translated> {
        let (l, r) = match (left, right) {
            (l, Expression::Literal(_)) => {
                let l = self.translate_expr(l)?;
                let r = self.coerce_operand(right, &l.shape)?;
                (l, r)
            }
            (Expression::Literal(_), r) => {
                let r = self.translate_expr(r)?;
                let l = self.coerce_operand(left, &r.shape)?;
                (l, r)
            }
            (l, r) => {
                let l = self.translate_expr(l)?;
                let r = self.translate_expr(r)?;
                self.check_stored_comparison(expr, &l, &r)?;
                (l, r)
            }
        };
        Ok(boolean(mql::Expression::op(
            comparison_op(op),
            vec![l.ast, r.ast],
        )))
    }

    fn check_stored_comparison(&self, expr: &Expression, l: &Translated, r: &Translated) -> Result<()> {
        if !self.options.strict_representations {
            return Ok(());
        }
        match (l.tag(), r.tag()) {
            (Some(a), Some(b)) if a.is_string_encoded() != b.is_string_encoded() => {
                Err(unsupported_comparison(
                    expr,
                    format!("the operands are stored as {a:?} and {b:?}"),
                ))
            }
            _ => Ok(()),
        }
    }

    /// The numeric view of a translated operand: string-encoded scalars are
    /// converted back to numbers.
    pub(crate) fn numeric(&self, expr: &Expression, operand: Translated) -> Result<mql::Expression> {
        let op = match operand.tag() {
            Some(RepresentationTag::StringEncodedScalar(kind)) => match kind {
                ScalarKind::Decimal => MqlOperator::ToDecimal,
                ScalarKind::Int32 => MqlOperator::ToInt,
                ScalarKind::Int64 => MqlOperator::ToLong,
                ScalarKind::Double => MqlOperator::ToDouble,
                ScalarKind::Char => {
                    return Err(unsupported(
                        expr,
                        "a character stored as a string has no numeric value",
                    ))
                }
            },
            _ => return Ok(operand.ast),
        };
        Ok(mql::Expression::op(op, vec![operand.ast]))
    }

    pub(crate) fn translate_arithmetic(&mut self, expr: &Expression, b: &ir::Binary) -> Result<Translated> {
        let l = self.translate_expr(&b.left)?;
        let r = self.translate_expr(&b.right)?;
        if expr.ty() == Type::String {
            let text = |e: &Expression, t: Translated| {
                if e.ty() == Type::String || t.tag().map_or(false, |tag| tag.is_string_encoded()) {
                    t.ast
                } else {
                    mql::Expression::op(MqlOperator::ToString, vec![t.ast])
                }
            };
            let args = vec![text(&b.left, l), text(&b.right, r)];
            return Ok(Translated::new(
                mql::Expression::op(MqlOperator::Concat, args),
                ValueShape::Scalar(RepresentationTag::Native),
            ));
        }
        let args = vec![self.numeric(expr, l)?, self.numeric(expr, r)?];
        let op = match b.op {
            BinaryOperator::Add => MqlOperator::Add,
            BinaryOperator::Subtract => MqlOperator::Subtract,
            BinaryOperator::Multiply => MqlOperator::Multiply,
            _ => MqlOperator::Divide,
        };
        let mut ast = mql::Expression::op(op, args);
        // integer division truncates
        if b.op == BinaryOperator::Divide && matches!(expr.ty(), Type::Int32 | Type::Int64) {
            ast = mql::Expression::op(MqlOperator::Trunc, vec![ast]);
        }
        Ok(Translated::new(
            ast,
            ValueShape::Scalar(RepresentationTag::NumericScalar),
        ))
    }

    pub(crate) fn translate_convert(&mut self, expr: &Expression, c: &ir::Convert) -> Result<Translated> {
        let from = c.expr.ty();
        let operand = self.translate_expr(&c.expr)?;
        let string_encoded = operand.tag().map_or(false, |tag| tag.is_string_encoded());
        let shape = ValueShape::computed(&c.to);
        let wrap = |op: MqlOperator, ast: mql::Expression| mql::Expression::op(op, vec![ast]);
        let ast = match (&c.to, &from) {
            (to, from) if to == from && !string_encoded => operand.ast,
            (Type::String, _) if string_encoded || from == Type::String => operand.ast,
            (Type::String, _) => wrap(MqlOperator::ToString, operand.ast),
            (to, Type::Char) if string_encoded && to.is_numeric() => {
                return Err(unsupported(
                    expr,
                    "a character stored as a string has no numeric value",
                ))
            }
            (to, from) if (to.is_numeric() || *to == Type::Char) && (string_encoded || *from == Type::String) => {
                match conversion_op(to) {
                    Some(op) => wrap(op, operand.ast),
                    None => operand.ast,
                }
            }
            (to, from)
                if (to.is_numeric() || *to == Type::Char)
                    && (from.is_numeric() || *from == Type::Char) =>
            {
                match to {
                    Type::Decimal if *from != Type::Decimal => wrap(MqlOperator::ToDecimal, operand.ast),
                    Type::Double if *from == Type::Decimal => wrap(MqlOperator::ToDouble, operand.ast),
                    to if numeric_rank(to) < numeric_rank(from) => match conversion_op(to) {
                        Some(op) => wrap(op, operand.ast),
                        None => operand.ast,
                    },
                    // widening keeps the stored number
                    _ => operand.ast,
                }
            }
            _ => operand.ast,
        };
        Ok(Translated::new(ast, shape))
    }
}
