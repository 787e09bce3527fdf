use super::{
    shape::element_name, unsupported, DocumentShape, Error, MapValue, MqlTranslator,
    ProjectedMember, Result, Translated, ValueShape,
};
use crate::{
    ir::{self, BinaryOperator, CaseConversion, Expression, Type, Value},
    mql::{self, MqlOperator},
    representation::{MapShape, RepresentationTag},
};
use std::collections::HashSet;

pub(crate) fn boolean(ast: mql::Expression) -> Translated {
    Translated::new(ast, ValueShape::Scalar(RepresentationTag::Native))
}

impl<'a> MqlTranslator<'a> {
    /// Translates a value-producing node into an aggregation expression.
    pub(crate) fn translate_expr(&mut self, expr: &Expression) -> Result<Translated> {
        use Expression::*;
        match expr {
            Literal(l) => Ok(Self::translate_literal(&l.value, &l.ty)),
            Parameter(p) => self
                .lookup(&p.name)
                .cloned()
                .ok_or_else(|| unsupported(expr, format!("parameter '{}' is not bound", p.name))),
            Source(_) => Err(unsupported(
                expr,
                "a collection cannot be read inside an expression",
            )),
            Field(f) => self.translate_field(expr, f),
            Binary(b) => self.translate_binary(expr, b),
            Not(e) => {
                let operand = self.translate_expr(e)?;
                Ok(boolean(mql::Expression::op(
                    MqlOperator::Not,
                    vec![operand.ast],
                )))
            }
            Conditional(c) => {
                let test = self.translate_expr(&c.test)?;
                let if_true = self.translate_expr(&c.if_true)?;
                let if_false = self.translate_expr(&c.if_false)?;
                Ok(Translated::new(
                    mql::Expression::cond(test.ast, if_true.ast, if_false.ast),
                    if_true.shape,
                ))
            }
            Convert(c) => self.translate_convert(expr, c),
            New(n) => self.translate_new(n),
            NewArray(a) => {
                let elements = a
                    .elements
                    .iter()
                    .map(|e| self.translate_expr(e))
                    .collect::<Result<Vec<_>>>()?;
                let element_shape = elements
                    .first()
                    .map(|t| t.shape.clone())
                    .unwrap_or_else(|| ValueShape::computed(&a.element_ty));
                Ok(Translated::new(
                    mql::Expression::Array(elements.into_iter().map(|t| t.ast).collect()),
                    ValueShape::Array(Box::new(element_shape)),
                ))
            }
            StringPredicate(p) => self.translate_string_predicate(expr, p),
            StringCase(s) => self.translate_string_case(expr, s),
            Dictionary(d) => self.translate_dictionary(expr, d),
            Where(_) | Select(_) | GroupBy(_) | OrderBy(_) | Skip(_) | Take(_) | SetOp(_)
            | Quantifier(_) | Contains(_) | ElementAccess(_) | Reduce(_) | Aggregate(_)
            | Reverse(_) | DefaultIfEmpty(_) | ToArray(_) | Zip(_) => self.translate_sequence(expr),
        }
    }

    /// Constants take their natural BSON form. Maps with string keys become
    /// documents, any other map an array of pairs.
    pub(crate) fn translate_literal(value: &Value, ty: &Type) -> Translated {
        let (key_ty, value_ty) = match ty {
            Type::Dictionary(k, v) => (k.as_ref().clone(), v.as_ref().clone()),
            _ => (Type::Null, Type::Null),
        };
        match value {
            Value::Map(entries) if entries.iter().all(|(k, _)| matches!(k, Value::String(_))) => {
                let doc = entries
                    .iter()
                    .map(|(k, v)| (k.as_text().unwrap_or_default(), v.to_bson()))
                    .collect::<bson::Document>();
                Translated::new(
                    mql::Expression::Literal(bson::Bson::Document(doc)),
                    ValueShape::Map(MapValue {
                        shape: MapShape::Document,
                        path: None,
                        key_ty,
                        value_ty,
                    }),
                )
            }
            Value::Map(_) => Translated::new(
                mql::Expression::Literal(value.to_bson()),
                ValueShape::Map(MapValue {
                    shape: MapShape::ArrayOfPairs,
                    path: None,
                    key_ty,
                    value_ty,
                }),
            ),
            _ => Translated::new(
                mql::Expression::Literal(value.to_bson()),
                ValueShape::computed(ty),
            ),
        }
    }

    fn translate_binary(&mut self, expr: &Expression, b: &ir::Binary) -> Result<Translated> {
        if b.op.is_logical() {
            let mut operands = Vec::new();
            Self::flatten_logical(b.op, expr, &mut operands);
            let args = operands
                .into_iter()
                .map(|e| self.translate_expr(e).map(|t| t.ast))
                .collect::<Result<Vec<_>>>()?;
            let op = match b.op {
                BinaryOperator::And => MqlOperator::And,
                _ => MqlOperator::Or,
            };
            return Ok(boolean(mql::Expression::op(op, args)));
        }
        if b.op.is_comparison() {
            return self.translate_comparison(expr, b.op, &b.left, &b.right);
        }
        self.translate_arithmetic(expr, b)
    }

    /// Collects the operands of a chain of the same logical operator.
    pub(crate) fn flatten_logical<'e>(op: BinaryOperator, expr: &'e Expression, out: &mut Vec<&'e Expression>) {
        match expr {
            Expression::Binary(b) if b.op == op => {
                Self::flatten_logical(op, &b.left, out);
                Self::flatten_logical(op, &b.right, out);
            }
            e => out.push(e),
        }
    }

    /// An anonymous document. Members named `Id` are stored as `_id`.
    fn translate_new(&mut self, n: &ir::New) -> Result<Translated> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(n.fields.len());
        let mut members = Vec::with_capacity(n.fields.len());
        for (member, e) in n.fields.iter() {
            if member.is_empty() || member.contains('.') || member.starts_with('$') {
                return Err(Error::InvalidFieldName(member.clone()));
            }
            let element = element_name(member).to_string();
            if !seen.insert(element.clone()) {
                return Err(Error::DuplicateField(element));
            }
            let value = self.translate_expr(e)?;
            fields.push((element.clone(), value.ast));
            members.push(ProjectedMember {
                member: member.clone(),
                element,
                shape: value.shape,
            });
        }
        Ok(Translated::new(
            mql::Expression::Document(fields),
            ValueShape::Document(DocumentShape::Projected(members)),
        ))
    }

    fn translate_string_case(&mut self, expr: &Expression, s: &ir::StringCase) -> Result<Translated> {
        let target = self.string_operand_ast(expr, &s.target)?;
        let op = match s.conversion {
            CaseConversion::ToLower => MqlOperator::ToLower,
            CaseConversion::ToUpper => MqlOperator::ToUpper,
        };
        Ok(Translated::new(
            mql::Expression::op(op, vec![target]),
            ValueShape::Scalar(RepresentationTag::Native),
        ))
    }
}
