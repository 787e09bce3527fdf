use super::{Error, MqlCodeGenerator, Result};
use crate::mql::{self, Expression};
use bson::{bson, doc, Bson};

impl MqlCodeGenerator {
    pub fn codegen_expression(&self, expr: Expression) -> Result<Bson> {
        match expr {
            Expression::Literal(b) => Ok(Self::wrap_in_literal_if(b, Self::needs_literal)),
            Expression::FieldRef(path) if path.is_empty() => Err(Error::EmptyFieldPath),
            Expression::FieldRef(path) => Ok(Bson::String(format!("${path}"))),
            Expression::Variable(var) => Ok(Bson::String(format!("$${var}"))),
            Expression::Operator(o) => self.codegen_operator(o),
            Expression::Let(l) => {
                let vars = l
                    .vars
                    .into_iter()
                    .map(|(name, e)| Ok((name, self.codegen_expression(e)?)))
                    .collect::<Result<bson::Document>>()?;
                Ok(bson!({"$let": {
                    "vars": vars,
                    "in": self.codegen_expression(*l.inside)?,
                }}))
            }
            Expression::Cond(c) => Ok(bson!({"$cond": {
                "if": self.codegen_expression(*c.test)?,
                "then": self.codegen_expression(*c.then)?,
                "else": self.codegen_expression(*c.otherwise)?,
            }})),
            Expression::Filter(f) => {
                let mut body = doc! {
                    "input": self.codegen_expression(*f.input)?,
                    "as": f._as,
                    "cond": self.codegen_expression(*f.cond)?,
                };
                if let Some(limit) = f.limit {
                    body.insert("limit", self.codegen_expression(*limit)?);
                }
                Ok(bson!({ "$filter": body }))
            }
            Expression::Map(m) => Ok(bson!({"$map": {
                "input": self.codegen_expression(*m.input)?,
                "as": m._as,
                "in": self.codegen_expression(*m.inside)?,
            }})),
            Expression::Reduce(r) => Ok(bson!({"$reduce": {
                "input": self.codegen_expression(*r.input)?,
                "initialValue": self.codegen_expression(*r.initial_value)?,
                "in": self.codegen_expression(*r.inside)?,
            }})),
            Expression::Zip(z) => {
                let inputs = z
                    .inputs
                    .into_iter()
                    .map(|e| self.codegen_expression(e))
                    .collect::<Result<Vec<_>>>()?;
                Ok(bson!({"$zip": { "inputs": inputs }}))
            }
            Expression::Array(array) => Ok(Bson::Array(
                array
                    .into_iter()
                    .map(|e| self.codegen_expression(e))
                    .collect::<Result<Vec<Bson>>>()?,
            )),
            Expression::Document(fields) => Ok(Bson::Document(
                fields
                    .into_iter()
                    .map(|(k, v)| Ok((k, self.codegen_expression(v)?)))
                    .collect::<Result<bson::Document>>()?,
            )),
        }
    }

    /// Operators with a single operand are written without the argument
    /// array unless the operand is itself an array.
    fn codegen_operator(&self, o: mql::Operator) -> Result<Bson> {
        let operator = Self::to_mql_op(o.op);
        let mut args = o
            .args
            .into_iter()
            .map(|e| self.codegen_expression(e))
            .collect::<Result<Vec<_>>>()?;
        if args.len() == 1 && !matches!(args[0], Bson::Array(_)) {
            let arg = args.remove(0);
            return Ok(bson!({ operator: arg }));
        }
        Ok(bson!({ operator: Bson::Array(args) }))
    }
}
